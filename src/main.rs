mod audio;
mod audio_api;
mod effects;
mod engines;
mod error;
mod loader;
mod offline;
mod params;
mod pipeline;
mod scheduler;
mod session;
mod shared;
mod tui;

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use crossterm::terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;

use audio::{AudioBuffer, Engine};
use loader::sample_loader;
use pipeline::config::Config;
use pipeline::persistence;
use session::{KitSample, Session, SessionSetup};
use shared::InputEvent;

const LOG_ENV: &str = "GRAINSTEP_LOG";
const DEFAULT_BOUNCE_SECONDS: f64 = 8.0;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

// grainstep [project_dir]
// grainstep bounce <out.wav> [seconds] [project_dir]
fn run() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("bounce") => {
            let out = args.get(1).map(PathBuf::from).context("usage: grainstep bounce <out.wav> [seconds] [project_dir]")?;
            let seconds = match args.get(2) {
                Some(s) => s.parse::<f64>().with_context(|| format!("`{s}` is not a number of seconds"))?,
                None => DEFAULT_BOUNCE_SECONDS,
            };
            let project_dir = project_dir(args.get(3));
            init_logging(&project_dir)?;
            run_bounce(&project_dir, &out, seconds)
        }
        other => {
            let project_dir = project_dir(other);
            init_logging(&project_dir)?;
            run_live(&project_dir)
        }
    }
}

fn project_dir(arg: Option<impl AsRef<str>>) -> PathBuf {
    arg.map(|a| PathBuf::from(a.as_ref()))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default())
}

// the terminal belongs to the tui, so logs go to .grainstep/grainstep.log
fn init_logging(project_dir: &Path) -> anyhow::Result<()> {
    let path = persistence::log_file_path(project_dir);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;

    let level = std::env::var(LOG_ENV)
        .ok()
        .and_then(|v| tracing::Level::from_str(&v).ok())
        .unwrap_or(tracing::Level::INFO);

    tracing_subscriber::fmt()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_max_level(level)
        .init();
    Ok(())
}

// every sample is decoded before a single producer exists
fn load_samples(config: &Config, project_dir: &Path, sample_rate: u32) -> anyhow::Result<(Vec<KitSample>, Arc<AudioBuffer>)> {
    let paths = config.kit_paths(project_dir)?;
    let buffers = sample_loader::load_all(&paths, sample_rate)?;
    let kit: Vec<KitSample> = paths
        .iter()
        .zip(buffers)
        .map(|(path, buffer)| KitSample {
            name: path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
            buffer,
        })
        .collect();

    let grain_source = match config.grain_source_path(project_dir) {
        Some(path) => sample_loader::load(&path, sample_rate)?,
        None => kit.first().map(|s| Arc::clone(&s.buffer)).context("kit is empty")?,
    };
    tracing::info!(tracks = kit.len(), sample_rate, "samples loaded");
    Ok((kit, grain_source))
}

fn restore_saved<G: audio_api::AudioGraph, K: scheduler::Clock>(session: &mut Session<G, K>, project_dir: &Path) {
    if let Some(state) = persistence::load_project(project_dir) {
        session.restore(&state);
    }
}

fn run_bounce(project_dir: &Path, out: &Path, seconds: f64) -> anyhow::Result<()> {
    let config = Config::load(project_dir)?;
    let sample_rate = config.bounce_sample_rate;
    let (kit, grain_source) = load_samples(&config, project_dir, sample_rate)?;

    let engine = Engine::new(sample_rate);
    let clock = engine.clock();
    let mut session = Session::new(engine, clock, SessionSetup::from_config(&config, sample_rate, kit, grain_source))?;
    restore_saved(&mut session, project_dir);
    session.start_transport();

    let stats = offline::bounce(&mut session, seconds, out)?;
    println!("wrote {} ({} frames, peak {:.3})", out.display(), stats.frames, stats.peak);
    Ok(())
}

fn run_live(project_dir: &Path) -> anyhow::Result<()> {
    let config = Config::load(project_dir)?;
    let audio = audio::start_audio(config.command_queue)?;
    let sample_rate = audio.sample_rate();
    let (kit, grain_source) = load_samples(&config, project_dir, sample_rate)?;

    let clock = audio.clock();
    let mut session = Session::new(audio, clock, SessionSetup::from_config(&config, sample_rate, kit, grain_source))?;
    restore_saved(&mut session, project_dir);
    session.observe_display(Box::new(|row| {
        tracing::trace!(step = ?row.iter().position(|&on| on), "display step");
    }));

    terminal::enable_raw_mode()?;
    let _guard = RawModeGuard; // auto drops when out of scope

    let backend = CrosstermBackend::new(std::io::stdout());
    let mut term = Terminal::new(backend)?;
    term.clear()?;

    let frame_time = Duration::from_millis(16); // ~60fps
    let mut tui_state = tui::mode::TuiState::default();

    loop {
        // stalls are already logged and shown in the status line
        let _ = session.tick();

        let ended = session.graph().poll_ended();
        if !ended.is_empty() {
            tracing::debug!(count = ended.len(), "sources released");
        }

        let ds = session.display_state();
        tui_state.sync(&ds);
        term.draw(|frame| {
            tui::view::render(frame, frame.area(), &ds);
        })?;

        for event in tui::input::poll_input(frame_time, &tui_state)? {
            if event == InputEvent::Quit {
                if let Err(e) = persistence::save_project(project_dir, &session.snapshot()) {
                    tracing::error!("failed to save project: {e:#}");
                }
                return Ok(());
            }
            session.handle_input(event);
        }
    }
}

struct RawModeGuard;
impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}
