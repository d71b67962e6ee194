// Renders a session without an audio device: the scheduler and the renderer
// share one clock that only moves when a block is rendered.
use std::path::Path;

use anyhow::Context;

use crate::audio::{AudioClock, Engine, StereoFrame};
use crate::error::SchedulerError;
use crate::session::Session;

pub const BLOCK_FRAMES: usize = 128;

pub type OfflineSession = Session<Engine, AudioClock>;

/// Peak and RMS over both channels of a render.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BounceStats {
    pub frames: usize,
    pub peak: f32,
    pub rms: f32,
}

impl BounceStats {
    fn from_frames(frames: &[StereoFrame]) -> Self {
        let peak = frames.iter().map(|f| f.peak()).fold(0.0f32, f32::max);
        let sum_squares: f64 = frames
            .iter()
            .map(|f| (f.left as f64).powi(2) + (f.right as f64).powi(2))
            .sum();
        let rms = if frames.is_empty() {
            0.0
        } else {
            (sum_squares / (2 * frames.len()) as f64).sqrt() as f32
        };
        Self { frames: frames.len(), peak, rms }
    }
}

/// Tick, then render one block, until `seconds` of audio exist.
pub fn render(session: &mut OfflineSession, seconds: f64) -> Result<Vec<StereoFrame>, SchedulerError> {
    let sample_rate = session.graph().sample_rate();
    let total = (seconds.max(0.0) * sample_rate as f64).round() as usize;
    let mut out = Vec::with_capacity(total);
    let mut block = [StereoFrame::zero(); BLOCK_FRAMES];

    while out.len() < total {
        session.tick()?;
        let n = BLOCK_FRAMES.min(total - out.len());
        session.graph_mut().render_block(&mut block[..n]);
        out.extend_from_slice(&block[..n]);
    }
    Ok(out)
}

/// Stereo 32-bit float WAV, samples as rendered (no clipping).
pub fn write_wav(path: &Path, sample_rate: u32, frames: &[StereoFrame]) -> anyhow::Result<()> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer =
        hound::WavWriter::create(path, spec).with_context(|| format!("failed to create {}", path.display()))?;
    for frame in frames {
        writer.write_sample(frame.left)?;
        writer.write_sample(frame.right)?;
    }
    writer.finalize().with_context(|| format!("failed to finalize {}", path.display()))?;
    Ok(())
}

pub fn bounce(session: &mut OfflineSession, seconds: f64, path: &Path) -> anyhow::Result<BounceStats> {
    let frames = render(session, seconds)?;
    write_wav(path, session.graph().sample_rate(), &frames)?;
    let stats = BounceStats::from_frames(&frames);
    tracing::info!(path = %path.display(), frames = stats.frames, peak = stats.peak, rms = stats.rms, "bounce written");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::audio::AudioBuffer;
    use crate::effects::{DelaySettings, ReverbSettings};
    use crate::engines::GrainSettings;
    use crate::session::{KitSample, SessionSetup};
    use crate::shared::InputEvent;

    const RATE: u32 = 8000;

    fn session() -> OfflineSession {
        let hit = Arc::new(AudioBuffer::from_mono(RATE, vec![0.5; 400]).unwrap());
        let setup = SessionSetup {
            sample_rate: RATE,
            lookahead: 0.1,
            steps: 4,
            bpm: 240.0,
            master_db: 0.0,
            kit: vec![KitSample { name: "hit.wav".into(), buffer: hit }],
            grain_source: Arc::new(AudioBuffer::from_mono(RATE, vec![0.25; 2 * RATE as usize]).unwrap()),
            grain: GrainSettings::default(),
            delay: DelaySettings { pre_gain: 1.0, delay_time: 0.25, feedback: 0.0 },
            reverb: ReverbSettings::default(),
            seed: Some(3),
        };
        let engine = Engine::new(RATE);
        let clock = engine.clock();
        Session::new(engine, clock, setup).unwrap()
    }

    #[test]
    fn idle_session_is_silent() {
        let mut s = session();
        let frames = render(&mut s, 0.5).unwrap();
        assert_eq!(frames.len(), 4000);
        assert_eq!(BounceStats::from_frames(&frames).peak, 0.0);
        assert!((s.now() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn sequenced_hits_land_on_the_beat() {
        let mut s = session();
        s.toggle_step(0, 0);
        s.start_transport();
        let frames = render(&mut s, 1.2).unwrap();

        // first step at 0.1 s, one step every 0.25 s, four steps per bar
        let onset = frames.iter().position(|f| f.peak() > 1e-3).unwrap();
        assert!((onset as i64 - 800).abs() <= 2, "onset at {onset}");
        let second_bar = 800 + 4 * 2000;
        assert!(frames[second_bar - 100..second_bar - 10].iter().all(|f| f.peak() < 1e-3));
        assert!(frames[second_bar + 10..second_bar + 100].iter().any(|f| f.peak() > 1e-3));
    }

    #[test]
    fn pads_echo_once_with_zero_feedback() {
        let mut s = session();
        s.handle_input(InputEvent::TriggerPad(0));
        let frames = render(&mut s, 1.0).unwrap();

        let loud = |range: std::ops::Range<usize>| frames[range].iter().any(|f| f.peak() > 0.1);
        assert!(loud(0..400));
        assert!(!loud(500..1900));
        assert!(loud(2000..2400));
        assert!(!loud(2500..8000));
    }

    #[test]
    fn bounce_writes_stereo_float_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let mut s = session();
        s.handle_input(InputEvent::ToggleGrains);
        let stats = bounce(&mut s, 0.25, &path).unwrap();
        assert_eq!(stats.frames, 2000);
        assert!(stats.peak > 0.0);

        let reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, RATE);
        assert_eq!(spec.sample_format, hound::SampleFormat::Float);
        assert_eq!(reader.duration(), 2000);
    }
}
