use std::sync::Arc;

use crate::audio_api::{AudioBuffer, AudioGraph, Param};
use crate::effects::{DelaySettings, EffectChain, FeedbackDelayNetwork, MasterBus, ReverbSettings};
use crate::engines::{GrainSettings, GranularEngine, StepDisplayFollower, StepSequencerEngine, TimeProducer};
use crate::error::{ConfigError, SchedulerError};
use crate::params::clamp_logged;
use crate::pipeline::config::Config;
use crate::pipeline::project::ProjectState;
use crate::pipeline::score::Score;
use crate::scheduler::{Clock, Scheduler};
use crate::shared::{Control, DisplayState, InputEvent, Screen};

/// Transport starts this far ahead of the clock so the first step isn't late.
pub const TRANSPORT_START_DELAY: f64 = 0.1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProducerKey {
    Granular,
    Sequencer,
    Display,
}

/// A kit sample: sequencer track and pad at the same time.
#[derive(Clone, Debug)]
pub struct KitSample {
    pub name: String,
    pub buffer: Arc<AudioBuffer>,
}

/// Everything needed to build a session, already loaded.
pub struct SessionSetup {
    pub sample_rate: u32,
    pub lookahead: f64,
    pub steps: usize,
    pub bpm: f64,
    pub master_db: f64,
    pub kit: Vec<KitSample>,
    pub grain_source: Arc<AudioBuffer>,
    pub grain: GrainSettings,
    pub delay: DelaySettings,
    pub reverb: ReverbSettings,
    // fixes grain jitter, for tests and reproducible bounces
    pub seed: Option<u64>,
}

impl SessionSetup {
    pub fn from_config(config: &Config, sample_rate: u32, kit: Vec<KitSample>, grain_source: Arc<AudioBuffer>) -> Self {
        Self {
            sample_rate,
            lookahead: config.lookahead,
            steps: config.steps,
            bpm: config.transport.bpm,
            master_db: config.transport.master_db,
            kit,
            grain_source,
            grain: config.grain,
            delay: config.delay,
            reverb: config.reverb,
            seed: None,
        }
    }
}

struct Pad {
    buffer: Arc<AudioBuffer>,
    volume: f64,
}

/// The one object the front end talks to.
///
/// Owns the graph handle, the scheduler and everything it drives, plus the
/// persistent subgraphs they play into. Routing:
///
/// ```text
/// sequencer hits ─► track chain ─┐
/// grains ────────────────────────┼─► master bus ─► destination
/// pads ─► feedback delay ────────┘
/// ```
pub struct Session<G: AudioGraph, K: Clock> {
    graph: G,
    scheduler: Scheduler<K, ProducerKey>,
    granular: GranularEngine,
    sequencer: StepSequencerEngine,
    display: StepDisplayFollower,
    delay: FeedbackDelayNetwork,
    master: MasterBus,
    chains: Vec<EffectChain>,
    pads: Vec<Pad>,
    track_names: Vec<String>,
    cursor: (usize, usize),
    screen: Screen,
    selected_control: usize,
    status: String,
}

impl<G: AudioGraph, K: Clock> Session<G, K> {
    pub fn new(mut graph: G, clock: K, setup: SessionSetup) -> Result<Self, ConfigError> {
        let g: &mut dyn AudioGraph = &mut graph;

        let master = MasterBus::new(g, setup.sample_rate, setup.master_db, setup.reverb);
        let chains: Vec<EffectChain> = setup.kit.iter().map(|_| EffectChain::new(g, master.input())).collect();

        let delay = FeedbackDelayNetwork::with_settings(g, setup.delay);
        delay.connect(g, master.input());

        let granular = match setup.seed {
            Some(seed) => GranularEngine::with_seed(g, setup.grain_source, setup.grain, seed)?,
            None => GranularEngine::new(g, setup.grain_source, setup.grain)?,
        };
        granular.connect(g, master.input());

        let buffers: Vec<Arc<AudioBuffer>> = setup.kit.iter().map(|s| Arc::clone(&s.buffer)).collect();
        let outputs = chains.iter().map(EffectChain::input).collect();
        let score = Score::empty(setup.kit.len(), setup.steps)?;
        let sequencer = StepSequencerEngine::new(score, buffers, outputs, setup.bpm)?;
        let display = StepDisplayFollower::new(setup.steps, sequencer.bpm())?;

        let pads = setup
            .kit
            .iter()
            .map(|s| Pad { buffer: Arc::clone(&s.buffer), volume: 1.0 })
            .collect();
        let track_names = setup.kit.into_iter().map(|s| s.name).collect();

        tracing::info!(tracks = chains.len(), steps = setup.steps, bpm = sequencer.bpm(), "session ready");

        Ok(Self {
            graph,
            scheduler: Scheduler::with_lookahead(clock, setup.lookahead),
            granular,
            sequencer,
            display,
            delay,
            master,
            chains,
            pads,
            track_names,
            cursor: (0, 0),
            screen: Screen::default(),
            selected_control: 0,
            status: String::new(),
        })
    }

    pub fn graph(&self) -> &G {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut G {
        &mut self.graph
    }

    pub fn now(&self) -> f64 {
        self.scheduler.now()
    }

    pub fn sequencer(&self) -> &StepSequencerEngine {
        &self.sequencer
    }

    pub fn display(&self) -> &StepDisplayFollower {
        &self.display
    }

    pub fn granular(&self) -> &GranularEngine {
        &self.granular
    }

    pub fn delay(&self) -> &FeedbackDelayNetwork {
        &self.delay
    }

    pub fn master(&self) -> &MasterBus {
        &self.master
    }

    /// Let the row observer know when the step display moves.
    pub fn observe_display(&mut self, observer: crate::engines::RowObserver) {
        self.display.set_observer(observer);
    }

    /// Run every producer that is due. Call this often (every UI frame).
    pub fn tick(&mut self) -> Result<usize, SchedulerError> {
        let Self { graph, scheduler, granular, sequencer, display, .. } = &mut *self;
        let result = scheduler.tick(|key, tick, _| {
            let producer: &mut dyn TimeProducer = match key {
                ProducerKey::Granular => &mut *granular,
                ProducerKey::Sequencer => &mut *sequencer,
                ProducerKey::Display => &mut *display,
            };
            producer.advance_time(&mut *graph, tick)
        });
        if let Err(e) = &result {
            self.status = e.to_string();
        }
        result
    }

    pub fn is_playing(&self) -> bool {
        self.scheduler.contains(ProducerKey::Sequencer)
    }

    /// Sequencer and step display always start together.
    pub fn start_transport(&mut self) {
        let start = self.scheduler.now() + TRANSPORT_START_DELAY;
        self.scheduler.add(ProducerKey::Sequencer, Some(start));
        self.scheduler.add(ProducerKey::Display, Some(start));
        tracing::info!(start, "transport started");
    }

    pub fn stop_transport(&mut self) {
        self.scheduler.remove(ProducerKey::Sequencer);
        self.scheduler.remove(ProducerKey::Display);
        tracing::info!("transport stopped");
    }

    pub fn grains_running(&self) -> bool {
        self.scheduler.contains(ProducerKey::Granular)
    }

    pub fn start_granular(&mut self) {
        self.scheduler.add(ProducerKey::Granular, None);
        tracing::info!("granular engine started");
    }

    pub fn stop_granular(&mut self) {
        self.scheduler.remove(ProducerKey::Granular);
        tracing::info!("granular engine stopped");
    }

    pub fn set_bpm(&mut self, bpm: f64) {
        self.sequencer.set_bpm(bpm);
        self.display.set_bpm(self.sequencer.bpm());
    }

    pub fn toggle_step(&mut self, track: usize, step: usize) {
        self.sequencer.toggle_step(track, step);
    }

    /// One-shot of kit sample `pad` through the feedback delay, right now.
    pub fn trigger_pad(&mut self, pad: usize) {
        let Some(p) = self.pads.get(pad) else {
            tracing::debug!(pad, "no sample on this pad");
            return;
        };
        let now = self.scheduler.now();
        let g = &mut self.graph;
        let env = g.create_gain();
        g.set_value(env, Param::Gain, p.volume as f32);
        g.connect(env, self.delay.input());
        let src = g.create_buffer_source(Arc::clone(&p.buffer));
        g.connect(src, env);
        g.start(src, now, 0.0);
        g.release_when_idle(env);
    }

    pub fn control_value(&self, control: Control) -> f64 {
        let track = self.cursor.0;
        match control {
            Control::Bpm => self.sequencer.bpm(),
            Control::MasterVolume => self.master.volume_db(),
            Control::TrackVolume => self.chains.get(track).map_or(0.0, EffectChain::volume_db),
            Control::TrackCutoff => self.chains.get(track).map_or(0.0, EffectChain::cutoff),
            Control::ReverbLevel => self.master.reverb().level_db,
            Control::ReverbDuration => self.master.reverb().duration,
            Control::ReverbDecay => self.master.reverb().decay,
            Control::GrainPosition => self.granular.position(),
            Control::GrainPeriod => self.granular.period(),
            Control::GrainDuration => self.granular.duration(),
            Control::GrainLevel => self.granular.level(),
            Control::DelayPreGain => self.delay.pre_gain(),
            Control::DelayTime => self.delay.delay_time(),
            Control::DelayFeedback => self.delay.feedback(),
            Control::PadVolume => self.pads.get(track).map_or(0.0, |p| p.volume),
        }
    }

    /// Write a control. Out of range values are clamped by the component.
    pub fn set_control(&mut self, control: Control, value: f64) {
        let now = self.scheduler.now();
        let track = self.cursor.0;
        let g = &mut self.graph;
        match control {
            Control::Bpm => self.set_bpm(value),
            Control::MasterVolume => self.master.set_volume_db(g, value, now),
            Control::TrackVolume => {
                if let Some(chain) = self.chains.get_mut(track) {
                    chain.set_volume_db(g, value, now);
                }
            }
            Control::TrackCutoff => {
                if let Some(chain) = self.chains.get_mut(track) {
                    chain.set_cutoff(g, value, now);
                }
            }
            Control::ReverbLevel => self.master.set_reverb_level_db(g, value, now),
            Control::ReverbDuration => {
                let decay = self.master.reverb().decay;
                self.master.set_reverb_shape(g, value, decay);
            }
            Control::ReverbDecay => {
                let duration = self.master.reverb().duration;
                self.master.set_reverb_shape(g, duration, value);
            }
            Control::GrainPosition => self.granular.set_position(value),
            Control::GrainPeriod => self.granular.set_period(value),
            Control::GrainDuration => self.granular.set_duration(value),
            Control::GrainLevel => self.granular.set_level(g, value),
            Control::DelayPreGain => self.delay.set_pre_gain(g, value),
            Control::DelayTime => self.delay.set_delay_time(g, value),
            Control::DelayFeedback => self.delay.set_feedback(g, value),
            Control::PadVolume => {
                if let (Some(pad), Some(v)) = (self.pads.get_mut(track), clamp_logged("pad volume", value, 0.0..=1.0)) {
                    pad.volume = v;
                }
            }
        }
    }

    /// Nudge a control by `steps` increments.
    pub fn adjust(&mut self, control: Control, steps: i32) {
        let value = self.control_value(control) + steps as f64 * control.increment();
        self.set_control(control, value);
    }

    pub fn handle_input(&mut self, event: InputEvent) {
        match event {
            InputEvent::TogglePlay => {
                if self.is_playing() {
                    self.stop_transport();
                } else {
                    self.start_transport();
                }
            }
            InputEvent::ToggleGrains => {
                if self.grains_running() {
                    self.stop_granular();
                } else {
                    self.start_granular();
                }
            }
            InputEvent::ToggleReverb => {
                let enabled = !self.master.reverb().enabled;
                self.master.set_reverb_enabled(&mut self.graph, enabled);
            }
            InputEvent::NextScreen => {
                self.screen = self.screen.next();
                self.selected_control = 0;
            }
            InputEvent::MoveCursor { tracks, steps } => {
                let (track, step) = self.cursor;
                self.cursor = (
                    wrap(track, tracks, self.sequencer.num_tracks()),
                    wrap(step, steps, self.sequencer.num_steps()),
                );
            }
            InputEvent::ToggleStep => {
                let (track, step) = self.cursor;
                self.toggle_step(track, step);
            }
            InputEvent::TriggerPad(pad) => self.trigger_pad(pad as usize),
            InputEvent::SelectControl(delta) => {
                let len = self.screen.controls().len();
                self.selected_control = wrap(self.selected_control, delta, len);
            }
            InputEvent::Adjust(control, steps) => self.adjust(control, steps),
            InputEvent::Quit => {}
        }
    }

    pub fn display_state(&self) -> DisplayState {
        DisplayState {
            screen: self.screen,
            playing: self.is_playing(),
            grains_on: self.grains_running(),
            reverb_on: self.master.reverb().enabled,
            bpm: self.sequencer.bpm(),
            track_names: self.track_names.clone(),
            score: self.sequencer.score().rows().to_vec(),
            playhead: self.display.row().to_vec(),
            cursor: self.cursor,
            controls: self.screen.controls().iter().map(|&c| (c, self.control_value(c))).collect(),
            selected_control: self.selected_control,
            status: self.status.clone(),
        }
    }

    pub fn snapshot(&self) -> ProjectState {
        ProjectState {
            kit: self.track_names.clone(),
            score: self.sequencer.score().rows().to_vec(),
            bpm: self.sequencer.bpm(),
            master_db: self.master.volume_db(),
            track_db: self.chains.iter().map(EffectChain::volume_db).collect(),
            track_cutoff: self.chains.iter().map(EffectChain::cutoff).collect(),
            pad_volume: self.pads.iter().map(|p| p.volume).collect(),
            grain: GrainSettings {
                period: self.granular.period(),
                duration: self.granular.duration(),
                position: self.granular.position(),
                level: self.granular.level(),
            },
            delay: self.delay.settings(),
            reverb: self.master.reverb(),
        }
    }

    /// Apply saved edits. Returns false (and changes nothing) when the saved
    /// grid doesn't match this kit and step count.
    pub fn restore(&mut self, state: &ProjectState) -> bool {
        let (tracks, steps) = (self.sequencer.num_tracks(), self.sequencer.num_steps());
        if !state.fits(tracks, steps) {
            tracing::warn!(tracks, steps, "saved project doesn't match the current kit, starting fresh");
            return false;
        }
        let score = match Score::from_rows(state.score.clone()) {
            Ok(score) => score,
            Err(e) => {
                tracing::warn!("saved score rejected: {e}");
                return false;
            }
        };
        if let Err(e) = self.sequencer.replace_score(score) {
            tracing::warn!("saved score rejected: {e}");
            return false;
        }

        self.set_bpm(state.bpm);
        let now = self.scheduler.now();
        let g = &mut self.graph;
        self.master.set_volume_db(g, state.master_db, now);
        for (chain, (&db, &hz)) in self.chains.iter_mut().zip(state.track_db.iter().zip(&state.track_cutoff)) {
            chain.set_volume_db(g, db, now);
            chain.set_cutoff(g, hz, now);
        }
        for (pad, &volume) in self.pads.iter_mut().zip(&state.pad_volume) {
            if let Some(v) = clamp_logged("pad volume", volume, 0.0..=1.0) {
                pad.volume = v;
            }
        }

        self.granular.set_period(state.grain.period);
        self.granular.set_duration(state.grain.duration);
        self.granular.set_position(state.grain.position);
        self.granular.set_level(g, state.grain.level);

        self.delay.set_pre_gain(g, state.delay.pre_gain);
        self.delay.set_delay_time(g, state.delay.delay_time);
        self.delay.set_feedback(g, state.delay.feedback);

        self.master.set_reverb_level_db(g, state.reverb.level_db, now);
        self.master.set_reverb_shape(g, state.reverb.duration, state.reverb.decay);
        self.master.set_reverb_enabled(g, state.reverb.enabled);

        tracing::info!("project restored");
        true
    }
}

fn wrap(index: usize, delta: i32, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    (index as i64 + delta as i64).rem_euclid(len as i64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_api::{GraphCommand, NodeSpec, RecordingGraph};
    use crate::scheduler::ManualClock;

    fn buffer(frames: usize) -> Arc<AudioBuffer> {
        Arc::new(AudioBuffer::from_mono(1000, vec![0.5; frames]).unwrap())
    }

    fn setup(tracks: usize) -> SessionSetup {
        SessionSetup {
            sample_rate: 1000,
            lookahead: 0.1,
            steps: 16,
            bpm: 280.0,
            master_db: 0.0,
            kit: (0..tracks)
                .map(|i| KitSample { name: format!("t{i}.wav"), buffer: buffer(50) })
                .collect(),
            grain_source: buffer(3000),
            grain: GrainSettings::default(),
            delay: DelaySettings::default(),
            reverb: ReverbSettings::default(),
            seed: Some(9),
        }
    }

    fn session(tracks: usize) -> (ManualClock, Session<RecordingGraph, ManualClock>) {
        let clock = ManualClock::new(0.0);
        let session = Session::new(RecordingGraph::new(), clock.clone(), setup(tracks)).unwrap();
        (clock, session)
    }

    fn sources_started(session: &Session<RecordingGraph, ManualClock>) -> Vec<f64> {
        let graph = session.graph();
        graph.sources().iter().filter_map(|s| graph.start_of(*s)).map(|(t, _)| t).collect()
    }

    #[test]
    fn transport_starts_a_little_ahead_and_in_lockstep() {
        let (clock, mut s) = session(2);
        s.toggle_step(0, 0);
        s.start_transport();
        assert!(s.is_playing());

        assert_eq!(s.tick().unwrap(), 0);
        clock.set(0.05);
        assert_eq!(s.tick().unwrap(), 2);
        assert_eq!(s.sequencer().step_index(), 1);
        assert_eq!(s.display().lit_step(), Some(0));
        assert_eq!(sources_started(&s), vec![0.1]);

        for i in 1..40 {
            clock.set(0.05 + i as f64 * 0.05);
            s.tick().unwrap();
            let lit = s.display().lit_step().unwrap();
            assert_eq!((lit + 1) % 16, s.sequencer().step_index());
        }
    }

    #[test]
    fn stopping_before_the_first_step_fires_nothing() {
        let (clock, mut s) = session(1);
        s.toggle_step(0, 0);
        s.start_transport();
        s.stop_transport();
        clock.set(1.0);
        assert_eq!(s.tick().unwrap(), 0);
        assert!(sources_started(&s).is_empty());
        assert_eq!(s.display().lit_step(), None);
    }

    #[test]
    fn bpm_is_shared_by_sequencer_and_display() {
        let (_, mut s) = session(1);
        s.set_bpm(120.0);
        assert_eq!(s.sequencer().bpm(), 120.0);
        assert_eq!(s.display().bpm(), 120.0);
        s.adjust(Control::Bpm, 100_000);
        assert_eq!(s.display().bpm(), 1000.0);
    }

    #[test]
    fn grains_start_now_and_stop_on_request() {
        let (clock, mut s) = session(1);
        s.graph_mut().clear();
        s.start_granular();
        assert_eq!(s.tick().unwrap(), 3); // 0.0, 0.04, 0.08
        s.stop_granular();
        clock.set(1.0);
        assert_eq!(s.tick().unwrap(), 0);
        assert_eq!(s.graph().sources().len(), 3);
    }

    #[test]
    fn pads_play_through_the_delay_at_their_volume() {
        let (clock, mut s) = session(3);
        s.handle_input(InputEvent::MoveCursor { tracks: 2, steps: 0 });
        s.handle_input(InputEvent::Adjust(Control::PadVolume, -10));
        clock.set(2.0);
        s.graph_mut().clear();
        s.handle_input(InputEvent::TriggerPad(2));

        let g = s.graph();
        let env = g.created()[0].0;
        assert!(g.is_connected(env, s.delay().input()));
        let src = g.sources()[0];
        assert!(g.is_connected(src, env));
        assert_eq!(g.start_of(src), Some((2.0, 0.0)));
        assert!(g.commands.iter().any(|c| matches!(
            c,
            GraphCommand::SetValue { node, param: Param::Gain, value } if *node == env && (*value - 0.5).abs() < 1e-6
        )));
        assert!(g.commands.iter().any(|c| matches!(c, GraphCommand::ReleaseWhenIdle { node } if *node == env)));

        s.graph_mut().clear();
        s.trigger_pad(7);
        assert!(s.graph().commands.is_empty());
    }

    #[test]
    fn cursor_and_control_selection_wrap() {
        let (_, mut s) = session(3);
        s.handle_input(InputEvent::MoveCursor { tracks: -1, steps: -1 });
        assert_eq!(s.display_state().cursor, (2, 15));
        s.handle_input(InputEvent::ToggleStep);
        assert!(s.sequencer().score().get(2, 15));

        s.handle_input(InputEvent::NextScreen);
        let ds = s.display_state();
        assert_eq!(ds.screen, Screen::Granular);
        s.handle_input(InputEvent::SelectControl(-1));
        assert_eq!(s.display_state().selected(), Some(Control::GrainLevel));
    }

    #[test]
    fn reverb_toggle_reroutes_master() {
        let (_, mut s) = session(1);
        s.graph_mut().clear();
        s.handle_input(InputEvent::ToggleReverb);
        assert!(s.display_state().reverb_on);
        let convolver = s
            .graph()
            .commands
            .iter()
            .find_map(|c| match c {
                GraphCommand::Connect { from, to } if *from == s.master().input() => Some(*to),
                _ => None,
            })
            .unwrap();
        assert_ne!(convolver, s.graph().destination());
    }

    #[test]
    fn snapshot_restore_round_trip() {
        let (_, mut s) = session(2);
        s.toggle_step(1, 3);
        s.set_bpm(150.0);
        s.adjust(Control::DelayFeedback, -4);
        s.handle_input(InputEvent::MoveCursor { tracks: 1, steps: 0 });
        s.adjust(Control::TrackCutoff, -8);
        let saved = s.snapshot();

        let (_, mut fresh) = session(2);
        assert!(fresh.restore(&saved));
        assert_eq!(fresh.snapshot(), saved);
        assert!(fresh.sequencer().score().get(1, 3));
        assert!((fresh.delay().feedback() - 0.8).abs() < 1e-9);

        let (_, mut other_kit) = session(3);
        assert!(!other_kit.restore(&saved));
        assert!(!other_kit.sequencer().score().get(1, 3));
    }

    #[test]
    fn builds_persistent_graph_once() {
        let (_, s) = session(2);
        let g = s.graph();
        let convolvers = g.created().iter().filter(|(_, spec)| matches!(spec, NodeSpec::Convolver { .. })).count();
        let lowpasses = g.created().iter().filter(|(_, spec)| matches!(spec, NodeSpec::BiquadLowpass { .. })).count();
        assert_eq!(convolvers, 1);
        assert_eq!(lowpasses, 2);
        assert!(g.is_connected(s.delay().output(), s.master().input()));
        assert!(g.is_connected(s.granular().output(), s.master().input()));
    }
}
