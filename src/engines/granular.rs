use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::audio_api::{AudioBuffer, AudioGraph, NodeId, Param};
use crate::error::{require_positive, ConfigError};
use crate::params::clamp_logged;
use crate::scheduler::Tick;

use super::TimeProducer;

/// Random offset added to each grain start so the period doesn't buzz.
pub const JITTER: f64 = 0.003;
pub const MIN_PERIOD: f64 = 0.005;
pub const MIN_DURATION: f64 = 0.001;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrainSettings {
    pub period: f64,
    pub duration: f64,
    pub position: f64,
    pub level: f64,
}

impl Default for GrainSettings {
    fn default() -> Self {
        Self {
            period: 0.04,
            duration: 0.1,
            position: 1.0,
            level: 1.0,
        }
    }
}

/// Emits one triangle-windowed grain of the source buffer per call.
pub struct GranularEngine {
    buffer: Arc<AudioBuffer>,
    output: NodeId,
    period: f64,
    duration: f64,
    position: f64,
    level: f64,
    rng: StdRng,
}

impl GranularEngine {
    pub fn new(
        graph: &mut dyn AudioGraph,
        buffer: Arc<AudioBuffer>,
        settings: GrainSettings,
    ) -> Result<Self, ConfigError> {
        Self::build(graph, buffer, settings, StdRng::from_entropy())
    }

    /// Same as `new` but with reproducible jitter and playback rates.
    pub fn with_seed(
        graph: &mut dyn AudioGraph,
        buffer: Arc<AudioBuffer>,
        settings: GrainSettings,
        seed: u64,
    ) -> Result<Self, ConfigError> {
        Self::build(graph, buffer, settings, StdRng::seed_from_u64(seed))
    }

    fn build(
        graph: &mut dyn AudioGraph,
        buffer: Arc<AudioBuffer>,
        settings: GrainSettings,
        rng: StdRng,
    ) -> Result<Self, ConfigError> {
        if buffer.is_empty() {
            return Err(ConfigError::EmptyBuffer("grain source"));
        }
        let period = require_positive("grain period", settings.period)?;
        let duration = require_positive("grain duration", settings.duration)?;

        let output = graph.create_gain();
        let mut engine = Self {
            buffer,
            output,
            period: MIN_PERIOD,
            duration: MIN_DURATION,
            position: 0.0,
            level: 1.0,
            rng,
        };
        engine.set_period(period);
        engine.set_duration(duration);
        engine.set_position(settings.position);
        engine.set_level(graph, settings.level);
        Ok(engine)
    }

    pub fn output(&self) -> NodeId {
        self.output
    }

    pub fn connect(&self, graph: &mut dyn AudioGraph, sink: NodeId) {
        graph.connect(self.output, sink);
    }

    pub fn buffer_duration(&self) -> f64 {
        self.buffer.duration()
    }

    pub fn period(&self) -> f64 {
        self.period
    }

    pub fn set_period(&mut self, period: f64) {
        if let Some(p) = clamp_logged("grain period", period, MIN_PERIOD..=f64::MAX) {
            self.period = p;
        }
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Also pulls the position back so the grain still ends inside the buffer.
    pub fn set_duration(&mut self, duration: f64) {
        let max = self.buffer_duration().max(MIN_DURATION);
        if let Some(d) = clamp_logged("grain duration", duration, MIN_DURATION..=max) {
            self.duration = d;
            self.set_position(self.position);
        }
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn max_position(&self) -> f64 {
        (self.buffer_duration() - self.duration).max(0.0)
    }

    pub fn set_position(&mut self, position: f64) {
        if let Some(p) = clamp_logged("grain position", position, 0.0..=self.max_position()) {
            self.position = p;
        }
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    pub fn set_level(&mut self, graph: &mut dyn AudioGraph, level: f64) {
        if let Some(l) = clamp_logged("grain level", level, 0.0..=1.0) {
            self.level = l;
            graph.set_value(self.output, Param::Gain, l as f32);
        }
    }
}

impl TimeProducer for GranularEngine {
    fn advance_time(&mut self, graph: &mut dyn AudioGraph, tick: Tick) -> f64 {
        let t = tick.current_time;
        let start = t + self.rng.gen_range(0.0..JITTER);
        let end = start + self.duration;

        let env = graph.create_gain();
        graph.connect(env, self.output);
        graph.set_value(env, Param::Gain, 0.0);
        graph.set_value_at_time(env, Param::Gain, 0.0, start);
        graph.linear_ramp_to_value_at_time(env, Param::Gain, 1.0, start + self.duration / 2.0);
        graph.linear_ramp_to_value_at_time(env, Param::Gain, 0.0, end);

        let src = graph.create_buffer_source(Arc::clone(&self.buffer));
        graph.connect(src, env);
        let rate = self.rng.gen_range(0.5..1.5);
        graph.set_value(src, Param::PlaybackRate, rate as f32);
        graph.start(src, start, self.position);
        graph.stop(src, end);
        graph.release_when_idle(env);

        t + self.period
    }
}
