use crate::audio_api::AudioGraph;
use crate::error::{require_positive, ConfigError};
use crate::params::{clamp_logged, step_interval, wrap_step, BPM_RANGE};
use crate::scheduler::Tick;

use super::TimeProducer;

/// Called with the freshly lit row every time the follower moves.
pub type RowObserver = Box<dyn FnMut(&[bool])>;

/// Lights the current sequencer step in a one-row display.
///
/// Runs on the same clock and bpm as the sequencer, so the lit cell is the
/// step being played.
pub struct StepDisplayFollower {
    row: Vec<bool>,
    bpm: f64,
    step_index: usize,
    observer: Option<RowObserver>,
}

impl StepDisplayFollower {
    pub fn new(num_steps: usize, bpm: f64) -> Result<Self, ConfigError> {
        if num_steps == 0 {
            return Err(ConfigError::NoSteps);
        }
        let bpm = require_positive("bpm", bpm)?;
        let mut follower = Self {
            row: vec![false; num_steps],
            bpm,
            step_index: 0,
            observer: None,
        };
        follower.set_bpm(bpm);
        Ok(follower)
    }

    pub fn set_observer(&mut self, observer: RowObserver) {
        self.observer = Some(observer);
    }

    pub fn row(&self) -> &[bool] {
        &self.row
    }

    /// The step currently lit, if the follower has fired yet.
    pub fn lit_step(&self) -> Option<usize> {
        self.row.iter().position(|&on| on)
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn num_steps(&self) -> usize {
        self.row.len()
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn set_bpm(&mut self, bpm: f64) {
        if let Some(b) = clamp_logged("bpm", bpm, BPM_RANGE) {
            self.bpm = b;
        }
    }
}

impl TimeProducer for StepDisplayFollower {
    fn advance_time(&mut self, _graph: &mut dyn AudioGraph, tick: Tick) -> f64 {
        self.row.fill(false);
        self.row[self.step_index] = true;
        self.step_index = wrap_step(self.step_index, self.row.len());
        if let Some(observer) = self.observer.as_mut() {
            observer(&self.row);
        }
        tick.current_time + step_interval(self.bpm)
    }
}
