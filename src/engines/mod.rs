// Time-driven producers: things the scheduler calls back to emit audio events.
use crate::audio_api::AudioGraph;
use crate::scheduler::Tick;

mod display;
mod granular;
mod sequencer;

pub use display::{RowObserver, StepDisplayFollower};
pub use granular::{GrainSettings, GranularEngine};
pub use sequencer::StepSequencerEngine;

/// A producer fires at `tick.current_time`, may build nodes on `graph`, and
/// answers with the next time it wants to fire. That time must be later
/// than `tick.current_time`.
pub trait TimeProducer {
    fn advance_time(&mut self, graph: &mut dyn AudioGraph, tick: Tick) -> f64;
}
