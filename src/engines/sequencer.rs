use std::sync::Arc;

use crate::audio_api::{AudioBuffer, AudioGraph, NodeId};
use crate::error::{require_positive, ConfigError};
use crate::params::{clamp_logged, step_interval, wrap_step, BPM_RANGE};
use crate::pipeline::score::Score;
use crate::scheduler::Tick;

use super::TimeProducer;

/// Walks the score one step per beat, firing every active track.
///
/// Each hit is a fresh buffer source straight into the track's effect chain,
/// started exactly at the scheduled time.
pub struct StepSequencerEngine {
    score: Score,
    buffers: Vec<Arc<AudioBuffer>>,
    outputs: Vec<NodeId>,
    bpm: f64,
    step_index: usize,
}

impl StepSequencerEngine {
    pub fn new(
        score: Score,
        buffers: Vec<Arc<AudioBuffer>>,
        outputs: Vec<NodeId>,
        bpm: f64,
    ) -> Result<Self, ConfigError> {
        let tracks = score.num_tracks();
        if buffers.len() != tracks || outputs.len() != tracks {
            return Err(ConfigError::TrackMismatch {
                tracks,
                buffers: buffers.len(),
                chains: outputs.len(),
            });
        }
        if score.num_steps() == 0 {
            return Err(ConfigError::NoSteps);
        }
        let bpm = require_positive("bpm", bpm)?;

        let mut engine = Self { score, buffers, outputs, bpm, step_index: 0 };
        engine.set_bpm(bpm);
        Ok(engine)
    }

    pub fn score(&self) -> &Score {
        &self.score
    }

    pub fn toggle_step(&mut self, track: usize, step: usize) {
        self.score.toggle(track, step);
    }

    pub fn set_step(&mut self, track: usize, step: usize, on: bool) {
        self.score.set(track, step, on);
    }

    /// Swap in a saved score. Shape must match the current one.
    pub fn replace_score(&mut self, score: Score) -> Result<(), ConfigError> {
        if score.num_tracks() != self.score.num_tracks() || score.num_steps() != self.num_steps() {
            return Err(ConfigError::ShapeMismatch {
                tracks: score.num_tracks(),
                steps: score.num_steps(),
                expected_tracks: self.num_tracks(),
                expected_steps: self.num_steps(),
            });
        }
        self.score = score;
        Ok(())
    }

    pub fn num_tracks(&self) -> usize {
        self.score.num_tracks()
    }

    pub fn num_steps(&self) -> usize {
        self.score.num_steps()
    }

    pub fn step_index(&self) -> usize {
        self.step_index
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

impl TimeProducer for StepSequencerEngine {
    fn advance_time(&mut self, graph: &mut dyn AudioGraph, tick: Tick) -> f64 {
        let t = tick.current_time;
        for (track, row) in self.score.rows().iter().enumerate() {
            if !row[self.step_index] {
                continue;
            }
            let src = graph.create_buffer_source(Arc::clone(&self.buffers[track]));
            graph.connect(src, self.outputs[track]);
            graph.start(src, t, 0.0);
        }
        tracing::trace!(step = self.step_index, t, "sequencer step");

        self.step_index = wrap_step(self.step_index, self.num_steps());
        t + step_interval(self.bpm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_api::RecordingGraph;

    fn tick(t: f64) -> Tick {
        Tick { current_time: t, audio_time: t, dt: 0.0 }
    }

    fn sequencer(tracks: usize, steps: usize, bpm: f64) -> StepSequencerEngine {
        let buffer = Arc::new(AudioBuffer::from_mono(1000, vec![1.0; 10]).unwrap());
        StepSequencerEngine::new(
            Score::empty(tracks, steps).unwrap(),
            vec![buffer; tracks],
            (0..tracks).map(|i| NodeId(1000 + i as u64)).collect(),
            bpm,
        )
        .unwrap()
    }

    #[test]
    fn sixteen_steps_at_280_bpm() {
        let mut seq = sequencer(7, 16, 280.0);
        let mut graph = RecordingGraph::new();
        let mut t = 0.0;
        for n in 1..=16 {
            let next = seq.advance_time(&mut graph, tick(t));
            assert!((next - t - 0.2143).abs() < 1e-4);
            assert!(next > t);
            assert_eq!(seq.step_index(), n % 16);
            t = next;
        }
        assert_eq!(seq.step_index(), 0);
        assert!(graph.commands.is_empty());
    }

    #[test]
    fn single_hit_fires_once_per_cycle_at_tick_time() {
        let mut seq = sequencer(2, 4, 120.0);
        seq.set_step(0, 0, true);
        let mut graph = RecordingGraph::new();
        let mut t = 1.0;
        let mut hits = Vec::new();
        for _ in 0..8 {
            graph.clear();
            let fire_at = t;
            t = seq.advance_time(&mut graph, tick(t));
            for src in graph.sources() {
                assert!(graph.is_connected(src, NodeId(1000)));
                hits.push(graph.start_of(src).unwrap());
                assert_eq!(graph.start_of(src), Some((fire_at, 0.0)));
            }
        }
        assert_eq!(hits, vec![(1.0, 0.0), (3.0, 0.0)]);
    }

    #[test]
    fn bpm_change_only_affects_the_next_interval() {
        let mut seq = sequencer(1, 4, 60.0);
        let mut graph = RecordingGraph::new();
        let first = seq.advance_time(&mut graph, tick(0.0));
        assert_eq!(first, 1.0);
        seq.set_bpm(120.0);
        assert_eq!(seq.advance_time(&mut graph, tick(first)), 1.5);
        assert_eq!(seq.step_index(), 2);
    }

    #[test]
    fn bpm_is_clamped() {
        let mut seq = sequencer(1, 4, 60.0);
        seq.set_bpm(0.0);
        assert_eq!(seq.bpm(), 1.0);
        seq.set_bpm(f64::INFINITY);
        assert_eq!(seq.bpm(), 1.0);
        seq.set_bpm(5000.0);
        assert_eq!(seq.bpm(), 1000.0);
    }

    #[test]
    fn construction_checks_track_counts() {
        let err = StepSequencerEngine::new(Score::empty(3, 16).unwrap(), vec![], vec![], 120.0).err();
        assert_eq!(err, Some(ConfigError::TrackMismatch { tracks: 3, buffers: 0, chains: 0 }));
        let buffer = Arc::new(AudioBuffer::from_mono(1000, vec![1.0]).unwrap());
        let err = StepSequencerEngine::new(Score::empty(1, 4).unwrap(), vec![buffer], vec![NodeId(9)], -1.0).err();
        assert!(matches!(err, Some(ConfigError::NotPositive { name: "bpm", .. })));
    }
}
