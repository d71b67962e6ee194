use crate::audio_api::{AudioGraph, NodeId, Param};
use crate::params::{clamp_logged, db_to_linear, CUTOFF_RANGE, SMOOTHING, VOLUME_DB_RANGE};

pub const DEFAULT_CUTOFF: f64 = 18000.0;

/// Per-track gain into a lowpass, wired once into the master bus.
pub struct EffectChain {
    gain: NodeId,
    lowpass: NodeId,
    volume_db: f64,
    cutoff: f64,
}

impl EffectChain {
    pub fn new(graph: &mut dyn AudioGraph, master: NodeId) -> Self {
        let gain = graph.create_gain();
        let lowpass = graph.create_biquad_lowpass(DEFAULT_CUTOFF as f32);
        graph.connect(gain, lowpass);
        graph.connect(lowpass, master);
        Self { gain, lowpass, volume_db: 0.0, cutoff: DEFAULT_CUTOFF }
    }

    pub fn input(&self) -> NodeId {
        self.gain
    }

    pub fn volume_db(&self) -> f64 {
        self.volume_db
    }

    pub fn set_volume_db(&mut self, graph: &mut dyn AudioGraph, db: f64, now: f64) {
        if let Some(db) = clamp_logged("track volume", db, VOLUME_DB_RANGE) {
            self.volume_db = db;
            graph.set_target_at_time(self.gain, Param::Gain, db_to_linear(db) as f32, now, SMOOTHING);
        }
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    pub fn set_cutoff(&mut self, graph: &mut dyn AudioGraph, hz: f64, now: f64) {
        if let Some(hz) = clamp_logged("track cutoff", hz, CUTOFF_RANGE) {
            self.cutoff = hz;
            graph.set_target_at_time(self.lowpass, Param::Frequency, hz as f32, now, SMOOTHING);
        }
    }
}
