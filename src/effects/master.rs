use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::audio_api::{AudioBuffer, AudioGraph, NodeId, Param};
use crate::params::{
    clamp_logged, db_to_linear, REVERB_DB_RANGE, REVERB_DECAY_RANGE, REVERB_DURATION_RANGE, SMOOTHING,
    VOLUME_DB_RANGE,
};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReverbSettings {
    pub enabled: bool,
    pub duration: f64,
    pub decay: f64,
    pub level_db: f64,
}

impl Default for ReverbSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            duration: 1.0,
            decay: 2.0,
            level_db: 12.0,
        }
    }
}

/// Noise burst with a power-law fade, `(2r - 1) * (1 - i/len)^decay`.
pub fn impulse_response(duration: f64, decay: f64, sample_rate: u32, rng: &mut impl Rng) -> AudioBuffer {
    let len = ((duration * sample_rate as f64) as usize).max(1);
    let samples = (0..len)
        .map(|i| {
            let noise = 2.0 * rng.gen_range(0.0..1.0) - 1.0;
            (noise * (1.0 - i as f64 / len as f64).powf(decay)) as f32
        })
        .collect();
    AudioBuffer::mono(sample_rate, samples)
}

/// Master gain with a switchable convolution reverb in front of the output.
///
/// The reverb path (convolver into its own gain into the destination) stays
/// wired; switching only moves the master gain between the destination and
/// the convolver.
pub struct MasterBus {
    master: NodeId,
    convolver: NodeId,
    reverb_gain: NodeId,
    volume_db: f64,
    reverb: ReverbSettings,
    sample_rate: u32,
    rng: StdRng,
}

impl MasterBus {
    pub fn new(graph: &mut dyn AudioGraph, sample_rate: u32, volume_db: f64, reverb: ReverbSettings) -> Self {
        let mut rng = StdRng::from_entropy();
        let duration = clamp_logged("reverb duration", reverb.duration, REVERB_DURATION_RANGE).unwrap_or(1.0);
        let decay = clamp_logged("reverb decay", reverb.decay, REVERB_DECAY_RANGE).unwrap_or(2.0);
        let level_db = clamp_logged("reverb level", reverb.level_db, REVERB_DB_RANGE).unwrap_or(12.0);
        let volume_db = clamp_logged("master volume", volume_db, VOLUME_DB_RANGE).unwrap_or(0.0);

        let master = graph.create_gain();
        let ir = impulse_response(duration, decay, sample_rate, &mut rng);
        let convolver = graph.create_convolver(Arc::new(ir));
        let reverb_gain = graph.create_gain();

        graph.set_value(master, Param::Gain, db_to_linear(volume_db) as f32);
        graph.set_value(reverb_gain, Param::Gain, db_to_linear(level_db) as f32);
        let destination = graph.destination();
        graph.connect(convolver, reverb_gain);
        graph.connect(reverb_gain, destination);
        graph.connect(master, if reverb.enabled { convolver } else { destination });

        Self {
            master,
            convolver,
            reverb_gain,
            volume_db,
            reverb: ReverbSettings { enabled: reverb.enabled, duration, decay, level_db },
            sample_rate,
            rng,
        }
    }

    /// Where tracks, grains and the delay network feed in.
    pub fn input(&self) -> NodeId {
        self.master
    }

    pub fn volume_db(&self) -> f64 {
        self.volume_db
    }

    pub fn set_volume_db(&mut self, graph: &mut dyn AudioGraph, db: f64, now: f64) {
        if let Some(db) = clamp_logged("master volume", db, VOLUME_DB_RANGE) {
            self.volume_db = db;
            graph.set_target_at_time(self.master, Param::Gain, db_to_linear(db) as f32, now, SMOOTHING);
        }
    }

    pub fn reverb(&self) -> ReverbSettings {
        self.reverb
    }

    pub fn set_reverb_enabled(&mut self, graph: &mut dyn AudioGraph, enabled: bool) {
        if enabled == self.reverb.enabled {
            return;
        }
        self.reverb.enabled = enabled;
        graph.disconnect(self.master, None);
        let destination = graph.destination();
        graph.connect(self.master, if enabled { self.convolver } else { destination });
        tracing::info!(enabled, "reverb switched");
    }

    pub fn set_reverb_level_db(&mut self, graph: &mut dyn AudioGraph, db: f64, now: f64) {
        if let Some(db) = clamp_logged("reverb level", db, REVERB_DB_RANGE) {
            self.reverb.level_db = db;
            graph.set_target_at_time(self.reverb_gain, Param::Gain, db_to_linear(db) as f32, now, SMOOTHING);
        }
    }

    /// Regenerates the impulse response; the running tail is cut.
    pub fn set_reverb_shape(&mut self, graph: &mut dyn AudioGraph, duration: f64, decay: f64) {
        let (Some(duration), Some(decay)) = (
            clamp_logged("reverb duration", duration, REVERB_DURATION_RANGE),
            clamp_logged("reverb decay", decay, REVERB_DECAY_RANGE),
        ) else {
            return;
        };
        self.reverb.duration = duration;
        self.reverb.decay = decay;
        let ir = impulse_response(duration, decay, self.sample_rate, &mut self.rng);
        graph.set_buffer(self.convolver, Arc::new(ir));
    }
}
