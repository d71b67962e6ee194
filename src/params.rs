// Shared parameter ranges and conversions.
use std::ops::RangeInclusive;

pub const BPM_RANGE: RangeInclusive<f64> = 1.0..=1000.0;
pub const VOLUME_DB_RANGE: RangeInclusive<f64> = -80.0..=6.0;
pub const REVERB_DB_RANGE: RangeInclusive<f64> = -80.0..=24.0;
pub const CUTOFF_RANGE: RangeInclusive<f64> = 50.0..=18000.0;
pub const REVERB_DURATION_RANGE: RangeInclusive<f64> = 0.01..=3.0;
pub const REVERB_DECAY_RANGE: RangeInclusive<f64> = 0.01..=2.0;
pub const DELAY_TIME_RANGE: RangeInclusive<f64> = 0.001..=1.0;

/// Smoothing used for live level and cutoff changes.
pub const SMOOTHING: f64 = 0.01;

pub fn db_to_linear(db: f64) -> f64 {
    10f64.powf(db / 20.0)
}

/// Seconds between steps.
pub fn step_interval(bpm: f64) -> f64 {
    60.0 / bpm
}

pub fn wrap_step(step: usize, num_steps: usize) -> usize {
    (step + 1) % num_steps
}

/// Clamp into `range`, logging when the value had to move.
/// Non-finite input gives `None`.
pub fn clamp_logged(name: &str, value: f64, range: RangeInclusive<f64>) -> Option<f64> {
    if !value.is_finite() {
        tracing::warn!(name, value, "ignoring non-finite value");
        return None;
    }
    let clamped = value.clamp(*range.start(), *range.end());
    if clamped != value {
        tracing::warn!(name, value, clamped, "value out of range, clamped");
    }
    Some(clamped)
}
