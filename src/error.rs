/// Rejected construction parameters.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be positive and finite, got {value}")]
    NotPositive { name: &'static str, value: f64 },

    #[error("{0} buffer is empty")]
    EmptyBuffer(&'static str),

    #[error("score has {tracks} tracks but {buffers} buffers and {chains} effect chains")]
    TrackMismatch { tracks: usize, buffers: usize, chains: usize },

    #[error("score row {row} has {len} steps, expected {expected}")]
    RaggedScore { row: usize, len: usize, expected: usize },

    #[error("score is {tracks}x{steps}, expected {expected_tracks}x{expected_steps}")]
    ShapeMismatch { tracks: usize, steps: usize, expected_tracks: usize, expected_steps: usize },

    #[error("step count must be at least 1")]
    NoSteps,
}

/// Scheduling invariant violations.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SchedulerError {
    #[error("producer {key} stalled: called at {current}, asked for {returned}")]
    Stalled { key: String, current: f64, returned: f64 },
}

pub(crate) fn require_positive(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::NotPositive { name, value })
    }
}
