// Persistent subgraphs: built once, then only their parameters change.
mod chain;
mod feedback_delay;
mod master;

pub use chain::EffectChain;
pub use feedback_delay::{DelaySettings, FeedbackDelayNetwork};
pub use master::{impulse_response, MasterBus, ReverbSettings};
