//! Error types for the jump engine.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("invalid timestamp: {timestamp} (must be finite and non-negative)")]
    InvalidTimestamp { timestamp: f64 },

    #[error("non-monotonic timestamp: {current} is earlier than previous {previous}")]
    NonMonotonicTimestamp { previous: f64, current: f64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
