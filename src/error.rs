//! Error types for the beat tracking engine

use std::fmt;

/// Errors that can occur while validating configuration
///
/// These are construction-time errors only. The running engine never
/// returns a `Result`: malformed runtime input is clamped or discarded,
/// and the only externally visible failure mode is loss of confidence.
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// A numeric range is inverted or out of bounds
    InvalidRange(String),

    /// A buffer or bank capacity is zero or otherwise unusable
    InvalidCapacity(String),

    /// A gain, threshold, or rate parameter is non-finite or out of bounds
    InvalidParameter(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidRange(msg) => write!(f, "Invalid range: {}", msg),
            ConfigError::InvalidCapacity(msg) => write!(f, "Invalid capacity: {}", msg),
            ConfigError::InvalidParameter(msg) => write!(f, "Invalid parameter: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
