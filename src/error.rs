//! Error types for faultsched
//!
//! Interruptions (catastrophes, preemptions) are deliberately absent: they are
//! ordinary control flow delivered through
//! [`Interrupt`](crate::runtime::Interrupt), not failures.

use thiserror::Error;

use crate::types::SimTime;

/// Main error type for faultsched operations
#[derive(Error, Debug)]
pub enum FaultschedError {
    /// Simulation errors
    #[error("Simulation error: {0}")]
    Sim(#[from] SimError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by the simulation substrate
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    /// Invalid configuration detected before the run started
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A timer was requested with a negative or non-finite delay
    #[error("Negative delay: {0}")]
    NegativeDelay(SimTime),

    /// `run_until` was asked to stop before the current clock
    #[error("Deadline {deadline} lies before current time {now}")]
    DeadlineInPast { deadline: SimTime, now: SimTime },
}

/// Configuration validation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A rate that must be strictly positive was not
    #[error("{name} must be > 0 (got {value})")]
    NonPositiveRate { name: &'static str, value: f64 },

    /// A rate that may be zero was negative
    #[error("{name} must be >= 0 (got {value})")]
    NegativeRate { name: &'static str, value: f64 },

    /// A duration or interval that must be strictly positive was not
    #[error("{name} must be > 0 (got {value})")]
    NonPositiveDuration { name: &'static str, value: f64 },

    /// NaN or infinite parameter
    #[error("{name} must be finite (got {value})")]
    NotFinite { name: &'static str, value: f64 },

    /// TOML parse error in a configuration file
    #[error("Invalid configuration file: {0}")]
    Parse(String),

    /// Configuration file could not be read
    #[error("Cannot read configuration file {path}: {reason}")]
    Io { path: String, reason: String },
}

/// Result type for faultsched operations
pub type FaultschedResult<T> = Result<T, FaultschedError>;

/// Result type for simulation operations
pub type SimResult<T> = Result<T, SimError>;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ConfigError::NonPositiveRate { name: "mu_service_rate", value: 0.0 };
        assert_eq!(err.to_string(), "mu_service_rate must be > 0 (got 0)");

        let sim: SimError = err.clone().into();
        assert_eq!(sim, SimError::Config(err));

        let top: FaultschedError = SimError::NegativeDelay(-1.0).into();
        assert_eq!(top.to_string(), "Simulation error: Negative delay: -1");
    }
}
