//! Error types for signal-core

use thiserror::Error;

/// Result type alias for signal-core
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for agent and registry operations
#[derive(Error, Debug)]
pub enum Error {
    /// Generic error message
    #[error("{0}")]
    Generic(String),

    /// A signal could not be constructed because a field is out of range
    #[error("Invalid signal: {0}")]
    InvalidSignal(String),

    /// An agent produced output that cannot be turned into a signal
    #[error("Invalid agent output: {0}")]
    InvalidOutput(String),

    /// Agent processing failed
    #[error("Agent processing failed: {0}")]
    ProcessingFailed(String),

    /// Requested data is not available for the subject
    #[error("Data not available for {subject}: {key}")]
    DataUnavailable {
        subject: String,
        key: String,
    },

    /// An agent with the same id is already registered
    #[error("Agent already registered: {0}")]
    DuplicateAgent(String),

    /// No agent with the given id is registered
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    /// Weight is negative or not a finite number
    #[error("Invalid weight {weight} for agent {id}")]
    InvalidWeight {
        id: String,
        weight: f64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::DuplicateAgent("momentum".to_string());
        assert_eq!(err.to_string(), "Agent already registered: momentum");

        let err = Error::DataUnavailable {
            subject: "AAPL".to_string(),
            key: "pe_ratio".to_string(),
        };
        assert_eq!(err.to_string(), "Data not available for AAPL: pe_ratio");

        let err = Error::InvalidWeight {
            id: "value".to_string(),
            weight: -0.5,
        };
        assert_eq!(err.to_string(), "Invalid weight -0.5 for agent value");
    }
}
