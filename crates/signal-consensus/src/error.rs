//! Error types for consensus and ensemble operations

use thiserror::Error;

/// Errors visible to callers of the engine
///
/// Agent failures never show up here; they are recorded as data in the
/// round's outcomes. Only malformed engine inputs and configuration fail.
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// Strategy name not in the supported set
    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),

    /// No weight profile exists for the set of stages that reported
    #[error("No weight profile configured for stages [{}]", .0.join(", "))]
    UnconfiguredStageSet(Vec<String>),

    /// A weight profile failed validation
    #[error("Invalid weight profile {name}: {reason}")]
    InvalidProfile {
        name: String,
        reason: String,
    },

    /// The same stage was reported twice
    #[error("Duplicate stage: {0}")]
    DuplicateStage(String),

    /// Subject identifier is empty
    #[error("Invalid subject: {0:?}")]
    InvalidSubject(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Error raised by the core crate (registry, signal validation)
    #[error(transparent)]
    Core(#[from] signal_core::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// IO error while loading configuration
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type alias for consensus operations
pub type Result<T> = std::result::Result<T, ConsensusError>;

/// Convert ConsensusError to signal_core::Error
impl From<ConsensusError> for signal_core::Error {
    fn from(err: ConsensusError) -> Self {
        match err {
            ConsensusError::Core(inner) => inner,
            other => signal_core::Error::ProcessingFailed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConsensusError::UnknownStrategy("plurality".to_string());
        assert_eq!(err.to_string(), "Unknown strategy: plurality");

        let err = ConsensusError::UnconfiguredStageSet(vec![
            "quantitative".to_string(),
            "synthesis".to_string(),
        ]);
        assert_eq!(
            err.to_string(),
            "No weight profile configured for stages [quantitative, synthesis]"
        );
    }

    #[test]
    fn test_error_conversion() {
        let err: signal_core::Error = ConsensusError::ConfigError("bad floor".to_string()).into();
        match err {
            signal_core::Error::ProcessingFailed(msg) => assert!(msg.contains("bad floor")),
            _ => panic!("Expected ProcessingFailed variant"),
        }

        let core = signal_core::Error::UnknownAgent("ghost".to_string());
        let wrapped: ConsensusError = core.into();
        let back: signal_core::Error = wrapped.into();
        assert!(matches!(back, signal_core::Error::UnknownAgent(_)));
    }
}
