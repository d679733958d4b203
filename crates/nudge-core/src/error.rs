use thiserror::Error;

/// Top-level error type for the Nudge system.
///
/// Each variant wraps a subsystem-specific failure. Collaborator outcomes
/// that callers must branch on (transcription, delivery) have their own
/// dedicated enums in the crates that own those collaborators; this type
/// covers everything that propagates with `?`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NudgeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Intake error: {0}")]
    Intake(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for NudgeError {
    fn from(err: toml::de::Error) -> Self {
        NudgeError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for NudgeError {
    fn from(err: toml::ser::Error) -> Self {
        NudgeError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for NudgeError {
    fn from(err: serde_json::Error) -> Self {
        NudgeError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Nudge operations.
pub type Result<T> = std::result::Result<T, NudgeError>;
