use thiserror::Error;

/// Top-level error type for the Abacus system.
///
/// Collaborator seams (reply providers, transcribers) report failures through
/// this type. Subsystem crates define their own error types and implement
/// `From<AbacusError>` so that `?` works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AbacusError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Reply provider error: {0}")]
    Provider(String),

    #[error("Transcription error: {0}")]
    Transcription(String),
}

impl From<toml::de::Error> for AbacusError {
    fn from(err: toml::de::Error) -> Self {
        AbacusError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for AbacusError {
    fn from(err: toml::ser::Error) -> Self {
        AbacusError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for AbacusError {
    fn from(err: serde_json::Error) -> Self {
        AbacusError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Abacus operations.
pub type Result<T> = std::result::Result<T, AbacusError>;
