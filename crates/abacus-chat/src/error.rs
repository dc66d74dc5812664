//! Error types for the conversation session.

use abacus_core::error::AbacusError;
use abacus_core::types::MessageId;

use crate::capture::CaptureState;

/// Errors from the conversation session.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("voice capture is already in progress")]
    CaptureInProgress,
    #[error("voice capture is not active")]
    NotCapturing,
    #[error("microphone permission denied")]
    PermissionDenied,
    #[error("message not found: {0}")]
    NotFound(MessageId),
    #[error("invalid capture transition: {from} -> {to}")]
    InvalidTransition { from: CaptureState, to: CaptureState },
    #[error("reply provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("timed out after {0} ms")]
    Timeout(u64),
    #[error("transcription error: {0}")]
    Transcription(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<AbacusError> for ChatError {
    fn from(err: AbacusError) -> Self {
        match err {
            AbacusError::Provider(reason) => ChatError::ProviderUnavailable(reason),
            AbacusError::Transcription(reason) => ChatError::Transcription(reason),
            other => ChatError::Internal(other.to_string()),
        }
    }
}
