//! Abacus Transcribe crate - speech-to-text collaborator for voice messages.
//!
//! Provides a trait-based abstraction over the platform transcriber, the
//! result type it produces, and a mock implementation for testing without a
//! real speech engine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use abacus_core::error::AbacusError;
use abacus_core::types::AudioRef;

// =============================================================================
// Result types
// =============================================================================

/// The result of transcribing one recorded clip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionResult {
    /// Full transcribed text.
    pub text: String,
    /// Detected or specified language.
    pub language: String,
}

// =============================================================================
// Trait
// =============================================================================

/// Service for converting recorded audio into text.
///
/// A call may take arbitrarily long or never finish if the platform engine
/// is unavailable; callers are expected to bound it with a timeout.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe the clip behind `audio`.
    async fn transcribe(&self, audio: &AudioRef) -> Result<TranscriptionResult, AbacusError>;
}

// =============================================================================
// Mock implementation
// =============================================================================

/// Mock transcriber that returns a fixed transcript.
///
/// Used for testing and for running the app without a speech engine.
/// Optionally waits before answering or fails every call.
#[derive(Debug, Clone)]
pub struct MockTranscriber {
    text: String,
    delay: Option<Duration>,
    fail_with: Option<String>,
    calls: Arc<AtomicUsize>,
}

impl Default for MockTranscriber {
    fn default() -> Self {
        Self::new("[mock transcription]")
    }
}

impl MockTranscriber {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            delay: None,
            fail_with: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wait `delay` before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every call with the given reason.
    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.fail_with = Some(reason.into());
        self
    }

    /// Number of transcriptions requested so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, audio: &AudioRef) -> Result<TranscriptionResult, AbacusError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if audio.is_empty() {
            return Err(AbacusError::Transcription(
                "Cannot transcribe an empty audio reference".to_string(),
            ));
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(ref reason) = self.fail_with {
            return Err(AbacusError::Transcription(reason.clone()));
        }

        tracing::debug!(audio = %audio, text_len = self.text.len(), "Mock transcription generated");

        Ok(TranscriptionResult {
            text: self.text.clone(),
            language: "en".to_string(),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
