//! Voice capture state machine.
//!
//! Enforces valid transitions for the recording lifecycle:
//! - Idle -> Capturing (placeholder appended)
//! - Capturing -> Idle (capture completed or cancelled)

use std::fmt;
use std::time::Instant;

use abacus_core::types::MessageId;

use crate::error::ChatError;

/// Operational state of voice capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureState {
    /// No recording in progress.
    Idle,
    /// Recording; a placeholder message sits in the log.
    Capturing,
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureState::Idle => write!(f, "Idle"),
            CaptureState::Capturing => write!(f, "Capturing"),
        }
    }
}

impl CaptureState {
    /// Returns whether a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &CaptureState) -> bool {
        matches!(
            (self, target),
            (CaptureState::Idle, CaptureState::Capturing)
                | (CaptureState::Capturing, CaptureState::Idle)
        )
    }
}

/// Tracks the capture state together with the placeholder it owns.
#[derive(Debug)]
pub(crate) struct CaptureTracker {
    state: CaptureState,
    placeholder: Option<MessageId>,
    started_at: Option<Instant>,
}

impl Default for CaptureTracker {
    fn default() -> Self {
        Self {
            state: CaptureState::Idle,
            placeholder: None,
            started_at: None,
        }
    }
}

impl CaptureTracker {
    pub(crate) fn state(&self) -> CaptureState {
        self.state
    }

    pub(crate) fn placeholder(&self) -> Option<MessageId> {
        self.placeholder
    }

    fn transition(&mut self, target: CaptureState) -> Result<(), ChatError> {
        if self.state.can_transition_to(&target) {
            tracing::debug!("Capture state: {} -> {}", self.state, target);
            self.state = target;
            Ok(())
        } else {
            Err(ChatError::InvalidTransition {
                from: self.state,
                to: target,
            })
        }
    }

    /// Idle -> Capturing, remembering the placeholder shown in the log.
    pub(crate) fn begin(&mut self, placeholder: MessageId) -> Result<(), ChatError> {
        if self.state == CaptureState::Capturing {
            return Err(ChatError::CaptureInProgress);
        }
        self.transition(CaptureState::Capturing)?;
        self.placeholder = Some(placeholder);
        self.started_at = Some(Instant::now());
        Ok(())
    }

    /// Capturing -> Idle. Returns the placeholder and the elapsed recording time.
    pub(crate) fn finish(&mut self) -> Result<(MessageId, f32), ChatError> {
        if self.state == CaptureState::Idle {
            return Err(ChatError::NotCapturing);
        }
        self.transition(CaptureState::Idle)?;
        let elapsed = self
            .started_at
            .take()
            .map(|t| t.elapsed().as_secs_f32())
            .unwrap_or_default();
        let placeholder = self
            .placeholder
            .take()
            .ok_or_else(|| ChatError::Internal("capture had no placeholder".to_string()))?;
        Ok((placeholder, elapsed))
    }

    /// Force the tracker back to Idle (session reset).
    pub(crate) fn reset(&mut self) {
        if self.state != CaptureState::Idle {
            tracing::warn!("Capture state reset to Idle from {}", self.state);
        }
        self.state = CaptureState::Idle;
        self.placeholder = None;
        self.started_at = None;
    }
}

// =============================================================================
// Tests
// =============================================================================
