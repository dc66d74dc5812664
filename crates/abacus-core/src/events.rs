use serde::Serialize;

use crate::types::MessageId;

/// Change notifications emitted by a conversation session.
///
/// Every mutation of the message log produces one event after it has been
/// applied. A failed reply additionally emits `ReplyFailed` after the
/// `MessageAppended` for its notice. The presentation layer re-renders on
/// receipt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub enum SessionEvent {
    /// A message was appended at `index`.
    MessageAppended { id: MessageId, index: usize },

    /// The message at `index` was substituted in place.
    MessageReplaced {
        previous: MessageId,
        id: MessageId,
        index: usize,
    },

    /// A message was removed from `index`.
    MessageRemoved { id: MessageId, index: usize },

    /// A voice message received its transcript.
    TranscriptResolved { id: MessageId, index: usize },

    /// A reply request failed or timed out; a notice was appended instead.
    ReplyFailed { notice: MessageId, reason: String },

    /// The log was cleared.
    SessionReset { cleared: usize },
}

impl SessionEvent {
    /// Returns a short event name for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            SessionEvent::MessageAppended { .. } => "message_appended",
            SessionEvent::MessageReplaced { .. } => "message_replaced",
            SessionEvent::MessageRemoved { .. } => "message_removed",
            SessionEvent::TranscriptResolved { .. } => "transcript_resolved",
            SessionEvent::ReplyFailed { .. } => "reply_failed",
            SessionEvent::SessionReset { .. } => "session_reset",
        }
    }
}
