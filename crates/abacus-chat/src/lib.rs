//! Conversation session for Abacus.
//!
//! Owns the ordered message log, the voice-capture lifecycle, and the
//! asynchronous reply and transcription contracts that feed it.

pub mod capture;
pub mod error;
pub mod ordering;
pub mod provider;
pub mod session;

pub use capture::CaptureState;
pub use error::ChatError;
pub use provider::{CannedReplyProvider, MockReplyProvider, ReplyProvider};
pub use session::ConversationSession;
