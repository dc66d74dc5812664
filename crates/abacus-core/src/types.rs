use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

// =============================================================================
// Newtypes
// =============================================================================

/// Opaque unique identifier for a message in the log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Handle to a recorded audio clip produced by the recorder.
///
/// The session never opens the audio itself; it only hands the reference
/// to the transcriber and matches transcripts back by equality.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct AudioRef(pub String);

impl AudioRef {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for AudioRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Enums
// =============================================================================

/// Who authored a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    /// The person using the app.
    User,
    /// The reply provider.
    Assistant,
    /// Visible failure notices (provider unavailable, permission denied).
    System,
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::User => write!(f, "user"),
            Sender::Assistant => write!(f, "assistant"),
            Sender::System => write!(f, "system"),
        }
    }
}

/// How a message is rendered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Plain text bubble.
    Text,
    /// Scanned-image card with no text body.
    ImageCard,
    /// Recorded voice clip, optionally with a transcript.
    Voice,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Text => write!(f, "text"),
            MessageKind::ImageCard => write!(f, "image_card"),
            MessageKind::Voice => write!(f, "voice"),
        }
    }
}

/// Outcome of the microphone permission prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MicrophonePermission {
    Granted,
    Denied,
}

// =============================================================================
// Message
// =============================================================================

/// A single entry in the conversation log.
///
/// Sender and kind are fixed at construction. The transcript of a voice
/// message can be resolved at most once through [`Message::resolve_transcript`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Message {
    id: MessageId,
    sender: Sender,
    kind: MessageKind,
    text: Option<String>,
    audio: Option<AudioRef>,
    transcript: Option<String>,
    created_at: DateTime<Utc>,
}

impl Message {
    fn build(sender: Sender, kind: MessageKind, text: Option<String>, audio: Option<AudioRef>) -> Self {
        Self {
            id: MessageId::new(),
            sender,
            kind,
            text,
            audio,
            transcript: None,
            created_at: Utc::now(),
        }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self::build(Sender::User, MessageKind::Text, Some(text.into()), None)
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::build(Sender::Assistant, MessageKind::Text, Some(text.into()), None)
    }

    pub fn system_notice(text: impl Into<String>) -> Self {
        Self::build(Sender::System, MessageKind::Text, Some(text.into()), None)
    }

    pub fn image_card(sender: Sender) -> Self {
        Self::build(sender, MessageKind::ImageCard, None, None)
    }

    /// A finalized user voice message with its transcript still pending.
    pub fn voice(audio: AudioRef) -> Self {
        Self::build(Sender::User, MessageKind::Voice, None, Some(audio))
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn sender(&self) -> Sender {
        self.sender
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn audio(&self) -> Option<&AudioRef> {
        self.audio.as_ref()
    }

    pub fn transcript(&self) -> Option<&str> {
        self.transcript.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Whether this is a voice message for `audio` still awaiting its transcript.
    pub fn awaits_transcript_for(&self, audio: &AudioRef) -> bool {
        self.kind == MessageKind::Voice
            && self.transcript.is_none()
            && self.audio.as_ref() == Some(audio)
    }

    /// Set the transcript of a voice message.
    ///
    /// Returns `false` without touching the message if it is not a voice
    /// message or already has a transcript. Messages in a session log are
    /// only reachable through `&[Message]`, so there this runs solely via
    /// the session's own `resolve_transcript`.
    pub fn resolve_transcript(&mut self, transcript: impl Into<String>) -> bool {
        if self.kind != MessageKind::Voice || self.transcript.is_some() {
            return false;
        }
        let transcript = transcript.into();
        self.text = Some(transcript.clone());
        self.transcript = Some(transcript);
        true
    }
}
