//! The conversation session: single owner of the message log.
//!
//! All log mutations happen through `&mut self`. Reply generation and
//! transcription run on spawned tasks that never touch the log; they send a
//! [`Completion`] back over a channel and the owner applies it in
//! [`ConversationSession::process_next`] or
//! [`ConversationSession::poll_completions`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc};

use abacus_core::config::{AbacusConfig, ChatConfig, VoiceConfig};
use abacus_core::events::SessionEvent;
use abacus_core::types::{AudioRef, Message, MessageId, MicrophonePermission};
use abacus_transcribe::{TranscriptionResult, Transcriber};

use crate::capture::{CaptureState, CaptureTracker};
use crate::error::ChatError;
use crate::ordering::ReplyQueue;
use crate::provider::ReplyProvider;

/// Capacity of the change-notification channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

type ReplyOutcome = Result<String, ChatError>;

/// Result of a background task, routed back to the session owner.
///
/// `epoch` identifies the session generation the task was started in;
/// completions from before a [`ConversationSession::reset`] are dropped.
#[derive(Debug)]
enum Completion {
    Reply {
        epoch: u64,
        seq: u64,
        outcome: ReplyOutcome,
    },
    Transcript {
        epoch: u64,
        audio: AudioRef,
        outcome: Result<TranscriptionResult, ChatError>,
    },
}

/// Ordered message log plus the asynchronous reply and transcription contracts.
///
/// Operations that request a reply or a transcription spawn Tokio tasks, so
/// they must be called from within a Tokio runtime.
pub struct ConversationSession {
    chat: ChatConfig,
    voice: VoiceConfig,
    messages: Vec<Message>,
    capture: CaptureTracker,
    replies: ReplyQueue<ReplyOutcome>,
    reply_provider: Arc<dyn ReplyProvider>,
    transcriber: Arc<dyn Transcriber>,
    epoch: u64,
    in_flight: usize,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
    events: broadcast::Sender<SessionEvent>,
}

impl std::fmt::Debug for ConversationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationSession")
            .field("messages", &self.messages.len())
            .field("capture", &self.capture.state())
            .field("ordering", &self.replies.ordering())
            .field("epoch", &self.epoch)
            .field("in_flight", &self.in_flight)
            .finish()
    }
}

impl ConversationSession {
    /// Create a session with the given settings and collaborators.
    ///
    /// If `chat.welcome_message` is set, the log starts with that assistant
    /// greeting.
    pub fn new(
        chat: ChatConfig,
        voice: VoiceConfig,
        reply_provider: Arc<dyn ReplyProvider>,
        transcriber: Arc<dyn Transcriber>,
    ) -> Self {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let replies = ReplyQueue::new(chat.reply_ordering);

        let mut session = Self {
            chat,
            voice,
            messages: Vec::new(),
            capture: CaptureTracker::default(),
            replies,
            reply_provider,
            transcriber,
            epoch: 0,
            in_flight: 0,
            completion_tx,
            completion_rx,
            events,
        };

        if let Some(greeting) = session.chat.welcome_message.clone() {
            session.append(Message::assistant_text(greeting));
        }
        session
    }

    /// Create a session from the `[chat]` and `[voice]` sections of `config`.
    pub fn from_config(
        config: &AbacusConfig,
        reply_provider: Arc<dyn ReplyProvider>,
        transcriber: Arc<dyn Transcriber>,
    ) -> Self {
        Self::new(
            config.chat.clone(),
            config.voice.clone(),
            reply_provider,
            transcriber,
        )
    }

    // -- Read side --

    /// The current log, in display order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// An owned copy of the current log.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id() == id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn capture_state(&self) -> CaptureState {
        self.capture.state()
    }

    /// Whether any reply or transcription is still outstanding.
    pub fn has_pending(&self) -> bool {
        self.in_flight > 0
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    // -- User-originating operations --

    /// Append a user text message and request a reply to it.
    ///
    /// Text is trimmed first. Blank text is ignored and returns `Ok(None)`.
    pub fn append_user_text(&mut self, text: &str) -> Result<Option<MessageId>, ChatError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            tracing::debug!("Ignoring blank user text");
            return Ok(None);
        }
        if trimmed.chars().count() > self.chat.max_message_length {
            return Err(ChatError::MessageTooLong(self.chat.max_message_length));
        }

        let id = self.append(Message::user_text(trimmed));
        tracing::info!(message_id = %id, text_len = trimmed.len(), "User text appended");
        self.request_reply(trimmed);
        Ok(Some(id))
    }

    /// Start recording: append the placeholder message and return its id.
    ///
    /// Fails with `CaptureInProgress` while already capturing. If the
    /// microphone permission was denied, a notice is appended and
    /// `PermissionDenied` is returned; the state stays Idle.
    pub fn begin_voice_capture(
        &mut self,
        permission: MicrophonePermission,
    ) -> Result<MessageId, ChatError> {
        if self.capture.state() == CaptureState::Capturing {
            return Err(ChatError::CaptureInProgress);
        }
        if permission == MicrophonePermission::Denied {
            tracing::warn!("Microphone permission denied, voice capture not started");
            let notice = self.chat.permission_denied_notice.clone();
            self.append(Message::system_notice(notice));
            return Err(ChatError::PermissionDenied);
        }

        let placeholder = Message::user_text(self.voice.placeholder_text.clone());
        let id = placeholder.id();
        self.capture.begin(id)?;
        self.append(placeholder);
        tracing::info!(placeholder_id = %id, "Voice capture started");
        Ok(id)
    }

    /// Substitute the placeholder with the finalized voice message.
    ///
    /// The voice message takes the placeholder's position and receives a new
    /// id, which is returned. A reply and a transcription are requested.
    ///
    /// Fails with `NotFound` if the placeholder is no longer in the log; the
    /// caller should then use [`Self::append_voice_message`] so the recording
    /// is not lost.
    pub fn complete_voice_capture(
        &mut self,
        placeholder_id: MessageId,
        audio: AudioRef,
    ) -> Result<MessageId, ChatError> {
        let active = self.capture.placeholder();
        let index = match self.position_of(placeholder_id) {
            Some(index) => index,
            None => {
                if active == Some(placeholder_id) {
                    self.capture.finish()?;
                }
                tracing::warn!(placeholder_id = %placeholder_id, "Placeholder missing on capture completion");
                return Err(ChatError::NotFound(placeholder_id));
            }
        };
        match active {
            None => return Err(ChatError::NotCapturing),
            Some(active) if active != placeholder_id => {
                return Err(ChatError::NotFound(placeholder_id));
            }
            Some(_) => {}
        }

        let (_, elapsed_secs) = self.capture.finish()?;
        let voice = Message::voice(audio.clone());
        let id = voice.id();
        self.messages[index] = voice;
        self.emit(SessionEvent::MessageReplaced {
            previous: placeholder_id,
            id,
            index,
        });
        tracing::info!(
            message_id = %id,
            placeholder_id = %placeholder_id,
            audio = %audio,
            elapsed_secs,
            "Voice capture completed"
        );

        let prompt = self.voice.voice_prompt.clone();
        self.request_reply(prompt);
        self.request_transcription(audio);
        Ok(id)
    }

    /// Abandon the current recording and remove its placeholder.
    pub fn cancel_voice_capture(&mut self) -> Result<(), ChatError> {
        let (placeholder_id, elapsed_secs) = self.capture.finish()?;
        if let Some(index) = self.position_of(placeholder_id) {
            self.messages.remove(index);
            self.emit(SessionEvent::MessageRemoved {
                id: placeholder_id,
                index,
            });
        }
        tracing::info!(placeholder_id = %placeholder_id, elapsed_secs, "Voice capture cancelled");
        Ok(())
    }

    /// Append a finalized voice message without a placeholder.
    pub fn append_voice_message(&mut self, audio: AudioRef) -> MessageId {
        let id = self.append(Message::voice(audio.clone()));
        tracing::info!(message_id = %id, audio = %audio, "Voice message appended");

        let prompt = self.voice.voice_prompt.clone();
        self.request_reply(prompt);
        self.request_transcription(audio);
        id
    }

    /// Set the transcript of the most recent voice message for `audio` that
    /// does not have one yet.
    ///
    /// Returns `false` and leaves the log unchanged if no such message exists.
    pub fn resolve_transcript(&mut self, audio: &AudioRef, transcript: &str) -> bool {
        let Some(index) = self
            .messages
            .iter()
            .rposition(|m| m.awaits_transcript_for(audio))
        else {
            tracing::info!(audio = %audio, "No voice message awaiting this transcript");
            return false;
        };

        if !self.messages[index].resolve_transcript(transcript) {
            return false;
        }
        let id = self.messages[index].id();
        self.emit(SessionEvent::TranscriptResolved { id, index });
        tracing::debug!(message_id = %id, text_len = transcript.len(), "Transcript resolved");
        true
    }

    /// Append a message naming an uploaded file and request a reply to it.
    ///
    /// A blank file name is ignored and returns `None`.
    pub fn append_file_reference(&mut self, filename: &str) -> Option<MessageId> {
        let name = filename.trim();
        if name.is_empty() {
            tracing::debug!("Ignoring blank file name");
            return None;
        }

        let id = self.append(Message::user_text(format!("Uploaded file: {}", name)));
        tracing::info!(message_id = %id, file = %name, "File reference appended");
        let prompt = format!("{}{}", self.voice.file_prompt_prefix, name);
        self.request_reply(prompt);
        Some(id)
    }

    /// Seed the log with pre-built messages, e.g. a sample conversation.
    ///
    /// No replies are requested. Returns the number of messages appended.
    pub fn preload(&mut self, messages: impl IntoIterator<Item = Message>) -> usize {
        let mut count = 0;
        for message in messages {
            self.append(message);
            count += 1;
        }
        count
    }

    /// Clear the log and return to Idle.
    ///
    /// Replies and transcripts requested before the reset are discarded
    /// when they arrive.
    pub fn reset(&mut self) {
        let cleared = self.messages.len();
        self.messages.clear();
        self.capture.reset();
        self.replies.reset();
        self.epoch += 1;
        self.emit(SessionEvent::SessionReset { cleared });
        tracing::info!(cleared, epoch = self.epoch, "Session reset");
    }

    // -- Asynchronous contracts --

    /// Ask the reply provider for a reply to `prompt`.
    ///
    /// Exactly one assistant message is eventually appended for the request:
    /// the reply, or a notice if the provider fails or exceeds
    /// `chat.reply_timeout_ms`. Returns the request's sequence number.
    pub fn request_reply(&mut self, prompt: impl Into<String>) -> u64 {
        let prompt = prompt.into();
        let seq = self.replies.issue();
        let epoch = self.epoch;
        let provider = Arc::clone(&self.reply_provider);
        let tx = self.completion_tx.clone();
        let timeout_ms = self.chat.reply_timeout_ms;

        self.in_flight += 1;
        tracing::debug!(seq, epoch, prompt_len = prompt.len(), "Reply requested");

        tokio::spawn(async move {
            let started = Instant::now();
            let outcome = match tokio::time::timeout(
                Duration::from_millis(timeout_ms),
                provider.generate_reply(&prompt),
            )
            .await
            {
                Ok(Ok(reply)) => Ok(reply),
                Ok(Err(e)) => Err(ChatError::from(e)),
                Err(_) => Err(ChatError::Timeout(timeout_ms)),
            };
            tracing::debug!(
                seq,
                elapsed_ms = started.elapsed().as_millis() as u64,
                ok = outcome.is_ok(),
                "Reply finished"
            );
            // The session may have been dropped; nothing to deliver to then.
            let _ = tx.send(Completion::Reply {
                epoch,
                seq,
                outcome,
            });
        });

        seq
    }

    fn request_transcription(&mut self, audio: AudioRef) {
        let epoch = self.epoch;
        let transcriber = Arc::clone(&self.transcriber);
        let tx = self.completion_tx.clone();
        let timeout_ms = self.voice.transcription_timeout_ms;

        self.in_flight += 1;
        tracing::debug!(audio = %audio, epoch, "Transcription requested");

        tokio::spawn(async move {
            let outcome = match tokio::time::timeout(
                Duration::from_millis(timeout_ms),
                transcriber.transcribe(&audio),
            )
            .await
            {
                Ok(Ok(result)) => Ok(result),
                Ok(Err(e)) => Err(ChatError::from(e)),
                Err(_) => Err(ChatError::Timeout(timeout_ms)),
            };
            let _ = tx.send(Completion::Transcript {
                epoch,
                audio,
                outcome,
            });
        });
    }

    /// Wait for the next background result and apply it to the log.
    ///
    /// Returns `false` immediately when nothing is outstanding. Cancel-safe:
    /// if the future is dropped before a result arrives, nothing is lost.
    pub async fn process_next(&mut self) -> bool {
        if self.in_flight == 0 {
            return false;
        }
        match self.completion_rx.recv().await {
            Some(completion) => {
                self.in_flight = self.in_flight.saturating_sub(1);
                self.apply(completion);
                true
            }
            None => false,
        }
    }

    /// Apply every result that has already arrived, without waiting.
    ///
    /// Returns the number of results applied.
    pub fn poll_completions(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(completion) = self.completion_rx.try_recv() {
            self.in_flight = self.in_flight.saturating_sub(1);
            self.apply(completion);
            applied += 1;
        }
        applied
    }

    /// Apply results until nothing is outstanding.
    ///
    /// Terminates because every background call is bounded by a timeout.
    pub async fn settle(&mut self) {
        while self.process_next().await {}
    }

    // -- Private helpers --

    fn apply(&mut self, completion: Completion) {
        match completion {
            Completion::Reply {
                epoch,
                seq,
                outcome,
            } => {
                if epoch != self.epoch {
                    tracing::debug!(seq, epoch, "Dropping reply issued before reset");
                    return;
                }
                for outcome in self.replies.complete(seq, outcome) {
                    self.commit_reply(outcome);
                }
            }
            Completion::Transcript {
                epoch,
                audio,
                outcome,
            } => {
                if epoch != self.epoch {
                    tracing::debug!(audio = %audio, epoch, "Dropping transcript issued before reset");
                    return;
                }
                self.commit_transcript(audio, outcome);
            }
        }
    }

    fn commit_reply(&mut self, outcome: ReplyOutcome) {
        match outcome {
            Ok(reply) => {
                let id = self.append(Message::assistant_text(reply));
                tracing::debug!(message_id = %id, "Assistant reply committed");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Reply failed, appending notice");
                let notice = self.chat.unavailable_notice.clone();
                let id = self.append(Message::system_notice(notice));
                self.emit(SessionEvent::ReplyFailed {
                    notice: id,
                    reason: e.to_string(),
                });
            }
        }
    }

    fn commit_transcript(
        &mut self,
        audio: AudioRef,
        outcome: Result<TranscriptionResult, ChatError>,
    ) {
        match outcome {
            Ok(result) => {
                let text = result.text.trim();
                if text.is_empty() {
                    tracing::debug!(audio = %audio, "Transcription returned empty text");
                    return;
                }
                self.resolve_transcript(&audio, text);
            }
            Err(e) => {
                tracing::warn!(audio = %audio, error = %e, "Transcription failed");
                if self.messages.iter().any(|m| m.awaits_transcript_for(&audio)) {
                    let notice = self.voice.transcription_failed_notice.clone();
                    self.append(Message::system_notice(notice));
                }
            }
        }
    }

    fn append(&mut self, message: Message) -> MessageId {
        let id = message.id();
        self.messages.push(message);
        let index = self.messages.len() - 1;
        self.emit(SessionEvent::MessageAppended { id, index });
        id
    }

    fn position_of(&self, id: MessageId) -> Option<usize> {
        self.messages.iter().position(|m| m.id() == id)
    }

    fn emit(&self, event: SessionEvent) {
        tracing::trace!(event = event.event_name(), "Session event");
        // No subscribers is fine; the log itself is the source of truth.
        let _ = self.events.send(event);
    }
}

// =============================================================================
// Tests
// =============================================================================
