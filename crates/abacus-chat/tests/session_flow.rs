//! End-to-end tests for the conversation session.
//!
//! Each test builds its own session with deterministic collaborators and
//! runs on a paused Tokio clock so provider delays and timeouts resolve
//! instantly and in a fixed order.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use abacus_chat::{CaptureState, ChatError, ConversationSession, MockReplyProvider, ReplyProvider};
use abacus_core::config::{ChatConfig, ReplyOrdering, VoiceConfig};
use abacus_core::error::AbacusError;
use abacus_core::events::SessionEvent;
use abacus_core::types::{AudioRef, MessageKind, MicrophonePermission, Sender};
use abacus_transcribe::{MockTranscriber, Transcriber, TranscriptionResult};

// =============================================================================
// Helpers
// =============================================================================

/// Replies `re: <prompt>` after a delay looked up from the prompt text.
struct DelayByPrompt;

#[async_trait]
impl ReplyProvider for DelayByPrompt {
    async fn generate_reply(&self, prompt: &str) -> Result<String, AbacusError> {
        let delay_ms = match prompt {
            "slow" => 1_000,
            "medium" => 500,
            _ => 10,
        };
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        Ok(format!("re: {}", prompt))
    }
}

/// Transcriber that never answers.
struct SilentTranscriber;

#[async_trait]
impl Transcriber for SilentTranscriber {
    async fn transcribe(&self, _audio: &AudioRef) -> Result<TranscriptionResult, AbacusError> {
        std::future::pending().await
    }
}

fn chat_config(ordering: ReplyOrdering) -> ChatConfig {
    ChatConfig {
        reply_ordering: ordering,
        ..ChatConfig::default()
    }
}

fn session_with(
    chat: ChatConfig,
    provider: Arc<dyn ReplyProvider>,
    transcriber: Arc<dyn Transcriber>,
) -> ConversationSession {
    ConversationSession::new(chat, VoiceConfig::default(), provider, transcriber)
}

fn texts(session: &ConversationSession) -> Vec<String> {
    session
        .messages()
        .iter()
        .map(|m| m.text().unwrap_or_default().to_string())
        .collect()
}

// =============================================================================
// Properties
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_blank_input_leaves_log_unchanged() {
    let mut session = session_with(
        ChatConfig::default(),
        Arc::new(MockReplyProvider::new("ok")),
        Arc::new(MockTranscriber::default()),
    );
    session.append_user_text("seed").unwrap();
    session.settle().await;
    let before = session.snapshot();

    for blank in ["", " ", "\n", "\t  \r\n"] {
        assert!(session.append_user_text(blank).unwrap().is_none());
    }
    session.settle().await;
    assert_eq!(session.snapshot(), before);
}

#[tokio::test(start_paused = true)]
async fn test_each_text_gets_exactly_one_reply() {
    let mut session = session_with(
        ChatConfig::default(),
        Arc::new(MockReplyProvider::new("ok").with_delay(Duration::from_millis(800))),
        Arc::new(MockTranscriber::default()),
    );

    for i in 0..5 {
        session.append_user_text(&format!("question {}", i)).unwrap();
    }
    assert_eq!(session.len(), 5);

    session.settle().await;
    let users = session
        .messages()
        .iter()
        .filter(|m| m.sender() == Sender::User)
        .count();
    let assistants = session
        .messages()
        .iter()
        .filter(|m| m.sender() == Sender::Assistant)
        .count();
    assert_eq!(users, 5);
    assert_eq!(assistants, 5);
}

#[tokio::test(start_paused = true)]
async fn test_capture_cycle_is_substitution_not_addition() {
    let mut session = session_with(
        ChatConfig::default(),
        Arc::new(MockReplyProvider::new("ok")),
        Arc::new(SilentTranscriber),
    );
    session.append_user_text("before").unwrap();

    let placeholder = session
        .begin_voice_capture(MicrophonePermission::Granted)
        .unwrap();
    let after_placeholder = session.len();
    session
        .complete_voice_capture(placeholder, AudioRef::new("clip-1.m4a"))
        .unwrap();
    assert_eq!(session.len(), after_placeholder);
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_scenario_text_then_reply() {
    let mut session = session_with(
        ChatConfig::default(),
        Arc::new(MockReplyProvider::new("4").with_delay(Duration::from_millis(900))),
        Arc::new(MockTranscriber::default()),
    );
    assert!(session.is_empty());

    session.append_user_text("2+2=?").unwrap();
    assert_eq!(session.len(), 1);
    assert_eq!(session.messages()[0].sender(), Sender::User);
    assert_eq!(session.messages()[0].kind(), MessageKind::Text);
    assert_eq!(session.messages()[0].text(), Some("2+2=?"));

    session.settle().await;
    assert_eq!(texts(&session), vec!["2+2=?", "4"]);
    assert_eq!(session.messages()[1].sender(), Sender::Assistant);
}

#[tokio::test(start_paused = true)]
async fn test_scenario_voice_capture_and_transcript() {
    let mut session = session_with(
        ChatConfig::default(),
        Arc::new(MockReplyProvider::new("ok")),
        Arc::new(SilentTranscriber),
    );
    let audio = AudioRef::new("rec-42.m4a");

    let p = session
        .begin_voice_capture(MicrophonePermission::Granted)
        .unwrap();
    let last = session.messages().last().unwrap();
    assert_eq!(last.id(), p);
    assert_eq!(last.text(), Some("Listening…"));
    assert_eq!(session.capture_state(), CaptureState::Capturing);

    let len = session.len();
    let voice_id = session.complete_voice_capture(p, audio.clone()).unwrap();
    assert_eq!(session.len(), len);
    let slot = &session.messages()[len - 1];
    assert_eq!(slot.id(), voice_id);
    assert_eq!(slot.sender(), Sender::User);
    assert_eq!(slot.kind(), MessageKind::Voice);
    assert_eq!(slot.audio(), Some(&audio));
    assert!(slot.transcript().is_none());

    assert!(session.resolve_transcript(&audio, "hello"));
    assert!(!session.resolve_transcript(&audio, "something else"));
    assert_eq!(session.get(voice_id).unwrap().transcript(), Some("hello"));
}

#[tokio::test(start_paused = true)]
async fn test_transcript_arrives_after_message_exists() {
    let mut session = session_with(
        ChatConfig::default(),
        Arc::new(MockReplyProvider::new("ok")),
        Arc::new(MockTranscriber::new("what is pi").with_delay(Duration::from_millis(300))),
    );
    let mut events = session.subscribe();

    let p = session
        .begin_voice_capture(MicrophonePermission::Granted)
        .unwrap();
    let id = session
        .complete_voice_capture(p, AudioRef::new("rec-1.m4a"))
        .unwrap();
    session.settle().await;

    let voice = session.get(id).unwrap();
    assert_eq!(voice.transcript(), Some("what is pi"));
    assert_eq!(voice.text(), Some("what is pi"));

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event.event_name());
    }
    let replaced = seen.iter().position(|e| *e == "message_replaced").unwrap();
    let resolved = seen.iter().position(|e| *e == "transcript_resolved").unwrap();
    assert!(replaced < resolved);
}

// =============================================================================
// Ordering
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_issuance_ordering_preserves_request_order() {
    let mut session = session_with(
        chat_config(ReplyOrdering::Issuance),
        Arc::new(DelayByPrompt),
        Arc::new(MockTranscriber::default()),
    );
    session.append_user_text("slow").unwrap();
    session.append_user_text("medium").unwrap();
    session.append_user_text("fast").unwrap();
    session.settle().await;

    assert_eq!(
        texts(&session),
        vec!["slow", "medium", "fast", "re: slow", "re: medium", "re: fast"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_completion_ordering_first_finisher_wins() {
    let mut session = session_with(
        chat_config(ReplyOrdering::Completion),
        Arc::new(DelayByPrompt),
        Arc::new(MockTranscriber::default()),
    );
    session.append_user_text("slow").unwrap();
    session.append_user_text("medium").unwrap();
    session.append_user_text("fast").unwrap();
    session.settle().await;

    assert_eq!(
        texts(&session),
        vec!["slow", "medium", "fast", "re: fast", "re: medium", "re: slow"]
    );
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_provider_failure_appends_notice() {
    let mut session = session_with(
        ChatConfig::default(),
        Arc::new(MockReplyProvider::failing("network down")),
        Arc::new(MockTranscriber::default()),
    );
    let mut events = session.subscribe();

    session.append_user_text("2+2=?").unwrap();
    session.settle().await;

    assert_eq!(session.len(), 2);
    let notice = &session.messages()[1];
    assert_eq!(notice.sender(), Sender::System);
    assert_eq!(
        notice.text(),
        Some("Sorry, I couldn't get a response. Please try again.")
    );

    let mut failed = None;
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::ReplyFailed { notice, reason } = event {
            failed = Some((notice, reason));
        }
    }
    let (notice_id, reason) = failed.expect("ReplyFailed event");
    assert_eq!(notice_id, session.messages()[1].id());
    assert!(reason.contains("network down"));
}

#[tokio::test(start_paused = true)]
async fn test_provider_timeout_appends_notice() {
    let chat = ChatConfig {
        reply_timeout_ms: 2_000,
        ..ChatConfig::default()
    };
    let mut session = session_with(
        chat,
        Arc::new(MockReplyProvider::hanging()),
        Arc::new(MockTranscriber::default()),
    );

    let start = tokio::time::Instant::now();
    session.append_user_text("anyone there?").unwrap();
    session.settle().await;

    assert!(start.elapsed() >= Duration::from_millis(2_000));
    assert_eq!(session.len(), 2);
    assert_eq!(session.messages()[1].sender(), Sender::System);
    assert!(!session.has_pending());
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_reply_keeps_its_slot_under_issuance() {
    struct HangOnFirst;

    #[async_trait]
    impl ReplyProvider for HangOnFirst {
        async fn generate_reply(&self, prompt: &str) -> Result<String, AbacusError> {
            if prompt == "first" {
                std::future::pending::<()>().await;
            }
            Ok(format!("re: {}", prompt))
        }
    }

    let chat = ChatConfig {
        reply_timeout_ms: 1_000,
        ..ChatConfig::default()
    };
    let mut session = session_with(chat, Arc::new(HangOnFirst), Arc::new(MockTranscriber::default()));
    session.append_user_text("first").unwrap();
    session.append_user_text("second").unwrap();
    session.settle().await;

    let senders: Vec<Sender> = session.messages().iter().map(|m| m.sender()).collect();
    assert_eq!(
        senders,
        vec![Sender::User, Sender::User, Sender::System, Sender::Assistant]
    );
    assert_eq!(session.messages()[3].text(), Some("re: second"));
}

#[tokio::test(start_paused = true)]
async fn test_transcriber_timeout_is_not_fatal() {
    let voice = VoiceConfig {
        transcription_timeout_ms: 1_500,
        ..VoiceConfig::default()
    };
    let mut session = ConversationSession::new(
        ChatConfig::default(),
        voice,
        Arc::new(MockReplyProvider::new("ok")),
        Arc::new(SilentTranscriber),
    );

    let id = session.append_voice_message(AudioRef::new("rec-9.m4a"));
    session.settle().await;

    assert!(session.get(id).unwrap().transcript().is_none());
    let notices = session
        .messages()
        .iter()
        .filter(|m| m.sender() == Sender::System)
        .count();
    assert_eq!(notices, 1);
    assert!(!session.has_pending());
}

#[tokio::test(start_paused = true)]
async fn test_transcriber_failure_appends_notice() {
    let mut session = session_with(
        ChatConfig::default(),
        Arc::new(MockReplyProvider::new("ok")),
        Arc::new(MockTranscriber::default().failing("engine crashed")),
    );
    let id = session.append_voice_message(AudioRef::new("rec-3.m4a"));
    session.settle().await;

    assert!(session.get(id).unwrap().transcript().is_none());
    assert!(session
        .messages()
        .iter()
        .any(|m| m.text() == Some("Couldn't transcribe the voice message.")));
}

#[tokio::test(start_paused = true)]
async fn test_empty_transcript_leaves_message_untouched() {
    let mut session = session_with(
        ChatConfig::default(),
        Arc::new(MockReplyProvider::new("ok")),
        Arc::new(MockTranscriber::new("   ")),
    );
    let id = session.append_voice_message(AudioRef::new("rec-4.m4a"));
    session.settle().await;

    assert!(session.get(id).unwrap().transcript().is_none());
    assert!(session.messages().iter().all(|m| m.sender() != Sender::System));
}

// =============================================================================
// Capture cancel
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_cancel_mid_capture_discards_placeholder() {
    let provider = MockReplyProvider::new("ok");
    let transcriber = MockTranscriber::new("unused");
    let mut session = session_with(
        ChatConfig::default(),
        Arc::new(provider.clone()),
        Arc::new(transcriber.clone()),
    );
    session.append_user_text("2+2=?").unwrap();
    session.settle().await;
    let before = session.snapshot();

    let mut events = session.subscribe();
    let p = session
        .begin_voice_capture(MicrophonePermission::Granted)
        .unwrap();
    assert_eq!(session.len(), before.len() + 1);

    session.cancel_voice_capture().unwrap();
    assert_eq!(session.capture_state(), CaptureState::Idle);
    assert_eq!(session.snapshot(), before);

    assert!(matches!(
        events.try_recv().unwrap(),
        SessionEvent::MessageAppended { id, .. } if id == p
    ));
    assert_eq!(
        events.try_recv().unwrap(),
        SessionEvent::MessageRemoved {
            id: p,
            index: before.len()
        }
    );

    let err = session
        .complete_voice_capture(p, AudioRef::new("rec-cancelled.m4a"))
        .unwrap_err();
    assert!(matches!(err, ChatError::NotFound(id) if id == p));
    assert!(matches!(
        session.cancel_voice_capture().unwrap_err(),
        ChatError::NotCapturing
    ));

    session.settle().await;
    assert_eq!(session.snapshot(), before);
    assert_eq!(provider.prompts(), vec!["2+2=?"]);
    assert_eq!(transcriber.calls(), 0);
}

// =============================================================================
// Reset and recovery
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_reset_during_capture_then_recover() {
    let mut session = session_with(
        ChatConfig::default(),
        Arc::new(MockReplyProvider::new("ok")),
        Arc::new(MockTranscriber::new("recovered")),
    );
    let p = session
        .begin_voice_capture(MicrophonePermission::Granted)
        .unwrap();
    session.reset();
    assert_eq!(session.capture_state(), CaptureState::Idle);

    let audio = AudioRef::new("rec-5.m4a");
    let err = session.complete_voice_capture(p, audio.clone()).unwrap_err();
    assert!(matches!(err, ChatError::NotFound(_)));

    let id = session.append_voice_message(audio);
    session.settle().await;
    assert_eq!(session.get(id).unwrap().transcript(), Some("recovered"));
    assert_eq!(session.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_reset_drops_in_flight_work() {
    let mut session = session_with(
        chat_config(ReplyOrdering::Issuance),
        Arc::new(DelayByPrompt),
        Arc::new(MockTranscriber::default().with_delay(Duration::from_millis(200))),
    );
    session.append_user_text("slow").unwrap();
    session.append_voice_message(AudioRef::new("rec-6.m4a"));
    session.reset();

    session.append_user_text("fast").unwrap();
    session.settle().await;

    assert_eq!(texts(&session), vec!["fast", "re: fast"]);
}

#[tokio::test(start_paused = true)]
async fn test_session_drop_with_work_in_flight() {
    let mut session = session_with(
        ChatConfig::default(),
        Arc::new(MockReplyProvider::new("late").with_delay(Duration::from_millis(100))),
        Arc::new(MockTranscriber::default()),
    );
    session.append_user_text("hi").unwrap();
    drop(session);

    // The reply task finishes against a closed channel without panicking.
    tokio::time::sleep(Duration::from_millis(200)).await;
}
