//! Line-oriented terminal front end.
//!
//! Reads input lines, parses them into commands, and renders log entries as
//! they change.

use std::io::BufRead;
use std::path::Path;

use abacus_chat::ConversationSession;
use abacus_core::error::Result;
use abacus_core::types::{Message, MessageKind, Sender};
use abacus_core::SessionEvent;
use chrono::Local;
use tokio::sync::mpsc;

/// Forward each line of `reader` over a channel from a dedicated OS thread.
///
/// The thread is detached, so runtime shutdown never waits on a blocked
/// read. It exits at end of input or a read error. After the receiver is
/// dropped it exits on the next line.
pub fn spawn_line_reader<R>(reader: R) -> mpsc::Receiver<String>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(32);
    std::thread::spawn(move || {
        for line in reader.lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read input");
                    break;
                }
            }
        }
    });
    rx
}

/// A parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Plain text sent as a user message.
    Say(String),
    /// Start or stop a voice recording.
    Voice,
    /// Abandon the current recording.
    Cancel,
    /// Attach a file by name.
    File(String),
    Reset,
    History,
    /// Write the log as JSON to a path.
    Export(String),
    Help,
    Quit,
    /// A slash command we do not recognize.
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('/') else {
            return Command::Say(line.to_string());
        };
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        match name {
            "voice" => Command::Voice,
            "cancel" => Command::Cancel,
            "file" => Command::File(arg.to_string()),
            "reset" => Command::Reset,
            "history" => Command::History,
            "export" => Command::Export(arg.to_string()),
            "help" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => Command::Unknown(other.to_string()),
        }
    }
}

pub const HELP: &str = "\
Commands:
  <text>          send a message
  /voice          start recording, or stop and send it
  /cancel         discard the current recording
  /file <name>    attach a file
  /reset          clear the conversation
  /history        show the whole conversation
  /export <path>  save the conversation as JSON
  /quit           leave";

/// One display line for a message.
pub fn render_message(message: &Message) -> String {
    let time = message.created_at().with_timezone(&Local).format("%H:%M");
    let who = match message.sender() {
        Sender::User => "you",
        Sender::Assistant => "abacus",
        Sender::System => "!",
    };
    let body = match message.kind() {
        MessageKind::Text => message.text().unwrap_or_default().to_string(),
        MessageKind::ImageCard => "[scanned image]".to_string(),
        MessageKind::Voice => {
            let clip = message.audio().map(|a| a.as_str()).unwrap_or_default();
            match message.transcript() {
                Some(transcript) => format!("[voice {}] {}", clip, transcript),
                None => format!("[voice {}] (transcribing)", clip),
            }
        }
    };
    format!("{} {:>6} | {}", time, who, body)
}

/// Text to print for a session event, if any.
pub fn render_event(event: &SessionEvent, session: &ConversationSession) -> Option<String> {
    match event {
        SessionEvent::MessageAppended { id, .. } => session.get(*id).map(render_message),
        SessionEvent::MessageReplaced { id, .. } => session
            .get(*id)
            .map(|m| format!("{} (recorded)", render_message(m))),
        SessionEvent::MessageRemoved { .. } => Some("(recording discarded)".to_string()),
        SessionEvent::TranscriptResolved { id, .. } => session.get(*id).map(render_message),
        SessionEvent::SessionReset { cleared } => {
            Some(format!("(conversation cleared, {} messages)", cleared))
        }
        _ => None,
    }
}

/// The whole log, one line per message.
pub fn render_history(messages: &[Message]) -> String {
    if messages.is_empty() {
        return "(no messages)".to_string();
    }
    messages
        .iter()
        .map(render_message)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Write the log to `path` as pretty-printed JSON. Returns the number of
/// messages written.
pub fn export_history(messages: &[Message], path: &Path) -> Result<usize> {
    let json = serde_json::to_string_pretty(messages)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, json)?;
    tracing::info!(path = %path.display(), count = messages.len(), "Conversation exported");
    Ok(messages.len())
}

/// The conversation shown on first launch in demo mode.
pub fn sample_conversation() -> Vec<Message> {
    vec![
        Message::user_text("Hello ! there"),
        Message::assistant_text("Hello there! How may I assist you today?"),
        Message::user_text(
            "I want to learn how to solve a cubic equation? 1. Linear Equations:\n\n\
             • Solve for x: 3x + 5 = 14\n  • Solution: x = 3\n\
             • Solve for y: 2(y + 3) = 20\n  • Solution: y = 7\n\
             • Solve for x: 4x + 7 = 2x + 12\n  • Solution: x = 2.5",
        ),
        Message::image_card(Sender::Assistant),
    ]
}
