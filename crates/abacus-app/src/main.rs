//! Abacus application binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Initialize tracing
//! 3. Build the reply provider, transcriber, and conversation session
//! 4. Run the terminal loop until `/quit` or end of input

mod cli;
mod terminal;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::broadcast;
use uuid::Uuid;

use abacus_chat::{CannedReplyProvider, ChatError, ConversationSession};
use abacus_core::config::AbacusConfig;
use abacus_core::types::{AudioRef, MessageId, MicrophonePermission};
use abacus_core::SessionEvent;
use abacus_transcribe::MockTranscriber;

use cli::CliArgs;
use terminal::Command;

/// Simulated transcription latency for recordings made in the terminal.
const TRANSCRIPTION_DELAY: Duration = Duration::from_millis(800);

/// One turn of the main loop.
enum Step {
    Input(Option<String>),
    Progress,
    Interrupted,
}

/// Print every event received since the last call.
fn drain_events(events: &mut broadcast::Receiver<SessionEvent>, session: &ConversationSession) {
    loop {
        match events.try_recv() {
            Ok(event) => {
                tracing::trace!(event = event.event_name(), "Session event");
                if let Some(line) = terminal::render_event(&event, session) {
                    println!("{}", line);
                }
            }
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event receiver lagged, redrawing");
                println!("{}", terminal::render_history(session.messages()));
            }
            Err(_) => break,
        }
    }
}

/// Terminal-side view of the voice recording toggle.
struct Recorder {
    permission: MicrophonePermission,
    placeholder: Option<MessageId>,
}

impl Recorder {
    fn toggle(&mut self, session: &mut ConversationSession) {
        match self.placeholder.take() {
            None => match session.begin_voice_capture(self.permission) {
                Ok(id) => self.placeholder = Some(id),
                Err(ChatError::PermissionDenied) => {}
                Err(e) => println!("(error) {}", e),
            },
            Some(placeholder) => {
                let audio = AudioRef::new(format!("recording-{}.m4a", Uuid::new_v4()));
                match session.complete_voice_capture(placeholder, audio.clone()) {
                    Ok(_) => {}
                    Err(ChatError::NotFound(_)) => {
                        session.append_voice_message(audio);
                    }
                    Err(e) => println!("(error) {}", e),
                }
            }
        }
    }

    fn cancel(&mut self, session: &mut ConversationSession) {
        self.placeholder = None;
        if let Err(e) = session.cancel_voice_capture() {
            println!("(error) {}", e);
        }
    }
}

/// Apply one command. Returns `false` when the user asked to leave.
fn handle_command(
    command: Command,
    session: &mut ConversationSession,
    recorder: &mut Recorder,
) -> bool {
    match command {
        Command::Say(text) => {
            if let Err(e) = session.append_user_text(&text) {
                println!("(error) {}", e);
            }
        }
        Command::Voice => recorder.toggle(session),
        Command::Cancel => recorder.cancel(session),
        Command::File(name) => {
            if session.append_file_reference(&name).is_none() {
                println!("usage: /file <name>");
            }
        }
        Command::Reset => {
            recorder.placeholder = None;
            session.reset();
        }
        Command::History => println!("{}", terminal::render_history(session.messages())),
        Command::Export(path) => {
            if path.is_empty() {
                println!("usage: /export <path>");
            } else {
                match terminal::export_history(session.messages(), Path::new(&path)) {
                    Ok(count) => println!("(exported {} messages to {})", count, path),
                    Err(e) => println!("(error) {}", e),
                }
            }
        }
        Command::Help => println!("{}", terminal::HELP),
        Command::Quit => return false,
        Command::Unknown(name) => println!("unknown command /{}, try /help", name),
    }
    true
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let loaded = AbacusConfig::load(&config_file);
    let mut config = match &loaded {
        Ok(config) => config.clone(),
        Err(_) => AbacusConfig::default(),
    };
    args.apply_overrides(&mut config)?;

    // Tracing.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .init();

    tracing::info!("Starting Abacus v{}", env!("CARGO_PKG_VERSION"));
    match loaded {
        Ok(_) => tracing::info!(path = %config_file.display(), "Configuration loaded"),
        Err(e) => tracing::warn!(
            path = %config_file.display(),
            error = %e,
            "Failed to load config, using defaults"
        ),
    }

    // Collaborators.
    let provider = Arc::new(CannedReplyProvider::from_config(&config.simulator));
    let transcriber = Arc::new(MockTranscriber::default().with_delay(TRANSCRIPTION_DELAY));
    let mut session = ConversationSession::from_config(&config, provider, transcriber);
    tracing::info!(
        ordering = ?config.chat.reply_ordering,
        reply_timeout_ms = config.chat.reply_timeout_ms,
        "Conversation session ready"
    );

    if args.demo {
        let seeded = session.preload(terminal::sample_conversation());
        tracing::info!(seeded, "Sample conversation loaded");
    }

    let mut recorder = Recorder {
        permission: if args.deny_microphone {
            MicrophonePermission::Denied
        } else {
            MicrophonePermission::Granted
        },
        placeholder: None,
    };

    println!("{}", terminal::HELP);
    if !session.is_empty() {
        println!("{}", terminal::render_history(session.messages()));
    }

    let mut events = session.subscribe();
    let mut input = terminal::spawn_line_reader(std::io::BufReader::new(std::io::stdin()));

    loop {
        let step = tokio::select! {
            line = input.recv() => Step::Input(line),
            _ = session.process_next(), if session.has_pending() => Step::Progress,
            _ = tokio::signal::ctrl_c() => Step::Interrupted,
        };

        match step {
            Step::Input(Some(line)) => {
                if !handle_command(Command::parse(&line), &mut session, &mut recorder) {
                    break;
                }
            }
            Step::Input(None) => {
                // End of input: let outstanding replies land before leaving.
                session.settle().await;
                drain_events(&mut events, &session);
                break;
            }
            Step::Progress => {}
            Step::Interrupted => break,
        }
        drain_events(&mut events, &session);
    }

    tracing::info!(messages = session.len(), "Abacus shutting down");
    Ok(())
}
