use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AbacusError, Result};

/// Top-level configuration for the Abacus application.
///
/// Loaded from `~/.abacus/config.toml` by default. Missing sections and
/// fields fall back to their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AbacusConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
}

impl AbacusConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AbacusConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.chat.reply_timeout_ms == 0 {
            return Err(AbacusError::Config(
                "chat.reply_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.voice.transcription_timeout_ms == 0 {
            return Err(AbacusError::Config(
                "voice.transcription_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.chat.max_message_length == 0 {
            return Err(AbacusError::Config(
                "chat.max_message_length must be greater than 0".to_string(),
            ));
        }
        if self.simulator.min_delay_ms > self.simulator.max_delay_ms {
            return Err(AbacusError::Config(format!(
                "simulator.min_delay_ms ({}) exceeds simulator.max_delay_ms ({})",
                self.simulator.min_delay_ms, self.simulator.max_delay_ms
            )));
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Order in which assistant replies are committed to the log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyOrdering {
    /// Replies appear in the order their requests were issued.
    #[default]
    Issuance,
    /// Replies appear in the order their providers finished.
    Completion,
}

impl std::str::FromStr for ReplyOrdering {
    type Err = AbacusError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "issuance" => Ok(ReplyOrdering::Issuance),
            "completion" => Ok(ReplyOrdering::Completion),
            other => Err(AbacusError::Config(format!(
                "unknown reply ordering '{}', expected 'issuance' or 'completion'",
                other
            ))),
        }
    }
}

/// Conversation session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Upper bound on a single reply request, in milliseconds.
    pub reply_timeout_ms: u64,
    /// Commit order for assistant replies.
    pub reply_ordering: ReplyOrdering,
    /// Maximum user message length in characters, after trimming.
    pub max_message_length: usize,
    /// Notice appended when a reply fails or times out.
    pub unavailable_notice: String,
    /// Notice appended when voice capture is refused for lack of permission.
    pub permission_denied_notice: String,
    /// Optional assistant greeting appended when a session starts.
    pub welcome_message: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            reply_timeout_ms: 5_000,
            reply_ordering: ReplyOrdering::Issuance,
            max_message_length: 2_000,
            unavailable_notice: "Sorry, I couldn't get a response. Please try again.".to_string(),
            permission_denied_notice:
                "Microphone access is required to record a voice message.".to_string(),
            welcome_message: None,
        }
    }
}

/// Voice capture and transcription settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Text of the placeholder shown while recording.
    pub placeholder_text: String,
    /// Prompt context sent to the reply provider for a voice message.
    pub voice_prompt: String,
    /// Prefix of the prompt context sent for an uploaded file.
    pub file_prompt_prefix: String,
    /// Upper bound on a single transcription, in milliseconds.
    pub transcription_timeout_ms: u64,
    /// Notice appended when transcription fails or times out.
    pub transcription_failed_notice: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            placeholder_text: "Listening…".to_string(),
            voice_prompt: "[voice]".to_string(),
            file_prompt_prefix: "[file] ".to_string(),
            transcription_timeout_ms: 10_000,
            transcription_failed_notice: "Couldn't transcribe the voice message.".to_string(),
        }
    }
}

/// Settings for the simulated reply provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Lower bound of the random reply delay, in milliseconds.
    pub min_delay_ms: u64,
    /// Upper bound of the random reply delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Canned replies to choose from.
    pub replies: Vec<String>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 600,
            max_delay_ms: 1_400,
            replies: [
                "Here’s a random response while the API is being wired up.",
                "Working on it... Here’s a placeholder answer.",
                "This is a simulated reply. The real API response will appear here.",
                "Got it! Responding with a temporary message.",
                "Thanks for your message — here’s a random placeholder.",
                "I’m a stub right now. Real answers coming soon.",
                "Placeholder reply: your request has been received.",
                "Simulated: I understand. Here’s something for now.",
                "Here’s a random message — API integration pending.",
                "Acknowledged. Returning a mock response.",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}
