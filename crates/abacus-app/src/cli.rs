//! CLI argument definitions for the Abacus application.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

use abacus_core::config::{AbacusConfig, ReplyOrdering};
use abacus_core::error::Result;

/// Abacus: a math-tutoring chat session in your terminal.
#[derive(Parser, Debug)]
#[command(name = "abacus", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Reply commit order: "issuance" or "completion".
    #[arg(long = "ordering")]
    pub ordering: Option<ReplyOrdering>,

    /// Reply timeout in milliseconds.
    #[arg(long = "reply-timeout-ms")]
    pub reply_timeout_ms: Option<u64>,

    /// Start with the sample conversation.
    #[arg(long = "demo")]
    pub demo: bool,

    /// Behave as if microphone access was refused.
    #[arg(long = "deny-microphone")]
    pub deny_microphone: bool,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > ABACUS_CONFIG env var > platform default (~/.abacus/config.toml).
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("ABACUS_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Apply command-line overrides on top of the loaded configuration and
    /// re-validate the result.
    pub fn apply_overrides(&self, config: &mut AbacusConfig) -> Result<()> {
        if let Some(ref level) = self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(ordering) = self.ordering {
            config.chat.reply_ordering = ordering;
        }
        if let Some(timeout) = self.reply_timeout_ms {
            config.chat.reply_timeout_ms = timeout;
        }
        config.validate()
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".abacus").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".abacus").join("config.toml");
    }
    PathBuf::from("config.toml")
}
