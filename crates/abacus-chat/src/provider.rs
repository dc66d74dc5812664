//! Reply providers: where assistant messages come from.
//!
//! `ReplyProvider` is the seam a network-backed backend plugs into. The
//! crate ships the simulated provider used while no backend exists and a
//! deterministic double for tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::IndexedRandom;
use rand::Rng;

use abacus_core::config::SimulatorConfig;
use abacus_core::error::AbacusError;

/// Reply used when the canned list is empty.
const FALLBACK_REPLY: &str = "Okay.";

/// Produces assistant reply content for a prompt.
///
/// Implementations may take any finite time and may fail; the session bounds
/// every call with a timeout and turns failures into a visible notice.
#[async_trait]
pub trait ReplyProvider: Send + Sync {
    async fn generate_reply(&self, prompt: &str) -> Result<String, AbacusError>;
}

// =============================================================================
// CannedReplyProvider
// =============================================================================

/// Simulated provider: a random canned reply after a random delay.
#[derive(Debug, Clone)]
pub struct CannedReplyProvider {
    replies: Vec<String>,
    min_delay_ms: u64,
    max_delay_ms: u64,
}

impl CannedReplyProvider {
    /// Create a provider from explicit replies and a delay window.
    ///
    /// Bounds given in the wrong order are swapped.
    pub fn new(replies: Vec<String>, min_delay_ms: u64, max_delay_ms: u64) -> Self {
        let (min_delay_ms, max_delay_ms) = if min_delay_ms <= max_delay_ms {
            (min_delay_ms, max_delay_ms)
        } else {
            (max_delay_ms, min_delay_ms)
        };
        Self {
            replies,
            min_delay_ms,
            max_delay_ms,
        }
    }

    pub fn from_config(config: &SimulatorConfig) -> Self {
        Self::new(
            config.replies.clone(),
            config.min_delay_ms,
            config.max_delay_ms,
        )
    }

    /// Pick the delay and reply for one request.
    fn draw(&self) -> (Duration, String) {
        let mut rng = rand::rng();
        let delay_ms = rng.random_range(self.min_delay_ms..=self.max_delay_ms);
        let reply = self
            .replies
            .choose(&mut rng)
            .cloned()
            .unwrap_or_else(|| FALLBACK_REPLY.to_string());
        (Duration::from_millis(delay_ms), reply)
    }
}

impl Default for CannedReplyProvider {
    fn default() -> Self {
        Self::from_config(&SimulatorConfig::default())
    }
}

#[async_trait]
impl ReplyProvider for CannedReplyProvider {
    async fn generate_reply(&self, prompt: &str) -> Result<String, AbacusError> {
        let (delay, reply) = self.draw();
        tracing::debug!(
            prompt_len = prompt.len(),
            delay_ms = delay.as_millis() as u64,
            "Simulating assistant reply"
        );
        tokio::time::sleep(delay).await;
        Ok(reply)
    }
}

// =============================================================================
// MockReplyProvider
// =============================================================================

#[derive(Debug, Clone)]
enum MockBehavior {
    Reply(String),
    Fail(String),
    Hang,
}

/// Deterministic provider for tests and offline runs.
///
/// Returns a fixed reply (optionally after a delay), fails every call, or
/// never answers. Records every prompt it receives.
#[derive(Debug, Clone)]
pub struct MockReplyProvider {
    behavior: MockBehavior,
    delay: Option<Duration>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockReplyProvider {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            behavior: MockBehavior::Reply(reply.into()),
            delay: None,
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A provider whose every call fails with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            behavior: MockBehavior::Fail(reason.into()),
            ..Self::new("")
        }
    }

    /// A provider that never completes.
    pub fn hanging() -> Self {
        Self {
            behavior: MockBehavior::Hang,
            ..Self::new("")
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ReplyProvider for MockReplyProvider {
    async fn generate_reply(&self, prompt: &str) -> Result<String, AbacusError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.behavior {
            MockBehavior::Reply(reply) => Ok(reply.clone()),
            MockBehavior::Fail(reason) => Err(AbacusError::Provider(reason.clone())),
            MockBehavior::Hang => std::future::pending().await,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
