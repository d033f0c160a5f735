use async_trait::async_trait;
use media_ingestion_domain::RateLimitBudget;
use rand::Rng;
use shaku::Interface;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

const MIN_RETRY_DELAY_MS: u64 = 10;
const MAX_JITTER_MS: u64 = 25;

/// Shared per-provider call budget.
///
/// Every caller consuming under the same key draws from the same window, so
/// granted consumptions per window never exceed the budget's points.
#[async_trait]
pub trait RateLimiter: Interface {
    async fn consume(&self, consume_key: &str) -> Result<(), RateLimiterError>;

    fn budget(&self) -> &RateLimitBudget;
}

/// Result of a single check-and-increment against a window counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Granted,
    Denied { ms_before_next: u64 },
}

/// What a caller does when its key is out of points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    FailFast,
    Block { max_wait: Duration },
}

impl Default for WaitPolicy {
    fn default() -> Self {
        WaitPolicy::Block {
            max_wait: Duration::from_secs(30),
        }
    }
}

impl WaitPolicy {
    /// Drives `attempt` until it is granted or the policy gives up.
    pub async fn acquire<F, Fut>(&self, key: &str, mut attempt: F) -> Result<(), RateLimiterError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<RateDecision, RateLimiterError>>,
    {
        let mut waited = Duration::ZERO;
        loop {
            let ms_before_next = match attempt().await? {
                RateDecision::Granted => return Ok(()),
                RateDecision::Denied { ms_before_next } => ms_before_next,
            };

            let exceeded = || RateLimiterError::RateLimitExceeded {
                key: key.to_string(),
                retry_after_ms: ms_before_next,
            };

            let max_wait = match self {
                WaitPolicy::FailFast => return Err(exceeded()),
                WaitPolicy::Block { max_wait } => *max_wait,
            };

            let delay = Duration::from_millis(ms_before_next.max(MIN_RETRY_DELAY_MS) + jitter_ms());
            if waited + delay > max_wait {
                return Err(exceeded());
            }

            debug!("Rate limit hit for {}. Retrying in {:?}", key, delay);
            tokio::time::sleep(delay).await;
            waited += delay;
        }
    }
}

fn jitter_ms() -> u64 {
    rand::rng().random_range(0..=MAX_JITTER_MS)
}

#[derive(Debug, thiserror::Error)]
pub enum RateLimiterError {
    #[error("Rate limit exceeded for {key}, retry after {retry_after_ms}ms")]
    RateLimitExceeded { key: String, retry_after_ms: u64 },

    #[error("Failed to connect to Redis: {0}")]
    ConnectionError(String),

    #[error("Failed to execute rate limiting script: {0}")]
    ScriptError(String),

    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}
