use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Calls allowed per window for one provider. Immutable once built; the
/// consumption counters live with the limiter, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitBudget {
    key_prefix: String,
    points: u32,
    window_ms: u64,
}

impl RateLimitBudget {
    pub fn new(
        key_prefix: impl Into<String>,
        points: u32,
        window: Duration,
    ) -> Result<Self, BudgetError> {
        let key_prefix = key_prefix.into();
        if key_prefix.is_empty() {
            return Err(BudgetError::EmptyKeyPrefix);
        }
        if points == 0 {
            return Err(BudgetError::ZeroPoints);
        }
        let window_ms = u64::try_from(window.as_millis()).map_err(|_| BudgetError::ZeroWindow)?;
        if window_ms == 0 {
            return Err(BudgetError::ZeroWindow);
        }
        Ok(Self {
            key_prefix,
            points,
            window_ms,
        })
    }

    pub fn per_second(key_prefix: impl Into<String>, points: u32) -> Result<Self, BudgetError> {
        Self::new(key_prefix, points, Duration::from_secs(1))
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    pub fn points(&self) -> u32 {
        self.points
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Counter key for one consumer of this budget.
    pub fn counter_key(&self, consume_key: &str) -> String {
        format!("{}:{}", self.key_prefix, consume_key)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BudgetError {
    #[error("Rate limit key prefix must not be empty")]
    EmptyKeyPrefix,

    #[error("Rate limit budget must allow at least one point")]
    ZeroPoints,

    #[error("Rate limit window must be at least one millisecond")]
    ZeroWindow,
}
