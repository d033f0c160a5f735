use async_trait::async_trait;
use media_ingestion_application::{RateDecision, RateLimiter, RateLimiterError, WaitPolicy};
use media_ingestion_domain::RateLimitBudget;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;

struct Window {
    started: Instant,
    used: u32,
}

/// Process-local fixed-window limiter.
pub struct InMemoryRateLimiter {
    budget: RateLimitBudget,
    policy: WaitPolicy,
    windows: Mutex<HashMap<String, Window>>,
}

impl InMemoryRateLimiter {
    pub fn new(budget: RateLimitBudget, policy: WaitPolicy) -> Self {
        Self {
            budget,
            policy,
            windows: Mutex::new(HashMap::new()),
        }
    }

    async fn try_consume(&self, key: &str) -> RateDecision {
        let now = Instant::now();
        let window_len = self.budget.window();
        let mut windows = self.windows.lock().await;
        let window = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            used: 0,
        });

        let elapsed = now.duration_since(window.started);
        if elapsed >= window_len {
            window.started = now;
            window.used = 0;
        }

        if window.used < self.budget.points() {
            window.used += 1;
            RateDecision::Granted
        } else {
            let remaining = window_len.saturating_sub(now.duration_since(window.started));
            RateDecision::Denied {
                ms_before_next: remaining.as_millis() as u64,
            }
        }
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn consume(&self, consume_key: &str) -> Result<(), RateLimiterError> {
        let key = self.budget.counter_key(consume_key);
        let key_ref = &key;
        let this = self;
        self.policy
            .acquire(&key, move || async move { Ok(this.try_consume(key_ref).await) })
            .await
    }

    fn budget(&self) -> &RateLimitBudget {
        &self.budget
    }
}
