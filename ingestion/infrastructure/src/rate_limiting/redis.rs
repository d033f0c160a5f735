use async_trait::async_trait;
use lazy_static::lazy_static;
use media_ingestion_application::{RateDecision, RateLimiter, RateLimiterError, WaitPolicy};
use media_ingestion_domain::RateLimitBudget;
use redis::Script;
use std::sync::Arc;

use crate::connection::RedisConnection;

lazy_static! {
    static ref LUA_SCRIPT: Script = {
        const SCRIPT_SOURCE: &str = include_str!("limiter.lua");
        Script::new(SCRIPT_SOURCE)
    };
}

/// Fixed-window limiter whose counters live in Redis, shared by every
/// process pointed at the same instance.
pub struct RedisRateLimiter {
    redis: Arc<dyn RedisConnection>,
    budget: RateLimitBudget,
    policy: WaitPolicy,
}

impl RedisRateLimiter {
    pub fn new(redis: Arc<dyn RedisConnection>, budget: RateLimitBudget, policy: WaitPolicy) -> Self {
        Self {
            redis,
            budget,
            policy,
        }
    }

    pub fn redis_key(&self, consume_key: &str) -> String {
        format!("rate_limit:{}", self.budget.counter_key(consume_key))
    }

    async fn try_consume(&self, key: &str) -> Result<RateDecision, RateLimiterError> {
        let mut conn = self
            .redis
            .get_connection()
            .await
            .map_err(|e| RateLimiterError::ConnectionError(e.to_string()))?;

        let mut script_invocation = LUA_SCRIPT.prepare_invoke();
        script_invocation
            .key(key)
            .arg(self.budget.points())
            .arg(self.budget.window_ms());

        let result: Result<(i64, i64), _> = script_invocation.invoke_async(&mut conn).await;

        match result {
            Ok((1, _)) => Ok(RateDecision::Granted),
            Ok((0, ms_before_next)) => Ok(RateDecision::Denied {
                ms_before_next: ms_before_next.max(0) as u64,
            }),
            Ok((other, _)) => Err(RateLimiterError::Unexpected(format!(
                "Lua script returned an unexpected value: {}",
                other
            ))),
            Err(e) => Err(RateLimiterError::ScriptError(e.to_string())),
        }
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn consume(&self, consume_key: &str) -> Result<(), RateLimiterError> {
        let key = self.redis_key(consume_key);
        let key_ref = &key;
        let this = self;
        self.policy
            .acquire(&key, move || async move { this.try_consume(key_ref).await })
            .await
    }

    fn budget(&self) -> &RateLimitBudget {
        &self.budget
    }
}
