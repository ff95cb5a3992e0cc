//! Fixed-window request throttle keyed by `agent:caller`.
//!
//! Bursts straddling a window boundary are accepted; this is an approximation
//! of a sliding window, not a replacement for one.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::domain::AgentId;
use crate::obs;

/// Window size and request budget.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests allowed per window.
    pub max_requests: u32,
    /// Window length (milliseconds).
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window_ms: 60_000,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// The caller exhausted its budget for the current window.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("rate limit of {limit} requests exceeded for {agent} (retry in {retry_after:?})")]
pub struct RateLimited {
    pub agent: AgentId,
    pub limit: u32,
    pub retry_after: Duration,
}

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    count: u32,
    reset_at: Instant,
}

/// Per (agent, caller) fixed-window counters.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<String, RateWindow>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn windows(&self) -> MutexGuard<'_, HashMap<String, RateWindow>> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count one request from `caller_id` against `agent`.
    pub fn check(&self, agent: AgentId, caller_id: &str) -> Result<(), RateLimited> {
        let now = Instant::now();
        let key = format!("{agent}:{caller_id}");
        let fresh = RateWindow {
            count: 0,
            reset_at: now + self.config.window(),
        };

        let mut windows = self.windows();
        let window = windows.entry(key).or_insert(fresh);
        if now > window.reset_at {
            *window = fresh;
        }

        if window.count >= self.config.max_requests {
            let retry_after = window.reset_at - now;
            drop(windows);
            obs::emit_rate_limit_hit(agent.as_str(), caller_id, self.config.max_requests);
            return Err(RateLimited {
                agent,
                limit: self.config.max_requests,
                retry_after,
            });
        }
        window.count += 1;
        Ok(())
    }

    /// Drop every window.
    pub fn reset(&self) {
        self.windows().clear();
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
