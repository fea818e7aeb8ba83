//! Limiter settings: the backoff schedule and free-attempt quota.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, TurnstileError};

/// Configuration for the backoff limiter.
///
/// Constructed once at startup and shared read-only by every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Escalating backoff schedule in seconds. An empty schedule disables limiting.
    #[serde(default = "default_delays")]
    pub delays: Vec<u64>,

    /// Requests allowed without backoff inside one unlock window
    #[serde(default = "default_free_attempts")]
    pub free_attempts: u32,

    /// Width of the rolling free-attempt window in seconds
    #[serde(default = "default_free_attempts_unlock_delay")]
    pub free_attempts_unlock_delay: u64,

    /// Seconds added to the delay once the schedule's ceiling is reached (0 clamps instead)
    #[serde(default)]
    pub increase_by_limit_reached: u64,

    /// Namespace prepended to every store key
    #[serde(default = "default_store_key_prefix")]
    pub store_key_prefix: String,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            delays: default_delays(),
            free_attempts: default_free_attempts(),
            free_attempts_unlock_delay: default_free_attempts_unlock_delay(),
            increase_by_limit_reached: 0,
            store_key_prefix: default_store_key_prefix(),
        }
    }
}

fn default_delays() -> Vec<u64> {
    vec![10, 20, 30, 40, 50, 60]
}

fn default_free_attempts() -> u32 {
    3
}

fn default_free_attempts_unlock_delay() -> u64 {
    10
}

fn default_store_key_prefix() -> String {
    "ipLimiter".to_string()
}

impl LimiterConfig {
    /// Whether limiting is switched off entirely.
    pub fn is_disabled(&self) -> bool {
        self.delays.is_empty()
    }

    /// Validate the settings.
    ///
    /// Zero entries in the schedule are rejected. A schedule that is not
    /// ascending is accepted, since escalation only follows list order.
    pub fn validate(&self) -> Result<()> {
        if let Some(position) = self.delays.iter().position(|&d| d == 0) {
            return Err(TurnstileError::Config(format!(
                "limiter.delays[{}] must be a positive number of seconds",
                position
            )));
        }

        if self.delays.windows(2).any(|pair| pair[0] > pair[1]) {
            warn!(delays = ?self.delays, "Backoff schedule is not ascending");
        }

        Ok(())
    }
}
