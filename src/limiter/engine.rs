//! Backoff decision engine.
//!
//! The engine is a pure function of the stored record, the limiter settings
//! and the current time. It performs no I/O; persisting the returned record
//! is the caller's job.

use chrono::{DateTime, Duration, Utc};
use tracing::trace;

use super::record::LimitRecord;
use super::settings::LimiterConfig;
use crate::error::Result;

/// Outcome of a single admission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny,
}

/// A verdict together with the record to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Limiting is switched off; nothing to persist.
    Disabled,
    /// The request proceeds.
    Allow(LimitRecord),
    /// The request is rejected; the record is also the rejection payload.
    Deny(LimitRecord),
}

impl Decision {
    /// The verdict carried by this decision.
    pub fn verdict(&self) -> Verdict {
        match self {
            Decision::Disabled | Decision::Allow(_) => Verdict::Allow,
            Decision::Deny(_) => Verdict::Deny,
        }
    }

    /// The record to persist, if any.
    pub fn record(&self) -> Option<&LimitRecord> {
        match self {
            Decision::Disabled => None,
            Decision::Allow(record) | Decision::Deny(record) => Some(record),
        }
    }
}

/// The backoff rate limiter.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: LimiterConfig,
}

impl RateLimiter {
    /// Create a limiter, rejecting settings that fail validation.
    pub fn new(config: LimiterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The limiter settings.
    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Decide the fate of a request given the stored record and the current time.
    pub fn decide(&self, record: Option<&LimitRecord>, now: DateTime<Utc>) -> Decision {
        if self.config.is_disabled() {
            return Decision::Disabled;
        }

        let Some(record) = record else {
            trace!("No stored record, starting free attempts");
            return Decision::Allow(self.next_free(self.config.free_attempts, 0, now));
        };

        // Free quota still active: spend one, or refill when the window has elapsed.
        if record.attempts_left > 0 {
            let diff = seconds_until(record.free_attempts_unlock_time, now);
            let attempts_left = if diff > 0 {
                record.attempts_left
            } else {
                self.config.free_attempts
            };
            return Decision::Allow(self.next_free(attempts_left, 0, now));
        }

        match record.next_request_time {
            Some(next_request_time) => {
                if seconds_until(Some(next_request_time), now) < 0 {
                    trace!("Backoff elapsed, resetting free attempts");
                    return Decision::Allow(self.next_free(self.config.free_attempts, 0, now));
                }
            }
            // Quota spent but no backoff scheduled yet: this request passes and
            // the first backoff stage applies to the next one.
            None => return Decision::Allow(self.next_free(0, 0, now)),
        }

        Decision::Deny(self.escalate(record, now))
    }

    /// Compute the record for a request still inside an active backoff window.
    fn escalate(&self, record: &LimitRecord, now: DateTime<Utc>) -> LimitRecord {
        let delays = &self.config.delays;
        let last = delays.len() - 1;
        let index = delays.iter().position(|&d| d == record.delay_seconds);
        let at_ceiling = index.map_or(true, |i| i == last);

        if at_ceiling && self.config.increase_by_limit_reached > 0 {
            let delay = record
                .delay_seconds
                .saturating_add(self.config.increase_by_limit_reached);
            trace!(delay, "Backoff ceiling reached, increasing delay");
            return LimitRecord::backoff(delay, offset(now, delay));
        }

        let next_index = match index {
            Some(i) if i == last => i,
            Some(i) => i + 1,
            None => 0,
        };
        self.next_free(0, next_index, now)
    }

    /// Spend a free attempt if any are left, otherwise schedule the backoff at `index`.
    fn next_free(&self, attempts_left: u32, index: usize, now: DateTime<Utc>) -> LimitRecord {
        if attempts_left > 0 {
            LimitRecord::free(
                attempts_left - 1,
                offset(now, self.config.free_attempts_unlock_delay),
            )
        } else {
            let delay = self.config.delays[index];
            LimitRecord::backoff(delay, offset(now, delay))
        }
    }
}

/// Whole seconds from `now` until `time`, truncated toward zero. A missing time counts as now.
fn seconds_until(time: Option<DateTime<Utc>>, now: DateTime<Utc>) -> i64 {
    time.map_or(0, |t| (t - now).num_seconds())
}

/// `now` plus `secs` seconds, saturating at the latest representable instant.
fn offset(now: DateTime<Utc>, secs: u64) -> DateTime<Utc> {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
