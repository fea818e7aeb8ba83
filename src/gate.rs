//! Admission gate: ties key derivation, the record store and the engine together.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use crate::limiter::{normalize_path, ClientKey, Decision, RateLimiter};
use crate::store::{RecordStore, StoreError};

/// Result of running one request through the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    /// The key the record was read from and written to
    pub key: ClientKey,
    /// The engine's decision
    pub decision: Decision,
}

/// Runs the read-decide-write cycle for a request.
///
/// The read and the write are separate store calls with no lock in between,
/// so concurrent requests from the same client may overwrite each other's
/// record. The later write wins.
pub struct Gate {
    limiter: RateLimiter,
    store: Arc<dyn RecordStore>,
}

impl Gate {
    /// Create a gate over the given store.
    pub fn new(limiter: RateLimiter, store: Arc<dyn RecordStore>) -> Self {
        Self { limiter, store }
    }

    /// Check a request from `identity` to `path` at the current time.
    pub async fn check(&self, identity: &str, path: &str) -> Result<Admission, StoreError> {
        self.check_at(identity, path, Utc::now()).await
    }

    /// Check a request from `identity` to `path` at the given time.
    ///
    /// When limiting is disabled the store is never touched. Store failures
    /// are returned to the caller unchanged.
    pub async fn check_at(
        &self,
        identity: &str,
        path: &str,
        now: DateTime<Utc>,
    ) -> Result<Admission, StoreError> {
        let config = self.limiter.config();
        let key = ClientKey::derive(&config.store_key_prefix, normalize_path(path), identity);

        if config.is_disabled() {
            trace!(key = %key, "Limiting disabled, skipping store");
            return Ok(Admission {
                key,
                decision: Decision::Disabled,
            });
        }

        let stored = self.store.get(&key).await?;
        let decision = self.limiter.decide(stored.as_ref(), now);

        if let Some(record) = decision.record() {
            self.store.set(&key, record).await?;
        }

        debug!(
            key = %key,
            verdict = ?decision.verdict(),
            record = ?decision.record(),
            "Admission decided"
        );

        Ok(Admission { key, decision })
    }
}

impl std::fmt::Debug for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gate")
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}
