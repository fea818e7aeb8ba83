//! Record store adapters.
//!
//! The limiter persists one [`LimitRecord`] per [`ClientKey`]. Stores give no
//! transactional guarantees: a read followed by a write from two concurrent
//! requests may lose one of the updates.

mod memory;
mod redis;

use async_trait::async_trait;
use thiserror::Error;

use crate::limiter::{ClientKey, LimitRecord};

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// Errors that can occur talking to a record store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connection failed: {0}")]
    Connection(String),
    #[error("store operation failed: {0}")]
    Operation(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Operation(format!("record encoding: {}", err))
    }
}

/// Trait for record store implementations.
///
/// Implementations treat stored text that does not decode as a missing record.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch the record stored under `key`.
    async fn get(&self, key: &ClientKey) -> Result<Option<LimitRecord>, StoreError>;

    /// Store `record` under `key`, replacing any previous value.
    async fn set(&self, key: &ClientKey, record: &LimitRecord) -> Result<(), StoreError>;
}

/// Decode stored text, logging and discarding anything unreadable.
pub(crate) fn decode_stored(key: &ClientKey, raw: &str) -> Option<LimitRecord> {
    let record = LimitRecord::decode(raw);
    if record.is_none() {
        tracing::warn!(key = %key, raw = %raw, "Discarding unreadable limit record");
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_failure_is_operation_error() {
        let err = serde_json::from_str::<u32>("not a number").unwrap_err();
        let store_err = StoreError::from(err);
        assert!(matches!(store_err, StoreError::Operation(_)));
        assert!(store_err.to_string().contains("record encoding"));
    }

    #[test]
    fn test_decode_stored_discards_garbage() {
        let key = ClientKey::derive("test", "login", "10.0.0.1");
        assert_eq!(decode_stored(&key, "{\"delay\":"), None);
    }
}
