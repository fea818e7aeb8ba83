//! In-process record store.

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::trace;

use super::{decode_stored, RecordStore, StoreError};
use crate::limiter::{ClientKey, LimitRecord};

/// A record store held in process memory.
///
/// Records are kept in their encoded text form, exactly as a remote store
/// would hold them. Suitable for tests and single-instance deployments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<String, String>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw text under a key, bypassing encoding.
    pub fn insert_raw(&self, key: &ClientKey, raw: impl Into<String>) {
        self.records.insert(key.to_string(), raw.into());
    }

    /// Get the number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get(&self, key: &ClientKey) -> Result<Option<LimitRecord>, StoreError> {
        let raw = match self.records.get(key.as_str()) {
            Some(entry) => entry.value().clone(),
            None => return Ok(None),
        };
        Ok(decode_stored(key, &raw))
    }

    async fn set(&self, key: &ClientKey, record: &LimitRecord) -> Result<(), StoreError> {
        trace!(key = %key, "Storing limit record");
        self.records.insert(key.to_string(), record.encode()?);
        Ok(())
    }
}
