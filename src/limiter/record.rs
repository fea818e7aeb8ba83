//! The persisted limiting record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Limiting state of one client on one route.
///
/// A record is either in free-attempt mode (`delay_seconds == 0`, quota in
/// `attempts_left`) or in backoff mode (`delay_seconds > 0` with
/// `next_request_time` set). A record with neither is the transient state
/// left behind when the last free attempt was spent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitRecord {
    /// Current backoff in seconds, 0 while in free-attempt mode
    #[serde(rename = "delay")]
    pub delay_seconds: u64,

    /// Free attempts remaining in the current window
    pub attempts_left: u32,

    /// Earliest instant a backed-off client may proceed
    #[serde(default, with = "timestamp", skip_serializing_if = "Option::is_none")]
    pub next_request_time: Option<DateTime<Utc>>,

    /// End of the current free-attempt window
    #[serde(default, with = "timestamp", skip_serializing_if = "Option::is_none")]
    pub free_attempts_unlock_time: Option<DateTime<Utc>>,
}

impl LimitRecord {
    /// A record in free-attempt mode.
    pub fn free(attempts_left: u32, unlock_time: DateTime<Utc>) -> Self {
        Self {
            delay_seconds: 0,
            attempts_left,
            next_request_time: None,
            free_attempts_unlock_time: Some(unlock_time),
        }
    }

    /// A record in backoff mode.
    pub fn backoff(delay_seconds: u64, next_request_time: DateTime<Utc>) -> Self {
        Self {
            delay_seconds,
            attempts_left: 0,
            next_request_time: Some(next_request_time),
            free_attempts_unlock_time: None,
        }
    }

    /// Encode the record as compact JSON for storage.
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Decode a stored record, returning `None` for anything unparseable.
    pub fn decode(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

/// RFC 3339 timestamps with millisecond precision and a `Z` suffix.
mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(time) => serializer.serialize_str(&time.to_rfc3339_opts(SecondsFormat::Millis, true)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(serde::de::Error::custom)
        })
        .transpose()
    }
}
