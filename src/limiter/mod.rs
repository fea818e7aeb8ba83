//! Backoff limiting logic and the persisted record model.

mod engine;
mod key;
mod record;
mod settings;

pub use engine::{Decision, RateLimiter, Verdict};
pub use key::{normalize_path, ClientKey};
pub use record::LimitRecord;
pub use settings::LimiterConfig;
