//! Turnstile - Per-client Admission Control
//!
//! This crate decides, for each (client, route) pair, whether a request
//! proceeds or is rejected with a retry delay. Clients get a small quota of
//! free attempts inside a rolling window; beyond it every request that arrives
//! while a backoff is active escalates the delay along a configured schedule.
//! State is persisted per client and route in a pluggable record store.

pub mod config;
pub mod error;
pub mod gate;
pub mod http;
pub mod limiter;
pub mod store;
