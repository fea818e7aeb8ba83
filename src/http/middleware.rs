//! Admission middleware for axum.
//!
//! Every request passes through the [`Gate`]: the client address and the
//! normalized path select the record, and the engine's verdict either lets the
//! request continue (with the new record attached as an [`Admitted`]
//! extension) or answers `429 Too Many Requests` with the record as body.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};

use crate::config::FailurePolicy;
use crate::gate::Gate;
use crate::limiter::{Decision, LimitRecord};

/// Identity used when no client address can be determined.
const UNKNOWN_CLIENT: &str = "unknown";

/// Shared state for [`admission_middleware`].
#[derive(Clone)]
pub struct AdmissionState {
    /// The admission gate
    pub gate: Arc<Gate>,
    /// What to do when the store cannot be reached
    pub failure_policy: FailurePolicy,
    /// Honour `X-Forwarded-For` and `X-Real-IP`
    pub trust_forwarded_headers: bool,
}

impl AdmissionState {
    /// Create middleware state with the default failure policy and forwarded headers trusted.
    pub fn new(gate: Arc<Gate>) -> Self {
        Self {
            gate,
            failure_policy: FailurePolicy::default(),
            trust_forwarded_headers: true,
        }
    }

    /// Set the failure policy.
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Set whether forwarded headers are trusted.
    pub fn with_trust_forwarded_headers(mut self, trust: bool) -> Self {
        self.trust_forwarded_headers = trust;
        self
    }
}

/// The limiting record of an admitted request, available to downstream handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admitted(pub LimitRecord);

/// Admission middleware.
///
/// Store failures are never treated as a verdict: they are logged and the
/// configured [`FailurePolicy`] decides whether the request continues.
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn admission_middleware(
    State(state): State<AdmissionState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    mut request: Request,
    next: Next,
) -> Response {
    let client_ip = extract_client_ip(
        &request,
        connect_info.as_ref(),
        state.trust_forwarded_headers,
    )
    .unwrap_or_else(|| UNKNOWN_CLIENT.to_string());

    let checked = state.gate.check(&client_ip, request.uri().path()).await;

    let admission = match checked {
        Ok(admission) => admission,
        Err(e) => {
            warn!(client = %client_ip, error = %e, "Admission store unavailable");
            return match state.failure_policy {
                FailurePolicy::Open => next.run(request).await,
                FailurePolicy::Closed => unavailable_response(),
            };
        }
    };

    match admission.decision {
        Decision::Disabled => next.run(request).await,
        Decision::Allow(record) => {
            request.extensions_mut().insert(Admitted(record));
            next.run(request).await
        }
        Decision::Deny(record) => {
            debug!(
                key = %admission.key,
                delay = record.delay_seconds,
                "Request rejected"
            );
            rejection_response(record, Utc::now())
        }
    }
}

/// Extract the client address, checking forwarded headers first when trusted.
///
/// Order of precedence:
/// 1. X-Forwarded-For header (first address in list)
/// 2. X-Real-IP header
/// 3. ConnectInfo socket address
fn extract_client_ip<B>(
    request: &axum::http::Request<B>,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
    trust_forwarded: bool,
) -> Option<String> {
    if trust_forwarded {
        let forwarded = request
            .headers()
            .get("X-Forwarded-For")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());
        if let Some(ip) = forwarded {
            return Some(ip.to_string());
        }

        let real_ip = request
            .headers()
            .get("X-Real-IP")
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());
        if let Some(ip) = real_ip {
            return Some(ip.to_string());
        }
    }

    connect_info.map(|ci| ci.0.ip().to_string())
}

/// Whole seconds until `next_request_time`, rounded up and at least 1.
fn retry_after_secs(record: &LimitRecord, now: DateTime<Utc>) -> u64 {
    let millis = record
        .next_request_time
        .map_or(0, |t| (t - now).num_milliseconds());
    let secs = millis.saturating_add(999) / 1000;
    secs.max(1) as u64
}

/// Create a 429 Too Many Requests response carrying the record.
fn rejection_response(record: LimitRecord, now: DateTime<Utc>) -> Response {
    let retry_after = retry_after_secs(&record, now);
    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(record)).into_response();
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
    response
}

/// Create a 503 response for requests that could not be checked.
fn unavailable_response() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(serde_json::json!({
            "error": "Admission check unavailable",
            "code": "ADMISSION_UNAVAILABLE"
        })),
    )
        .into_response()
}
