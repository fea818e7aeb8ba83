//! Router for running Turnstile as a standalone admission check.
//!
//! A front proxy forwards each original request (or an authorization
//! sub-request carrying the client address in `X-Forwarded-For`). Any path
//! other than `/healthz` is subject to admission; admitted requests receive
//! their limiting record as JSON, rejected ones a 429.

use axum::{
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};

use super::middleware::{admission_middleware, AdmissionState, Admitted};

/// Build the service router.
pub fn router(state: AdmissionState) -> Router {
    Router::new()
        .fallback(admitted)
        .layer(middleware::from_fn_with_state(state, admission_middleware))
        .route("/healthz", get(healthz))
}

async fn healthz() -> &'static str {
    "ok"
}

/// Echo the record of an admitted request; 204 when limiting did not produce one.
async fn admitted(admitted: Option<Extension<Admitted>>) -> Response {
    match admitted {
        Some(Extension(Admitted(record))) => (StatusCode::OK, Json(record)).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FailurePolicy;
    use crate::gate::Gate;
    use crate::limiter::{ClientKey, LimitRecord, LimiterConfig, RateLimiter};
    use crate::store::{MemoryStore, RecordStore, StoreError};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use std::sync::Arc;
    use tower::ServiceExt;

    struct FailingStore;

    #[async_trait]
    impl RecordStore for FailingStore {
        async fn get(&self, _key: &ClientKey) -> Result<Option<LimitRecord>, StoreError> {
            Err(StoreError::Operation("READONLY".to_string()))
        }

        async fn set(&self, _key: &ClientKey, _record: &LimitRecord) -> Result<(), StoreError> {
            Err(StoreError::Operation("READONLY".to_string()))
        }
    }

    fn limiter_config(delays: Vec<u64>, free_attempts: u32) -> LimiterConfig {
        LimiterConfig {
            delays,
            free_attempts,
            ..Default::default()
        }
    }

    fn state_with(config: LimiterConfig, store: Arc<dyn RecordStore>) -> AdmissionState {
        AdmissionState::new(Arc::new(Gate::new(RateLimiter::new(config).unwrap(), store)))
    }

    fn request_from(ip: &str, path: &str) -> Request<Body> {
        Request::builder()
            .uri(path)
            .header("X-Forwarded-For", ip)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_admitted_request_receives_record() {
        let store = Arc::new(MemoryStore::new());
        let app = router(state_with(limiter_config(vec![10, 20], 3), store.clone()));

        let response = app.oneshot(request_from("10.0.0.1", "/login")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["delay"], 0);
        assert_eq!(body["attemptsLeft"], 2);
        assert!(body["freeAttemptsUnlockTime"].is_string());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_backoff_rejects_with_429() {
        let store = Arc::new(MemoryStore::new());
        let app = router(state_with(limiter_config(vec![60], 0), store));

        // The first request schedules the backoff, the second falls inside it.
        let first = app
            .clone()
            .oneshot(request_from("10.0.0.1", "/login"))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.oneshot(request_from("10.0.0.1", "/login/")).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(second.headers().get(header::RETRY_AFTER).unwrap(), "60");

        let body = body_json(second).await;
        assert_eq!(body["delay"], 60);
        assert_eq!(body["attemptsLeft"], 0);
        assert!(body["nextRequestTime"].is_string());
        assert!(body.get("freeAttemptsUnlockTime").is_none());
    }

    #[tokio::test]
    async fn test_other_client_unaffected_by_backoff() {
        let store = Arc::new(MemoryStore::new());
        let app = router(state_with(limiter_config(vec![60], 0), store));

        for _ in 0..2 {
            app.clone()
                .oneshot(request_from("10.0.0.1", "/login"))
                .await
                .unwrap();
        }

        let response = app.oneshot(request_from("10.0.0.2", "/login")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_disabled_limiting_passes_through() {
        let app = router(state_with(limiter_config(Vec::new(), 3), Arc::new(FailingStore)));

        let response = app.oneshot(request_from("10.0.0.1", "/login")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_store_failure_closed_returns_503() {
        let app = router(state_with(limiter_config(vec![10], 3), Arc::new(FailingStore)));

        let response = app.oneshot(request_from("10.0.0.1", "/login")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["code"], "ADMISSION_UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_store_failure_open_passes_without_record() {
        let state = state_with(limiter_config(vec![10], 3), Arc::new(FailingStore))
            .with_failure_policy(FailurePolicy::Open);
        let app = router(state);

        let response = app.oneshot(request_from("10.0.0.1", "/login")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_healthz_is_not_limited() {
        let store = Arc::new(MemoryStore::new());
        let app = router(state_with(limiter_config(vec![60], 0), store.clone()));

        for _ in 0..3 {
            let response = app
                .clone()
                .oneshot(request_from("10.0.0.1", "/healthz"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_missing_client_address_uses_shared_identity() {
        let store = Arc::new(MemoryStore::new());
        let app = router(state_with(limiter_config(vec![10], 3), store.clone()));

        let request = Request::builder().uri("/login").body(Body::empty()).unwrap();
        app.oneshot(request).await.unwrap();

        let key = ClientKey::derive("ipLimiter", "login", "unknown");
        assert!(store.get(&key).await.unwrap().is_some());
    }
}
