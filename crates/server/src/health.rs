//! Liveness and readiness endpoints
//!
//! `GET /health` answers as long as the process serves requests.
//! `GET /health/ready` runs every registered [`ReadinessCheck`] and reports
//! 503 when any of them fails.

use async_trait::async_trait;
use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A dependency the service needs before it can take traffic
#[async_trait]
pub trait ReadinessCheck: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self) -> std::result::Result<(), String>;
}

/// Outcome of one readiness check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentStatus {
    pub component: String,
    pub healthy: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Shared state for health routes
#[derive(Clone)]
pub struct HealthState {
    pub service_name: String,
    pub start_time: Instant,
    checks: Vec<Arc<dyn ReadinessCheck>>,
    check_timeout: Duration,
}

impl HealthState {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            start_time: Instant::now(),
            checks: Vec::new(),
            check_timeout: Duration::from_secs(2),
        }
    }

    pub fn with_check(mut self, check: Arc<dyn ReadinessCheck>) -> Self {
        self.checks.push(check);
        self
    }

    pub fn with_check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout = timeout;
        self
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Run all checks concurrently
    pub async fn run_checks(&self) -> Vec<ComponentStatus> {
        let runs = self.checks.iter().map(|check| async move {
            let start = Instant::now();
            let outcome = tokio::time::timeout(self.check_timeout, check.check()).await;
            let error = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(_) => Some("check timed out".to_string()),
            };
            ComponentStatus {
                component: check.name().to_string(),
                healthy: error.is_none(),
                latency_ms: start.elapsed().as_millis() as u64,
                error,
            }
        });
        futures::future::join_all(runs).await
    }
}

/// `GET /health`
pub async fn health_handler(State(state): State<Arc<HealthState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": state.service_name,
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
        "uptime_seconds": state.uptime_seconds(),
    }))
}

/// `GET /health/ready`
pub async fn readiness_handler(State(state): State<Arc<HealthState>>) -> (StatusCode, Json<Value>) {
    let components = state.run_checks().await;
    let ready = components.iter().all(|c| c.healthy);
    if !ready {
        tracing::warn!(?components, "Readiness check failed");
    }

    let status_code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = json!({
        "status": if ready { "ready" } else { "degraded" },
        "service": state.service_name,
        "timestamp": Utc::now().to_rfc3339(),
        "components": components,
    });

    (status_code, Json(body))
}

pub fn health_routes(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/health/ready", get(readiness_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    struct Fixed(&'static str, bool);

    #[async_trait]
    impl ReadinessCheck for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        async fn check(&self) -> std::result::Result<(), String> {
            if self.1 {
                Ok(())
            } else {
                Err("connection refused".to_string())
            }
        }
    }

    struct Hangs;

    #[async_trait]
    impl ReadinessCheck for Hangs {
        fn name(&self) -> &str {
            "slow"
        }

        async fn check(&self) -> std::result::Result<(), String> {
            std::future::pending().await
        }
    }

    async fn ready(state: HealthState) -> (StatusCode, Value) {
        let response = health_routes(Arc::new(state))
            .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_ready_when_all_checks_pass() {
        let (status, body) = ready(HealthState::new("storefront").with_check(Arc::new(Fixed("store", true)))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["components"][0]["component"], "store");
    }

    #[tokio::test]
    async fn test_degraded_when_a_check_fails() {
        let state = HealthState::new("storefront")
            .with_check(Arc::new(Fixed("store", true)))
            .with_check(Arc::new(Fixed("users", false)));
        let (status, body) = ready(state).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["components"][1]["error"], "connection refused");
    }

    #[tokio::test]
    async fn test_hanging_check_times_out() {
        let state = HealthState::new("storefront")
            .with_check(Arc::new(Hangs))
            .with_check_timeout(Duration::from_millis(20));
        let components = state.run_checks().await;
        assert!(!components[0].healthy);
        assert_eq!(components[0].error.as_deref(), Some("check timed out"));
    }
}
