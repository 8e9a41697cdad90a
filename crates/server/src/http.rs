//! HTTP server implementation using Axum
//!
//! [`HttpServer`] wraps the application router with the shared middleware
//! stack (request tracing, CORS, request timeout, request metrics) and runs
//! it until its shutdown token is cancelled.

use async_trait::async_trait;
use axum::extract::{MatchedPath, Request, State};
use axum::http::HeaderValue;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;
use parking_lot::RwLock;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use observability::{RequestMetricsGuard, ServerMetrics};

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::traits::Server;

/// HTTP server implementation using Axum
///
/// ```ignore
/// use server::{HttpServer, ServerConfig, ServerExt};
///
/// let server = HttpServer::new(ServerConfig::new("127.0.0.1", 8080), router)?;
/// server.run_with_signals().await?;
/// ```
#[derive(Clone)]
pub struct HttpServer {
    config: ServerConfig,
    router: Router,
    running: Arc<AtomicBool>,
    bound_addr: Arc<RwLock<Option<SocketAddr>>>,
}

impl HttpServer {
    /// Wrap `router` with the middleware stack
    ///
    /// `router` must already have its routes. Fails if a configured CORS
    /// origin is not a valid header value.
    pub fn new(config: ServerConfig, router: Router) -> Result<Self> {
        let cors = cors_layer(&config.cors_origins)?;
        let metrics = ServerMetrics::new("storefront");

        let router = router
            .route_layer(middleware::from_fn_with_state(metrics, track_request))
            .layer(TimeoutLayer::new(config.request_timeout))
            .layer(cors)
            .layer(TraceLayer::new_for_http());

        Ok(Self {
            config,
            router,
            running: Arc::new(AtomicBool::new(false)),
            bound_addr: Arc::new(RwLock::new(None)),
        })
    }

    /// The fully layered router (for testing or inspection)
    pub fn router(&self) -> &Router {
        &self.router
    }
}

fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return Ok(layer.allow_origin(Any));
    }

    let origins = origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin)
                .map_err(|_| ServerError::ConfigError(format!("invalid CORS origin: {}", origin)))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(layer.allow_origin(origins))
}

async fn track_request(State(metrics): State<ServerMetrics>, request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let mut guard = RequestMetricsGuard::new(metrics, request.method().as_str(), route);

    let response = next.run(request).await;
    guard.set_status(response.status().as_u16());
    response
}

#[async_trait]
impl Server for HttpServer {
    fn name(&self) -> &str {
        "http"
    }

    fn address(&self) -> Option<SocketAddr> {
        *self.bound_addr.read()
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn run(&self, shutdown_token: CancellationToken) -> Result<()> {
        let addr = self.config.http_addr()?;

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::bind(addr.to_string(), e))?;
        let local_addr = listener.local_addr().map_err(ServerError::Io)?;
        *self.bound_addr.write() = Some(local_addr);

        info!(%local_addr, "HTTP server listening");
        self.running.store(true, Ordering::SeqCst);

        let graceful = shutdown_token.clone();
        let serve = axum::serve(listener, self.router.clone())
            .with_graceful_shutdown(async move {
                graceful.cancelled().await;
                info!("HTTP server received shutdown signal");
            })
            .into_future();
        tokio::pin!(serve);

        let drain_timeout = self.config.shutdown_timeout;
        let drain_deadline = async {
            shutdown_token.cancelled().await;
            tokio::time::sleep(drain_timeout).await;
        };

        let result = tokio::select! {
            result = &mut serve => result,
            _ = drain_deadline => {
                warn!(timeout = ?drain_timeout, "In-flight requests did not drain, closing");
                Ok(())
            }
        };

        self.running.store(false, Ordering::SeqCst);
        *self.bound_addr.write() = None;

        match result {
            Ok(()) => {
                info!("HTTP server shutdown complete");
                Ok(())
            }
            Err(e) => {
                error!(%e, "HTTP server error");
                Err(ServerError::Io(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ServerExt;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::routing::get;
    use std::time::Duration;
    use tower::ServiceExt as _;

    fn ephemeral() -> ServerConfig {
        ServerConfig::new("127.0.0.1", 0)
    }

    #[tokio::test]
    async fn test_http_server_shutdown() {
        let router = Router::new().route("/", get(|| async { "ok" }));
        let server = HttpServer::new(ephemeral(), router).unwrap();
        let (handle, token) = server.spawn();

        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), handle).await;
        assert!(result.is_ok(), "Server should shutdown within timeout");
    }

    #[tokio::test]
    async fn test_bound_address_is_reported() {
        let router = Router::new().route("/", get(|| async { "ok" }));
        let server = HttpServer::new(ephemeral(), router).unwrap();
        let observer = server.clone();
        let (handle, token) = server.spawn();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(observer.is_running());
        assert_ne!(observer.address().map(|a| a.port()), Some(0));

        token.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        assert!(!observer.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_request_times_out() {
        let router = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                "late"
            }),
        );
        let config = ephemeral().with_request_timeout(Duration::from_secs(1));
        let server = HttpServer::new(config, router).unwrap();

        let response = server
            .router()
            .clone()
            .oneshot(axum::http::Request::get("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }

    #[test]
    fn test_invalid_cors_origin() {
        let config = ephemeral().with_cors_origins(vec!["bad\norigin".to_string()]);
        assert!(matches!(
            HttpServer::new(config, Router::new()),
            Err(ServerError::ConfigError(_))
        ));
    }

    #[test]
    fn test_http_server_name() {
        let router = Router::new().route("/", get(|| async { "ok" }));
        let server = HttpServer::new(ephemeral(), router).unwrap();
        assert_eq!(server.name(), "http");
    }
}
