//! Listener configuration for the storefront HTTP host

use crate::error::{Result, ServerError};
use std::net::SocketAddr;
use std::time::Duration;

/// Default port assignments
pub mod ports {
    /// Storefront API and realtime endpoint
    pub const STOREFRONT_HTTP: u16 = 8080;
    /// Prometheus exporter
    pub const METRICS: u16 = 9090;
}

/// Bind address and per-request limits for [`HttpServer`](crate::HttpServer)
///
/// ```
/// use server::config::ServerConfig;
/// use std::time::Duration;
///
/// let config = ServerConfig::new("127.0.0.1", 8080)
///     .with_request_timeout(Duration::from_secs(10));
/// assert_eq!(config.http_addr().unwrap().port(), 8080);
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    pub http_port: u16,
    /// Upper bound for a single HTTP request; realtime sockets are exempt
    pub request_timeout: Duration,
    /// How long to wait for in-flight requests after shutdown is signalled
    pub shutdown_timeout: Duration,
    /// Allowed CORS origins; empty allows any origin
    pub cors_origins: Vec<String>,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, http_port: u16) -> Self {
        Self {
            host: host.into(),
            http_port,
            ..Self::default()
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = origins;
        self
    }

    pub fn http_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.http_port)
            .parse()
            .map_err(|_| ServerError::InvalidAddress(format!("{}:{}", self.host, self.http_port)))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            http_port: ports::STOREFRONT_HTTP,
            request_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(30),
            cors_origins: Vec::new(),
        }
    }
}
