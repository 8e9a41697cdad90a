//! Prometheus metrics for the storefront
//!
//! [`init_metrics`] installs the global recorder; the metric handles below
//! are no-ops until it has been called.

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Install the Prometheus recorder and serve `/metrics` on `addr`
///
/// ```ignore
/// observability::init_metrics("0.0.0.0:9090".parse()?)?;
/// ```
pub fn init_metrics(addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full("http_request_duration_seconds".to_string()),
            &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
        )?
        .install()?;

    tracing::info!(%addr, "Metrics server listening");
    Ok(())
}

/// HTTP request metrics
///
/// # Metrics
///
/// * `http_requests_total` - Completed requests, labelled `method`/`route`/`status`
/// * `http_request_duration_seconds` - Request latency
/// * `http_requests_in_flight` - Requests currently being handled
#[derive(Clone)]
pub struct ServerMetrics {
    request_duration: Histogram,
    in_flight: Gauge,
    server_name: String,
}

impl ServerMetrics {
    pub fn new(server_name: &str) -> Self {
        let name = server_name.to_string();
        Self {
            request_duration: histogram!("http_request_duration_seconds", "server" => name.clone()),
            in_flight: gauge!("http_requests_in_flight", "server" => name.clone()),
            server_name: name,
        }
    }

    /// Record a completed request
    ///
    /// `route` should be the matched route template, not the raw path, to
    /// keep label cardinality bounded.
    pub fn record_request(&self, method: &str, route: &str, status_code: u16, duration: Duration) {
        counter!(
            "http_requests_total",
            "server" => self.server_name.clone(),
            "method" => method.to_string(),
            "route" => route.to_string(),
            "status" => status_code.to_string()
        )
        .increment(1);
        self.request_duration.record(duration.as_secs_f64());
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }
}

/// Tracks one in-flight request and records it on drop
///
/// A request whose future is dropped before completion is recorded with
/// status 499.
///
/// ```ignore
/// let mut guard = RequestMetricsGuard::new(metrics.clone(), "GET", "/orders");
/// let response = next.run(request).await;
/// guard.set_status(response.status().as_u16());
/// ```
pub struct RequestMetricsGuard {
    metrics: ServerMetrics,
    method: String,
    route: String,
    start: Instant,
    status_code: u16,
}

impl RequestMetricsGuard {
    pub fn new(metrics: ServerMetrics, method: impl Into<String>, route: impl Into<String>) -> Self {
        metrics.in_flight.increment(1.0);
        Self {
            metrics,
            method: method.into(),
            route: route.into(),
            start: Instant::now(),
            status_code: 499,
        }
    }

    pub fn set_status(&mut self, code: u16) {
        self.status_code = code;
    }
}

impl Drop for RequestMetricsGuard {
    fn drop(&mut self) {
        self.metrics.in_flight.decrement(1.0);
        self.metrics
            .record_request(&self.method, &self.route, self.status_code, self.start.elapsed());
    }
}

/// Order lifecycle metrics
///
/// # Metrics
///
/// * `orders_created_total` - Orders persisted through checkout
/// * `order_transitions_total` - Accepted status transitions, labelled `from`/`to`
/// * `order_transitions_rejected_total` - Rejected transitions, labelled by error kind
/// * `order_notifications_failed_total` - Realtime emissions whose transport failed
/// * `order_fallback_scans_total` - Per-user listings served by the bounded full scan
/// * `realtime_connections` - Live realtime subscribers
#[derive(Clone)]
pub struct OrderMetrics {
    orders_created: Counter,
    fallback_scans: Counter,
    realtime_connections: Gauge,
}

impl OrderMetrics {
    pub fn new() -> Self {
        Self {
            orders_created: counter!("orders_created_total"),
            fallback_scans: counter!("order_fallback_scans_total"),
            realtime_connections: gauge!("realtime_connections"),
        }
    }

    pub fn order_created(&self) {
        self.orders_created.increment(1);
    }

    pub fn transition(&self, from: &str, to: &str) {
        counter!(
            "order_transitions_total",
            "from" => from.to_string(),
            "to" => to.to_string()
        )
        .increment(1);
    }

    pub fn transition_rejected(&self, kind: &'static str) {
        counter!("order_transitions_rejected_total", "kind" => kind).increment(1);
    }

    pub fn notification_failed(&self, channel: &'static str) {
        counter!("order_notifications_failed_total", "channel" => channel).increment(1);
    }

    pub fn fallback_scan(&self) {
        self.fallback_scans.increment(1);
    }

    pub fn set_realtime_connections(&self, count: usize) {
        self.realtime_connections.set(count as f64);
    }
}

impl Default for OrderMetrics {
    fn default() -> Self {
        Self::new()
    }
}
