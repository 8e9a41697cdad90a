//! Observability for the storefront order service
//!
//! - Structured logging via `tracing` (pretty, json or compact output)
//! - Prometheus exporter plus HTTP and order-lifecycle metric handles
//!
//! ```ignore
//! use observability::{init_logging, LogFormat};
//!
//! init_logging("storefront", LogFormat::Json, "info")?;
//! observability::init_metrics("0.0.0.0:9090".parse()?)?;
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat};
pub use metrics::{init_metrics, OrderMetrics, RequestMetricsGuard, ServerMetrics};
