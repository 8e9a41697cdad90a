//! HTTP hosting for the storefront order service
//!
//! # Modules
//!
//! - [`config`] - Bind address, timeouts and CORS origins
//! - [`http`] - Axum server with the shared middleware stack
//! - [`health`] - Liveness and readiness routes
//! - [`port_validator`] - Startup port checks
//! - [`shutdown`] - Signal-driven cancellation
//! - [`traits`] - `Server` and `ServerExt`
//!
//! ```ignore
//! use server::{health_routes, HealthState, HttpServer, Server, ServerConfig, ShutdownController};
//!
//! let shutdown = ShutdownController::with_signals();
//! let router = orders_router.merge(health_routes(Arc::new(HealthState::new("storefront"))));
//! HttpServer::new(ServerConfig::default(), router)?
//!     .run(shutdown.child_token())
//!     .await?;
//! ```

pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod port_validator;
pub mod shutdown;
pub mod traits;

pub use config::{ports, ServerConfig};
pub use error::{Result, ServerError};
pub use health::{health_routes, ComponentStatus, HealthState, ReadinessCheck};
pub use http::HttpServer;
pub use port_validator::{validate_port_range, validate_ports_available};
pub use shutdown::ShutdownController;
pub use traits::{Server, ServerExt};
