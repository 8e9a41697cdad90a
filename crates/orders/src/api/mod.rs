//! HTTP and WebSocket API for orders
//!
//! Every response body is the [`common::ApiResponse`] envelope. Callers are
//! identified by headers set by the session layer in front of the service.

pub mod auth;
pub mod handlers;
pub mod realtime;
pub mod routes;

#[cfg(test)]
mod tests;

use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::manager::OrderManager;
use crate::realtime::BroadcastHub;

pub use auth::{AdminUser, AuthUser};
pub use routes::create_router;

/// Header names and the admin allowlist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSettings {
    pub user_header: String,
    pub email_header: String,
    pub name_header: String,
    /// Empty means every authenticated caller is an admin
    pub admin_user_ids: HashSet<String>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            user_header: "x-user-id".to_string(),
            email_header: "x-user-email".to_string(),
            name_header: "x-user-name".to_string(),
            admin_user_ids: HashSet::new(),
        }
    }
}

impl AuthSettings {
    pub fn is_admin(&self, user_id: &str) -> bool {
        self.admin_user_ids.is_empty() || self.admin_user_ids.contains(user_id)
    }
}

/// Shared state behind every order route
pub struct OrdersApiState {
    pub manager: Arc<OrderManager>,
    pub hub: BroadcastHub,
    pub auth: AuthSettings,
    /// Cancelled on server shutdown; closes open realtime sockets
    pub shutdown: CancellationToken,
}

impl OrdersApiState {
    pub fn new(manager: Arc<OrderManager>, hub: BroadcastHub, auth: AuthSettings) -> Self {
        Self {
            manager,
            hub,
            auth,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }
}
