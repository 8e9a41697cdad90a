//! API routes for orders

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::api::handlers::*;
use crate::api::realtime::realtime_socket;
use crate::api::OrdersApiState;

/// Create the orders router
pub fn create_router(state: Arc<OrdersApiState>) -> Router {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/:id/cancel", post(cancel_order))
        .route("/admin/orders", get(admin_list_orders))
        .route(
            "/admin/orders/:id",
            get(admin_get_order)
                .put(admin_update_order)
                .delete(admin_delete_order),
        )
        .route("/admin/realtime/connections", get(realtime_connections))
        .route("/realtime", get(realtime_socket))
        .with_state(state)
}
