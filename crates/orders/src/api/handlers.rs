//! API handlers for order HTTP endpoints

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use common::ApiResponse;

use crate::api::auth::{AdminUser, AuthUser, Rejection};
use crate::api::OrdersApiState;
use crate::error::OrderError;
use crate::manager::Checkout;
use crate::realtime::{ConnectionInfo, ConnectionStats};
use crate::types::Order;

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, Rejection>;

/// Body of `PUT /admin/orders/:id`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

/// Body of `GET /admin/realtime/connections`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeConnections {
    #[serde(flatten)]
    pub stats: ConnectionStats,
    pub connections: Vec<ConnectionInfo>,
}

/// Map an [`OrderError`] onto a status code and envelope
///
/// Store and internal failures are logged in full but reported generically.
pub fn error_response(err: OrderError) -> Rejection {
    let status = match &err {
        OrderError::Validation(_)
        | OrderError::IllegalTransition { .. }
        | OrderError::NotCancellable(_) => StatusCode::BAD_REQUEST,
        OrderError::Unauthenticated => StatusCode::UNAUTHORIZED,
        OrderError::Forbidden(_) => StatusCode::FORBIDDEN,
        OrderError::NotFound(_) => StatusCode::NOT_FOUND,
        OrderError::Conflict { .. } => StatusCode::CONFLICT,
        OrderError::Storage(_) | OrderError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let message = match &err {
        OrderError::NotFound(_) => "Order not found".to_string(),
        OrderError::Storage(detail) => {
            tracing::error!(error = %detail, "Order storage failure");
            "Order storage is unavailable, please retry".to_string()
        }
        OrderError::Internal(detail) => {
            tracing::error!(error = %detail, "Internal order error");
            "Internal server error".to_string()
        }
        _ => err.to_string(),
    };

    (status, Json(ApiResponse::error(message)))
}

fn bad_body(rejection: JsonRejection) -> Rejection {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse::error(format!("Invalid request body: {}", rejection.body_text()))),
    )
}

/// `POST /orders`
pub async fn create_order(
    State(state): State<Arc<OrdersApiState>>,
    AuthUser(identity): AuthUser,
    payload: Result<Json<Checkout>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<Order>>), Rejection> {
    let Json(checkout) = payload.map_err(bad_body)?;

    let order = state
        .manager
        .place_order(&identity, checkout)
        .await
        .map_err(error_response)?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(order))))
}

/// `GET /orders`
pub async fn list_orders(
    State(state): State<Arc<OrdersApiState>>,
    AuthUser(identity): AuthUser,
) -> ApiResult<Vec<Order>> {
    let orders = state
        .manager
        .list_for_customer(&identity)
        .await
        .map_err(error_response)?;
    Ok(Json(ApiResponse::ok(orders)))
}

/// `POST /orders/:id/cancel`
pub async fn cancel_order(
    State(state): State<Arc<OrdersApiState>>,
    AuthUser(identity): AuthUser,
    Path(order_id): Path<String>,
) -> ApiResult<Order> {
    let order = state
        .manager
        .cancel_for_customer(&identity, &order_id)
        .await
        .map_err(error_response)?;
    Ok(Json(ApiResponse::ok_with_message(order, "Order cancelled")))
}

/// `GET /admin/orders`
pub async fn admin_list_orders(
    State(state): State<Arc<OrdersApiState>>,
    _admin: AdminUser,
) -> ApiResult<Vec<Order>> {
    let orders = state.manager.list_all_orders().await.map_err(error_response)?;
    Ok(Json(ApiResponse::ok(orders)))
}

/// `GET /admin/orders/:id`
pub async fn admin_get_order(
    State(state): State<Arc<OrdersApiState>>,
    _admin: AdminUser,
    Path(order_id): Path<String>,
) -> ApiResult<Order> {
    let order = state.manager.get_order(&order_id).await.map_err(error_response)?;
    Ok(Json(ApiResponse::ok(order)))
}

/// `PUT /admin/orders/:id`
pub async fn admin_update_order(
    State(state): State<Arc<OrdersApiState>>,
    AdminUser(admin): AdminUser,
    Path(order_id): Path<String>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> ApiResult<Order> {
    let Json(req) = payload.map_err(bad_body)?;

    let update = state
        .manager
        .update_status(&order_id, &req.status, Some(admin.user_id))
        .await
        .map_err(error_response)?;

    let status = update.order.status;
    let message = if update.changed {
        format!("Order status updated to {}", status)
    } else {
        format!("Order is already {}", status)
    };
    let response = ApiResponse::ok_with_message(update.order, message);
    Ok(Json(response))
}

/// `DELETE /admin/orders/:id`
pub async fn admin_delete_order(
    State(state): State<Arc<OrdersApiState>>,
    _admin: AdminUser,
    Path(order_id): Path<String>,
) -> ApiResult<()> {
    state.manager.delete_order(&order_id).await.map_err(error_response)?;
    Ok(Json(ApiResponse::message("Order deleted")))
}

/// `GET /admin/realtime/connections`
pub async fn realtime_connections(
    State(state): State<Arc<OrdersApiState>>,
    _admin: AdminUser,
) -> ApiResult<RealtimeConnections> {
    Ok(Json(ApiResponse::ok(RealtimeConnections {
        stats: state.hub.stats(),
        connections: state.hub.active_connections(),
    })))
}
