//! Caller identity extractors

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;

use common::{ApiResponse, Identity};

use crate::api::handlers::error_response;
use crate::api::OrdersApiState;
use crate::error::OrderError;

pub type Rejection = (StatusCode, Json<ApiResponse<()>>);

/// An authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser(pub Identity);

/// An authenticated caller who passed the admin check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminUser(pub Identity);

/// 403 for a caller outside the admin allowlist
pub fn admin_required() -> Rejection {
    error_response(OrderError::Forbidden("Admin access required".to_string()))
}

fn header(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl FromRequestParts<Arc<OrdersApiState>> for AuthUser {
    type Rejection = Rejection;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<OrdersApiState>) -> Result<Self, Self::Rejection> {
        let settings = &state.auth;
        let Some(user_id) = header(parts, &settings.user_header) else {
            return Err(error_response(OrderError::Unauthenticated));
        };

        Ok(AuthUser(Identity {
            user_id,
            email: header(parts, &settings.email_header),
            name: header(parts, &settings.name_header),
        }))
    }
}

#[async_trait]
impl FromRequestParts<Arc<OrdersApiState>> for AdminUser {
    type Rejection = Rejection;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<OrdersApiState>) -> Result<Self, Self::Rejection> {
        let AuthUser(identity) = AuthUser::from_request_parts(parts, state).await?;
        if !state.auth.is_admin(&identity.user_id) {
            tracing::debug!(user_id = %identity.user_id, "Admin route refused");
            return Err(admin_required());
        }
        Ok(AdminUser(identity))
    }
}
