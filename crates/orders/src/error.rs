//! Order lifecycle error types

use thiserror::Error;

use crate::store::StoreError;
use crate::types::OrderStatus;

/// Errors that can occur while placing, reading or transitioning orders
#[derive(Error, Debug)]
pub enum OrderError {
    /// Missing or malformed input
    #[error("{0}")]
    Validation(String),

    /// No resolved session on the request
    #[error("Authentication required")]
    Unauthenticated,

    /// Authenticated, but not allowed to act on this order
    #[error("{0}")]
    Forbidden(String),

    /// Order not found
    #[error("Order not found: {0}")]
    NotFound(String),

    /// Transition rejected by the state machine
    #[error("Cannot change order status from {from} to {to}: {reason}")]
    IllegalTransition {
        from: OrderStatus,
        to: OrderStatus,
        reason: String,
    },

    /// Customer cancellation outside of pending/processing
    #[error("Order cannot be cancelled while it is {0}")]
    NotCancellable(OrderStatus),

    /// A concurrent writer changed the status between read and write
    #[error("Order {order_id} was changed concurrently (now {current}); requested {requested}")]
    Conflict {
        order_id: String,
        current: OrderStatus,
        requested: OrderStatus,
    },

    /// Document store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OrderError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Short machine-readable code, used in logs and metrics labels
    pub fn kind(&self) -> &'static str {
        match self {
            OrderError::Validation(_) => "validation",
            OrderError::Unauthenticated => "unauthenticated",
            OrderError::Forbidden(_) => "forbidden",
            OrderError::NotFound(_) => "not_found",
            OrderError::IllegalTransition { .. } => "illegal_transition",
            OrderError::NotCancellable(_) => "not_cancellable",
            OrderError::Conflict { .. } => "conflict",
            OrderError::Storage(_) => "storage",
            OrderError::Internal(_) => "internal",
        }
    }
}

impl From<StoreError> for OrderError {
    fn from(err: StoreError) -> Self {
        OrderError::Storage(err.to_string())
    }
}

/// Result type for order operations
pub type Result<T> = std::result::Result<T, OrderError>;
