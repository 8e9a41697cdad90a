//! Order status state machine
//!
//! ```text
//! pending -> processing -> shipped -> delivered
//!    \            |
//!     +-----> cancelled
//! ```
//!
//! Delivered and cancelled are terminal. Customers may only cancel; every
//! forward move is an administrator action.

use crate::error::OrderError;
use crate::types::{Actor, OrderStatus};

/// Knobs for the administrator side of the state machine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransitionPolicy {
    /// Let admins jump ahead, e.g. pending -> shipped
    pub allow_forward_skips: bool,
    /// Let admins move back along the fulfilment path, e.g. shipped -> processing
    pub allow_admin_rollback: bool,
}

/// Outcome of a legal request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Persist the new status and notify
    Apply,
    /// Requested status equals the current one; nothing to write
    NoOp,
}

/// Decides whether a requested status change is legal
#[derive(Debug, Clone, Copy, Default)]
pub struct StateMachine {
    policy: TransitionPolicy,
}

impl StateMachine {
    pub fn new(policy: TransitionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> TransitionPolicy {
        self.policy
    }

    /// Check `from -> to` for the given actor
    pub fn check(&self, from: OrderStatus, to: OrderStatus, actor: &Actor) -> Result<Transition, OrderError> {
        match actor {
            Actor::Customer(_) => Self::check_customer(from, to),
            Actor::Admin(_) => self.check_admin(from, to),
        }
    }

    fn check_customer(from: OrderStatus, to: OrderStatus) -> Result<Transition, OrderError> {
        if to != OrderStatus::Cancelled {
            return Err(illegal(from, to, "customers can only cancel their orders"));
        }
        if !from.is_cancellable() {
            return Err(OrderError::NotCancellable(from));
        }
        Ok(Transition::Apply)
    }

    fn check_admin(&self, from: OrderStatus, to: OrderStatus) -> Result<Transition, OrderError> {
        if from == to {
            return Ok(Transition::NoOp);
        }
        if from.is_terminal() {
            return Err(illegal(from, to, &format!("order is already {}", from)));
        }
        if to == OrderStatus::Cancelled {
            return if from.is_cancellable() {
                Ok(Transition::Apply)
            } else {
                Err(illegal(from, to, "only pending or processing orders can be cancelled"))
            };
        }

        // Both ends are on the fulfilment path here
        let (Some(from_rank), Some(to_rank)) = (from.rank(), to.rank()) else {
            return Err(illegal(from, to, "unknown transition"));
        };

        if to_rank > from_rank {
            if to_rank == from_rank + 1 || self.policy.allow_forward_skips {
                Ok(Transition::Apply)
            } else {
                Err(illegal(from, to, "orders advance one step at a time"))
            }
        } else if self.policy.allow_admin_rollback {
            Ok(Transition::Apply)
        } else {
            Err(illegal(from, to, "backward transitions are not allowed"))
        }
    }

    /// Statuses the actor may move an order to from `from`, for rendering
    /// transition controls
    pub fn allowed_targets(&self, from: OrderStatus, actor: &Actor) -> Vec<OrderStatus> {
        OrderStatus::ALL
            .into_iter()
            .filter(|to| *to != from)
            .filter(|to| matches!(self.check(from, *to, actor), Ok(Transition::Apply)))
            .collect()
    }
}

fn illegal(from: OrderStatus, to: OrderStatus, reason: &str) -> OrderError {
    OrderError::IllegalTransition {
        from,
        to,
        reason: reason.to_string(),
    }
}
