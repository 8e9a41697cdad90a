//! Order lifecycle and status synchronization for the storefront
//!
//! # Features
//!
//! - Canonical order shape with address normalization at the storage boundary
//! - Status state machine with guarded (compare-and-set) writes
//! - Realtime order events on per-customer and admin channels
//! - Reconciliation of realtime events with polled snapshots
//!
//! # Feature Flags
//!
//! - `postgres` - Enable the PostgreSQL document store
//! - `api` - Enable the HTTP and WebSocket API

pub mod address;
pub mod error;
pub mod manager;
pub mod realtime;
pub mod reconcile;
pub mod repository;
pub mod store;
pub mod transition;
pub mod types;
pub mod users;

#[cfg(feature = "api")]
pub mod api;

// Re-export commonly used types
pub use address::{normalize_address, ShippingAddress};
pub use error::{OrderError, Result};
pub use manager::{Checkout, OrderManager, TotalsPolicy};
pub use repository::{OrderRepository, RepositorySettings, StatusUpdate};
pub use transition::{StateMachine, Transition, TransitionPolicy};
pub use types::{Actor, ActorRole, Amount, Order, OrderItem, OrderStatus, StatusChange};

// Store exports
pub use store::memory::InMemoryDocumentStore;
pub use store::{DocumentStore, StoreError};

#[cfg(feature = "postgres")]
pub use store::postgres::PostgresDocumentStore;

// Realtime exports
pub use realtime::{BroadcastHub, Channel, FeedItem, Notifier, OrderEvent};

pub use users::{DocumentUserDirectory, InMemoryUserDirectory, UserDirectory, UserProfile};
