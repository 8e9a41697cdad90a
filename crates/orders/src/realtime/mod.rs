//! Realtime order events
//!
//! Two kinds of channel: one private channel per customer (`user-{id}`) and a
//! single shared admin channel. Publishing is synchronous and never blocks on
//! subscribers; a failed publish is the caller's to log, never to retry.

mod hub;
mod testing;

pub use hub::{BroadcastHub, ConnectionId, ConnectionInfo, ConnectionStats, Subscription};
pub use testing::{FailingNotifier, RecordingNotifier};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::types::{Order, OrderStatus};

/// Key of the shared admin channel
pub const ADMIN_CHANNEL: &str = "admin-orders";

/// A broadcast scope
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Private channel of one customer
    User(String),
    /// Every admin observer
    Admin,
}

impl Channel {
    pub fn key(&self) -> String {
        match self {
            Channel::User(user_id) => format!("user-{}", user_id),
            Channel::Admin => ADMIN_CHANNEL.to_string(),
        }
    }

    /// Metrics label
    pub fn kind(&self) -> &'static str {
        match self {
            Channel::User(_) => "user",
            Channel::Admin => "admin",
        }
    }
}

/// Events pushed to subscribers, always carrying canonical orders
///
/// On the wire: `{ "event": "order-updated", "data": { ... } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum OrderEvent {
    /// User channel: the customer's new order was persisted
    OrderCreated(Order),
    /// User channel: the customer's order changed status
    OrderUpdated(Order),
    /// Admin channel: any new order
    NewOrder(Order),
    /// Admin channel: any status change
    #[serde(rename_all = "camelCase")]
    OrderStatusChanged {
        order: Order,
        previous_status: OrderStatus,
    },
    /// Admin channel: an order was hard-deleted
    #[serde(rename_all = "camelCase")]
    OrderDeleted { id: String, user_id: String },
}

impl OrderEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated(_) => "order-created",
            OrderEvent::OrderUpdated(_) => "order-updated",
            OrderEvent::NewOrder(_) => "new-order",
            OrderEvent::OrderStatusChanged { .. } => "order-status-changed",
            OrderEvent::OrderDeleted { .. } => "order-deleted",
        }
    }
}

/// Event name of the frame sent in place of dropped events
pub const RESYNC_EVENT: &str = "resync";

/// One item read from a live event stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedItem {
    /// A serialized [`OrderEvent`]
    Event(Arc<str>),
    /// The subscriber fell behind and this many events were dropped;
    /// the order list must be re-fetched
    Gap(u64),
}

#[derive(Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
enum ControlFrame {
    Resync { skipped: u64 },
}

impl FeedItem {
    /// Text frame for the socket
    ///
    /// A gap goes out as `{ "event": "resync", "data": { "skipped": n } }`.
    pub fn to_frame(&self) -> String {
        match self {
            FeedItem::Event(text) => text.to_string(),
            FeedItem::Gap(skipped) => {
                serde_json::json!({ "event": RESYNC_EVENT, "data": { "skipped": skipped } }).to_string()
            }
        }
    }

    /// Read a text frame produced by [`FeedItem::to_frame`]
    pub fn from_frame(text: &str) -> Self {
        match serde_json::from_str::<ControlFrame>(text) {
            Ok(ControlFrame::Resync { skipped }) => FeedItem::Gap(skipped),
            Err(_) => FeedItem::Event(Arc::from(text)),
        }
    }
}

/// Errors from a publish attempt
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("Failed to encode event: {0}")]
    Encode(String),

    #[error("Realtime transport error: {0}")]
    Transport(String),
}

pub type NotifyResult<T> = std::result::Result<T, NotifyError>;

/// Outbound side of the realtime transport
pub trait Notifier: Send + Sync {
    /// Emit `event` on `channel`
    ///
    /// # Returns
    /// Number of subscribers the event was handed to (zero is not an error)
    fn publish(&self, channel: &Channel, event: OrderEvent) -> NotifyResult<usize>;
}
