//! In-process broadcast hub with a connection registry

use chrono::{DateTime, Utc};
use futures::future::select_all;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};

use observability::OrderMetrics;

use super::{Channel, FeedItem, Notifier, NotifyError, NotifyResult, OrderEvent};

/// A unique identifier for each subscriber connection
pub type ConnectionId = u64;

/// Information about a live subscriber
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub user_id: String,
    pub channels: Vec<String>,
    pub connected_at: DateTime<Utc>,
}

/// Connection counts for diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStats {
    pub total_connections: usize,
    /// Live subscribers per channel key
    pub channels: BTreeMap<String, usize>,
}

struct HubInner {
    capacity: usize,
    senders: RwLock<HashMap<String, broadcast::Sender<Arc<str>>>>,
    connections: RwLock<HashMap<ConnectionId, ConnectionInfo>>,
    next_conn_id: AtomicU64,
    metrics: OrderMetrics,
}

/// Fan-out of serialized order events to live subscribers
///
/// One `tokio::sync::broadcast` channel per channel key, created on first
/// join and dropped with its last subscriber. Events are serialized once per
/// publish and shared between receivers.
#[derive(Clone)]
pub struct BroadcastHub {
    inner: Arc<HubInner>,
}

impl BroadcastHub {
    /// Create a hub; `capacity` is the per-channel backlog before slow
    /// subscribers start missing events
    pub fn new(capacity: usize, metrics: OrderMetrics) -> Self {
        Self {
            inner: Arc::new(HubInner {
                capacity: capacity.max(1),
                senders: RwLock::new(HashMap::new()),
                connections: RwLock::new(HashMap::new()),
                next_conn_id: AtomicU64::new(1),
                metrics,
            }),
        }
    }

    /// Join `channels` on behalf of `user_id`
    ///
    /// The connection stays registered until the returned [`Subscription`]
    /// is dropped.
    pub fn subscribe(&self, user_id: &str, channels: &[Channel]) -> Subscription {
        let id = self.inner.next_conn_id.fetch_add(1, Ordering::SeqCst);
        let keys: Vec<String> = channels.iter().map(Channel::key).collect();

        let receivers = {
            let mut senders = self.inner.senders.write();
            keys.iter()
                .map(|key| {
                    senders
                        .entry(key.clone())
                        .or_insert_with(|| broadcast::channel(self.inner.capacity).0)
                        .subscribe()
                })
                .collect()
        };

        let info = ConnectionInfo {
            id,
            user_id: user_id.to_string(),
            channels: keys.clone(),
            connected_at: Utc::now(),
        };
        let total = {
            let mut connections = self.inner.connections.write();
            connections.insert(id, info);
            connections.len()
        };
        self.inner.metrics.set_realtime_connections(total);
        tracing::debug!(conn_id = id, user_id, channels = ?keys, "Realtime subscriber joined");

        Subscription {
            id,
            keys,
            receivers,
            hub: self.clone(),
        }
    }

    /// Number of live connections
    pub fn connection_count(&self) -> usize {
        self.inner.connections.read().len()
    }

    /// Snapshot of every live connection
    pub fn active_connections(&self) -> Vec<ConnectionInfo> {
        let mut connections: Vec<ConnectionInfo> =
            self.inner.connections.read().values().cloned().collect();
        connections.sort_by_key(|c| c.id);
        connections
    }

    /// Per-channel subscriber counts
    pub fn stats(&self) -> ConnectionStats {
        let connections = self.inner.connections.read();
        let mut channels = BTreeMap::new();
        for info in connections.values() {
            for key in &info.channels {
                *channels.entry(key.clone()).or_insert(0) += 1;
            }
        }
        ConnectionStats {
            total_connections: connections.len(),
            channels,
        }
    }

    fn unregister(&self, id: ConnectionId, keys: &[String]) {
        let total = {
            let mut connections = self.inner.connections.write();
            connections.remove(&id);
            connections.len()
        };

        // Receivers are already gone, so an idle sender has no subscribers left
        let mut senders = self.inner.senders.write();
        for key in keys {
            if senders.get(key).is_some_and(|tx| tx.receiver_count() == 0) {
                senders.remove(key);
            }
        }
        drop(senders);

        self.inner.metrics.set_realtime_connections(total);
        tracing::debug!(conn_id = id, "Realtime subscriber left");
    }
}

impl Notifier for BroadcastHub {
    fn publish(&self, channel: &Channel, event: OrderEvent) -> NotifyResult<usize> {
        let text: Arc<str> = serde_json::to_string(&event)
            .map_err(|e| NotifyError::Encode(e.to_string()))?
            .into();

        let senders = self.inner.senders.read();
        let delivered = match senders.get(&channel.key()) {
            // Err only means nobody is listening right now
            Some(tx) => tx.send(text).unwrap_or(0),
            None => 0,
        };

        tracing::trace!(channel = %channel.key(), event = event.name(), delivered, "Published order event");
        Ok(delivered)
    }
}

/// A live subscriber's view of the hub
pub struct Subscription {
    id: ConnectionId,
    keys: Vec<String>,
    receivers: Vec<broadcast::Receiver<Arc<str>>>,
    hub: BroadcastHub,
}

impl Subscription {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Channel keys this subscription joined
    pub fn channels(&self) -> &[String] {
        &self.keys
    }

    /// Next serialized event from any joined channel
    ///
    /// When a slow subscriber falls behind, the dropped events are reported
    /// as one [`FeedItem::Gap`] so the client can re-fetch. Returns `None`
    /// once every channel is closed.
    pub async fn recv(&mut self) -> Option<FeedItem> {
        loop {
            if self.receivers.is_empty() {
                return None;
            }

            let (result, index, _) =
                select_all(self.receivers.iter_mut().map(|rx| Box::pin(rx.recv()))).await;

            match result {
                Ok(text) => return Some(FeedItem::Event(text)),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(conn_id = self.id, skipped, "Realtime subscriber lagged, events dropped");
                    return Some(FeedItem::Gap(skipped));
                }
                Err(RecvError::Closed) => {
                    self.receivers.remove(index);
                }
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.receivers.clear();
        self.hub.unregister(self.id, &self.keys);
    }
}
