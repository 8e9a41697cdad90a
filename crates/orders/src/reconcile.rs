//! Client-side reconciliation of realtime events with polled snapshots
//!
//! Realtime events are an optimization; the polled order list is the
//! source of truth. A client keeps an [`OrderBoard`] of the last good
//! snapshot, applies events to it idempotently, and re-fetches on the
//! [`PollPolicy`] schedule whenever the realtime channel is not connected.
//! A gap in the feed (dropped events) forces a re-fetch even while connected.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use common::Identity;

use crate::error::Result;
use crate::manager::OrderManager;
use crate::realtime::{FeedItem, OrderEvent, Subscription};
use crate::types::{Order, OrderStatus};

/// When to re-fetch the order list
///
/// Poll every `interval`, unless the realtime channel was connected within
/// the last `connected_grace`. Never poll twice within `min_interval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub connected_grace: Duration,
    pub min_interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            connected_grace: Duration::from_secs(60),
            min_interval: Duration::from_secs(5),
        }
    }
}

impl PollPolicy {
    pub fn should_poll(&self, now: Instant, last_poll: Option<Instant>, last_connected: Option<Instant>) -> bool {
        if let Some(connected) = last_connected {
            if now.saturating_duration_since(connected) < self.connected_grace {
                return false;
            }
        }
        match last_poll {
            None => true,
            Some(polled) => now.saturating_duration_since(polled) >= self.interval.max(self.min_interval),
        }
    }

    /// A user-requested refresh only honours the debounce
    pub fn allows_refresh(&self, now: Instant, last_poll: Option<Instant>) -> bool {
        last_poll.map_or(true, |polled| now.saturating_duration_since(polled) >= self.min_interval)
    }
}

/// Whose orders a board shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardScope {
    Customer(String),
    Admin,
}

impl BoardScope {
    fn admits(&self, order: &Order) -> bool {
        if order.is_test {
            return false;
        }
        match self {
            BoardScope::Customer(user_id) => order.is_owned_by(user_id),
            BoardScope::Admin => true,
        }
    }
}

/// A client's view of an order list
#[derive(Debug, Clone)]
pub struct OrderBoard {
    scope: BoardScope,
    orders: Vec<Order>,
    stale: bool,
    last_error: Option<String>,
    last_synced: Option<DateTime<Utc>>,
    revision: u64,
}

impl OrderBoard {
    pub fn new(scope: BoardScope) -> Self {
        Self {
            scope,
            orders: Vec::new(),
            stale: false,
            last_error: None,
            last_synced: None,
            revision: 0,
        }
    }

    /// Orders, newest first
    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn get(&self, order_id: &str) -> Option<&Order> {
        self.orders.iter().find(|o| o.id == order_id)
    }

    /// `true` after a failed fetch, until the next good snapshot
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn last_synced(&self) -> Option<DateTime<Utc>> {
        self.last_synced
    }

    /// Bumped on every change, so renderers can skip unchanged frames
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Orders per status, for dashboard counters
    pub fn status_counts(&self) -> HashMap<OrderStatus, usize> {
        let mut counts = HashMap::new();
        for order in &self.orders {
            *counts.entry(order.status).or_insert(0) += 1;
        }
        counts
    }

    /// Apply one realtime event
    ///
    /// Updates match by id and never move an order back to an older
    /// `updatedAt`, so duplicates and late arrivals are harmless.
    ///
    /// # Returns
    /// `true` if the board changed
    pub fn apply_event(&mut self, event: &OrderEvent) -> bool {
        let changed = self.fold_event(event);
        if changed {
            self.revision += 1;
        }
        changed
    }

    fn fold_event(&mut self, event: &OrderEvent) -> bool {
        match event {
            OrderEvent::OrderCreated(order) | OrderEvent::NewOrder(order) => {
                if !self.scope.admits(order) {
                    return false;
                }
                if self.get(&order.id).is_some() {
                    return self.replace_if_newer(order);
                }
                self.orders.push(order.clone());
                self.sort();
                true
            }
            OrderEvent::OrderUpdated(order) | OrderEvent::OrderStatusChanged { order, .. } => {
                self.replace_if_newer(order)
            }
            OrderEvent::OrderDeleted { id, .. } => {
                let before = self.orders.len();
                self.orders.retain(|o| &o.id != id);
                self.orders.len() != before
            }
        }
    }

    /// Replace the list with a fresh fetch
    ///
    /// An order already held with a newer `updatedAt` than the snapshot's
    /// copy (an event that overtook the fetch) is kept.
    pub fn apply_snapshot(&mut self, snapshot: Vec<Order>) {
        let mut held: HashMap<String, Order> =
            self.orders.drain(..).map(|o| (o.id.clone(), o)).collect();

        self.orders = snapshot
            .into_iter()
            .filter(|order| self.scope.admits(order))
            .map(|order| match held.remove(&order.id) {
                Some(current) if current.updated_at > order.updated_at => current,
                _ => order,
            })
            .collect();
        self.sort();

        self.stale = false;
        self.last_error = None;
        self.last_synced = Some(Utc::now());
        self.revision += 1;
    }

    /// Record a failed fetch; the last good data stays on display
    pub fn mark_fetch_failed(&mut self, error: impl Into<String>) {
        self.stale = true;
        self.last_error = Some(error.into());
        self.revision += 1;
    }

    fn replace_if_newer(&mut self, order: &Order) -> bool {
        let Some(slot) = self.orders.iter_mut().find(|o| o.id == order.id) else {
            return false;
        };
        if slot.updated_at > order.updated_at || *slot == *order {
            return false;
        }
        *slot = order.clone();
        true
    }

    fn sort(&mut self) {
        self.orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    }
}

/// Where a reconciler re-fetches its list from
#[async_trait]
pub trait OrderSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<Order>>;
}

/// A customer's own orders
pub struct CustomerOrders {
    manager: Arc<OrderManager>,
    identity: Identity,
}

impl CustomerOrders {
    pub fn new(manager: Arc<OrderManager>, identity: Identity) -> Self {
        Self { manager, identity }
    }
}

#[async_trait]
impl OrderSource for CustomerOrders {
    async fn fetch(&self) -> Result<Vec<Order>> {
        self.manager.list_for_customer(&self.identity).await
    }
}

/// Every order, for the admin dashboard
pub struct AllOrders {
    manager: Arc<OrderManager>,
}

impl AllOrders {
    pub fn new(manager: Arc<OrderManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl OrderSource for AllOrders {
    async fn fetch(&self) -> Result<Vec<Order>> {
        self.manager.list_all_orders().await
    }
}

/// A live stream of serialized [`OrderEvent`]s
///
/// Implemented by the in-process [`Subscription`] and by remote socket
/// clients.
#[async_trait]
pub trait EventFeed: Send {
    /// Next event or gap; `None` once the feed has closed
    async fn next_event(&mut self) -> Option<FeedItem>;
}

#[async_trait]
impl EventFeed for Subscription {
    async fn next_event(&mut self) -> Option<FeedItem> {
        self.recv().await
    }
}

/// Keeps an [`OrderBoard`] in sync from events and polls
pub struct Reconciler<S> {
    source: S,
    policy: PollPolicy,
    board: Arc<RwLock<OrderBoard>>,
}

impl<S: OrderSource> Reconciler<S> {
    pub fn new(source: S, policy: PollPolicy, scope: BoardScope) -> Self {
        Self {
            source,
            policy,
            board: Arc::new(RwLock::new(OrderBoard::new(scope))),
        }
    }

    /// Shared handle to the board, for rendering
    pub fn board(&self) -> Arc<RwLock<OrderBoard>> {
        Arc::clone(&self.board)
    }

    /// Fetch once and fold the result into the board
    ///
    /// # Returns
    /// `true` if the fetch succeeded
    pub async fn refresh(&self) -> bool {
        match self.source.fetch().await {
            Ok(orders) => {
                self.board.write().apply_snapshot(orders);
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Order list fetch failed, keeping last snapshot");
                self.board.write().mark_fetch_failed(e.to_string());
                false
            }
        }
    }

    /// Run until `shutdown` fires
    ///
    /// Loads once up front, then applies events from `events` while it is
    /// open and polls per the policy. A gap in the feed triggers a re-fetch,
    /// deferred until `min_interval` after the last one. When the
    /// subscription closes, polling takes over after the grace period.
    pub async fn run<F: EventFeed>(&self, mut events: Option<F>, shutdown: CancellationToken) {
        self.refresh().await;
        let mut last_poll = Some(Instant::now());
        let mut last_connected = events.as_ref().map(|_| Instant::now());
        let mut resync_pending = false;

        let mut ticker = tokio::time::interval(self.policy.min_interval.max(Duration::from_millis(100)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!("Reconciler stopped");
                    break;
                }

                _ = ticker.tick() => {
                    let now = Instant::now();
                    if events.is_some() {
                        last_connected = Some(now);
                    }
                    let resync_due = resync_pending && self.policy.allows_refresh(now, last_poll);
                    if resync_due || self.policy.should_poll(now, last_poll, last_connected) {
                        self.refresh().await;
                        last_poll = Some(now);
                        resync_pending = false;
                    }
                }

                item = next_event(&mut events) => match item {
                    Some(FeedItem::Event(text)) => match serde_json::from_str::<OrderEvent>(&text) {
                        Ok(event) => {
                            self.board.write().apply_event(&event);
                        }
                        Err(e) => tracing::warn!(error = %e, "Ignoring unreadable order event"),
                    },
                    Some(FeedItem::Gap(skipped)) => {
                        tracing::info!(skipped, "Realtime events missed, re-fetching");
                        let now = Instant::now();
                        if self.policy.allows_refresh(now, last_poll) {
                            self.refresh().await;
                            last_poll = Some(now);
                        } else {
                            resync_pending = true;
                        }
                    }
                    None => {
                        tracing::info!("Realtime channel closed, falling back to polling");
                        events = None;
                        last_connected = Some(Instant::now());
                    }
                },
            }
        }
    }
}

async fn next_event<F: EventFeed>(events: &mut Option<F>) -> Option<FeedItem> {
    match events {
        Some(feed) => feed.next_event().await,
        None => std::future::pending().await,
    }
}
