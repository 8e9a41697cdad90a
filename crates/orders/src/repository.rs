//! Order repository
//!
//! The only code that touches the `orders` collection. Every document read
//! from the store goes through [`canonicalize`], so callers never see legacy
//! id or address aliases.

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::sync::Arc;

use observability::OrderMetrics;

use crate::address::normalize_address;
use crate::error::{OrderError, Result};
use crate::store::{ConditionalUpdate, Direction, Document, DocumentStore, Precondition, Query, StoreResult};
use crate::transition::{StateMachine, Transition};
use crate::types::{Actor, NewOrder, Order, OrderStatus, StatusChange};

/// Collection holding order documents
pub const ORDERS: &str = "orders";

const ID_KEYS: &[&str] = &["id", "_id", "orderId"];
const USER_ID_KEYS: &[&str] = &["userId", "user_id", "uid"];
const ADDRESS_KEYS: &[&str] = &["shippingAddress", "address", "shipping"];
const TOTAL_KEYS: &[&str] = &["totalAmount", "total", "amount"];
const TEST_FLAG_KEYS: &[&str] = &["isTest", "test", "synthetic"];
const PRODUCT_ID_KEYS: &[&str] = &["productId", "product_id", "id"];

/// Query bounds for the repository
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepositorySettings {
    /// Most orders returned for one customer
    pub user_query_limit: usize,
    /// Most documents read when the indexed per-user query fails
    pub fallback_scan_limit: usize,
    /// Most orders returned by the admin listing
    pub admin_list_limit: usize,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            user_query_limit: 200,
            fallback_scan_limit: 1000,
            admin_list_limit: 1000,
        }
    }
}

/// Result of [`OrderRepository::update_status`]
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    /// The order as stored after the call
    pub order: Order,
    /// Status observed before the call
    pub previous: OrderStatus,
    /// `false` when the request was a no-op and nothing was written
    pub changed: bool,
}

/// Data access for the `orders` collection
pub struct OrderRepository {
    store: Arc<dyn DocumentStore>,
    state_machine: StateMachine,
    settings: RepositorySettings,
    metrics: OrderMetrics,
}

impl OrderRepository {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        state_machine: StateMachine,
        settings: RepositorySettings,
        metrics: OrderMetrics,
    ) -> Self {
        Self {
            store,
            state_machine,
            settings,
            metrics,
        }
    }

    pub fn state_machine(&self) -> &StateMachine {
        &self.state_machine
    }

    pub fn settings(&self) -> RepositorySettings {
        self.settings
    }

    /// Fetch one order in canonical shape; `Ok(None)` when it does not exist
    pub async fn get_by_id(&self, order_id: &str) -> Result<Option<Order>> {
        match self.store.get(ORDERS, order_id).await? {
            Some(doc) => canonicalize(doc).map(Some),
            None => Ok(None),
        }
    }

    /// A customer's orders, newest first, without test orders
    ///
    /// The indexed query runs once per owner field name, so orders written
    /// under a legacy owner key are found the same way as current ones.
    /// When it fails (missing index, permission error) this degrades to a
    /// bounded scan of the most recent orders instead of failing the caller.
    pub async fn get_by_user(&self, user_id: &str) -> Result<Vec<Order>> {
        let docs = match self.query_by_owner(user_id).await {
            Ok(docs) => docs,
            Err(e) => {
                tracing::warn!(
                    user_id,
                    error = %e,
                    scan_limit = self.settings.fallback_scan_limit,
                    "Indexed order query failed, falling back to bounded scan"
                );
                self.metrics.fallback_scan();

                let scan = Query::new()
                    .order_by("createdAt", Direction::Descending)
                    .limit(self.settings.fallback_scan_limit);
                self.store.query(ORDERS, &scan).await?
            }
        };

        let mut seen = HashSet::new();
        let mut orders: Vec<Order> = canonicalize_all(docs)
            .into_iter()
            .filter(|order| order.is_owned_by(user_id) && !order.is_test)
            .filter(|order| seen.insert(order.id.clone()))
            .collect();
        sort_newest_first(&mut orders);
        orders.truncate(self.settings.user_query_limit);
        Ok(orders)
    }

    async fn query_by_owner(&self, user_id: &str) -> StoreResult<Vec<Document>> {
        let mut docs = Vec::new();
        for key in USER_ID_KEYS {
            let indexed = Query::new()
                .where_eq(*key, user_id)
                .order_by("createdAt", Direction::Descending)
                .limit(self.settings.user_query_limit);
            docs.extend(self.store.query(ORDERS, &indexed).await?);
        }
        Ok(docs)
    }

    /// Every non-test order, newest first
    pub async fn list_all(&self) -> Result<Vec<Order>> {
        let query = Query::new()
            .order_by("createdAt", Direction::Descending)
            .limit(self.settings.admin_list_limit);

        let mut orders: Vec<Order> = canonicalize_all(self.store.query(ORDERS, &query).await?)
            .into_iter()
            .filter(|order| !order.is_test)
            .collect();
        sort_newest_first(&mut orders);
        Ok(orders)
    }

    /// Persist a new order
    ///
    /// Status defaults to pending, and the history starts with the initial
    /// status. The store assigns id and timestamps.
    pub async fn create(&self, new_order: NewOrder, actor: &Actor) -> Result<Order> {
        if new_order.items.is_empty() {
            return Err(OrderError::validation("Order must contain at least one item"));
        }

        let status = new_order.status.unwrap_or_default();
        let mut doc = serde_json::to_value(&new_order)
            .map_err(|e| OrderError::Internal(format!("failed to encode order: {}", e)))?;
        if let Value::Object(map) = &mut doc {
            map.insert("status".to_string(), json!(status));
            map.insert(
                "statusHistory".to_string(),
                json!([StatusChange::new(status, actor)]),
            );
        }

        let stored = self.store.create(ORDERS, doc).await?;
        let order = canonicalize(stored)?;

        self.metrics.order_created();
        tracing::info!(
            order_id = %order.id,
            user_id = %order.user_id,
            total = %order.total_amount,
            "Order created"
        );
        Ok(order)
    }

    /// Move an order to `to` on behalf of `actor`
    ///
    /// Customers must own the order. The legality check runs against the
    /// status read here, and the write only lands if the stored status is
    /// still that value; otherwise the call fails with [`OrderError::Conflict`]
    /// and nothing is written.
    pub async fn update_status(&self, order_id: &str, to: OrderStatus, actor: &Actor) -> Result<StatusUpdate> {
        let Some(raw) = self.store.get(ORDERS, order_id).await? else {
            return Err(OrderError::NotFound(order_id.to_string()));
        };
        let observed_status = raw.get("status").cloned().unwrap_or(Value::Null);
        let current = canonicalize(raw)?;
        let from = current.status;

        if let Actor::Customer(user_id) = actor {
            if !current.is_owned_by(user_id) {
                self.metrics.transition_rejected("forbidden");
                return Err(OrderError::Forbidden(
                    "You can only modify your own orders".to_string(),
                ));
            }
        }

        match self.state_machine.check(from, to, actor) {
            Ok(Transition::Apply) => {}
            Ok(Transition::NoOp) => {
                tracing::debug!(order_id, status = %from, "Status unchanged, nothing to write");
                return Ok(StatusUpdate {
                    order: current,
                    previous: from,
                    changed: false,
                });
            }
            Err(e) => {
                self.metrics.transition_rejected(e.kind());
                tracing::debug!(order_id, %from, %to, error = %e, "Transition rejected");
                return Err(e);
            }
        }

        let mut history = current.status_history.clone();
        history.push(StatusChange::new(to, actor));
        let patch = json!({
            "userId": current.user_id,
            "status": to,
            "statusHistory": history,
            "shippingAddress": current.shipping_address,
        });

        let guard = Precondition::field_equals("status", observed_status);
        match self.store.update_if(ORDERS, order_id, &guard, patch).await? {
            ConditionalUpdate::Updated(doc) => {
                let order = canonicalize(doc)?;
                self.metrics.transition(from.as_str(), to.as_str());
                tracing::info!(
                    order_id,
                    %from,
                    %to,
                    role = ?actor.role(),
                    "Order status changed"
                );
                Ok(StatusUpdate {
                    order,
                    previous: from,
                    changed: true,
                })
            }
            ConditionalUpdate::NotFound => Err(OrderError::NotFound(order_id.to_string())),
            ConditionalUpdate::PreconditionFailed(doc) => {
                let now = canonicalize(doc)?.status;
                self.metrics.transition_rejected("conflict");
                tracing::warn!(order_id, %from, %to, current = %now, "Lost concurrent status update");
                Err(OrderError::Conflict {
                    order_id: order_id.to_string(),
                    current: now,
                    requested: to,
                })
            }
        }
    }

    /// Hard delete; `false` if there was nothing to delete
    pub async fn delete(&self, order_id: &str) -> Result<bool> {
        let deleted = self.store.delete(ORDERS, order_id).await?;
        if deleted {
            tracing::info!(order_id, "Order deleted");
        }
        Ok(deleted)
    }
}

fn sort_newest_first(orders: &mut [Order]) {
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// Canonicalize a batch, skipping documents that cannot be read as orders
fn canonicalize_all(docs: Vec<Document>) -> Vec<Order> {
    docs.into_iter()
        .filter_map(|doc| match canonicalize(doc) {
            Ok(order) => Some(order),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable order document");
                None
            }
        })
        .collect()
}

/// Turn a stored document of any historical shape into an [`Order`]
///
/// - id: the store key (`id`), else `_id`, else `orderId`; the aliases are dropped
/// - owner: `userId`, `user_id` or `uid`
/// - address: `shippingAddress`, `address` or `shipping`, normalized
/// - total: `totalAmount`, `total` or `amount`
/// - status: case-insensitive, `canceled` accepted
/// - timestamps: RFC 3339 strings, epoch milliseconds or `{seconds, nanoseconds}`
pub fn canonicalize(doc: Document) -> Result<Order> {
    let Value::Object(mut raw) = doc else {
        return Err(OrderError::Internal("order document is not an object".to_string()));
    };

    let id = first_string(&raw, ID_KEYS)
        .ok_or_else(|| OrderError::Internal("order document has no id".to_string()))?;
    let malformed = |what: &str| OrderError::Internal(format!("order {} has {}", id, what));

    let user_id = first_string(&raw, USER_ID_KEYS).ok_or_else(|| malformed("no owner"))?;

    let status = match raw.get("status") {
        Some(Value::String(s)) => s.parse::<OrderStatus>().map_err(|_| malformed("an unknown status"))?,
        None | Some(Value::Null) => OrderStatus::default(),
        Some(_) => return Err(malformed("a non-string status")),
    };

    let address = first_present(&raw, ADDRESS_KEYS).cloned().unwrap_or(Value::Null);

    let created_at = parse_timestamp(raw.get("createdAt"));
    let updated_at = parse_timestamp(raw.get("updatedAt"));
    let created_at = created_at.or(updated_at).unwrap_or(DateTime::UNIX_EPOCH);
    let updated_at = updated_at.unwrap_or(created_at);

    let items: Vec<Value> = match raw.remove("items") {
        Some(Value::Array(items)) => items.into_iter().map(canonical_item).collect(),
        _ => Vec::new(),
    };

    let history: Vec<Value> = match raw.remove("statusHistory") {
        Some(Value::Array(entries)) => entries
            .into_iter()
            .filter(|entry| serde_json::from_value::<StatusChange>(entry.clone()).is_ok())
            .collect(),
        _ => Vec::new(),
    };

    let is_test = TEST_FLAG_KEYS
        .iter()
        .any(|key| raw.get(*key).and_then(Value::as_bool).unwrap_or(false));

    let mut canonical = Map::new();
    canonical.insert("id".to_string(), Value::String(id.clone()));
    canonical.insert("userId".to_string(), Value::String(user_id));
    for key in ["userEmail", "userName", "paymentMethod", "shippingCost", "discount"] {
        if let Some(value) = raw.get(key).filter(|v| !v.is_null()) {
            canonical.insert(key.to_string(), value.clone());
        }
    }
    canonical.insert("items".to_string(), Value::Array(items));
    canonical.insert("shippingAddress".to_string(), json!(normalize_address(&address)));
    canonical.insert(
        "totalAmount".to_string(),
        first_present(&raw, TOTAL_KEYS).cloned().unwrap_or(json!(0)),
    );
    canonical.insert("status".to_string(), json!(status));
    canonical.insert("statusHistory".to_string(), Value::Array(history));
    canonical.insert("isTest".to_string(), Value::Bool(is_test));
    canonical.insert("createdAt".to_string(), json!(created_at));
    canonical.insert("updatedAt".to_string(), json!(updated_at));

    serde_json::from_value(Value::Object(canonical))
        .map_err(|e| OrderError::Internal(format!("order {} is malformed: {}", id, e)))
}

fn canonical_item(item: Value) -> Value {
    let Value::Object(mut item) = item else {
        return item;
    };

    if !item.contains_key("productId") {
        if let Some(product_id) = first_string(&item, PRODUCT_ID_KEYS) {
            item.insert("productId".to_string(), Value::String(product_id));
        }
    }
    item.remove("product_id");
    item.remove("id");

    if let Some(Value::String(qty)) = item.get("quantity") {
        if let Ok(qty) = qty.trim().parse::<u32>() {
            item.insert("quantity".to_string(), json!(qty));
        }
    }
    Value::Object(item)
}

fn first_present<'a>(raw: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| raw.get(*key))
        .find(|value| !value.is_null())
}

fn first_string(raw: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match raw.get(*key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        Value::Object(o) => {
            let seconds = o.get("seconds").or_else(|| o.get("_seconds"))?.as_i64()?;
            let nanos = o
                .get("nanoseconds")
                .or_else(|| o.get("_nanoseconds"))
                .and_then(Value::as_u64)
                .unwrap_or(0);
            DateTime::from_timestamp(seconds, u32::try_from(nanos).unwrap_or(0))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::ShippingAddress;
    use crate::store::memory::InMemoryDocumentStore;
    use crate::store::{StoreError, StoreResult};
    use crate::transition::TransitionPolicy;
    use crate::types::{Amount, OrderItem};
    use assert_matches::assert_matches;
    use async_trait::async_trait;

    fn repository(store: Arc<dyn DocumentStore>) -> OrderRepository {
        OrderRepository::new(
            store,
            StateMachine::new(TransitionPolicy::default()),
            RepositorySettings::default(),
            OrderMetrics::new(),
        )
    }

    fn new_order(user_id: &str) -> NewOrder {
        NewOrder {
            user_id: user_id.to_string(),
            user_email: Some(format!("{}@example.com", user_id)),
            user_name: None,
            items: vec![OrderItem {
                product_id: "p1".to_string(),
                name: "Lamp".to_string(),
                price: Amount::from(100u32),
                quantity: 2,
                image: None,
            }],
            shipping_address: normalize_address(&json!({
                "street": "1 Main St", "city": "X", "state": "Y", "zipCode": "1", "country": "Z"
            })),
            payment_method: "cod".to_string(),
            shipping_cost: Amount::zero(),
            discount: Amount::zero(),
            total_amount: Amount::from(200u32),
            status: None,
            is_test: false,
        }
    }

    #[test]
    fn test_canonicalize_legacy_document() {
        let order = canonicalize(json!({
            "_id": "legacy-1",
            "user_id": "u1",
            "address": { "addressLine1": "9 Elm", "city": "Oslo", "postalCode": "0150", "country": "NO" },
            "items": [{ "id": "p9", "name": "Cup", "price": "4.50", "quantity": "2" }],
            "total": 9,
            "status": "Processing",
            "createdAt": 1_700_000_000_000i64,
        }))
        .unwrap();

        assert_eq!(order.id, "legacy-1");
        assert_eq!(order.user_id, "u1");
        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(order.shipping_address.street, "9 Elm");
        assert_eq!(order.shipping_address.postal_code, "0150");
        assert_eq!(order.items[0].product_id, "p9");
        assert_eq!(order.items[0].quantity, 2);
        assert_eq!(order.total_amount, Amount::from(9u32));
        assert_eq!(order.created_at.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(order.updated_at, order.created_at);

        let wire = serde_json::to_value(&order).unwrap();
        assert!(wire.get("_id").is_none());
        assert!(wire.get("orderId").is_none());
        assert_eq!(wire["shippingAddress"]["zipCode"], "0150");
    }

    #[test]
    fn test_canonicalize_prefers_store_key() {
        let order = canonicalize(json!({
            "id": "key", "_id": "old", "orderId": "older", "userId": "u1", "items": [], "totalAmount": 0
        }))
        .unwrap();
        assert_eq!(order.id, "key");
    }

    #[test]
    fn test_canonicalize_is_stable() {
        let first = canonicalize(json!({
            "orderId": "o1", "userId": "u1", "shipping": "5 Oak Rd",
            "items": [{ "productId": "p1", "price": 3, "quantity": 1 }],
            "totalAmount": 3, "status": "canceled", "isTest": true,
            "createdAt": { "seconds": 1_700_000_000, "nanoseconds": 0 },
        }))
        .unwrap();
        let second = canonicalize(serde_json::to_value(&first).unwrap()).unwrap();
        assert_eq!(first, second);
        assert!(second.is_test);
        assert_eq!(second.status, OrderStatus::Cancelled);
    }

    #[test]
    fn test_canonicalize_rejects_unknown_status() {
        let result = canonicalize(json!({ "id": "o1", "userId": "u1", "status": "refunded" }));
        assert_matches!(result, Err(OrderError::Internal(_)));
    }

    #[tokio::test]
    async fn test_create_defaults_to_pending_with_history() {
        let repo = repository(Arc::new(InMemoryDocumentStore::new()));
        let order = repo
            .create(new_order("u1"), &Actor::Customer("u1".into()))
            .await
            .unwrap();

        assert!(!order.id.is_empty());
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.status_history.len(), 1);
        assert_eq!(order.status_history[0].status, OrderStatus::Pending);
        assert_eq!(repo.get_by_id(&order.id).await.unwrap(), Some(order));
    }

    #[tokio::test]
    async fn test_create_rejects_empty_items() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let repo = repository(store.clone());
        let mut order = new_order("u1");
        order.items.clear();

        assert_matches!(
            repo.create(order, &Actor::Customer("u1".into())).await,
            Err(OrderError::Validation(_))
        );
        assert!(store.is_empty(ORDERS));
    }

    #[tokio::test]
    async fn test_get_by_user_scopes_and_hides_test_orders() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let repo = repository(store.clone());
        let customer = Actor::Customer("u1".into());

        let first = repo.create(new_order("u1"), &customer).await.unwrap();
        let second = repo.create(new_order("u1"), &customer).await.unwrap();
        repo.create(new_order("u2"), &Actor::Customer("u2".into())).await.unwrap();
        let mut synthetic = new_order("u1");
        synthetic.is_test = true;
        repo.create(synthetic, &customer).await.unwrap();

        let ids: Vec<String> = repo.get_by_user("u1").await.unwrap().into_iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![second.id.clone(), first.id.clone()]);

        store.set_fail_filtered_queries(true);
        let fallback: Vec<String> = repo.get_by_user("u1").await.unwrap().into_iter().map(|o| o.id).collect();
        assert_eq!(fallback, vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn test_legacy_owner_key_is_listed_with_and_without_index() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let repo = repository(store.clone());
        store
            .seed(
                ORDERS,
                "legacy-1",
                json!({
                    "user_id": "u1", "status": "pending", "total": 3,
                    "items": [{ "productId": "p1", "price": 3, "quantity": 1 }],
                    "createdAt": "2024-01-01T00:00:00Z",
                }),
            )
            .unwrap();
        let current = repo.create(new_order("u1"), &Actor::Customer("u1".into())).await.unwrap();

        let expected = vec![current.id.clone(), "legacy-1".to_string()];
        let indexed: Vec<String> = repo.get_by_user("u1").await.unwrap().into_iter().map(|o| o.id).collect();
        assert_eq!(indexed, expected);

        store.set_fail_filtered_queries(true);
        let scanned: Vec<String> = repo.get_by_user("u1").await.unwrap().into_iter().map(|o| o.id).collect();
        assert_eq!(scanned, expected);
        store.set_fail_filtered_queries(false);

        // A status write stores the owner under the canonical key
        repo.update_status("legacy-1", OrderStatus::Processing, &Actor::Admin(None))
            .await
            .unwrap();
        let raw = store.get(ORDERS, "legacy-1").await.unwrap().unwrap();
        assert_eq!(raw["userId"], "u1");
        assert!(repo.get_by_user("u2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fallback_scan_is_bounded() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let repo = OrderRepository::new(
            store.clone(),
            StateMachine::default(),
            RepositorySettings {
                fallback_scan_limit: 2,
                ..RepositorySettings::default()
            },
            OrderMetrics::new(),
        );
        let customer = Actor::Customer("u1".into());
        for _ in 0..3 {
            repo.create(new_order("u1"), &customer).await.unwrap();
        }

        store.set_fail_filtered_queries(true);
        assert_eq!(repo.get_by_user("u1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_status_paths() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let repo = repository(store.clone());
        let order = repo.create(new_order("u1"), &Actor::Customer("u1".into())).await.unwrap();

        let update = repo
            .update_status(&order.id, OrderStatus::Processing, &Actor::Admin(None))
            .await
            .unwrap();
        assert!(update.changed);
        assert_eq!(update.previous, OrderStatus::Pending);
        assert!(update.order.updated_at > order.updated_at);
        assert_eq!(update.order.status_history.len(), 2);

        let noop = repo
            .update_status(&order.id, OrderStatus::Processing, &Actor::Admin(None))
            .await
            .unwrap();
        assert!(!noop.changed);
        assert_eq!(noop.order.updated_at, update.order.updated_at);

        assert_matches!(
            repo.update_status(&order.id, OrderStatus::Cancelled, &Actor::Customer("u2".into())).await,
            Err(OrderError::Forbidden(_))
        );
        assert_matches!(
            repo.update_status("missing", OrderStatus::Shipped, &Actor::Admin(None)).await,
            Err(OrderError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn test_rejected_transition_leaves_order_untouched() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let repo = repository(store.clone());
        let order = repo.create(new_order("u1"), &Actor::Customer("u1".into())).await.unwrap();
        repo.update_status(&order.id, OrderStatus::Cancelled, &Actor::Customer("u1".into()))
            .await
            .unwrap();
        let before = repo.get_by_id(&order.id).await.unwrap().unwrap();

        assert_matches!(
            repo.update_status(&order.id, OrderStatus::Shipped, &Actor::Admin(None)).await,
            Err(OrderError::IllegalTransition { .. })
        );
        assert_eq!(repo.get_by_id(&order.id).await.unwrap().unwrap(), before);
    }

    /// Serves a fixed, stale copy of every document on `get`
    struct StaleReadStore {
        inner: InMemoryDocumentStore,
        stale: Document,
    }

    #[async_trait]
    impl DocumentStore for StaleReadStore {
        async fn get(&self, _collection: &str, _id: &str) -> StoreResult<Option<Document>> {
            Ok(Some(self.stale.clone()))
        }
        async fn create(&self, collection: &str, data: Document) -> StoreResult<Document> {
            self.inner.create(collection, data).await
        }
        async fn update(&self, collection: &str, id: &str, patch: Document) -> StoreResult<Document> {
            self.inner.update(collection, id, patch).await
        }
        async fn update_if(
            &self,
            collection: &str,
            id: &str,
            precondition: &Precondition,
            patch: Document,
        ) -> StoreResult<ConditionalUpdate> {
            self.inner.update_if(collection, id, precondition, patch).await
        }
        async fn delete(&self, collection: &str, id: &str) -> StoreResult<bool> {
            self.inner.delete(collection, id).await
        }
        async fn query(&self, collection: &str, query: &Query) -> StoreResult<Vec<Document>> {
            self.inner.query(collection, query).await
        }
    }

    #[tokio::test]
    async fn test_lost_race_is_a_conflict() {
        let inner = InMemoryDocumentStore::new();
        let doc = json!({
            "userId": "u1", "status": "pending", "totalAmount": 1,
            "items": [{ "productId": "p1", "price": 1, "quantity": 1 }],
            "createdAt": "2024-01-01T00:00:00Z",
        });
        // Another admin already moved it on
        let mut moved = doc.clone();
        moved["status"] = json!("processing");
        inner.seed(ORDERS, "o1", moved).unwrap();

        let mut stale = doc;
        stale["id"] = json!("o1");
        let repo = repository(Arc::new(StaleReadStore { inner, stale }));

        let result = repo
            .update_status("o1", OrderStatus::Cancelled, &Actor::Admin(None))
            .await;
        assert_matches!(
            result,
            Err(OrderError::Conflict { current: OrderStatus::Processing, requested: OrderStatus::Cancelled, .. })
        );
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_as_storage_error() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let repo = repository(store.clone());
        store.set_fail_writes(true);

        let err = repo
            .create(new_order("u1"), &Actor::Customer("u1".into()))
            .await
            .unwrap_err();
        assert_matches!(err, OrderError::Storage(_));
        assert!(store.is_empty(ORDERS));
        let converted: OrderError = StoreError::Query("x".into()).into();
        assert_matches!(converted, OrderError::Storage(_));
    }

    #[test]
    fn test_address_is_canonical_on_order() {
        let order = canonicalize(json!({
            "id": "o1", "userId": "u1", "items": [], "totalAmount": 0,
            "shippingAddress": { "streetAddress": "2 Pine", "zip": "99" },
        }))
        .unwrap();
        assert_eq!(
            order.shipping_address,
            ShippingAddress {
                street: "2 Pine".to_string(),
                postal_code: "99".to_string(),
                ..ShippingAddress::default()
            }
        );
    }
}
