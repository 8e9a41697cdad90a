use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tower::ServiceExt;

use observability::OrderMetrics;

use super::handlers::error_response;
use super::*;
use crate::error::OrderError;
use crate::manager::TotalsPolicy;
use crate::realtime::{Channel, OrderEvent, RecordingNotifier};
use crate::repository::{OrderRepository, RepositorySettings, ORDERS};
use crate::store::memory::InMemoryDocumentStore;
use crate::transition::{StateMachine, TransitionPolicy};
use crate::types::OrderStatus;
use crate::users::InMemoryUserDirectory;

struct TestApp {
    router: Router,
    store: Arc<InMemoryDocumentStore>,
    notifier: Arc<RecordingNotifier>,
}

fn app_with(auth: AuthSettings) -> TestApp {
    let store = Arc::new(InMemoryDocumentStore::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let repository = OrderRepository::new(
        store.clone(),
        StateMachine::new(TransitionPolicy::default()),
        RepositorySettings::default(),
        OrderMetrics::new(),
    );
    let manager = OrderManager::new(
        repository,
        notifier.clone(),
        Arc::new(InMemoryUserDirectory::new()),
        TotalsPolicy::default(),
        OrderMetrics::new(),
    );
    let state = OrdersApiState::new(
        Arc::new(manager),
        BroadcastHub::new(16, OrderMetrics::new()),
        auth,
    );

    TestApp {
        router: create_router(Arc::new(state)),
        store,
        notifier,
    }
}

fn app() -> TestApp {
    app_with(AuthSettings::default())
}

impl TestApp {
    async fn call(&self, method: Method, uri: &str, user: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder
                .header("x-user-id", user)
                .header("x-user-email", format!("{}@example.com", user));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn place(&self, user: &str) -> Value {
        let (status, body) = self.call(Method::POST, "/orders", Some(user), Some(checkout())).await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["data"].clone()
    }
}

fn checkout() -> Value {
    json!({
        "items": [{ "productId": "p1", "price": 100, "quantity": 2 }],
        "shippingAddress": {
            "street": "1 Main St", "city": "X", "state": "Y", "zipCode": "1", "country": "Z"
        },
        "paymentMethod": "cod",
        "totalAmount": 200
    })
}

fn timestamp(value: &Value) -> chrono::DateTime<chrono::Utc> {
    value.as_str().unwrap().parse().unwrap()
}

fn ids(body: &Value) -> Vec<String> {
    body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_checkout_and_customer_listing() {
    let app = app();
    let order = app.place("u1").await;

    assert_eq!(order["status"], "pending");
    assert_eq!(order["userId"], "u1");
    assert_eq!(order["totalAmount"], 200);
    assert_eq!(order["shippingAddress"]["zipCode"], "1");
    assert_eq!(order["shippingAddress"]["postalCode"], "1");
    let id = order["id"].as_str().unwrap().to_string();
    assert!(!id.is_empty());

    let (status, body) = app.call(Method::GET, "/orders", Some("u1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(ids(&body), vec![id]);

    let (_, body) = app.call(Method::GET, "/orders", Some("u2"), None).await;
    assert!(ids(&body).is_empty());
}

#[tokio::test]
async fn test_checkout_rejections() {
    let app = app();

    let (status, body) = app.call(Method::POST, "/orders", None, Some(checkout())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Authentication required");

    let mut empty = checkout();
    empty["items"] = json!([]);
    let (status, body) = app.call(Method::POST, "/orders", Some("u1"), Some(empty)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Order must contain at least one item");

    let mut no_address = checkout();
    no_address.as_object_mut().unwrap().remove("shippingAddress");
    let (status, _) = app.call(Method::POST, "/orders", Some("u1"), Some(no_address)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/orders")
        .header("x-user-id", "u1")
        .header("content-type", "application/json")
        .body(Body::from("{ not json"))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], false);

    assert!(app.store.is_empty(ORDERS));
    assert!(app.notifier.is_empty());
}

#[tokio::test]
async fn test_admin_transition_scenario() {
    let app = app();
    let order = app.place("u1").await;
    let id = order["id"].as_str().unwrap();
    let uri = format!("/admin/orders/{}", id);
    app.notifier.clear();

    let (status, body) = app
        .call(Method::PUT, &uri, Some("admin"), Some(json!({ "status": "processing" })))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["status"], "processing");
    assert!(timestamp(&body["data"]["updatedAt"]) > timestamp(&order["updatedAt"]));
    assert_eq!(app.notifier.events_for(&Channel::User("u1".into())).len(), 1);
    assert_matches::assert_matches!(
        app.notifier.events_for(&Channel::Admin).as_slice(),
        [OrderEvent::OrderStatusChanged { previous_status: OrderStatus::Pending, .. }]
    );

    let (status, body) = app
        .call(Method::PUT, &uri, Some("admin"), Some(json!({ "status": "pending" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let message = body["message"].as_str().unwrap();
    assert!(message.contains("processing") && message.contains("pending"), "{}", message);

    let (status, _) = app
        .call(Method::PUT, &uri, Some("admin"), Some(json!({ "status": "cancelled" })))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, before) = app.call(Method::GET, &uri, Some("admin"), None).await;
    app.notifier.clear();
    let (status, _) = app
        .call(Method::PUT, &uri, Some("admin"), Some(json!({ "status": "shipped" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (_, after) = app.call(Method::GET, &uri, Some("admin"), None).await;
    assert_eq!(before, after);
    assert!(app.notifier.is_empty());
}

#[tokio::test]
async fn test_admin_update_edge_cases() {
    let app = app();
    let order = app.place("u1").await;
    let uri = format!("/admin/orders/{}", order["id"].as_str().unwrap());
    app.notifier.clear();

    let (status, body) = app
        .call(Method::PUT, &uri, Some("admin"), Some(json!({ "status": "Pending" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Order is already pending");
    assert!(app.notifier.is_empty());

    let (status, _) = app
        .call(Method::PUT, &uri, Some("admin"), Some(json!({ "status": "refunded" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call(Method::PUT, &uri, Some("admin"), Some(json!({ "state": "shipped" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .call(Method::PUT, "/admin/orders/missing", Some("admin"), Some(json!({ "status": "shipped" })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Order not found");
}

#[tokio::test]
async fn test_customer_cancel() {
    let app = app();
    let order = app.place("u1").await;
    let id = order["id"].as_str().unwrap();
    let cancel = format!("/orders/{}/cancel", id);

    let (status, _) = app.call(Method::POST, &cancel, Some("u2"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.call(Method::POST, &cancel, Some("u1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "cancelled");

    let shipped = app.place("u1").await;
    let admin_uri = format!("/admin/orders/{}", shipped["id"].as_str().unwrap());
    for status in ["processing", "shipped"] {
        app.call(Method::PUT, &admin_uri, Some("admin"), Some(json!({ "status": status })))
            .await;
    }
    let (status, body) = app
        .call(
            Method::POST,
            &format!("/orders/{}/cancel", shipped["id"].as_str().unwrap()),
            Some("u1"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("shipped"));

    let (status, _) = app.call(Method::POST, "/orders/missing/cancel", Some("u1"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_listing_and_delete() {
    let app = app();
    let first = app.place("u1").await;
    let second = app.place("u2").await;

    let (status, body) = app.call(Method::GET, "/admin/orders", Some("admin"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        ids(&body),
        vec![
            second["id"].as_str().unwrap().to_string(),
            first["id"].as_str().unwrap().to_string()
        ]
    );

    let uri = format!("/admin/orders/{}", first["id"].as_str().unwrap());
    app.notifier.clear();
    let (status, body) = app.call(Method::DELETE, &uri, Some("admin"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Order deleted");
    assert_eq!(app.notifier.events_for(&Channel::Admin).len(), 1);

    let (status, _) = app.call(Method::GET, &uri, Some("admin"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_allowlist() {
    let app = app_with(AuthSettings {
        admin_user_ids: HashSet::from(["boss".to_string()]),
        ..AuthSettings::default()
    });

    let (status, _) = app.call(Method::GET, "/admin/orders", Some("u1"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.call(Method::GET, "/admin/orders", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.call(Method::GET, "/admin/orders", Some("boss"), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_realtime_connections_endpoint() {
    let app = app();
    let (status, body) = app
        .call(Method::GET, "/admin/realtime/connections", Some("admin"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["totalConnections"], 0);
    assert_eq!(body["data"]["connections"], json!([]));
}

#[tokio::test]
async fn test_store_failure_is_500_without_details() {
    let app = app();
    app.store.set_fail_writes(true);

    let (status, body) = app.call(Method::POST, "/orders", Some("u1"), Some(checkout())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!body["message"].as_str().unwrap().contains("writes are disabled"));
    assert!(app.notifier.is_empty());
}

#[test]
fn test_identity_errors_map_to_401_and_403() {
    let (status, Json(body)) = error_response(OrderError::Unauthenticated);
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body.message.as_deref(), Some("Authentication required"));

    let (status, Json(body)) = auth::admin_required();
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body.message.as_deref(), Some("Admin access required"));
}

#[test]
fn test_conflict_maps_to_409() {
    let (status, Json(body)) = error_response(OrderError::Conflict {
        order_id: "o1".into(),
        current: OrderStatus::Cancelled,
        requested: OrderStatus::Processing,
    });
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(!body.success);
    assert!(body.message.unwrap().contains("cancelled"));
}
