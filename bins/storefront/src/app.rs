//! Turns a [`StorefrontConfig`] into running services

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::Router;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use config::{AuthConfig, HttpConfig, OrdersConfig, StorageBackend, StorageConfig, StorefrontConfig};
use observability::OrderMetrics;
use orders::api::{create_router, AuthSettings, OrdersApiState};
use orders::repository::ORDERS;
use orders::store::Query;
use orders::{
    Amount, BroadcastHub, DocumentStore, DocumentUserDirectory, InMemoryDocumentStore, Notifier, OrderManager,
    OrderRepository, RepositorySettings, StateMachine, TotalsPolicy, TransitionPolicy,
};
use server::{health_routes, HealthState, ReadinessCheck, ServerConfig};

/// Everything the HTTP layer needs, built once at startup
pub struct Services {
    pub store: Arc<dyn DocumentStore>,
    pub hub: BroadcastHub,
    pub manager: Arc<OrderManager>,
}

pub fn transition_policy(orders: &OrdersConfig) -> TransitionPolicy {
    TransitionPolicy {
        allow_forward_skips: orders.allow_forward_skips,
        allow_admin_rollback: orders.allow_admin_rollback,
    }
}

pub fn repository_settings(orders: &OrdersConfig) -> RepositorySettings {
    RepositorySettings {
        user_query_limit: orders.user_query_limit,
        fallback_scan_limit: orders.fallback_scan_limit,
        admin_list_limit: orders.admin_list_limit,
    }
}

pub fn totals_policy(orders: &OrdersConfig) -> Result<TotalsPolicy> {
    let tolerance: Amount = orders
        .total_tolerance
        .parse()
        .with_context(|| format!("Invalid orders.total_tolerance: {}", orders.total_tolerance))?;
    Ok(TotalsPolicy {
        verify: orders.verify_totals,
        tolerance,
    })
}

pub fn auth_settings(auth: &AuthConfig) -> AuthSettings {
    AuthSettings {
        user_header: auth.user_header.to_lowercase(),
        email_header: auth.email_header.to_lowercase(),
        name_header: auth.name_header.to_lowercase(),
        admin_user_ids: auth.admin_user_ids.iter().cloned().collect::<HashSet<_>>(),
    }
}

pub fn server_config(http: &HttpConfig) -> ServerConfig {
    ServerConfig::new(http.host.clone(), http.http_port)
        .with_request_timeout(Duration::from_secs(http.request_timeout_seconds))
        .with_shutdown_timeout(Duration::from_secs(http.shutdown_timeout_seconds))
        .with_cors_origins(http.cors_origins.clone())
}

/// Open the configured document store
pub async fn open_store(storage: &StorageConfig) -> Result<Arc<dyn DocumentStore>> {
    match storage.backend {
        StorageBackend::Memory => {
            info!("Using the in-memory document store");
            Ok(Arc::new(InMemoryDocumentStore::new()))
        }
        StorageBackend::Postgres => {
            let pg = storage
                .postgres
                .as_ref()
                .context("storage.postgres is required when backend is postgres")?;
            open_postgres(pg).await
        }
    }
}

#[cfg(feature = "postgres")]
async fn open_postgres(pg: &config::PostgresConfig) -> Result<Arc<dyn DocumentStore>> {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(pg.max_connections)
        .acquire_timeout(Duration::from_secs(pg.connection_timeout_seconds))
        .connect(&pg.connection_url())
        .await
        .with_context(|| format!("Failed to connect to PostgreSQL at {}:{}", pg.host, pg.port))?;

    let store = orders::PostgresDocumentStore::new(pool);
    store
        .migrate()
        .await
        .context("Failed to prepare the documents table")?;

    info!(host = %pg.host, database = %pg.database, "Using the PostgreSQL document store");
    Ok(Arc::new(store))
}

#[cfg(not(feature = "postgres"))]
async fn open_postgres(_pg: &config::PostgresConfig) -> Result<Arc<dyn DocumentStore>> {
    anyhow::bail!("storage.backend is postgres but this binary was built without the `postgres` feature")
}

pub fn build_services(config: &StorefrontConfig, store: Arc<dyn DocumentStore>) -> Result<Services> {
    let metrics = OrderMetrics::new();
    let hub = BroadcastHub::new(config.realtime.channel_capacity, metrics.clone());

    let repository = OrderRepository::new(
        Arc::clone(&store),
        StateMachine::new(transition_policy(&config.orders)),
        repository_settings(&config.orders),
        metrics.clone(),
    );
    let notifier: Arc<dyn Notifier> = Arc::new(hub.clone());
    let users = Arc::new(DocumentUserDirectory::new(Arc::clone(&store)));
    let manager = OrderManager::new(
        repository,
        notifier,
        users,
        totals_policy(&config.orders)?,
        metrics,
    );

    Ok(Services {
        store,
        hub,
        manager: Arc::new(manager),
    })
}

/// Order API, realtime socket and health routes
///
/// Realtime sockets close when `shutdown` is cancelled.
pub fn build_router(config: &StorefrontConfig, services: &Services, shutdown: CancellationToken) -> Router {
    let state = OrdersApiState::new(
        Arc::clone(&services.manager),
        services.hub.clone(),
        auth_settings(&config.auth),
    )
    .with_shutdown(shutdown);

    let health = HealthState::new(config.service.name.clone()).with_check(Arc::new(StoreReadiness {
        store: Arc::clone(&services.store),
    }));

    create_router(Arc::new(state)).merge(health_routes(Arc::new(health)))
}

/// Ready while the document store answers a one-row query
struct StoreReadiness {
    store: Arc<dyn DocumentStore>,
}

#[async_trait]
impl ReadinessCheck for StoreReadiness {
    fn name(&self) -> &str {
        "document_store"
    }

    async fn check(&self) -> std::result::Result<(), String> {
        self.store
            .query(ORDERS, &Query::new().limit(1))
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn router(config: &StorefrontConfig) -> Router {
        let store = open_store(&config.storage).await.unwrap();
        let services = build_services(config, store).unwrap();
        build_router(config, &services, CancellationToken::new())
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn checkout(total: u32) -> Request<Body> {
        let body = json!({
            "items": [{ "productId": "p1", "price": 10, "quantity": 1 }],
            "shippingAddress": {
                "street": "1 Main St", "city": "X", "state": "Y", "zipCode": "1", "country": "Z"
            },
            "paymentMethod": "cod",
            "totalAmount": total
        });
        Request::post("/orders")
            .header("x-user-id", "u1")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_default_wiring_is_ready() {
        let router = router(&StorefrontConfig::default()).await;
        let (status, body) = send(&router, Request::get("/health/ready").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["components"][0]["component"], "document_store");
    }

    #[tokio::test]
    async fn test_order_settings_reach_the_service() {
        let router = router(&StorefrontConfig::default()).await;
        let (status, _) = send(&router, checkout(99)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let mut trusting = StorefrontConfig::default();
        trusting.orders.verify_totals = false;
        let router = self::router(&trusting).await;
        let (status, body) = send(&router, checkout(99)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["totalAmount"], 99);
    }

    #[tokio::test]
    async fn test_admin_allowlist_from_config() {
        let mut config = StorefrontConfig::default();
        config.auth.admin_user_ids = vec!["boss".to_string()];
        let router = router(&config).await;

        let request = Request::get("/admin/orders").header("x-user-id", "u1").body(Body::empty()).unwrap();
        assert_eq!(send(&router, request).await.0, StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_bad_tolerance_is_reported() {
        let mut orders = OrdersConfig::default();
        orders.total_tolerance = "a lot".to_string();
        assert!(totals_policy(&orders).is_err());
    }

    #[cfg(not(feature = "postgres"))]
    #[tokio::test]
    async fn test_postgres_backend_needs_feature() {
        let mut storage = StorageConfig::default();
        storage.backend = StorageBackend::Postgres;
        storage.postgres = config::generate_default_config().storage.postgres;
        assert!(open_store(&storage).await.is_err());
    }
}
