//! Storefront configuration
//!
//! A single YAML document (default `storefront.yaml`). Every section is
//! optional and falls back to the values in [`defaults`]; `${VAR}` and
//! `$VAR` references are substituted from the environment before parsing.

use serde::{Deserialize, Serialize};

pub mod defaults;
pub mod parser;
pub mod substitution;
pub mod validator;

pub use defaults::*;
pub use parser::*;
pub use substitution::*;
pub use validator::*;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StorefrontConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub server: HttpConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub orders: OrdersConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
    #[serde(default)]
    pub environment: Environment,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            environment: Environment::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,
    /// Empty allows any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
            request_timeout_seconds: default_request_timeout(),
            shutdown_timeout_seconds: default_shutdown_timeout(),
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// `pretty`, `json` or `compact`
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            port: default_metrics_port(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default)]
    pub postgres: Option<PostgresConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PostgresConfig {
    pub host: String,
    #[serde(default = "default_postgres_port")]
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    #[serde(default = "default_ssl_mode")]
    pub ssl_mode: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_seconds: u64,
}

impl PostgresConfig {
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.user, self.password, self.host, self.port, self.database, self.ssl_mode
        )
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrdersConfig {
    #[serde(default = "default_user_query_limit")]
    pub user_query_limit: usize,
    #[serde(default = "default_fallback_scan_limit")]
    pub fallback_scan_limit: usize,
    #[serde(default = "default_admin_list_limit")]
    pub admin_list_limit: usize,
    /// Decimal string, e.g. "0.01"
    #[serde(default = "default_total_tolerance")]
    pub total_tolerance: String,
    #[serde(default = "default_enabled")]
    pub verify_totals: bool,
    #[serde(default)]
    pub allow_forward_skips: bool,
    #[serde(default)]
    pub allow_admin_rollback: bool,
}

impl Default for OrdersConfig {
    fn default() -> Self {
        Self {
            user_query_limit: default_user_query_limit(),
            fallback_scan_limit: default_fallback_scan_limit(),
            admin_list_limit: default_admin_list_limit(),
            total_tolerance: default_total_tolerance(),
            verify_totals: true,
            allow_forward_skips: false,
            allow_admin_rollback: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RealtimeConfig {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReconcileConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_connected_grace")]
    pub connected_grace_secs: u64,
    #[serde(default = "default_min_poll_interval")]
    pub min_poll_interval_secs: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            connected_grace_secs: default_connected_grace(),
            min_poll_interval_secs: default_min_poll_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Empty means every authenticated caller may use admin routes
    #[serde(default)]
    pub admin_user_ids: Vec<String>,
    #[serde(default = "default_user_header")]
    pub user_header: String,
    #[serde(default = "default_email_header")]
    pub email_header: String,
    #[serde(default = "default_name_header")]
    pub name_header: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_user_ids: Vec::new(),
            user_header: default_user_header(),
            email_header: default_email_header(),
            name_header: default_name_header(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: StorefrontConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.service.name, "storefront");
        assert_eq!(config.server.http_port, 8080);
        assert_eq!(config.metrics.port, 9090);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.orders.user_query_limit, 200);
        assert_eq!(config.orders.fallback_scan_limit, 1000);
        assert_eq!(config.orders.total_tolerance, "0.01");
        assert!(config.orders.verify_totals);
        assert!(!config.orders.allow_forward_skips);
        assert_eq!(config.realtime.channel_capacity, 64);
        assert_eq!(config.reconcile.poll_interval_secs, 30);
        assert_eq!(config.auth.user_header, "x-user-id");
    }

    #[test]
    fn test_parse_full_document() {
        let yaml = r#"
service:
  name: shop
  environment: production
server:
  host: 127.0.0.1
  http_port: 3000
  cors_origins: ["https://shop.example.com"]
logging:
  format: json
storage:
  backend: postgres
  postgres:
    host: db
    database: shop
    user: shop
    password: secret
orders:
  verify_totals: false
  allow_admin_rollback: true
auth:
  admin_user_ids: [boss]
"#;
        let config: StorefrontConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.service.environment, Environment::Production);
        assert_eq!(config.server.http_port, 3000);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
        let postgres = config.storage.postgres.unwrap();
        assert_eq!(postgres.port, 5432);
        assert_eq!(
            postgres.connection_url(),
            "postgres://shop:secret@db:5432/shop?sslmode=require"
        );
        assert!(!config.orders.verify_totals);
        assert!(config.orders.allow_admin_rollback);
        assert_eq!(config.auth.admin_user_ids, vec!["boss".to_string()]);
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let result: Result<StorefrontConfig, _> = serde_yaml::from_str("storage:\n  backend: mongo\n");
        assert!(result.is_err());
    }
}
