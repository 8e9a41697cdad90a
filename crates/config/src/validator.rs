use crate::*;
use bigdecimal::BigDecimal;
use std::str::FromStr;
use thiserror::Error;

const LOG_FORMATS: [&str; 3] = ["pretty", "json", "compact"];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Service name is required")]
    MissingServiceName,

    #[error("{field}: port {port} is invalid")]
    InvalidPort { field: String, port: u16 },

    #[error("server.http_port and metrics.port must differ, both are {0}")]
    PortCollision(u16),

    #[error("Invalid log format: {0}. Must be one of: pretty, json, compact")]
    InvalidLogFormat(String),

    #[error("Invalid CORS origin '{origin}': {message}")]
    InvalidCorsOrigin { origin: String, message: String },

    #[error("Storage: {message}")]
    InvalidStorage { message: String },

    #[error("{field} must be a positive integer")]
    InvalidPositiveInteger { field: String },

    #[error("orders.total_tolerance must be a non-negative decimal, got: {0}")]
    InvalidTolerance(String),

    #[error("reconcile: {message}")]
    InvalidReconcile { message: String },

    #[error("{field} must not be empty")]
    EmptyHeaderName { field: String },

    #[error("Environment variable '{var}' is missing or invalid: {message}")]
    InvalidEnvVar { var: String, message: String },
}

#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct DefaultApplied {
    pub field: String,
    pub value: String,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
    pub defaults_applied: Vec<DefaultApplied>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, field: &str, message: &str) {
        self.warnings.push(ValidationWarning {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    pub fn add_default(&mut self, field: &str, value: &str) {
        self.defaults_applied.push(DefaultApplied {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
}

pub fn validate_config(config: &StorefrontConfig) -> ValidationReport {
    let mut report = ValidationReport::new();

    validate_service(&config.service, &mut report);
    validate_server(config, &mut report);
    validate_storage(&config.storage, config.service.environment, &mut report);
    validate_orders(&config.orders, &mut report);
    validate_reconcile(&config.reconcile, &mut report);
    validate_auth(&config.auth, config.service.environment, &mut report);

    report
}

fn validate_service(service: &ServiceConfig, report: &mut ValidationReport) {
    if service.name.trim().is_empty() {
        report.add_error(ValidationError::MissingServiceName);
    }
}

fn validate_server(config: &StorefrontConfig, report: &mut ValidationReport) {
    let server = &config.server;
    if server.http_port == 0 {
        report.add_error(ValidationError::InvalidPort {
            field: "server.http_port".to_string(),
            port: 0,
        });
    }
    if server.request_timeout_seconds == 0 {
        report.add_error(ValidationError::InvalidPositiveInteger {
            field: "server.request_timeout_seconds".to_string(),
        });
    }

    for origin in &server.cors_origins {
        if let Err(e) = url::Url::parse(origin) {
            report.add_error(ValidationError::InvalidCorsOrigin {
                origin: origin.clone(),
                message: e.to_string(),
            });
        }
    }
    if server.cors_origins.is_empty() && config.service.environment == Environment::Production {
        report.add_warning("server.cors_origins", "Any origin is allowed in production");
    }

    if !LOG_FORMATS.contains(&config.logging.format.to_lowercase().as_str()) {
        report.add_error(ValidationError::InvalidLogFormat(config.logging.format.clone()));
    }

    if config.metrics.enabled {
        if config.metrics.port == 0 {
            report.add_error(ValidationError::InvalidPort {
                field: "metrics.port".to_string(),
                port: 0,
            });
        } else if config.metrics.port == server.http_port {
            report.add_error(ValidationError::PortCollision(server.http_port));
        }
    }
}

fn validate_storage(storage: &StorageConfig, environment: Environment, report: &mut ValidationReport) {
    match storage.backend {
        StorageBackend::Memory => {
            if environment == Environment::Production {
                report.add_warning(
                    "storage.backend",
                    "The memory backend loses every order on restart",
                );
            }
        }
        StorageBackend::Postgres => {
            let Some(pg) = &storage.postgres else {
                report.add_error(ValidationError::InvalidStorage {
                    message: "storage.postgres is required when backend is postgres".to_string(),
                });
                return;
            };

            for (field, value) in [
                ("storage.postgres.host", &pg.host),
                ("storage.postgres.database", &pg.database),
                ("storage.postgres.user", &pg.user),
                ("storage.postgres.password", &pg.password),
            ] {
                if value.is_empty() {
                    report.add_error(ValidationError::InvalidStorage {
                        message: format!("{} is required", field),
                    });
                }
                for var in unresolved_env_vars(value) {
                    report.add_error(ValidationError::InvalidEnvVar {
                        var,
                        message: format!("{} references an unset variable", field),
                    });
                }
            }

            if pg.max_connections == 0 {
                report.add_error(ValidationError::InvalidPositiveInteger {
                    field: "storage.postgres.max_connections".to_string(),
                });
            }
            let ssl_modes = ["disable", "allow", "prefer", "require", "verify-ca", "verify-full"];
            if !ssl_modes.contains(&pg.ssl_mode.as_str()) {
                report.add_error(ValidationError::InvalidStorage {
                    message: format!("unknown ssl_mode '{}'", pg.ssl_mode),
                });
            }
        }
    }
}

fn validate_orders(orders: &OrdersConfig, report: &mut ValidationReport) {
    for (field, value) in [
        ("orders.user_query_limit", orders.user_query_limit),
        ("orders.fallback_scan_limit", orders.fallback_scan_limit),
        ("orders.admin_list_limit", orders.admin_list_limit),
    ] {
        if value == 0 {
            report.add_error(ValidationError::InvalidPositiveInteger {
                field: field.to_string(),
            });
        }
    }

    if orders.fallback_scan_limit < orders.user_query_limit {
        report.add_warning(
            "orders.fallback_scan_limit",
            "Smaller than user_query_limit; customers may miss orders while the index is unavailable",
        );
    }

    match BigDecimal::from_str(orders.total_tolerance.trim()) {
        Ok(tolerance) if tolerance >= BigDecimal::from(0) => {}
        _ => report.add_error(ValidationError::InvalidTolerance(orders.total_tolerance.clone())),
    }

    if !orders.verify_totals {
        report.add_warning(
            "orders.verify_totals",
            "Client-supplied totals are stored without being checked",
        );
    }
    if orders.allow_admin_rollback {
        report.add_warning(
            "orders.allow_admin_rollback",
            "Admins may move orders back to an earlier status",
        );
    }
}

fn validate_reconcile(reconcile: &ReconcileConfig, report: &mut ValidationReport) {
    if reconcile.min_poll_interval_secs == 0 {
        report.add_error(ValidationError::InvalidReconcile {
            message: "min_poll_interval_secs must be positive".to_string(),
        });
    }
    if reconcile.poll_interval_secs < reconcile.min_poll_interval_secs {
        report.add_error(ValidationError::InvalidReconcile {
            message: format!(
                "poll_interval_secs ({}) is below min_poll_interval_secs ({})",
                reconcile.poll_interval_secs, reconcile.min_poll_interval_secs
            ),
        });
    }
}

fn validate_auth(auth: &AuthConfig, environment: Environment, report: &mut ValidationReport) {
    for (field, value) in [
        ("auth.user_header", &auth.user_header),
        ("auth.email_header", &auth.email_header),
        ("auth.name_header", &auth.name_header),
    ] {
        if value.trim().is_empty() {
            report.add_error(ValidationError::EmptyHeaderName {
                field: field.to_string(),
            });
        }
    }

    if auth.admin_user_ids.is_empty() {
        report.add_default("auth.admin_user_ids", "[] (every authenticated caller is an admin)");
        if environment == Environment::Production {
            report.add_warning(
                "auth.admin_user_ids",
                "No admin allowlist: every authenticated caller can manage all orders",
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let report = validate_config(&StorefrontConfig::default());
        assert!(report.is_valid(), "{:?}", report.errors);
        assert_eq!(report.defaults_applied.len(), 1);
    }

    #[test]
    fn test_postgres_backend_needs_section() {
        let mut config = StorefrontConfig::default();
        config.storage.backend = StorageBackend::Postgres;
        let report = validate_config(&config);
        assert!(matches!(report.errors.as_slice(), [ValidationError::InvalidStorage { .. }]));
    }

    #[test]
    fn test_unresolved_password_reported() {
        let mut config = generate_default_config();
        config.storage.backend = StorageBackend::Postgres;
        let report = validate_config(&config);
        assert!(report
            .errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidEnvVar { var, .. } if var == "STOREFRONT_DB_PASSWORD")));
    }

    #[test]
    fn test_field_errors() {
        let mut config = StorefrontConfig::default();
        config.metrics.port = config.server.http_port;
        config.logging.format = "xml".to_string();
        config.orders.total_tolerance = "-1".to_string();
        config.orders.user_query_limit = 0;
        config.reconcile.poll_interval_secs = 1;
        config.server.cors_origins = vec!["not a url".to_string()];

        let errors = validate_config(&config).errors;
        assert!(errors.contains(&ValidationError::PortCollision(8080)));
        assert!(errors.contains(&ValidationError::InvalidLogFormat("xml".to_string())));
        assert!(errors.contains(&ValidationError::InvalidTolerance("-1".to_string())));
        assert!(errors.contains(&ValidationError::InvalidPositiveInteger {
            field: "orders.user_query_limit".to_string()
        }));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::InvalidReconcile { .. })));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::InvalidCorsOrigin { .. })));
    }

    #[test]
    fn test_production_warnings() {
        let mut config = StorefrontConfig::default();
        config.service.environment = Environment::Production;
        let report = validate_config(&config);
        assert!(report.is_valid());
        let fields: Vec<_> = report.warnings.iter().map(|w| w.field.as_str()).collect();
        assert!(fields.contains(&"storage.backend"));
        assert!(fields.contains(&"auth.admin_user_ids"));
        assert!(fields.contains(&"server.cors_origins"));
    }
}
