use crate::*;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info, instrument};

#[instrument(skip(path))]
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<StorefrontConfig> {
    let path = path.as_ref();
    info!("Loading configuration from: {:?}", path);

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    debug!("Config file content length: {} bytes", content.len());

    parse_config(&content)
}

/// Substitute environment variables in `content` and parse it
pub fn parse_config(content: &str) -> Result<StorefrontConfig> {
    let substituted = substitution::substitute_env_vars(content)?;
    let config: StorefrontConfig = serde_yaml::from_str(&substituted)
        .with_context(|| "Failed to parse YAML configuration")?;

    info!(service = %config.service.name, "Configuration loaded");
    Ok(config)
}

/// The configuration written by `storefront init`
///
/// Uses the in-memory store; the postgres section is filled with
/// environment placeholders so switching backends only needs the variables.
#[instrument]
pub fn generate_default_config() -> StorefrontConfig {
    StorefrontConfig {
        storage: StorageConfig {
            backend: StorageBackend::Memory,
            postgres: Some(PostgresConfig {
                host: "${STOREFRONT_DB_HOST:-localhost}".to_string(),
                port: default_postgres_port(),
                database: "storefront".to_string(),
                user: "${STOREFRONT_DB_USER:-storefront}".to_string(),
                password: "${STOREFRONT_DB_PASSWORD}".to_string(),
                ssl_mode: "prefer".to_string(),
                max_connections: default_max_connections(),
                connection_timeout_seconds: default_connection_timeout(),
            }),
        },
        ..StorefrontConfig::default()
    }
}

#[instrument(skip(config))]
pub fn save_config<P: AsRef<Path> + std::fmt::Debug>(config: &StorefrontConfig, path: P) -> Result<()> {
    let path = path.as_ref();
    info!("Saving configuration to: {:?}", path);

    let yaml = serde_yaml::to_string(config)
        .with_context(|| "Failed to serialize configuration to YAML")?;
    fs::write(path, yaml)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    info!("Configuration saved successfully");
    Ok(())
}
