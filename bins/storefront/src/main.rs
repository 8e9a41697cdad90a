//! Storefront order service binary
//!
//! Commands for initializing, validating and starting the order service,
//! plus a terminal watcher for a running server.

mod app;
mod watch;

use anyhow::{Context, Result};
use cli::{Cli, Commands, StorageArg};
use config::{
    generate_default_config, load_config, save_config, validate_config, StorageBackend, StorefrontConfig,
};
use observability::{init_logging, init_metrics, LogFormat};
use server::{validate_ports_available, HttpServer, Server, ShutdownController};
use std::net::SocketAddr;
use std::path::Path;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    let log_override = cli.log_format.map(|f| f.as_str());

    match cli.command {
        Commands::Start { config, http, storage } => start_command(config, http, storage, log_override).await,
        Commands::Validate { config } => {
            init_logging("storefront", cli_format(log_override, "pretty"), "warn")?;
            validate_command(config).await
        }
        Commands::Watch {
            url,
            user,
            admin,
            config,
        } => {
            init_logging("storefront-watch", cli_format(log_override, "compact"), "warn")?;
            watch_command(&url, user, admin, config).await
        }
        Commands::Init { output, force } => {
            init_logging("storefront", cli_format(log_override, "pretty"), "info")?;
            init_command(output, force).await
        }
    }
}

fn cli_format(cli: Option<&str>, fallback: &str) -> LogFormat {
    LogFormat::parse(cli.unwrap_or(fallback)).unwrap_or(LogFormat::Pretty)
}

async fn start_command<P: AsRef<Path>>(
    config_path: P,
    http_override: Option<u16>,
    storage_override: Option<StorageArg>,
    log_override: Option<&str>,
) -> Result<()> {
    let config_path = config_path.as_ref();
    let mut config = load_config(config_path)?;
    apply_overrides(&mut config, http_override, storage_override);

    let format = cli_format(log_override.or(Some(config.logging.format.as_str())), "pretty");
    init_logging(&config.service.name, format, &config.logging.level)?;
    info!(path = ?config_path, environment = ?config.service.environment, "Storefront starting");

    let report = validate_config(&config);
    for warning in &report.warnings {
        warn!(field = %warning.field, message = %warning.message, "Configuration warning");
    }
    if !report.is_valid() {
        error!(error_count = report.errors.len(), "Configuration validation failed");
        for err in &report.errors {
            error!("{}", err);
        }
        anyhow::bail!("Cannot start storefront due to configuration errors");
    }

    let mut ports = vec![("HTTP", config.server.http_port)];
    if config.metrics.enabled {
        ports.push(("metrics", config.metrics.port));
    }
    validate_ports_available(&config.server.host, &ports).await?;

    if config.metrics.enabled {
        let addr: SocketAddr = format!("{}:{}", config.server.host, config.metrics.port)
            .parse()
            .with_context(|| format!("Invalid metrics address {}:{}", config.server.host, config.metrics.port))?;
        init_metrics(addr)?;
    } else {
        debug!("Metrics exporter disabled");
    }

    let store = app::open_store(&config.storage).await?;
    let services = app::build_services(&config, store)?;

    let shutdown = ShutdownController::with_signals();
    let router = app::build_router(&config, &services, shutdown.child_token());
    let server = HttpServer::new(app::server_config(&config.server), router)?;

    info!(
        host = %config.server.host,
        http_port = config.server.http_port,
        storage = ?config.storage.backend,
        "Starting order service"
    );
    server.run(shutdown.child_token()).await?;

    info!("Storefront stopped");
    Ok(())
}

fn apply_overrides(config: &mut StorefrontConfig, http: Option<u16>, storage: Option<StorageArg>) {
    if let Some(port) = http {
        debug!(port, "HTTP port overridden from the command line");
        config.server.http_port = port;
    }
    if let Some(storage) = storage {
        config.storage.backend = match storage {
            StorageArg::Memory => StorageBackend::Memory,
            StorageArg::Postgres => StorageBackend::Postgres,
        };
    }
}

async fn validate_command<P: AsRef<Path>>(config_path: P) -> Result<()> {
    info!(path = ?config_path.as_ref(), "Validating configuration");

    let config = match load_config(&config_path) {
        Ok(c) => c,
        Err(e) => {
            error!(%e, "Failed to load configuration");
            anyhow::bail!(e);
        }
    };

    let report = validate_config(&config);

    println!("\n=== Configuration Validation Report ===\n");

    if !report.defaults_applied.is_empty() {
        println!("Defaults Applied ({}):", report.defaults_applied.len());
        for default in &report.defaults_applied {
            println!("  [info] {} = {}", default.field, default.value);
        }
        println!();
    }

    if !report.warnings.is_empty() {
        println!("Warnings ({}):", report.warnings.len());
        for warning in &report.warnings {
            println!("  [warn] [{}] {}", warning.field, warning.message);
        }
        println!();
    }

    if !report.errors.is_empty() {
        println!("Errors ({}):", report.errors.len());
        for err in &report.errors {
            println!("  [error] {}", err);
        }
        println!();
        anyhow::bail!("Configuration validation failed");
    }

    println!("[ok] Configuration is valid!");
    println!();
    println!("Service: {}", config.service.name);
    println!("Environment: {:?}", config.service.environment);
    println!("HTTP: {}:{}", config.server.host, config.server.http_port);
    println!("Storage: {:?}", config.storage.backend);
    println!(
        "Transitions: forward skips {}, admin rollback {}",
        on_off(config.orders.allow_forward_skips),
        on_off(config.orders.allow_admin_rollback)
    );
    println!("Total verification: {}", on_off(config.orders.verify_totals));
    if config.auth.admin_user_ids.is_empty() {
        println!("Admins: every authenticated caller");
    } else {
        println!("Admins: {}", config.auth.admin_user_ids.len());
    }

    Ok(())
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

async fn watch_command<P: AsRef<Path>>(url: &str, user: String, admin: bool, config_path: P) -> Result<()> {
    let config_path = config_path.as_ref();
    let config = if config_path.exists() {
        load_config(config_path)?
    } else {
        debug!(path = ?config_path, "No configuration file, using defaults");
        StorefrontConfig::default()
    };

    let target = watch::WatchTarget::new(url, user, admin, &config.auth)?;
    let policy = watch::poll_policy(&config.reconcile);
    println!("Watching {} (ctrl+c to stop)", target.base_url);

    let shutdown = ShutdownController::with_signals();
    watch::run(target, policy, shutdown.child_token()).await
}

async fn init_command<P: AsRef<Path>>(output_path: P, force: bool) -> Result<()> {
    let output_path = output_path.as_ref();
    info!(?output_path, "Initializing new configuration file");

    if output_path.exists() && !force {
        anyhow::bail!("{:?} already exists; pass --force to overwrite it", output_path);
    }

    let config = generate_default_config();

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }

    save_config(&config, output_path)?;

    println!("[ok] Configuration file created successfully!");
    println!();
    println!("Location: {:?}", output_path);
    println!();
    println!("This configuration includes:");
    println!("  - HTTP server on port {}", config.server.http_port);
    println!("  - In-memory order storage (switch storage.backend to postgres for durability)");
    println!("  - Strict status transitions and server-side total verification");
    println!();
    println!("Next steps:");
    println!("  1. Edit the configuration file to customize settings");
    println!("  2. Set auth.admin_user_ids; an empty list lets every caller use admin routes");
    println!("  3. Run 'storefront validate --config {:?}' to check configuration", output_path);
    println!("  4. Run 'storefront start --config {:?}' to start the service", output_path);

    Ok(())
}
