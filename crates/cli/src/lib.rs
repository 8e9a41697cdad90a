use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "storefront")]
#[command(about = "Storefront order service - order lifecycle and realtime status sync")]
#[command(version)]
pub struct Cli {
    /// Override `logging.format` from the configuration file
    #[arg(long, global = true, value_enum, env = "STOREFRONT_LOG_FORMAT")]
    pub log_format: Option<LogFormatArg>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the order service
    Start {
        /// Path to the configuration file
        #[arg(short, long, default_value = "storefront.yaml", env = "STOREFRONT_CONFIG")]
        config: PathBuf,

        /// Override `server.http_port`
        #[arg(long)]
        http: Option<u16>,

        /// Override `storage.backend`
        #[arg(long, value_enum)]
        storage: Option<StorageArg>,
    },

    /// Validate configuration without starting the service
    Validate {
        /// Path to the configuration file
        #[arg(short, long, default_value = "storefront.yaml", env = "STOREFRONT_CONFIG")]
        config: PathBuf,
    },

    /// Follow a live order list from a running server
    Watch {
        /// Base URL of the storefront server
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        url: String,

        /// User id sent in the identity header
        #[arg(long)]
        user: String,

        /// Watch every order on the admin channel
        #[arg(long)]
        admin: bool,

        /// Configuration file supplying `reconcile` and `auth` settings, if present
        #[arg(short, long, default_value = "storefront.yaml", env = "STOREFRONT_CONFIG")]
        config: PathBuf,
    },

    /// Write a configuration file with all defaults
    Init {
        /// Output path for the new configuration file
        #[arg(short, long, default_value = "storefront.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormatArg {
    Pretty,
    Json,
    Compact,
}

impl LogFormatArg {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormatArg::Pretty => "pretty",
            LogFormatArg::Json => "json",
            LogFormatArg::Compact => "compact",
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageArg {
    /// In-process store; data is lost on restart
    Memory,
    /// PostgreSQL JSONB document store (needs the `postgres` feature)
    Postgres,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
