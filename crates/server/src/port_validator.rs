//! Port availability checks run before startup
//!
//! A successful check does not reserve the port; the real bind can still
//! fail if another process takes it in between.

use tokio::net::TcpListener;
use tracing::{debug, error, warn};

use crate::error::{Result, ServerError};

/// Check that every `(purpose, port)` pair can be bound on `host`
pub async fn validate_ports_available(host: &str, ports: &[(&str, u16)]) -> Result<()> {
    let mut seen = Vec::with_capacity(ports.len());
    for &(purpose, port) in ports {
        if let Some((other, _)) = seen.iter().find(|(_, p)| *p == port) {
            return Err(ServerError::ConfigError(format!(
                "{} and {} are both configured on port {}",
                other, purpose, port
            )));
        }
        seen.push((purpose, port));
        validate_single_port(host, port, purpose).await?;
    }
    Ok(())
}

async fn validate_single_port(host: &str, port: u16, purpose: &str) -> Result<()> {
    let addr = format!("{}:{}", host, port);
    debug!(purpose, port, "Checking port");

    match TcpListener::bind(&addr).await {
        Ok(listener) => {
            drop(listener);
            Ok(())
        }
        Err(e) => {
            error!(purpose, port, %e, "Port is not available");
            Err(ServerError::port_in_use(port, e.to_string()))
        }
    }
}

pub async fn is_port_in_use(host: &str, port: u16) -> bool {
    let addr = format!("{}:{}", host, port);
    TcpListener::bind(&addr).await.is_err()
}

/// Reject port 0 and warn on privileged ports
pub fn validate_port_range(port: u16) -> Result<()> {
    if port == 0 {
        return Err(ServerError::ConfigError(
            "Port cannot be 0 (ephemeral port assignment not supported for explicit binding)".to_string(),
        ));
    }
    if port < 1024 {
        warn!(port, "Privileged port (requires root/admin privileges)");
    }
    Ok(())
}
