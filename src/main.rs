//! vless-gateway: VLESS-over-WebSocket tunneling gateway
//!
//! # Usage
//!
//! ```bash
//! # Run with the environment configuration
//! UUID=550e8400-e29b-41d4-a716-446655440000 LISTEN=0.0.0.0:8080 vless-gateway
//!
//! # With a fallback destination list
//! PROXYIP="cdn.example, 203.0.113.7:8443" vless-gateway
//! ```

use anyhow::Result;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use vless_gateway::config::GatewayConfig;
use vless_gateway::gateway::GatewayServer;

fn print_help() {
    println!(
        r"vless-gateway v{}

VLESS-over-WebSocket tunneling gateway.

USAGE:
    vless-gateway

ENVIRONMENT:
    UUID       Static client identifier (canonical uuid form). A built-in
               default exists but must be overridden in real deployments.
    PROXYIP    Optional fallback destination list, comma or whitespace
               separated; entries are 'host' or 'host:port'.
    LISTEN     Listen address [default: 0.0.0.0:8080]
    RUST_LOG   Log filter (trace, debug, info, warn, error)

TLS termination is the host runtime's job; the gateway listens in plain
HTTP/1 and accepts WebSocket upgrades on any path.",
        vless_gateway::VERSION
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                return Ok(());
            }
            "-v" | "--version" => {
                println!("vless-gateway v{}", vless_gateway::VERSION);
                return Ok(());
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_help();
                std::process::exit(1);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(version = vless_gateway::VERSION, "starting vless-gateway");

    let config = GatewayConfig::from_env()?;
    let server = GatewayServer::bind(config).await?;

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
            return;
        }
        info!("ctrl-c received, shutting down");
        shutdown.signal();
    });

    server.run().await?;
    info!("gateway stopped");
    Ok(())
}
