//! Netstreams Daemon - Config-Driven Endpoint Server
//!
//! Serves every endpoint listed in the netstreams configuration file. Server
//! endpoints echo what they receive; client endpoints keep a connection to
//! their upstream open using the configured reconnect policy.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (one TCP server on 127.0.0.1:12012)
//! netstreamsd
//!
//! # With config file
//! netstreamsd --config /etc/netstreams/netstreams.toml
//!
//! # Override the default listen address
//! netstreamsd --bind 0.0.0.0 --port 9000 --transport messaging
//!
//! # Show the merged configuration and exit
//! netstreamsd --print-config
//!
//! # Verbose logging
//! RUST_LOG=debug netstreamsd
//! ```
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: Graceful shutdown

mod server;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::runtime::Handle;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

use netstreams_core::config::{default_config_path, load_config_from_path, ConfigOverrides};
use netstreams_core::{Environment, ImplementationId, TransportRegistry};

use server::{DaemonServer, ServerConfig};

/// Netstreams Daemon - serves the endpoints in a netstreams config file
#[derive(Parser, Debug)]
#[command(name = "netstreamsd")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "NETSTREAMS_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Default bind address for endpoints that name none
    #[arg(short = 'b', long, value_name = "ADDR")]
    bind: Option<String>,

    /// Default port for endpoints that name none
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Transport to use instead of the registry default (event-loop, messaging)
    #[arg(short = 't', long, value_parser = parse_transport)]
    transport: Option<ImplementationId>,

    /// Maximum concurrent connections across all endpoints
    #[arg(long, default_value_t = 1024)]
    max_connections: usize,

    /// Seconds of silence before a UDP peer is dropped
    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
    udp_idle_secs: u64,

    /// Print the merged configuration as JSON and exit
    #[arg(long)]
    print_config: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "NETSTREAMS_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

fn parse_transport(name: &str) -> Result<ImplementationId, String> {
    ImplementationId::builtin(name)
        .ok_or_else(|| format!("unknown transport '{name}' (expected 'event-loop' or 'messaging')"))
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "netstreams_daemon={level},netstreams_core={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

/// Wait for SIGTERM or SIGINT
async fn wait_for_shutdown() -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, initiating shutdown"),
        _ = sigint.recv() => info!("Received SIGINT, initiating shutdown"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(default_config_path);
    let mut config = load_config_from_path(config_path.clone())
        .with_context(|| format!("Failed to load configuration from {config_path:?}"))?;

    let mut overrides = ConfigOverrides::new();
    if let Some(bind) = args.bind {
        overrides = overrides.with_bind_address(bind);
    }
    if let Some(port) = args.port {
        overrides = overrides.with_port(port);
    }
    if let Some(transport) = args.transport {
        overrides = overrides.with_transport(transport);
    }
    overrides.apply(&mut config);

    if args.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    init_logging(&args.log_level);

    info!("Netstreams daemon starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("PID: {}", std::process::id());
    info!(source = %config.source(), path = ?config.config_file_path, "Configuration loaded");
    for line in TransportRegistry::global().describe() {
        info!(default = %line, "Transport registry");
    }

    let env = Environment::initialize("netstreamsd", Handle::current());

    let mut server = DaemonServer::new(
        config,
        ServerConfig {
            max_connections: args.max_connections,
            udp_idle_timeout: Duration::from_secs(args.udp_idle_secs),
        },
    );

    let result = match server.start().await {
        Ok(bound) => {
            for (name, addr) in &bound {
                info!(endpoint = %name, %addr, "Ready");
            }
            wait_for_shutdown().await
        }
        Err(e) => Err(e),
    };

    info!("Shutting down...");
    let open = server.connections();
    if !open.is_empty() {
        info!(connections = %serde_json::to_string(&open)?, "Closing live connections");
    }
    server.stop().await?;
    Environment::terminate();
    info!(uptime_secs = env.started_at().elapsed().as_secs(), "Environment terminated");

    match result {
        Ok(()) => {
            info!("Netstreams daemon stopped cleanly");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Daemon stopped with error");
            Err(e)
        }
    }
}
