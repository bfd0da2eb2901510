//! HTTP Stub Server - CLI Entry Point

use anyhow::{Context, Result};
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use stub_server::access_log::AccessLog;
use stub_server::config::DEFAULT_PORT;
use stub_server::{Dispatcher, EndpointRegistry, MockServer, ServerOptions};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "stub-server",
    about = "Configuration-driven HTTP stub server - templated JSON responses without a backend",
    version
)]
struct Args {
    /// Listening port (overrides PORT and the config file)
    #[arg(value_name = "PORT")]
    port: Option<u16>,

    /// Port taken from the environment when no positional port is given
    #[arg(long = "env-port", env = "PORT", hide = true)]
    env_port: Option<u16>,

    /// Path to configuration file (.json, .yaml or .yml)
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// Append one JSON line per request to this file
    #[arg(long, value_name = "PATH")]
    access_log: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print an example configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.print_config {
        let default_config = include_str!("../demos/default-config.json");
        println!("{}", default_config);
        return Ok(());
    }

    // A missing or malformed config aborts startup
    info!(path = ?args.config, "Loading configuration");
    let registry = EndpointRegistry::load(&args.config)
        .with_context(|| format!("Failed to load configuration {}", args.config.display()))?;

    if args.validate {
        println!(
            "Configuration is valid ({} endpoints defined)",
            registry.len()
        );
        return Ok(());
    }

    let port = args
        .port
        .or(args.env_port)
        .or(registry.port())
        .unwrap_or(DEFAULT_PORT);

    info!("Available endpoints:");
    for endpoint in registry.endpoints() {
        let rule = &endpoint.rule;
        if rule.delay_duration().is_some() {
            info!(
                "   {} {} ({}) [delay: {}ms]",
                endpoint.method, rule.path, rule.status, rule.delay
            );
        } else {
            info!("   {} {} ({})", endpoint.method, rule.path, rule.status);
        }
    }

    let access_log_path = args
        .access_log
        .or_else(|| registry.settings().access_log.clone());
    let access_log = match access_log_path {
        Some(path) => {
            info!(path = %path.display(), "Writing access log");
            AccessLog::open(&path)
                .await
                .with_context(|| format!("Failed to open access log {}", path.display()))?
        }
        None => AccessLog::disabled(),
    };

    let options = ServerOptions {
        port,
        cors: registry.settings().cors,
    };
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(registry)));
    let server = MockServer::new(dispatcher, access_log, options);

    server.run(SocketAddr::new(args.host, port)).await?;

    Ok(())
}
