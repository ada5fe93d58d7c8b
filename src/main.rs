use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use ai_api_proxy::config::load_config;
use ai_api_proxy::lifecycle::{wait_for_termination, Shutdown};
use ai_api_proxy::net::Listener;
use ai_api_proxy::observability::{logging, metrics};
use ai_api_proxy::HttpServer;

#[derive(Debug, Parser)]
#[command(name = "ai-api-proxy", version, about = "Reverse proxy for AI provider APIs")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the port of `listener.bind_address`.
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)?;
    if let Some(port) = cli.port {
        let mut addr: SocketAddr = config.listener.bind_address.parse()?;
        addr.set_port(port);
        config.listener.bind_address = addr.to_string();
    }

    let _log_guard = logging::init_logging(&config.logging)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        bind_address = %config.listener.bind_address,
        routes = config.path_map.len(),
        "ai-api-proxy starting"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let listener = Listener::bind(&config.listener).await?;
    let server = HttpServer::new(config)?;

    let shutdown = Shutdown::new();
    let mut server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    tokio::select! {
        result = &mut server_task => {
            result??;
            tracing::warn!("Server exited without a shutdown request");
            return Ok(());
        }
        _ = wait_for_termination() => {
            shutdown.trigger();
        }
    }

    server_task.await??;
    tracing::info!("Shutdown complete");
    Ok(())
}
