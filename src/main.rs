//! MCP Everything Server - Rust Implementation
//!
//! Serves one MCP session over stdin/stdout. Diagnostics go to stderr.

use clap::Parser;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use mcp_everything_rs::config::{Args, Config, LogFormat};
use mcp_everything_rs::error::Result;
use mcp_everything_rs::mcp::handler::CapabilityKind;
use mcp_everything_rs::mcp::server::McpServer;
use mcp_everything_rs::mcp::transport::StdioTransport;
use mcp_everything_rs::tools;
use mcp_everything_rs::VERSION;

fn init_logging(config: &Config) {
    let level = if config.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false);

    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is normal.
    let dotenv = dotenvy::dotenv();

    let args = Args::parse();
    let config: Config = args.into();
    init_logging(&config);

    if let Ok(path) = dotenv {
        info!("Loaded environment from {}", path.display());
    }
    config.validate()?;

    info!("MCP Everything Server v{}", VERSION);

    let registry = tools::default_registry(&config)?;
    info!(
        "Registered {} tools, {} prompts",
        registry.count(CapabilityKind::Tool),
        registry.count(CapabilityKind::PromptProvider)
    );

    let server = McpServer::new(registry, config.session_options());
    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, shutting down");
                shutdown.shutdown();
            }
            Err(e) => warn!("Unable to listen for interrupt: {}", e),
        }
    });

    info!("Starting stdio transport...");
    let outcome = server.run(StdioTransport::stdio()).await;
    if let Err(e) = &outcome {
        error!("Session ended with error: {}", e);
    }

    if let Some(path) = &config.metrics_file {
        match server.metrics().write_prometheus(path).await {
            Ok(()) => info!("Wrote session counters to {}", path.display()),
            Err(e) => warn!("Could not write session counters to {}: {}", path.display(), e),
        }
    }

    // A pending blocking read on stdin would keep the runtime alive.
    std::process::exit(if outcome.is_ok() { 0 } else { 1 });
}
