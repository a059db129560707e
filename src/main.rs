use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;
use tracing::{info, warn, Level};
use voicebot_server::transport::resolve;
use voicebot_server::{create_router, AppState, Config};

/// How long running bot sessions get to stop on shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Azure Debug Voice AI Server
#[derive(Parser, Debug)]
#[command(name = "voicebot-server", version, about, long_about = None)]
struct Cli {
    /// Host for HTTP server (default: localhost)
    #[arg(long)]
    host: Option<String>,

    /// Port for HTTP server (default: 7860)
    #[arg(long)]
    port: Option<u16>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Optional configuration file (toml/yaml/json)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env must be loaded before the config reads the environment
    voicebot_server::config::load_env_file(None);

    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let mut cfg = Config::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        cfg.service.http.bind = host;
    }
    if let Some(port) = cli.port {
        cfg.service.http.port = port;
    }

    info!("Loaded config: {}", cfg.service.name);
    info!("Enabled transports: {:?}", cfg.enabled_transports);

    let address = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let state = AppState::new(cfg)?;

    for kind in state.config.enabled_transports.iter().filter_map(|name| resolve(name)) {
        if !state.bot_context.transports.supports(kind) {
            warn!(
                "Transport '{}' is enabled but bots cannot join it: rooms are still provisioned, \
                 each session ends right after dispatch",
                kind
            );
        }
    }
    let bots = state.bots.clone();
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;

    info!("Server started on http://{} - ready to receive clients", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Server stopping");
    bots.shutdown(SHUTDOWN_GRACE).await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
