use clap::Parser;
use keeper_server::{build_router, AppState, ServerConfig, ServerStorage};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "keeper-server", about = "Keeper secret vault server")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "keeper-server.toml")]
    config: PathBuf,

    /// Listen address override
    #[arg(short, long)]
    listen: Option<String>,

    /// Database path override
    #[arg(short, long)]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();

    let mut cfg = if cli.config.exists() {
        ServerConfig::load(&cli.config)?
    } else {
        tracing::info!("No config file found, using defaults");
        ServerConfig::default()
    };

    if let Some(listen) = cli.listen {
        cfg.listen_addr = listen;
    }
    if let Some(database) = cli.database {
        cfg.storage_path = database;
    }
    cfg.apply_env();
    cfg.validate()?;

    tracing::info!("Starting keeper server on {}", cfg.listen_addr);

    let storage = ServerStorage::open(&cfg.storage_path)?;
    let app = build_router(AppState::new(storage, &cfg), &cfg);

    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
