// Gift Card Sync - Web Server
// Webhook-triggered sync plus a read-only snapshot API

use anyhow::{Context, Result};
use clap::Parser;
use giftcard_sync::server::{router, AppState};
use giftcard_sync::{init_tracing, open_database, SyncConfig, SyncOrchestrator};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "giftcard-sync-server", version, about = "Gift card sync webhook server")]
struct Cli {
    /// TOML configuration file (defaults to ./giftcard-sync.toml when present)
    #[arg(long, env = "GIFTCARD_SYNC_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = SyncConfig::load(cli.config.as_deref())?;
    init_tracing(&config.logging)?;

    let conn = open_database(&config.database_path)?;
    info!(path = %config.database_path.display(), "database opened");

    if config.webhook_secret.as_deref().map_or(true, str::is_empty) {
        warn!("no webhook secret configured (CRON_SECRET); every trigger will be rejected");
    }

    let orchestrator = SyncOrchestrator::from_config(&config)?;
    let state = AppState::new(conn, orchestrator, config.webhook_secret.clone());
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "🚀 server listening");
    info!("   Snapshot: GET  /api/sync");
    info!("   Trigger:  POST /api/webhooks/provider-data-updates");

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}
