// Gift Card Sync - CLI
//
//   giftcard-sync sync            run the pipeline once
//   giftcard-sync check           row counts and a sample of links
//   giftcard-sync runs --limit N  recent runs from the audit table

use anyhow::Result;
use clap::{Parser, Subcommand};
use giftcard_sync::{
    get_recent_runs, init_tracing, open_database, sample_associations, table_counts, SyncConfig,
    SyncOrchestrator,
};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    name = "giftcard-sync",
    version,
    about = "Synchronize gift card brand catalogs into SQLite"
)]
struct Cli {
    /// TOML configuration file (defaults to ./giftcard-sync.toml when present)
    #[arg(long, global = true, env = "GIFTCARD_SYNC_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Fetch every provider and reconcile the store
    Sync,
    /// Print table counts and a sample of stored links
    Check,
    /// Show recent sync runs
    Runs {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = SyncConfig::load(cli.config.as_deref())?;
    init_tracing(&config.logging)?;

    match cli.command {
        Command::Sync => run_sync(&config).await,
        Command::Check => run_check(&config).map(|_| ExitCode::SUCCESS),
        Command::Runs { limit } => run_history(&config, limit).map(|_| ExitCode::SUCCESS),
    }
}

async fn run_sync(config: &SyncConfig) -> Result<ExitCode> {
    println!("🔄 Gift Card Sync");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let conn = open_database(&config.database_path)?;
    let orchestrator = SyncOrchestrator::from_config(config)?;

    let outcome = orchestrator.run(&conn).await;

    for adapter in &outcome.adapters {
        let mark = if adapter.complete { "✓" } else { "✗" };
        println!(
            "{} {:<9} {} brands, {} cards, {} links",
            mark, adapter.source, adapter.brands, adapter.cards, adapter.records
        );
        for failure in &adapter.failures {
            println!(
                "    ↳ {} after {} attempt(s): {}",
                failure.unit, failure.attempts, failure.message
            );
        }
    }

    println!("\n{}", outcome.summary());
    match outcome.error_message() {
        None => {
            println!("✅ Sync complete");
            Ok(ExitCode::SUCCESS)
        }
        Some(reason) => {
            eprintln!("❌ Sync failed: {}", reason);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn run_check(config: &SyncConfig) -> Result<()> {
    let conn = open_database(&config.database_path)?;
    let counts = table_counts(&conn)?;

    println!("🔍 {}", config.database_path.display());
    println!("   brands:      {}", counts.brands);
    println!("   cards:       {}", counts.cards);
    println!(
        "   brand_cards: {} ({} active)",
        counts.brand_cards, counts.active_brand_cards
    );

    let sample = sample_associations(&conn, 5)?;
    if !sample.is_empty() {
        println!("\nSample links:");
        for link in sample {
            let state = match link.retired_at {
                Some(at) => format!("retired {}", at.to_rfc3339()),
                None => format!("seen {}", link.last_seen_at.to_rfc3339()),
            };
            println!(
                "   {} → {} [{}] {}",
                link.brand_name, link.card_name, link.source, state
            );
        }
    }

    Ok(())
}

fn run_history(config: &SyncConfig, limit: usize) -> Result<()> {
    let conn = open_database(&config.database_path)?;
    let runs = get_recent_runs(&conn, limit)?;

    if runs.is_empty() {
        println!("No sync runs recorded yet.");
        return Ok(());
    }

    for run in runs {
        let mark = if run.success { "✅" } else { "❌" };
        println!(
            "{} {}  {}  {} brands, {} cards, {} links, {} retired ({}ms)",
            mark,
            run.started_at.to_rfc3339(),
            run.run_id,
            run.brands,
            run.cards,
            run.records,
            run.retired,
            (run.finished_at - run.started_at).num_milliseconds()
        );
        if let Some(error) = run.error {
            println!("   {}", error);
        }
    }

    Ok(())
}
