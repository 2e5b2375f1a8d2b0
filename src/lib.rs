// Gift Card Sync - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod merge;
pub mod model;
pub mod normalize;
pub mod orchestrator;
pub mod reconciliation;
pub mod retry;
pub mod sources;

#[cfg(feature = "server")]
pub mod server;

// Re-export commonly used types
pub use config::SyncConfig;
pub use db::{
    get_all_associations, get_all_brands, get_all_cards, get_recent_runs, get_snapshot,
    insert_sync_run, open_database, sample_associations, setup_database, table_counts,
    SyncRunRecord, TableCounts,
};
pub use error::{FetchError, ReconcileError, RetryError};
pub use logging::{init_tracing, LogFormat};
pub use merge::merge;
pub use model::{
    AdapterResult, Association, Brand, Card, Snapshot, Source, SweepScope, SyncData, SyncRecord,
    UnitFailure,
};
pub use normalize::normalize_brand_name;
pub use orchestrator::{AdapterSummary, GatheredRun, SyncOrchestrator, SyncOutcome};
pub use reconciliation::{
    ReconcileStep, ReconciliationEngine, ReconciliationReport, SyncStore,
};
pub use retry::RetryPolicy;
pub use sources::{build_adapters, SourceAdapter, TcnAdapter, UltimateAdapter};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
