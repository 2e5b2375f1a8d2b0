// 🎼 Orchestrator - one sync run from fetch to audit row
//
// gather:  every adapter concurrently, then merge (no store access)
// apply:   reconcile the merged data, then record the run
//
// The split lets the server fetch without holding the database lock.

use crate::config::SyncConfig;
use crate::db::{insert_sync_run, SyncRunRecord};
use crate::merge::merge;
use crate::model::{AdapterResult, Source, SyncData, UnitFailure};
use crate::reconciliation::{ReconciliationEngine, ReconciliationReport};
use crate::sources::{build_adapters, SourceAdapter};
use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

// ============================================================================
// RUN RESULTS
// ============================================================================

/// What one adapter contributed to a run
#[derive(Debug, Clone, Serialize)]
pub struct AdapterSummary {
    pub source: Source,
    pub brands: usize,
    pub cards: usize,
    pub records: usize,
    pub complete: bool,
    pub failures: Vec<UnitFailure>,
}

impl AdapterSummary {
    fn from_result(result: &AdapterResult) -> Self {
        AdapterSummary {
            source: result.source,
            brands: result.data.brands.len(),
            cards: result.data.cards.len(),
            records: result.data.records.len(),
            complete: result.is_complete(),
            failures: result.failures.clone(),
        }
    }
}

/// Fetched and merged, not yet written
#[derive(Debug, Clone)]
pub struct GatheredRun {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub adapters: Vec<AdapterSummary>,
    pub merged: SyncData,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub adapters: Vec<AdapterSummary>,
    pub brands: usize,
    pub cards: usize,
    pub records: usize,
    pub reconciliation: Result<ReconciliationReport, String>,
    pub had_adapter_error: bool,
}

impl SyncOutcome {
    /// A run succeeds only if every adapter completed and the store was updated
    pub fn is_success(&self) -> bool {
        !self.had_adapter_error && self.reconciliation.is_ok()
    }

    /// Why the run failed, if it did
    pub fn error_message(&self) -> Option<String> {
        let mut problems: Vec<String> = self
            .adapters
            .iter()
            .filter(|a| !a.complete)
            .map(|a| {
                let units: Vec<String> = a
                    .failures
                    .iter()
                    .map(|f| format!("{} ({})", f.unit, f.message))
                    .collect();
                format!("{} failed for {}", a.source, units.join(", "))
            })
            .collect();

        if let Err(message) = &self.reconciliation {
            problems.push(format!("reconciliation failed: {}", message));
        }

        if problems.is_empty() {
            None
        } else {
            Some(problems.join("; "))
        }
    }

    pub fn summary(&self) -> String {
        let retired = self
            .reconciliation
            .as_ref()
            .map(|r| r.associations_retired)
            .unwrap_or(0);
        format!(
            "Synced {} brands, {} cards, {} links ({} retired) in {}ms",
            self.brands,
            self.cards,
            self.records,
            retired,
            (self.finished_at - self.started_at).num_milliseconds()
        )
    }

    pub fn to_run_record(&self) -> SyncRunRecord {
        SyncRunRecord {
            run_id: self.run_id.to_string(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            success: self.is_success(),
            had_adapter_error: self.had_adapter_error,
            brands: self.brands,
            cards: self.cards,
            records: self.records,
            retired: self
                .reconciliation
                .as_ref()
                .map(|r| r.associations_retired)
                .unwrap_or(0),
            error: self.error_message(),
            details: serde_json::to_value(&self.adapters).unwrap_or(serde_json::Value::Null),
        }
    }
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

pub struct SyncOrchestrator {
    adapters: Vec<Box<dyn SourceAdapter>>,
    engine: ReconciliationEngine,
}

impl SyncOrchestrator {
    pub fn new(adapters: Vec<Box<dyn SourceAdapter>>, engine: ReconciliationEngine) -> Self {
        SyncOrchestrator { adapters, engine }
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        Ok(Self::new(
            build_adapters(config)?,
            ReconciliationEngine::with_batch_size(config.reconcile.batch_size),
        ))
    }

    /// Run every adapter concurrently and merge whatever came back
    pub async fn gather(&self) -> GatheredRun {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, adapters = self.adapters.len(), "sync run started");

        let results = join_all(self.adapters.iter().map(|adapter| adapter.fetch())).await;

        for result in &results {
            if result.is_complete() {
                info!(
                    %run_id,
                    source = %result.source,
                    summary = %result.data.summary(),
                    "adapter finished"
                );
            } else {
                warn!(
                    %run_id,
                    source = %result.source,
                    failures = result.failures.len(),
                    summary = %result.data.summary(),
                    "adapter finished with failures"
                );
            }
        }

        GatheredRun {
            run_id,
            started_at,
            adapters: results.iter().map(AdapterSummary::from_result).collect(),
            merged: merge(&results),
        }
    }

    /// Reconcile gathered data into the store and record the run.
    ///
    /// Reconciliation is attempted even when adapters failed, so partial
    /// data still lands. Failing to write the audit row is logged only.
    pub fn apply(&self, conn: &Connection, gathered: GatheredRun) -> SyncOutcome {
        let GatheredRun {
            run_id,
            started_at,
            adapters,
            merged,
        } = gathered;

        let reconciliation = self.engine.reconcile(conn, &merged).map_err(|err| {
            error!(%run_id, error = %err, "reconciliation failed");
            err.to_string()
        });

        let outcome = SyncOutcome {
            run_id,
            started_at,
            finished_at: Utc::now(),
            had_adapter_error: adapters.iter().any(|a| !a.complete),
            adapters,
            brands: merged.brands.len(),
            cards: merged.cards.len(),
            records: merged.records.len(),
            reconciliation,
        };

        if let Err(err) = insert_sync_run(conn, &outcome.to_run_record()) {
            error!(%run_id, error = %err, "failed to record sync run");
        }

        match outcome.error_message() {
            None => info!(%run_id, summary = %outcome.summary(), "sync run succeeded"),
            Some(reason) => {
                error!(%run_id, summary = %outcome.summary(), %reason, "sync run failed")
            }
        }

        outcome
    }

    /// gather + apply against one connection
    pub async fn run(&self, conn: &Connection) -> SyncOutcome {
        let gathered = self.gather().await;
        self.apply(conn, gathered)
    }
}
