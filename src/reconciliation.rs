// ⚖️ Reconciliation Engine - make the store match one run's merged dataset
//
// Four batched steps, in order:
//   1. brands         insert if absent
//   2. cards          insert if absent
//   3. associations   upsert, stamping last_seen with the run start
//   4. sweep          retire in-scope links the run did not confirm
//
// Every batch is its own atomic write. A failing batch stops its step and
// every later step; batches already written stay written.

use crate::error::ReconcileError;
use crate::model::{Source, SweepScope, SyncData, SyncRecord};
use anyhow::Result;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, error, info};

pub const DEFAULT_BATCH_SIZE: usize = 50;

// ============================================================================
// STORE SEAM
// ============================================================================

/// Storage operations the engine needs. Each call is one atomic batch.
pub trait SyncStore {
    /// Insert brands that do not exist yet; returns how many were new
    fn insert_brands(&self, names: &[String]) -> Result<usize>;

    /// Insert cards that do not exist yet; returns how many were new
    fn insert_cards(&self, names: &[String]) -> Result<usize>;

    /// Insert or refresh links seen in the run starting at `run_start`
    fn upsert_associations(
        &self,
        records: &[SyncRecord],
        run_start: DateTime<Utc>,
    ) -> Result<usize>;

    /// Retire active links in `scope` last seen before `run_start`
    fn retire_stale(&self, scope: &SweepScope, run_start: DateTime<Utc>) -> Result<usize>;
}

// ============================================================================
// STEPS & REPORT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileStep {
    Brands,
    Cards,
    Associations,
    Sweep,
}

impl fmt::Display for ReconcileStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReconcileStep::Brands => "brands",
            ReconcileStep::Cards => "cards",
            ReconcileStep::Associations => "associations",
            ReconcileStep::Sweep => "sweep",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub run_start: DateTime<Utc>,
    pub brands_inserted: usize,
    pub cards_inserted: usize,
    pub associations_upserted: usize,
    pub associations_retired: usize,
    /// Batches committed across all steps
    pub batches: usize,
}

impl ReconciliationReport {
    pub fn new(run_start: DateTime<Utc>) -> Self {
        ReconciliationReport {
            run_start,
            brands_inserted: 0,
            cards_inserted: 0,
            associations_upserted: 0,
            associations_retired: 0,
            batches: 0,
        }
    }

    fn record_batch(&mut self, step: ReconcileStep, rows: usize) {
        let counter = match step {
            ReconcileStep::Brands => &mut self.brands_inserted,
            ReconcileStep::Cards => &mut self.cards_inserted,
            ReconcileStep::Associations => &mut self.associations_upserted,
            ReconcileStep::Sweep => &mut self.associations_retired,
        };
        *counter += rows;
        self.batches += 1;
    }

    pub fn summary(&self) -> String {
        format!(
            "{} new brands, {} new cards, {} links upserted, {} retired ({} batches)",
            self.brands_inserted,
            self.cards_inserted,
            self.associations_upserted,
            self.associations_retired,
            self.batches
        )
    }
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

#[derive(Debug, Clone)]
pub struct ReconciliationEngine {
    /// Rows per write statement (default: 50)
    pub batch_size: usize,
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        ReconciliationEngine {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(batch_size: usize) -> Self {
        ReconciliationEngine {
            batch_size: batch_size.max(1),
        }
    }

    /// Reconcile using the current time as the run start
    pub fn reconcile<S: SyncStore + ?Sized>(
        &self,
        store: &S,
        data: &SyncData,
    ) -> Result<ReconciliationReport, ReconcileError> {
        // Stored timestamps are milliseconds
        self.reconcile_at(store, data, Utc::now().trunc_subsecs(3))
    }

    /// Reconcile with an explicit run start
    pub fn reconcile_at<S: SyncStore + ?Sized>(
        &self,
        store: &S,
        data: &SyncData,
        run_start: DateTime<Utc>,
    ) -> Result<ReconciliationReport, ReconcileError> {
        let mut report = ReconciliationReport::new(run_start);
        info!(
            run_start = %run_start,
            summary = %data.summary(),
            batch_size = self.batch_size,
            "reconciling"
        );

        let brands: Vec<String> = data.brands.iter().cloned().collect();
        self.run_step(ReconcileStep::Brands, brands.chunks(self.batch_size), &mut report, |batch| {
            store.insert_brands(batch)
        })?;

        let cards: Vec<String> = data.cards.iter().cloned().collect();
        self.run_step(ReconcileStep::Cards, cards.chunks(self.batch_size), &mut report, |batch| {
            store.insert_cards(batch)
        })?;

        self.run_step(
            ReconcileStep::Associations,
            data.records.chunks(self.batch_size),
            &mut report,
            |batch| store.upsert_associations(batch, run_start),
        )?;

        let sweeps = self.sweep_batches(&data.sweep_scope);
        self.run_step(ReconcileStep::Sweep, sweeps.iter(), &mut report, |scope| {
            store.retire_stale(scope, run_start)
        })?;

        info!(report = %report.summary(), "reconciliation complete");
        Ok(report)
    }

    fn run_step<B, I, W>(
        &self,
        step: ReconcileStep,
        batches: I,
        report: &mut ReconciliationReport,
        mut write: W,
    ) -> Result<(), ReconcileError>
    where
        I: Iterator<Item = B>,
        W: FnMut(B) -> Result<usize>,
    {
        for (batch_index, batch) in batches.enumerate() {
            match write(batch) {
                Ok(rows) => {
                    report.record_batch(step, rows);
                    debug!(%step, batch = batch_index, rows, "batch committed");
                }
                Err(cause) => {
                    error!(
                        %step,
                        batch = batch_index,
                        error = %cause,
                        "batch failed; aborting run"
                    );
                    return Err(ReconcileError {
                        step,
                        batch_index,
                        batches_committed: report.batches,
                        cause,
                        partial: report.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Whole sources go in one batch; confirmed cards are chunked
    fn sweep_batches(&self, scope: &SweepScope) -> Vec<SweepScope> {
        let mut batches = Vec::new();

        if !scope.sources.is_empty() {
            batches.push(SweepScope {
                sources: scope.sources.clone(),
                cards: BTreeSet::new(),
            });
        }

        let cards: Vec<String> = scope.cards.iter().cloned().collect();
        for chunk in cards.chunks(self.batch_size) {
            batches.push(SweepScope {
                sources: BTreeSet::<Source>::new(),
                cards: chunk.iter().cloned().collect(),
            });
        }

        batches
    }
}
