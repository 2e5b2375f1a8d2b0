// 🗂️ Data Model - brands, cards and the links between them
//
// Brand and Card are identified by their normalized display names.
// Association identity is (brand_name, card_name); source and the two
// timestamps are mutable attributes of that identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// ============================================================================
// SOURCE
// ============================================================================

/// Which provider contributed a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// JSON API, one endpoint per card
    Tcn,
    /// Static HTML catalog page
    Ultimate,
}

impl Source {
    pub const ALL: [Source; 2] = [Source::Tcn, Source::Ultimate];

    /// Value persisted in the `source` column
    pub fn code(&self) -> &'static str {
        match self {
            Source::Tcn => "tcn",
            Source::Ultimate => "ultimate",
        }
    }

    /// Suffix embedded in card names so providers never collide by accident
    pub fn card_tag(&self) -> &'static str {
        match self {
            Source::Tcn => "TCN",
            Source::Ultimate => "Ultimate",
        }
    }

    pub fn from_code(code: &str) -> Option<Source> {
        match code {
            "tcn" => Some(Source::Tcn),
            "ultimate" => Some(Source::Ultimate),
            _ => None,
        }
    }

    /// "Birthday" -> "Birthday (Ultimate)"
    pub fn card_name(&self, display: &str) -> String {
        format!("{} ({})", display, self.card_tag())
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ============================================================================
// SYNC RECORD (transient, one per brand-card link seen in a run)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SyncRecord {
    pub brand_name: String,
    pub card_name: String,
    pub source: Source,
}

impl SyncRecord {
    pub fn new(
        brand_name: impl Into<String>,
        card_name: impl Into<String>,
        source: Source,
    ) -> Self {
        SyncRecord {
            brand_name: brand_name.into(),
            card_name: card_name.into(),
            source,
        }
    }
}

// ============================================================================
// SWEEP SCOPE
// ============================================================================

/// Which stored associations a run is allowed to retire.
///
/// A source that fetched completely is swept as a whole. A source that only
/// partially fetched is swept card by card, for the cards it did confirm.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepScope {
    pub sources: BTreeSet<Source>,
    pub cards: BTreeSet<String>,
}

impl SweepScope {
    /// Every source is authoritative
    pub fn everything() -> Self {
        SweepScope {
            sources: Source::ALL.into_iter().collect(),
            cards: BTreeSet::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty() && self.cards.is_empty()
    }
}

// ============================================================================
// SYNC DATA (merged dataset handed to the reconciliation engine)
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncData {
    pub brands: BTreeSet<String>,
    pub cards: BTreeSet<String>,
    pub records: Vec<SyncRecord>,
    pub sweep_scope: SweepScope,
}

impl SyncData {
    /// Build a dataset from records alone. Brands and cards are derived from
    /// the records and every source is swept.
    pub fn from_records(records: Vec<SyncRecord>) -> Self {
        let mut data = SyncData {
            sweep_scope: SweepScope::everything(),
            ..SyncData::default()
        };
        for record in records {
            data.push(record);
        }
        data
    }

    /// Add a record and register its brand and card
    pub fn push(&mut self, record: SyncRecord) {
        self.brands.insert(record.brand_name.clone());
        self.cards.insert(record.card_name.clone());
        self.records.push(record);
    }

    pub fn summary(&self) -> String {
        format!(
            "{} brands, {} cards, {} links",
            self.brands.len(),
            self.cards.len(),
            self.records.len()
        )
    }
}

// ============================================================================
// ADAPTER RESULT
// ============================================================================

/// One unit of work (an endpoint, a file) that produced no data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitFailure {
    pub unit: String,
    pub attempts: u32,
    pub message: String,
}

/// What a single source adapter produced in one run.
///
/// `failures` non-empty means the adapter failed, even though `data` may
/// still hold everything that did succeed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterResult {
    pub source: Source,
    pub data: SyncData,
    pub failures: Vec<UnitFailure>,
    /// Cards whose full brand list was fetched in this run
    pub confirmed_cards: BTreeSet<String>,
}

impl AdapterResult {
    pub fn new(source: Source) -> Self {
        AdapterResult {
            source,
            data: SyncData::default(),
            failures: Vec::new(),
            confirmed_cards: BTreeSet::new(),
        }
    }

    /// Whole-source failure: nothing could be read
    pub fn failed(source: Source, unit: impl Into<String>, message: impl Into<String>) -> Self {
        let mut result = AdapterResult::new(source);
        result.record_failure(unit, 1, message);
        result
    }

    pub fn record_failure(
        &mut self,
        unit: impl Into<String>,
        attempts: u32,
        message: impl Into<String>,
    ) {
        self.failures.push(UnitFailure {
            unit: unit.into(),
            attempts,
            message: message.into(),
        });
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

// ============================================================================
// PERSISTED ROWS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Brand {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub name: String,
}

/// Stored brand-card link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Association {
    pub brand_name: String,
    pub card_name: String,
    pub source: Source,
    /// Most recent run that confirmed this link
    #[serde(rename = "lastUpdatedAt")]
    pub last_seen_at: DateTime<Utc>,
    /// Set when a run completed without confirming this link
    #[serde(rename = "deletedAt")]
    pub retired_at: Option<DateTime<Utc>>,
}

impl Association {
    pub fn is_active(&self) -> bool {
        self.retired_at.is_none()
    }
}

/// Full contents of the three collections
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub brands: Vec<Brand>,
    pub cards: Vec<Card>,
    pub brand_cards: Vec<Association>,
}
