// 🗄️ Store - SQLite persistence for brands, cards, links and run history
//
// Timestamps are stored as INTEGER milliseconds since the Unix epoch.

use crate::model::{Association, Brand, Card, Snapshot, Source, SweepScope, SyncRecord};
use crate::reconciliation::SyncStore;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Open (or create) the database file and make sure the schema exists
pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database: {}", path.display()))?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL so readers (the snapshot endpoint) never block a sync
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", true)?;

    // ==========================================================================
    // Entities
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS brands (
            name TEXT PRIMARY KEY
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS cards (
            name TEXT PRIMARY KEY
        )",
        [],
    )?;

    // ==========================================================================
    // Brand-card links (soft-deleted, never removed)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS brand_cards (
            brand_name TEXT NOT NULL REFERENCES brands(name),
            card_name TEXT NOT NULL REFERENCES cards(name),
            source TEXT NOT NULL,
            last_updated_at INTEGER NOT NULL,
            deleted_at INTEGER,
            PRIMARY KEY (brand_name, card_name)
        )",
        [],
    )?;

    // ==========================================================================
    // Sync runs (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS sync_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT UNIQUE NOT NULL,
            started_at INTEGER NOT NULL,
            finished_at INTEGER NOT NULL,
            success INTEGER NOT NULL,
            had_adapter_error INTEGER NOT NULL,
            brands INTEGER NOT NULL,
            cards INTEGER NOT NULL,
            records INTEGER NOT NULL,
            retired INTEGER NOT NULL,
            error TEXT,
            details TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_brand_cards_last_updated ON brand_cards(last_updated_at)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_brand_cards_source ON brand_cards(source)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sync_runs_started ON sync_runs(started_at)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// TIME & ROW HELPERS
// ============================================================================

pub fn to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

fn conversion_error(index: usize, ty: Type, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, ty, message.into())
}

fn millis_at(row: &Row, index: usize) -> rusqlite::Result<DateTime<Utc>> {
    let ms: i64 = row.get(index)?;
    DateTime::from_timestamp_millis(ms).ok_or_else(|| {
        conversion_error(index, Type::Integer, format!("timestamp out of range: {}", ms))
    })
}

fn source_at(row: &Row, index: usize) -> rusqlite::Result<Source> {
    let code: String = row.get(index)?;
    Source::from_code(&code)
        .ok_or_else(|| conversion_error(index, Type::Text, format!("unknown source: {}", code)))
}

fn association_from_row(row: &Row) -> rusqlite::Result<Association> {
    let retired_ms: Option<i64> = row.get(4)?;
    let retired_at = match retired_ms {
        Some(_) => Some(millis_at(row, 4)?),
        None => None,
    };

    Ok(Association {
        brand_name: row.get(0)?,
        card_name: row.get(1)?,
        source: source_at(row, 2)?,
        last_seen_at: millis_at(row, 3)?,
        retired_at,
    })
}

fn placeholders(count: usize, group: &str) -> String {
    vec![group; count].join(", ")
}

// ============================================================================
// WRITES (one statement per batch)
// ============================================================================

fn insert_names(conn: &Connection, table: &str, names: &[String]) -> Result<usize> {
    if names.is_empty() {
        return Ok(0);
    }

    let sql = format!(
        "INSERT INTO {} (name) VALUES {} ON CONFLICT(name) DO NOTHING",
        table,
        placeholders(names.len(), "(?)")
    );
    let inserted = conn
        .execute(&sql, params_from_iter(names.iter()))
        .with_context(|| format!("Failed to insert {} {}", names.len(), table))?;

    Ok(inserted)
}

impl SyncStore for Connection {
    fn insert_brands(&self, names: &[String]) -> Result<usize> {
        insert_names(self, "brands", names)
    }

    fn insert_cards(&self, names: &[String]) -> Result<usize> {
        insert_names(self, "cards", names)
    }

    fn upsert_associations(
        &self,
        records: &[SyncRecord],
        run_start: DateTime<Utc>,
    ) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            "INSERT INTO brand_cards (brand_name, card_name, source, last_updated_at, deleted_at)
             VALUES {}
             ON CONFLICT(brand_name, card_name) DO UPDATE SET
                source = excluded.source,
                last_updated_at = MAX(brand_cards.last_updated_at, excluded.last_updated_at),
                deleted_at = NULL",
            placeholders(records.len(), "(?, ?, ?, ?, NULL)")
        );

        let seen_at = to_millis(run_start);
        let values = records.iter().flat_map(|r| {
            [
                Value::Text(r.brand_name.clone()),
                Value::Text(r.card_name.clone()),
                Value::Text(r.source.code().to_string()),
                Value::Integer(seen_at),
            ]
        });

        let upserted = self
            .execute(&sql, params_from_iter(values))
            .with_context(|| format!("Failed to upsert {} brand-card links", records.len()))?;

        Ok(upserted)
    }

    fn retire_stale(&self, scope: &SweepScope, run_start: DateTime<Utc>) -> Result<usize> {
        let mut clauses = Vec::new();
        let mut values = vec![Value::Integer(to_millis(run_start))];

        if !scope.sources.is_empty() {
            clauses.push(format!("source IN ({})", placeholders(scope.sources.len(), "?")));
            values.extend(scope.sources.iter().map(|s| Value::Text(s.code().to_string())));
        }
        if !scope.cards.is_empty() {
            clauses.push(format!("card_name IN ({})", placeholders(scope.cards.len(), "?")));
            values.extend(scope.cards.iter().cloned().map(Value::Text));
        }
        if clauses.is_empty() {
            return Ok(0);
        }

        // ?1 is reused for the comparison and the new retirement time
        let sql = format!(
            "UPDATE brand_cards SET deleted_at = ?1
             WHERE deleted_at IS NULL AND last_updated_at < ?1 AND ({})",
            clauses.join(" OR ")
        );

        let retired = self
            .execute(&sql, params_from_iter(values))
            .context("Failed to retire stale brand-card links")?;

        Ok(retired)
    }
}

// ============================================================================
// READS
// ============================================================================

pub fn get_all_brands(conn: &Connection) -> Result<Vec<Brand>> {
    let mut stmt = conn.prepare("SELECT name FROM brands ORDER BY name")?;

    let brands = stmt
        .query_map([], |row| Ok(Brand { name: row.get(0)? }))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(brands)
}

pub fn get_all_cards(conn: &Connection) -> Result<Vec<Card>> {
    let mut stmt = conn.prepare("SELECT name FROM cards ORDER BY name")?;

    let cards = stmt
        .query_map([], |row| Ok(Card { name: row.get(0)? }))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(cards)
}

/// Every link, active and retired
pub fn get_all_associations(conn: &Connection) -> Result<Vec<Association>> {
    let mut stmt = conn.prepare(
        "SELECT brand_name, card_name, source, last_updated_at, deleted_at
         FROM brand_cards
         ORDER BY brand_name, card_name",
    )?;

    let associations = stmt
        .query_map([], association_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(associations)
}

/// Full contents of the three collections
pub fn get_snapshot(conn: &Connection) -> Result<Snapshot> {
    Ok(Snapshot {
        brands: get_all_brands(conn)?,
        cards: get_all_cards(conn)?,
        brand_cards: get_all_associations(conn)?,
    })
}

/// Most recently confirmed links
pub fn sample_associations(conn: &Connection, limit: usize) -> Result<Vec<Association>> {
    let mut stmt = conn.prepare(
        "SELECT brand_name, card_name, source, last_updated_at, deleted_at
         FROM brand_cards
         ORDER BY last_updated_at DESC, brand_name, card_name
         LIMIT ?1",
    )?;

    let associations = stmt
        .query_map(params![limit as i64], association_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(associations)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCounts {
    pub brands: i64,
    pub cards: i64,
    pub brand_cards: i64,
    pub active_brand_cards: i64,
}

pub fn table_counts(conn: &Connection) -> Result<TableCounts> {
    let count = |sql: &str| -> Result<i64> { Ok(conn.query_row(sql, [], |row| row.get(0))?) };

    Ok(TableCounts {
        brands: count("SELECT COUNT(*) FROM brands")?,
        cards: count("SELECT COUNT(*) FROM cards")?,
        brand_cards: count("SELECT COUNT(*) FROM brand_cards")?,
        active_brand_cards: count("SELECT COUNT(*) FROM brand_cards WHERE deleted_at IS NULL")?,
    })
}

// ============================================================================
// SYNC RUNS
// ============================================================================

/// One row of the `sync_runs` audit table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRunRecord {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub had_adapter_error: bool,
    pub brands: usize,
    pub cards: usize,
    pub records: usize,
    pub retired: usize,
    pub error: Option<String>,
    /// Per-adapter summaries
    pub details: serde_json::Value,
}

pub fn insert_sync_run(conn: &Connection, run: &SyncRunRecord) -> Result<()> {
    let details = serde_json::to_string(&run.details)?;

    conn.execute(
        "INSERT INTO sync_runs (
            run_id, started_at, finished_at, success, had_adapter_error,
            brands, cards, records, retired, error, details
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            run.run_id,
            to_millis(run.started_at),
            to_millis(run.finished_at),
            run.success,
            run.had_adapter_error,
            run.brands as i64,
            run.cards as i64,
            run.records as i64,
            run.retired as i64,
            run.error,
            details,
        ],
    )
    .with_context(|| format!("Failed to record sync run {}", run.run_id))?;

    Ok(())
}

/// Latest runs first
pub fn get_recent_runs(conn: &Connection, limit: usize) -> Result<Vec<SyncRunRecord>> {
    let mut stmt = conn.prepare(
        "SELECT run_id, started_at, finished_at, success, had_adapter_error,
                brands, cards, records, retired, error, details
         FROM sync_runs
         ORDER BY started_at DESC, id DESC
         LIMIT ?1",
    )?;

    let runs = stmt
        .query_map(params![limit as i64], |row| {
            let details_json: String = row.get(10)?;
            let details = serde_json::from_str(&details_json)
                .map_err(|e| conversion_error(10, Type::Text, e.to_string()))?;

            Ok(SyncRunRecord {
                run_id: row.get(0)?,
                started_at: millis_at(row, 1)?,
                finished_at: millis_at(row, 2)?,
                success: row.get(3)?,
                had_adapter_error: row.get(4)?,
                brands: row.get::<_, i64>(5)? as usize,
                cards: row.get::<_, i64>(6)? as usize,
                records: row.get::<_, i64>(7)? as usize,
                retired: row.get::<_, i64>(8)? as usize,
                error: row.get(9)?,
                details,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap()
    }

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn seeded() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn.insert_brands(&names(&["Store X", "Store Y"])).unwrap();
        conn.insert_cards(&names(&["Acme (TCN)", "Her (Ultimate)"])).unwrap();
        conn
    }

    #[test]
    fn test_setup_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        setup_database(&conn).unwrap();

        let counts = table_counts(&conn).unwrap();
        assert_eq!(counts.brands, 0);
        assert_eq!(counts.brand_cards, 0);
    }

    #[test]
    fn test_insert_names_skips_existing() {
        let conn = seeded();

        let inserted = conn
            .insert_brands(&names(&["Store X", "Store Z"]))
            .unwrap();

        assert_eq!(inserted, 1);
        let brands: Vec<String> = get_all_brands(&conn)
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(brands, vec!["Store X", "Store Y", "Store Z"]);
    }

    #[test]
    fn test_duplicate_links_in_one_batch() {
        let conn = seeded();
        let records = vec![
            SyncRecord::new("Store X", "Acme (TCN)", Source::Tcn),
            SyncRecord::new("Store X", "Acme (TCN)", Source::Tcn),
        ];

        conn.upsert_associations(&records, at(1_000)).unwrap();

        assert_eq!(get_all_associations(&conn).unwrap().len(), 1);
    }

    #[test]
    fn test_links_require_known_brand_and_card() {
        let conn = seeded();
        let orphan = vec![SyncRecord::new("Unknown", "Acme (TCN)", Source::Tcn)];

        assert!(conn.upsert_associations(&orphan, at(1_000)).is_err());
    }

    #[test]
    fn test_retire_with_empty_scope_is_noop() {
        let conn = seeded();
        let link = SyncRecord::new("Store X", "Acme (TCN)", Source::Tcn);
        conn.upsert_associations(&[link], at(1_000)).unwrap();

        let retired = conn.retire_stale(&SweepScope::default(), at(2_000)).unwrap();

        assert_eq!(retired, 0);
        assert_eq!(table_counts(&conn).unwrap().active_brand_cards, 1);
    }

    #[test]
    fn test_retire_matches_source_or_card() {
        let conn = seeded();
        conn.upsert_associations(
            &[
                SyncRecord::new("Store X", "Acme (TCN)", Source::Tcn),
                SyncRecord::new("Store Y", "Acme (TCN)", Source::Tcn),
                SyncRecord::new("Store X", "Her (Ultimate)", Source::Ultimate),
            ],
            at(1_000),
        )
        .unwrap();

        let mut scope = SweepScope::default();
        scope.cards.insert("Her (Ultimate)".to_string());
        assert_eq!(conn.retire_stale(&scope, at(2_000)).unwrap(), 1);

        let scope = SweepScope::everything();
        assert_eq!(conn.retire_stale(&scope, at(3_000)).unwrap(), 2);

        let counts = table_counts(&conn).unwrap();
        assert_eq!(counts.brand_cards, 3);
        assert_eq!(counts.active_brand_cards, 0);
    }

    #[test]
    fn test_snapshot_and_sample() {
        let conn = seeded();
        let link = SyncRecord::new("Store X", "Acme (TCN)", Source::Tcn);
        conn.upsert_associations(&[link], at(1_000)).unwrap();
        let link = SyncRecord::new("Store Y", "Acme (TCN)", Source::Tcn);
        conn.upsert_associations(&[link], at(2_000)).unwrap();

        let snapshot = get_snapshot(&conn).unwrap();
        assert_eq!(snapshot.brands.len(), 2);
        assert_eq!(snapshot.cards.len(), 2);
        assert_eq!(snapshot.brand_cards.len(), 2);

        let sample = sample_associations(&conn, 1).unwrap();
        assert_eq!(sample.len(), 1);
        assert_eq!(sample[0].brand_name, "Store Y");
        assert_eq!(sample[0].last_seen_at, at(2_000));
    }

    #[test]
    fn test_unknown_source_is_a_read_error() {
        let conn = seeded();
        conn.execute(
            "INSERT INTO brand_cards (brand_name, card_name, source, last_updated_at)
             VALUES ('Store X', 'Acme (TCN)', 'providerC', 1000)",
            [],
        )
        .unwrap();

        assert!(get_all_associations(&conn).is_err());
    }

    #[test]
    fn test_sync_run_history() {
        let conn = seeded();
        for (i, success) in [true, false].into_iter().enumerate() {
            let run = SyncRunRecord {
                run_id: uuid::Uuid::new_v4().to_string(),
                started_at: at(1_000 * (i as i64 + 1)),
                finished_at: at(1_000 * (i as i64 + 1) + 500),
                success,
                had_adapter_error: !success,
                brands: 2,
                cards: 2,
                records: 3,
                retired: i,
                error: (!success).then(|| "tcn: 1 unit failed".to_string()),
                details: serde_json::json!([{ "source": "tcn", "records": 3 }]),
            };
            insert_sync_run(&conn, &run).unwrap();
        }

        let runs = get_recent_runs(&conn, 10).unwrap();
        assert_eq!(runs.len(), 2);
        assert!(!runs[0].success);
        assert_eq!(runs[0].error.as_deref(), Some("tcn: 1 unit failed"));
        assert_eq!(runs[0].details[0]["source"], "tcn");
        assert!(runs[1].success);

        assert_eq!(get_recent_runs(&conn, 1).unwrap().len(), 1);
    }
}
