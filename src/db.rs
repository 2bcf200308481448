// 🗄️ Canonical store - banks, monthly statistics, source-file ledger, events
//
// Store primitives used inside the per-file merge transaction return
// `rusqlite::Result` so a failure maps onto the transaction error kind.
// The read-side query layer returns `anyhow::Result` like the rest of the
// application edge.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::entities::bank::{canonical_bank_name, BankEntity};
use crate::entities::category::{BankCategory, CategorySource};
use crate::extract::{Metrics, NormalizedRecord};
use crate::schema::CanonicalField;

const MONTH_FORMAT: &str = "%Y-%m-%d";

/// Event for audit trail
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

/// One persisted statistic, as the merge engine sees it
#[derive(Debug, Clone, PartialEq)]
pub struct StoredStatistic {
    pub bank_id: String,
    pub month: NaiveDate,
    pub is_revised: bool,
    pub source_file: String,
    pub metrics: Metrics,
}

/// Ledger entry for one merged source file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFileEntry {
    pub file_name: String,
    pub content_hash: String,
    pub month: NaiveDate,
    pub is_revised: bool,
    pub record_count: usize,
    pub ingested_at: DateTime<Utc>,
}

pub fn open_database(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory: {}", parent.display()))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database: {}", path.display()))?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // Banks (one row per canonical name)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS banks (
            id TEXT PRIMARY KEY,
            canonical_name TEXT UNIQUE NOT NULL,
            bank_type TEXT NOT NULL,
            category_source TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Monthly statistics - at most one row per (bank, month)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS monthly_statistics (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            bank_id TEXT NOT NULL REFERENCES banks(id),
            month TEXT NOT NULL,
            is_revised INTEGER NOT NULL DEFAULT 0,
            atm_onsite INTEGER NOT NULL DEFAULT 0,
            atm_offsite INTEGER NOT NULL DEFAULT 0,
            pos_terminals INTEGER NOT NULL DEFAULT 0,
            micro_atms INTEGER NOT NULL DEFAULT 0,
            bharat_qr_codes INTEGER NOT NULL DEFAULT 0,
            upi_qr_codes INTEGER NOT NULL DEFAULT 0,
            credit_cards INTEGER NOT NULL DEFAULT 0,
            debit_cards INTEGER NOT NULL DEFAULT 0,
            pos_txn_volume INTEGER NOT NULL DEFAULT 0,
            pos_txn_value REAL NOT NULL DEFAULT 0,
            online_txn_volume INTEGER NOT NULL DEFAULT 0,
            online_txn_value REAL NOT NULL DEFAULT 0,
            source_file TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(bank_id, month)
        )",
        [],
    )?;

    // ==========================================================================
    // Source-file ledger
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS source_files (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_name TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            month TEXT NOT NULL,
            is_revised INTEGER NOT NULL,
            record_count INTEGER NOT NULL,
            ingested_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_stats_month ON monthly_statistics(month)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_banks_type ON banks(bank_type)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_source_files_hash ON source_files(content_hash)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

/// SHA-256 of a source file's bytes
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub fn month_key(month: NaiveDate) -> String {
    month.format(MONTH_FORMAT).to_string()
}

fn parse_month(raw: &str, col: usize) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, MONTH_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(col, Type::Text, Box::new(e)))
}

fn parse_timestamp(raw: &str, col: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(col, Type::Text, Box::new(e)))
}

// ============================================================================
// BANKS
// ============================================================================

fn bank_from_row(row: &Row) -> rusqlite::Result<BankEntity> {
    let bank_type: String = row.get(2)?;
    let source: String = row.get(3)?;
    let created_at: String = row.get(4)?;

    Ok(BankEntity {
        id: row.get(0)?,
        canonical_name: row.get(1)?,
        bank_type: BankCategory::from_label(&bank_type),
        category_source: CategorySource::parse(&source),
        created_at: parse_timestamp(&created_at, 4)?,
    })
}

pub fn find_bank(conn: &Connection, canonical_name: &str) -> rusqlite::Result<Option<BankEntity>> {
    conn.query_row(
        "SELECT id, canonical_name, bank_type, category_source, created_at
         FROM banks WHERE canonical_name = ?1",
        [canonical_name],
        bank_from_row,
    )
    .optional()
}

pub fn insert_bank(conn: &Connection, bank: &BankEntity) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO banks (id, canonical_name, bank_type, category_source, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            bank.id,
            bank.canonical_name,
            bank.bank_type.label(),
            bank.category_source.as_str(),
            bank.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn update_bank_type(conn: &Connection, bank: &BankEntity) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE banks SET bank_type = ?1, category_source = ?2 WHERE id = ?3",
        params![bank.bank_type.label(), bank.category_source.as_str(), bank.id],
    )?;
    Ok(())
}

/// Explicit reclassification; the only path that overrides an established type.
/// Returns false when no bank matches `name`.
pub fn reclassify_bank(conn: &Connection, name: &str, category: BankCategory) -> Result<bool> {
    let canonical = canonical_bank_name(name);
    let Some(mut bank) = find_bank(conn, &canonical)? else {
        return Ok(false);
    };

    let previous = bank.bank_type.clone();
    bank.reclassify(category);
    update_bank_type(conn, &bank)?;

    insert_event(
        conn,
        &Event::new(
            "bank_reclassified",
            "bank",
            &bank.id,
            serde_json::json!({
                "bank": bank.canonical_name,
                "from": previous.label(),
                "to": bank.bank_type.label(),
            }),
            "operator",
        ),
    )?;

    tracing::info!(bank = %bank.canonical_name, from = %previous, to = %bank.bank_type, "bank reclassified");
    Ok(true)
}

// ============================================================================
// MONTHLY STATISTICS (write side)
// ============================================================================

const METRIC_COLUMNS: &str = "atm_onsite, atm_offsite, pos_terminals, micro_atms, bharat_qr_codes, \
     upi_qr_codes, credit_cards, debit_cards, pos_txn_volume, pos_txn_value, \
     online_txn_volume, online_txn_value";

/// Read the twelve metric columns starting at `offset`
fn metrics_from_row(row: &Row, offset: usize) -> rusqlite::Result<Metrics> {
    Ok(Metrics {
        atm_onsite: row.get(offset)?,
        atm_offsite: row.get(offset + 1)?,
        pos_terminals: row.get(offset + 2)?,
        micro_atms: row.get(offset + 3)?,
        bharat_qr_codes: row.get(offset + 4)?,
        upi_qr_codes: row.get(offset + 5)?,
        credit_cards: row.get(offset + 6)?,
        debit_cards: row.get(offset + 7)?,
        pos_txn_volume: row.get(offset + 8)?,
        pos_txn_value: row.get(offset + 9)?,
        online_txn_volume: row.get(offset + 10)?,
        online_txn_value: row.get(offset + 11)?,
    })
}

pub fn get_statistic(
    conn: &Connection,
    bank_id: &str,
    month: NaiveDate,
) -> rusqlite::Result<Option<StoredStatistic>> {
    let sql = format!(
        "SELECT bank_id, month, is_revised, source_file, {METRIC_COLUMNS}
         FROM monthly_statistics WHERE bank_id = ?1 AND month = ?2"
    );

    conn.query_row(&sql, params![bank_id, month_key(month)], |row| {
        let month: String = row.get(1)?;
        Ok(StoredStatistic {
            bank_id: row.get(0)?,
            month: parse_month(&month, 1)?,
            is_revised: row.get(2)?,
            source_file: row.get(3)?,
            metrics: metrics_from_row(row, 4)?,
        })
    })
    .optional()
}

pub fn insert_statistic(
    conn: &Connection,
    bank_id: &str,
    record: &NormalizedRecord,
) -> rusqlite::Result<()> {
    let m = &record.metrics;
    conn.execute(
        &format!(
            "INSERT INTO monthly_statistics (
                bank_id, month, is_revised, {METRIC_COLUMNS}, source_file, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
        ),
        params![
            bank_id,
            month_key(record.reporting_month),
            record.is_revised,
            m.atm_onsite,
            m.atm_offsite,
            m.pos_terminals,
            m.micro_atms,
            m.bharat_qr_codes,
            m.upi_qr_codes,
            m.credit_cards,
            m.debit_cards,
            m.pos_txn_volume,
            m.pos_txn_value,
            m.online_txn_volume,
            m.online_txn_value,
            record.source_file,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Replace all twelve metrics in place and set the revised flag
pub fn overwrite_statistic(
    conn: &Connection,
    bank_id: &str,
    record: &NormalizedRecord,
    is_revised: bool,
) -> rusqlite::Result<()> {
    let m = &record.metrics;
    conn.execute(
        "UPDATE monthly_statistics SET
            is_revised = ?3,
            atm_onsite = ?4, atm_offsite = ?5, pos_terminals = ?6, micro_atms = ?7,
            bharat_qr_codes = ?8, upi_qr_codes = ?9, credit_cards = ?10, debit_cards = ?11,
            pos_txn_volume = ?12, pos_txn_value = ?13, online_txn_volume = ?14,
            online_txn_value = ?15, source_file = ?16, updated_at = ?17
         WHERE bank_id = ?1 AND month = ?2",
        params![
            bank_id,
            month_key(record.reporting_month),
            is_revised,
            m.atm_onsite,
            m.atm_offsite,
            m.pos_terminals,
            m.micro_atms,
            m.bharat_qr_codes,
            m.upi_qr_codes,
            m.credit_cards,
            m.debit_cards,
            m.pos_txn_volume,
            m.pos_txn_value,
            m.online_txn_volume,
            m.online_txn_value,
            record.source_file,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn record_source_file(conn: &Connection, entry: &SourceFileEntry) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO source_files (file_name, content_hash, month, is_revised, record_count, ingested_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            entry.file_name,
            entry.content_hash,
            month_key(entry.month),
            entry.is_revised,
            entry.record_count as i64,
            entry.ingested_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn list_source_files(conn: &Connection) -> Result<Vec<SourceFileEntry>> {
    let mut stmt = conn.prepare(
        "SELECT file_name, content_hash, month, is_revised, record_count, ingested_at
         FROM source_files ORDER BY id",
    )?;

    let entries = stmt
        .query_map([], |row| {
            let month: String = row.get(2)?;
            let count: i64 = row.get(4)?;
            let ingested_at: String = row.get(5)?;
            Ok(SourceFileEntry {
                file_name: row.get(0)?,
                content_hash: row.get(1)?,
                month: parse_month(&month, 2)?,
                is_revised: row.get(3)?,
                record_count: count.max(0) as usize,
                ingested_at: parse_timestamp(&ingested_at, 5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(entries)
}

// ============================================================================
// EVENTS
// ============================================================================

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> rusqlite::Result<()> {
    let data_json = serde_json::to_string(&event.data)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY id",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: parse_timestamp(&timestamp_str, 1)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e))
                })?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

// ============================================================================
// QUERY LAYER (read side)
// ============================================================================

/// Joined statistic row served to consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticRow {
    pub bank_name: String,
    pub bank_type: String,
    pub month: NaiveDate,
    pub is_revised: bool,
    pub source_file: String,
    #[serde(flatten)]
    pub metrics: Metrics,
}

/// All filters optional; `bank` accepts any spelling of the bank name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatisticsFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub bank: Option<String>,
    pub category: Option<String>,
}

pub fn query_statistics(conn: &Connection, filter: &StatisticsFilter) -> Result<Vec<StatisticRow>> {
    let sql = format!(
        "SELECT b.canonical_name, b.bank_type, s.month, s.is_revised, s.source_file, {}
         FROM monthly_statistics s
         JOIN banks b ON b.id = s.bank_id
         WHERE (?1 IS NULL OR s.month >= ?1)
           AND (?2 IS NULL OR s.month <= ?2)
           AND (?3 IS NULL OR b.canonical_name = ?3)
           AND (?4 IS NULL OR b.bank_type = ?4)
         ORDER BY s.month, b.canonical_name",
        METRIC_COLUMNS
            .split(", ")
            .map(|c| format!("s.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ")
    );

    let bank = filter.bank.as_deref().map(canonical_bank_name);
    let category = filter
        .category
        .as_deref()
        .map(|c| BankCategory::from_label(c).label().to_string());

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            params![
                filter.from.map(month_key),
                filter.to.map(month_key),
                bank,
                category,
            ],
            |row| {
                let month: String = row.get(2)?;
                Ok(StatisticRow {
                    bank_name: row.get(0)?,
                    bank_type: row.get(1)?,
                    month: parse_month(&month, 2)?,
                    is_revised: row.get(3)?,
                    source_file: row.get(4)?,
                    metrics: metrics_from_row(row, 5)?,
                })
            },
        )?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Banks, optionally restricted to one category
pub fn list_banks(conn: &Connection, category: Option<&str>) -> Result<Vec<BankEntity>> {
    let category = category.map(|c| BankCategory::from_label(c).label().to_string());
    let mut stmt = conn.prepare(
        "SELECT id, canonical_name, bank_type, category_source, created_at
         FROM banks
         WHERE (?1 IS NULL OR bank_type = ?1)
         ORDER BY canonical_name",
    )?;

    let banks = stmt
        .query_map(params![category], bank_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(banks)
}

pub fn list_categories(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT DISTINCT bank_type FROM banks ORDER BY bank_type")?;
    let categories = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(categories)
}

pub fn list_months(conn: &Connection) -> Result<Vec<NaiveDate>> {
    let mut stmt = conn.prepare("SELECT DISTINCT month FROM monthly_statistics ORDER BY month")?;
    let months = stmt
        .query_map([], |row| {
            let month: String = row.get(0)?;
            parse_month(&month, 0)
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(months)
}

pub fn statistic_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM monthly_statistics", [], |row| row.get(0))?;
    Ok(count)
}

/// One point of a month-over-month series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthPoint {
    pub month: NaiveDate,
    pub value: f64,
    /// Percent change from the previous stored month; None for the first
    /// month or when the previous value is zero
    pub growth_pct: Option<f64>,
}

/// Month-over-month growth of one metric for one bank
pub fn month_over_month_growth(
    conn: &Connection,
    bank: &str,
    metric: CanonicalField,
) -> Result<Vec<GrowthPoint>> {
    if metric == CanonicalField::BankName || metric == CanonicalField::BankType {
        anyhow::bail!("{} is not a metric", metric.name());
    }

    let filter = StatisticsFilter {
        bank: Some(bank.to_string()),
        ..StatisticsFilter::default()
    };

    let mut previous: Option<f64> = None;
    let mut points = Vec::new();

    for row in query_statistics(conn, &filter)? {
        let value = row.metrics.get(metric).unwrap_or(0.0);
        let growth_pct = previous
            .filter(|p| *p != 0.0)
            .map(|p| (value - p) / p * 100.0);
        points.push(GrowthPoint {
            month: row.month,
            value,
            growth_pct,
        });
        previous = Some(value);
    }

    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(bank: &str, month: (i32, u32), debit_cards: i64) -> NormalizedRecord {
        NormalizedRecord {
            canonical_bank_name: bank.to_string(),
            bank_type: BankCategory::PrivateSector,
            category_source: CategorySource::Inferred,
            reporting_month: NaiveDate::from_ymd_opt(month.0, month.1, 1).unwrap(),
            source_file: "test.csv".to_string(),
            is_revised: false,
            metrics: Metrics {
                debit_cards,
                pos_txn_value: 12.5,
                ..Metrics::default()
            },
        }
    }

    fn seed(conn: &Connection, name: &str, category: BankCategory) -> BankEntity {
        let bank = BankEntity::new(name.to_string(), category, CategorySource::Banner);
        insert_bank(conn, &bank).unwrap();
        bank
    }

    #[test]
    fn test_setup_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        setup_database(&conn).unwrap();
        assert_eq!(statistic_count(&conn).unwrap(), 0);
    }

    #[test]
    fn test_bank_round_trip() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let bank = seed(&conn, "HDFC BANK", BankCategory::PrivateSector);
        let found = find_bank(&conn, "HDFC BANK").unwrap().unwrap();
        assert_eq!(found.id, bank.id);
        assert_eq!(found.bank_type, BankCategory::PrivateSector);
        assert_eq!(found.category_source, CategorySource::Banner);
        assert!(find_bank(&conn, "NOPE").unwrap().is_none());
    }

    #[test]
    fn test_statistic_insert_and_overwrite() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        let bank = seed(&conn, "HDFC BANK", BankCategory::PrivateSector);

        let original = record("HDFC BANK", (2024, 11), 100);
        insert_statistic(&conn, &bank.id, &original).unwrap();

        let month = original.reporting_month;
        let stored = get_statistic(&conn, &bank.id, month).unwrap().unwrap();
        assert!(!stored.is_revised);
        assert_eq!(stored.metrics, original.metrics);

        let revised = record("HDFC BANK", (2024, 11), 250);
        overwrite_statistic(&conn, &bank.id, &revised, true).unwrap();
        let stored = get_statistic(&conn, &bank.id, month).unwrap().unwrap();
        assert!(stored.is_revised);
        assert_eq!(stored.metrics.debit_cards, 250);

        // A second row for the same (bank, month) violates the store invariant
        assert!(insert_statistic(&conn, &bank.id, &original).is_err());
        assert_eq!(statistic_count(&conn).unwrap(), 1);
    }

    #[test]
    fn test_query_filters() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        let hdfc = seed(&conn, "HDFC BANK", BankCategory::PrivateSector);
        let sbi = seed(&conn, "STATE BANK OF INDIA", BankCategory::PublicSector);

        insert_statistic(&conn, &hdfc.id, &record("HDFC BANK", (2024, 10), 1)).unwrap();
        insert_statistic(&conn, &hdfc.id, &record("HDFC BANK", (2024, 11), 2)).unwrap();
        insert_statistic(&conn, &sbi.id, &record("STATE BANK OF INDIA", (2024, 11), 3)).unwrap();

        let all = query_statistics(&conn, &StatisticsFilter::default()).unwrap();
        assert_eq!(all.len(), 3);

        let nov = query_statistics(
            &conn,
            &StatisticsFilter {
                from: NaiveDate::from_ymd_opt(2024, 11, 1),
                ..StatisticsFilter::default()
            },
        )
        .unwrap();
        assert_eq!(nov.len(), 2);

        // Any spelling of the bank works
        let sbi_rows = query_statistics(
            &conn,
            &StatisticsFilter {
                bank: Some("SBI".to_string()),
                ..StatisticsFilter::default()
            },
        )
        .unwrap();
        assert_eq!(sbi_rows.len(), 1);
        assert_eq!(sbi_rows[0].metrics.debit_cards, 3);

        let public = query_statistics(
            &conn,
            &StatisticsFilter {
                category: Some("public sector".to_string()),
                ..StatisticsFilter::default()
            },
        )
        .unwrap();
        assert_eq!(public.len(), 1);

        assert_eq!(list_months(&conn).unwrap().len(), 2);
        assert_eq!(
            list_categories(&conn).unwrap(),
            vec!["Private Sector Banks".to_string(), "Public Sector Banks".to_string()]
        );
        assert_eq!(list_banks(&conn, Some("Public Sector Banks")).unwrap().len(), 1);
        assert_eq!(list_banks(&conn, None).unwrap().len(), 2);
    }

    #[test]
    fn test_month_over_month_growth() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        let hdfc = seed(&conn, "HDFC BANK", BankCategory::PrivateSector);

        insert_statistic(&conn, &hdfc.id, &record("HDFC BANK", (2024, 9), 0)).unwrap();
        insert_statistic(&conn, &hdfc.id, &record("HDFC BANK", (2024, 10), 200)).unwrap();
        insert_statistic(&conn, &hdfc.id, &record("HDFC BANK", (2024, 11), 250)).unwrap();

        let growth = month_over_month_growth(&conn, "HDFC Bank Ltd", CanonicalField::DebitCards).unwrap();
        assert_eq!(growth.len(), 3);
        assert_eq!(growth[0].growth_pct, None);
        assert_eq!(growth[1].growth_pct, None);
        assert_eq!(growth[2].growth_pct, Some(25.0));

        assert!(month_over_month_growth(&conn, "HDFC", CanonicalField::BankName).is_err());
    }

    #[test]
    fn test_reclassify_bank() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        let bank = seed(&conn, "IDBI BANK", BankCategory::PublicSector);

        assert!(reclassify_bank(&conn, "IDBI Bank Ltd", BankCategory::PrivateSector).unwrap());
        let found = find_bank(&conn, "IDBI BANK").unwrap().unwrap();
        assert_eq!(found.bank_type, BankCategory::PrivateSector);
        assert_eq!(found.category_source, CategorySource::Manual);

        let events = get_events_for_entity(&conn, "bank", &bank.id).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "bank_reclassified");

        assert!(!reclassify_bank(&conn, "Unheard Of Bank", BankCategory::Foreign).unwrap());
    }

    #[test]
    fn test_source_file_ledger() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let entry = SourceFileEntry {
            file_name: "ATMMarch2025.xlsx".to_string(),
            content_hash: content_hash(b"bytes"),
            month: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            is_revised: false,
            record_count: 42,
            ingested_at: Utc::now(),
        };
        record_source_file(&conn, &entry).unwrap();

        let entries = list_source_files(&conn).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].record_count, 42);
        assert_eq!(entries[0].content_hash.len(), 64);
    }

    #[test]
    fn test_event_log() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let event = Event::new(
            "bank_created",
            "bank",
            "test_id_123",
            serde_json::json!({"bank": "HDFC BANK"}),
            "merge_engine",
        );

        insert_event(&conn, &event).unwrap();

        let events = get_events_for_entity(&conn, "bank", "test_id_123").unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "bank_created");
        assert_eq!(events[0].actor, "merge_engine");
    }
}
