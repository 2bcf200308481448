// 📤 CSV export of stored statistics

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

use crate::db::{self, StatisticRow, StatisticsFilter};

/// Flat CSV row; the csv writer cannot serialize flattened structs
#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    month: String,
    bank_name: &'a str,
    bank_type: &'a str,
    is_revised: bool,
    atm_onsite: i64,
    atm_offsite: i64,
    pos_terminals: i64,
    micro_atms: i64,
    bharat_qr_codes: i64,
    upi_qr_codes: i64,
    credit_cards: i64,
    debit_cards: i64,
    pos_txn_volume: i64,
    pos_txn_value: f64,
    online_txn_volume: i64,
    online_txn_value: f64,
    source_file: &'a str,
}

impl<'a> From<&'a StatisticRow> for ExportRow<'a> {
    fn from(row: &'a StatisticRow) -> Self {
        let m = &row.metrics;
        ExportRow {
            month: db::month_key(row.month),
            bank_name: &row.bank_name,
            bank_type: &row.bank_type,
            is_revised: row.is_revised,
            atm_onsite: m.atm_onsite,
            atm_offsite: m.atm_offsite,
            pos_terminals: m.pos_terminals,
            micro_atms: m.micro_atms,
            bharat_qr_codes: m.bharat_qr_codes,
            upi_qr_codes: m.upi_qr_codes,
            credit_cards: m.credit_cards,
            debit_cards: m.debit_cards,
            pos_txn_volume: m.pos_txn_volume,
            pos_txn_value: m.pos_txn_value,
            online_txn_volume: m.online_txn_volume,
            online_txn_value: m.online_txn_value,
            source_file: &row.source_file,
        }
    }
}

/// Write matching statistics as CSV, returns the number of rows written
pub fn write_csv<W: Write>(conn: &Connection, filter: &StatisticsFilter, out: W) -> Result<usize> {
    let rows = db::query_statistics(conn, filter)?;
    let mut writer = csv::Writer::from_writer(out);

    for row in &rows {
        writer.serialize(ExportRow::from(row))?;
    }
    writer.flush()?;

    Ok(rows.len())
}

pub fn export_csv(conn: &Connection, filter: &StatisticsFilter, path: &Path) -> Result<usize> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let count = write_csv(conn, filter, file)?;

    tracing::info!(path = %path.display(), rows = count, "statistics exported");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::category::{BankCategory, CategorySource};
    use crate::extract::{Metrics, NormalizedRecord, SourceFile};
    use crate::reconciliation::MergeEngine;
    use chrono::NaiveDate;

    fn seeded() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();

        let source = SourceFile {
            name: "ATMMar2025.csv".to_string(),
            reporting_month: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            is_revised: false,
        };
        let record = NormalizedRecord {
            canonical_bank_name: "STATE BANK OF INDIA".to_string(),
            bank_type: BankCategory::PublicSector,
            category_source: CategorySource::Banner,
            reporting_month: source.reporting_month,
            source_file: source.name.clone(),
            is_revised: false,
            metrics: Metrics {
                debit_cards: 42,
                pos_txn_value: 10.5,
                ..Metrics::default()
            },
        };
        MergeEngine::default()
            .merge_file(&mut conn, &source, "h", &[record])
            .unwrap();
        conn
    }

    #[test]
    fn test_write_csv_has_header_and_rows() {
        let conn = seeded();
        let mut out = Vec::new();
        let count = write_csv(&conn, &StatisticsFilter::default(), &mut out).unwrap();
        assert_eq!(count, 1);

        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("month,bank_name,bank_type,is_revised,atm_onsite"));
        assert!(header.ends_with("online_txn_value,source_file"));

        let row = lines.next().unwrap();
        assert!(row.starts_with("2025-03-01,STATE BANK OF INDIA,Public Sector Banks,false"));
        assert!(row.contains(",42,"));
        assert!(row.ends_with("ATMMar2025.csv"));
    }

    #[test]
    fn test_export_csv_to_file() {
        let conn = seeded();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");

        let filter = StatisticsFilter {
            category: Some("Private Sector Banks".to_string()),
            ..StatisticsFilter::default()
        };
        assert_eq!(export_csv(&conn, &filter, &path).unwrap(), 0);
        assert_eq!(export_csv(&conn, &StatisticsFilter::default(), &path).unwrap(), 1);

        let mut reader = csv::Reader::from_path(&path).unwrap();
        assert_eq!(reader.records().count(), 1);
    }
}
