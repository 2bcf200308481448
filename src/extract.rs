// 🧾 Record Extractor - grid rows → NormalizedRecords
//
// Walks the rows below the header block. Banner rows update the active
// category, data rows become one record each, everything else is skipped.
// Missing columns and junk cells degrade to zero with a warning; only a
// missing header aborts the file.

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use crate::config::Config;
use crate::entities::bank::BankNormalizer;
use crate::entities::category::{banner_in_row, BankCategory, BannerState, CategoryClassifier, CategorySource};
use crate::error::IngestResult;
use crate::grid::{Cell, RawGrid};
use crate::header::{HeaderLocation, HeaderLocator};
use crate::schema::{CanonicalField, ColumnMap, SchemaMapper};

// ============================================================================
// RECORDS
// ============================================================================

/// The twelve metrics of one bank in one month. Counts are whole numbers,
/// the two *_value fields are amounts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub atm_onsite: i64,
    pub atm_offsite: i64,
    pub pos_terminals: i64,
    pub micro_atms: i64,
    pub bharat_qr_codes: i64,
    pub upi_qr_codes: i64,
    pub credit_cards: i64,
    pub debit_cards: i64,
    pub pos_txn_volume: i64,
    pub pos_txn_value: f64,
    pub online_txn_volume: i64,
    pub online_txn_value: f64,
}

impl Metrics {
    fn count_mut(&mut self, field: CanonicalField) -> Option<&mut i64> {
        match field {
            CanonicalField::AtmOnsite => Some(&mut self.atm_onsite),
            CanonicalField::AtmOffsite => Some(&mut self.atm_offsite),
            CanonicalField::PosTerminals => Some(&mut self.pos_terminals),
            CanonicalField::MicroAtms => Some(&mut self.micro_atms),
            CanonicalField::BharatQrCodes => Some(&mut self.bharat_qr_codes),
            CanonicalField::UpiQrCodes => Some(&mut self.upi_qr_codes),
            CanonicalField::CreditCards => Some(&mut self.credit_cards),
            CanonicalField::DebitCards => Some(&mut self.debit_cards),
            CanonicalField::PosTxnVolume => Some(&mut self.pos_txn_volume),
            CanonicalField::OnlineTxnVolume => Some(&mut self.online_txn_volume),
            _ => None,
        }
    }

    fn amount_mut(&mut self, field: CanonicalField) -> Option<&mut f64> {
        match field {
            CanonicalField::PosTxnValue => Some(&mut self.pos_txn_value),
            CanonicalField::OnlineTxnValue => Some(&mut self.online_txn_value),
            _ => None,
        }
    }

    /// Metric value as a float, for growth and export
    pub fn get(&self, field: CanonicalField) -> Option<f64> {
        let value = match field {
            CanonicalField::AtmOnsite => self.atm_onsite as f64,
            CanonicalField::AtmOffsite => self.atm_offsite as f64,
            CanonicalField::PosTerminals => self.pos_terminals as f64,
            CanonicalField::MicroAtms => self.micro_atms as f64,
            CanonicalField::BharatQrCodes => self.bharat_qr_codes as f64,
            CanonicalField::UpiQrCodes => self.upi_qr_codes as f64,
            CanonicalField::CreditCards => self.credit_cards as f64,
            CanonicalField::DebitCards => self.debit_cards as f64,
            CanonicalField::PosTxnVolume => self.pos_txn_volume as f64,
            CanonicalField::PosTxnValue => self.pos_txn_value,
            CanonicalField::OnlineTxnVolume => self.online_txn_volume as f64,
            CanonicalField::OnlineTxnValue => self.online_txn_value,
            CanonicalField::BankName | CanonicalField::BankType => return None,
        };
        Some(value)
    }

    /// Parse `cell` into `field`. Returns false when the cell was unparsable
    /// (the field is then zero).
    pub fn set_from_cell(&mut self, field: CanonicalField, cell: &Cell) -> bool {
        if let Some(slot) = self.amount_mut(field) {
            let parsed = parse_amount(cell);
            *slot = parsed.unwrap_or(0.0);
            return parsed.is_some();
        }
        if let Some(slot) = self.count_mut(field) {
            let parsed = parse_count(cell);
            *slot = parsed.unwrap_or(0);
            return parsed.is_some();
        }
        true
    }
}

/// One bank row of one source file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub canonical_bank_name: String,
    pub bank_type: BankCategory,
    pub category_source: CategorySource,

    /// Always the first day of the month
    pub reporting_month: NaiveDate,

    pub source_file: String,
    pub is_revised: bool,
    pub metrics: Metrics,
}

/// File-level facts every record of a file shares
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    pub name: String,
    pub reporting_month: NaiveDate,
    pub is_revised: bool,
}

// ============================================================================
// WARNINGS
// ============================================================================

/// Degraded-success conditions; the file is still ingested
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ExtractionWarning {
    /// Header lacks these fields; they are zero for every row
    SchemaIncomplete { missing: Vec<CanonicalField> },

    /// Cell could not be read as a number; the field is zero for this row
    UnparsableCell {
        row: usize,
        field: CanonicalField,
        raw: String,
    },
}

impl fmt::Display for ExtractionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionWarning::SchemaIncomplete { missing } => {
                let names: Vec<&str> = missing.iter().map(|m| m.name()).collect();
                write!(f, "schema incomplete, defaulting to zero: {}", names.join(", "))
            }
            ExtractionWarning::UnparsableCell { row, field, raw } => {
                write!(f, "row {}: unparsable {} value {:?}", row, field.name(), raw)
            }
        }
    }
}

/// Result of extracting one file
#[derive(Debug, Clone)]
pub struct Extraction {
    pub header: HeaderLocation,
    pub columns: ColumnMap,
    pub records: Vec<NormalizedRecord>,
    pub warnings: Vec<ExtractionWarning>,
}

impl Extraction {
    pub fn unparsable_cells(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| matches!(w, ExtractionWarning::UnparsableCell { .. }))
            .count()
    }

    pub fn schema_incomplete(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, ExtractionWarning::SchemaIncomplete { .. }))
    }
}

// ============================================================================
// NUMERIC PARSING
// ============================================================================

/// Keep digits, '.', '-' and parse; negatives are not valid statistics
fn parse_number(cell: &Cell) -> Option<f64> {
    let value = match cell {
        Cell::Empty => return Some(0.0),
        Cell::Number(n) => *n,
        Cell::Text(raw) => {
            let cleaned: String = raw
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            cleaned.parse::<f64>().ok()?
        }
    };

    if value.is_finite() && value >= 0.0 {
        Some(value)
    } else {
        None
    }
}

/// Whole count; fractional parts are dropped
pub fn parse_count(cell: &Cell) -> Option<i64> {
    parse_number(cell).map(|v| v.trunc() as i64)
}

pub fn parse_amount(cell: &Cell) -> Option<f64> {
    parse_number(cell)
}

// ============================================================================
// REPORTING MONTH
// ============================================================================

fn month_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*[\s_.,'-]*(\d{4}|\d{2})(?:\D|$)",
        )
        .expect("invalid month token regex")
    })
}

/// First-of-month date from a month name/abbreviation followed by a 2- or
/// 4-digit year ("ATMMarch2025.xlsx", "ATM_Nov_24.xls", "March 2025 (Revised)")
pub fn reporting_month_from_name(name: &str) -> Option<NaiveDate> {
    for caps in month_token_re().captures_iter(name) {
        let month = match caps[1].to_ascii_lowercase().as_str() {
            "jan" => 1,
            "feb" => 2,
            "mar" => 3,
            "apr" => 4,
            "may" => 5,
            "jun" => 6,
            "jul" => 7,
            "aug" => 8,
            "sep" => 9,
            "oct" => 10,
            "nov" => 11,
            "dec" => 12,
            _ => continue,
        };

        let digits = &caps[2];
        let Ok(year) = digits.parse::<i32>() else {
            continue;
        };
        let year = if digits.len() == 2 { 2000 + year } else { year };

        if let Some(date) = NaiveDate::from_ymd_opt(year, month, 1) {
            return Some(date);
        }
    }
    None
}

/// Files and listing labels marked "revised" (case-insensitive)
pub fn is_revised_name(name: &str) -> bool {
    name.to_lowercase().contains("revised")
}

// ============================================================================
// RECORD EXTRACTOR
// ============================================================================

const MIN_BANK_NAME_LEN: usize = 3;

pub struct RecordExtractor {
    locator: HeaderLocator,
    mapper: SchemaMapper,
    classifier: CategoryClassifier,
}

impl RecordExtractor {
    pub fn new(locator: HeaderLocator, mapper: SchemaMapper, classifier: CategoryClassifier) -> Self {
        RecordExtractor {
            locator,
            mapper,
            classifier,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        RecordExtractor::new(
            HeaderLocator::new(&config.anchor_label, config.header_scan_rows),
            SchemaMapper::new(&config.anchor_label),
            CategoryClassifier::new(config.banner_window),
        )
    }

    pub fn extract(
        &self,
        grid: &RawGrid,
        source: &SourceFile,
        normalizer: &mut BankNormalizer,
    ) -> IngestResult<Extraction> {
        let header = self.locator.locate(grid)?;
        let columns = self.mapper.map(grid, &header);
        let mut warnings = Vec::new();

        if !columns.is_complete() {
            let missing = columns.missing();
            tracing::warn!(
                file = %source.name,
                missing = missing.len(),
                "schema incomplete, absent fields default to zero"
            );
            warnings.push(ExtractionWarning::SchemaIncomplete { missing });
        }

        let bank_col = columns.get(CanonicalField::BankName).unwrap_or(header.anchor_col);
        let type_col = columns.get(CanonicalField::BankType);
        let data_start = header.data_start();

        let mut state = BannerState::new();
        let mut records = Vec::new();

        for row_idx in data_start..grid.len() {
            let row = grid.row(row_idx);

            if let Some(text) = banner_in_row(row) {
                state = state.with_banner(&text);
                continue;
            }

            let Some(raw_name) = bank_name_of(grid.cell(row_idx, bank_col)) else {
                let first = grid.cell(row_idx, 0);
                if first.is_non_numeric_text() {
                    if let Some(text) = first.as_text() {
                        state = state.with_banner(text);
                    }
                }
                continue;
            };

            if is_total_row(raw_name) {
                continue;
            }

            let canonical = normalizer.normalize(raw_name);
            let type_text = type_col.and_then(|c| grid.cell(row_idx, c).as_text());

            let (next_state, classification) =
                self.classifier
                    .classify(state, grid, row_idx, data_start, &canonical, type_text);
            state = next_state;

            let mut metrics = Metrics::default();
            for field in CanonicalField::METRICS {
                let Some(col) = columns.get(field) else {
                    continue;
                };
                let cell = grid.cell(row_idx, col);
                if !metrics.set_from_cell(field, cell) {
                    tracing::debug!(
                        file = %source.name,
                        row = row_idx,
                        field = field.name(),
                        raw = %cell.display(),
                        "unparsable cell, using zero"
                    );
                    warnings.push(ExtractionWarning::UnparsableCell {
                        row: row_idx,
                        field,
                        raw: cell.display(),
                    });
                }
            }

            records.push(NormalizedRecord {
                canonical_bank_name: canonical,
                bank_type: classification.category,
                category_source: classification.source,
                reporting_month: source.reporting_month,
                source_file: source.name.clone(),
                is_revised: source.is_revised,
                metrics,
            });
        }

        tracing::info!(
            file = %source.name,
            month = %source.reporting_month,
            records = records.len(),
            warnings = warnings.len(),
            header_row = header.anchor_row,
            header_span = header.span,
            "file extracted"
        );

        Ok(Extraction {
            header,
            columns,
            records,
            warnings,
        })
    }
}

impl Default for RecordExtractor {
    fn default() -> Self {
        RecordExtractor::from_config(&Config::default())
    }
}

/// Bank-name cells are text of at least three characters
fn bank_name_of(cell: &Cell) -> Option<&str> {
    cell.as_text()
        .filter(|_| cell.is_non_numeric_text())
        .filter(|t| t.chars().count() >= MIN_BANK_NAME_LEN)
}

/// Summary rows ("Total", "Grand Total", "Sub-Total") are not banks
fn is_total_row(name: &str) -> bool {
    let upper = name.trim().to_uppercase();
    upper.starts_with("TOTAL") || upper.starts_with("GRAND TOTAL") || upper.starts_with("SUB-TOTAL")
        || upper.starts_with("SUB TOTAL")
}
