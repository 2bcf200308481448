// 📐 Schema Mapper - header text → canonical column indices
//
// Every release names its columns differently ("Credit Cards", "No. of
// Credit Cards outstanding", a merged "Number of outstanding cards" group
// over "Credit"/"Debit"...). Header rows are forward-filled to rebuild merged
// group labels, concatenated per column, case-folded, and each canonical
// field takes the first column whose label matches one of its keyword rules.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::grid::{Cell, RawGrid};
use crate::header::{normalize_label, HeaderLocation};

// ============================================================================
// CANONICAL FIELDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    BankName,
    BankType,
    AtmOnsite,
    AtmOffsite,
    PosTerminals,
    MicroAtms,
    BharatQrCodes,
    UpiQrCodes,
    CreditCards,
    DebitCards,
    PosTxnVolume,
    PosTxnValue,
    OnlineTxnVolume,
    OnlineTxnValue,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 14] = [
        CanonicalField::BankName,
        CanonicalField::BankType,
        CanonicalField::AtmOnsite,
        CanonicalField::AtmOffsite,
        CanonicalField::PosTerminals,
        CanonicalField::MicroAtms,
        CanonicalField::BharatQrCodes,
        CanonicalField::UpiQrCodes,
        CanonicalField::CreditCards,
        CanonicalField::DebitCards,
        CanonicalField::PosTxnVolume,
        CanonicalField::PosTxnValue,
        CanonicalField::OnlineTxnVolume,
        CanonicalField::OnlineTxnValue,
    ];

    /// The twelve numeric metrics, in store column order
    pub const METRICS: [CanonicalField; 12] = [
        CanonicalField::AtmOnsite,
        CanonicalField::AtmOffsite,
        CanonicalField::PosTerminals,
        CanonicalField::MicroAtms,
        CanonicalField::BharatQrCodes,
        CanonicalField::UpiQrCodes,
        CanonicalField::CreditCards,
        CanonicalField::DebitCards,
        CanonicalField::PosTxnVolume,
        CanonicalField::PosTxnValue,
        CanonicalField::OnlineTxnVolume,
        CanonicalField::OnlineTxnValue,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CanonicalField::BankName => "bank_name",
            CanonicalField::BankType => "bank_type",
            CanonicalField::AtmOnsite => "atm_onsite",
            CanonicalField::AtmOffsite => "atm_offsite",
            CanonicalField::PosTerminals => "pos_terminals",
            CanonicalField::MicroAtms => "micro_atms",
            CanonicalField::BharatQrCodes => "bharat_qr_codes",
            CanonicalField::UpiQrCodes => "upi_qr_codes",
            CanonicalField::CreditCards => "credit_cards",
            CanonicalField::DebitCards => "debit_cards",
            CanonicalField::PosTxnVolume => "pos_txn_volume",
            CanonicalField::PosTxnValue => "pos_txn_value",
            CanonicalField::OnlineTxnVolume => "online_txn_volume",
            CanonicalField::OnlineTxnValue => "online_txn_value",
        }
    }

    pub fn from_name(name: &str) -> Option<CanonicalField> {
        CanonicalField::ALL.iter().copied().find(|f| f.name() == name)
    }

    /// Decimal amounts; every other metric is a count
    pub fn is_amount(&self) -> bool {
        matches!(self, CanonicalField::PosTxnValue | CanonicalField::OnlineTxnValue)
    }

    /// bank_type is optional - its absence never degrades a file
    pub fn is_optional(&self) -> bool {
        matches!(self, CanonicalField::BankType)
    }
}

// ============================================================================
// KEYWORD RULES
// ============================================================================

/// A column matches when its label contains every word of any `all_of`
/// group and none of the `none_of` words.
struct FieldRule {
    field: CanonicalField,
    all_of: &'static [&'static [&'static str]],
    none_of: &'static [&'static str],
}

const TXN_WORDS: &[&str] = &["volume", "value", "transaction", "txn", "amount"];

const FIELD_RULES: &[FieldRule] = &[
    FieldRule {
        field: CanonicalField::BankName,
        all_of: &[&["bank name"], &["name of the bank"], &["name of bank"]],
        none_of: &[],
    },
    FieldRule {
        field: CanonicalField::BankType,
        all_of: &[&["bank type"], &["type of bank"], &["bank group"]],
        none_of: &[],
    },
    FieldRule {
        field: CanonicalField::AtmOnsite,
        all_of: &[&["atm", "on-site"], &["atm", "onsite"], &["atm", "on site"]],
        none_of: &["micro"],
    },
    FieldRule {
        field: CanonicalField::AtmOffsite,
        all_of: &[&["atm", "off-site"], &["atm", "offsite"], &["atm", "off site"]],
        none_of: &["micro"],
    },
    FieldRule {
        field: CanonicalField::PosTerminals,
        all_of: &[&["pos", "terminal"], &["pos"]],
        none_of: TXN_WORDS,
    },
    FieldRule {
        field: CanonicalField::MicroAtms,
        all_of: &[&["micro", "atm"]],
        none_of: &[],
    },
    FieldRule {
        field: CanonicalField::BharatQrCodes,
        all_of: &[&["bharat", "qr"]],
        none_of: &[],
    },
    FieldRule {
        field: CanonicalField::UpiQrCodes,
        all_of: &[&["upi", "qr"]],
        none_of: &[],
    },
    FieldRule {
        field: CanonicalField::CreditCards,
        all_of: &[&["credit card"]],
        none_of: TXN_WORDS,
    },
    FieldRule {
        field: CanonicalField::DebitCards,
        all_of: &[&["debit card"]],
        none_of: TXN_WORDS,
    },
    FieldRule {
        field: CanonicalField::PosTxnVolume,
        all_of: &[&["pos", "volume"], &["pos", "number of transaction"]],
        none_of: &[],
    },
    FieldRule {
        field: CanonicalField::PosTxnValue,
        all_of: &[&["pos", "value"], &["pos", "amount"]],
        none_of: &[],
    },
    FieldRule {
        field: CanonicalField::OnlineTxnVolume,
        all_of: &[&["online", "volume"], &["e-com", "volume"], &["ecom", "volume"]],
        none_of: &[],
    },
    FieldRule {
        field: CanonicalField::OnlineTxnValue,
        all_of: &[&["online", "value"], &["e-com", "value"], &["ecom", "value"]],
        none_of: &[],
    },
];

impl FieldRule {
    fn matches(&self, label: &str) -> bool {
        if self.none_of.iter().any(|w| label.contains(w)) {
            return false;
        }
        self.all_of
            .iter()
            .any(|group| group.iter().all(|w| label.contains(w)))
    }
}

/// True when a header label carries any word the field rules look for
pub fn mentions_field_keyword(label: &str) -> bool {
    FIELD_RULES
        .iter()
        .flat_map(|rule| rule.all_of.iter())
        .flat_map(|group| group.iter())
        .any(|w| label.contains(w))
}

// ============================================================================
// COLUMN MAP
// ============================================================================

/// Canonical field → source column, built once per file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnMap {
    columns: HashMap<CanonicalField, usize>,

    /// Combined, case-folded label per column (after truncate/pad)
    pub labels: Vec<String>,
}

impl ColumnMap {
    pub fn get(&self, field: CanonicalField) -> Option<usize> {
        self.columns.get(&field).copied()
    }

    pub fn contains(&self, field: CanonicalField) -> bool {
        self.columns.contains_key(&field)
    }

    pub fn insert(&mut self, field: CanonicalField, column: usize) {
        self.columns.insert(field, column);
    }

    /// Non-optional fields with no matching column; they default to zero
    pub fn missing(&self) -> Vec<CanonicalField> {
        CanonicalField::ALL
            .iter()
            .copied()
            .filter(|f| !f.is_optional() && !self.contains(*f))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }
}

// ============================================================================
// SCHEMA MAPPER
// ============================================================================

pub struct SchemaMapper {
    anchor: String,
}

impl SchemaMapper {
    /// `anchor` is the header label that located the table; it always maps
    /// to bank_name, ahead of the built-in keyword rules.
    pub fn new(anchor: &str) -> Self {
        SchemaMapper {
            anchor: normalize_label(anchor),
        }
    }

    pub fn map(&self, grid: &RawGrid, location: &HeaderLocation) -> ColumnMap {
        let data_width = grid.data_width_from(location.data_start());
        let labels = fit_to_width(combined_labels(grid, location), data_width);

        let mut map = ColumnMap {
            columns: HashMap::new(),
            labels,
        };

        if let Some(col) = map.labels.iter().position(|l| l.contains(&self.anchor)) {
            map.insert(CanonicalField::BankName, col);
        }

        for rule in FIELD_RULES {
            if map.contains(rule.field) {
                continue;
            }
            if let Some(col) = map.labels.iter().position(|l| rule.matches(l)) {
                map.insert(rule.field, col);
            }
        }

        tracing::debug!(
            mapped = map.columns.len(),
            missing = map.missing().len(),
            "column map built"
        );
        map
    }
}

impl Default for SchemaMapper {
    fn default() -> Self {
        SchemaMapper::new(crate::header::DEFAULT_ANCHOR)
    }
}

/// Forward-fill blank cells left-to-right; leading blanks stay blank
pub fn forward_fill(row: &[Cell], width: usize) -> Vec<String> {
    fill_within_groups(row, width, &vec![false; width])
}

/// Forward-fill that restarts at every group boundary. A boundary is a
/// column where some header row above holds its own label, so a merged
/// sub-label never spills past the end of its parent group.
fn fill_within_groups(row: &[Cell], width: usize, boundaries: &[bool]) -> Vec<String> {
    let mut filled = Vec::with_capacity(width);
    let mut last = String::new();

    for col in 0..width {
        let text = row.get(col).map(|c| c.display()).unwrap_or_default();
        if !text.is_empty() {
            last = text;
        } else if boundaries.get(col).copied().unwrap_or(false) {
            last.clear();
        }
        filled.push(last.clone());
    }

    filled
}

/// One case-folded label per column from all header rows
pub fn combined_labels(grid: &RawGrid, location: &HeaderLocation) -> Vec<String> {
    let width = location
        .rows()
        .map(|r| {
            grid.row(r)
                .iter()
                .rposition(|c| !c.is_blank())
                .map_or(0, |p| p + 1)
        })
        .max()
        .unwrap_or(0);

    let mut boundaries = vec![false; width];
    let mut filled: Vec<Vec<String>> = Vec::with_capacity(location.span);

    for r in location.rows() {
        let row = grid.row(r);
        filled.push(fill_within_groups(row, width, &boundaries));
        for (col, _) in crate::grid::populated(row) {
            if col < width {
                boundaries[col] = true;
            }
        }
    }

    (0..width)
        .map(|col| {
            let joined = filled
                .iter()
                .map(|row| row[col].as_str())
                .collect::<Vec<_>>()
                .join(" ");
            normalize_label(&joined)
        })
        .collect()
}

/// Truncate or pad header labels to the data column count.
/// A zero data width (no data rows) leaves labels untouched.
pub fn fit_to_width(mut labels: Vec<String>, data_width: usize) -> Vec<String> {
    if data_width == 0 {
        return labels;
    }
    if labels.len() > data_width {
        labels.truncate(data_width);
    } else {
        let start = labels.len();
        labels.extend((start..data_width).map(|i| format!("extra_col_{}", i)));
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::HeaderLocator;

    fn map_grid(rows: Vec<Vec<&str>>) -> ColumnMap {
        let grid = RawGrid::from_text_rows(rows);
        let loc = HeaderLocator::default().locate(&grid).unwrap();
        SchemaMapper::default().map(&grid, &loc)
    }

    #[test]
    fn test_forward_fill() {
        let row = vec![
            Cell::Empty,
            Cell::Text("ATMs".to_string()),
            Cell::Empty,
            Cell::Text("POS".to_string()),
        ];
        assert_eq!(forward_fill(&row, 5), vec!["", "ATMs", "ATMs", "POS", "POS"]);
    }

    #[test]
    fn test_full_modern_layout() {
        let map = map_grid(vec![
            vec![
                "Sr", "Bank Name", "ATMs", "", "PoS", "Micro ATMs", "Bharat QR Codes",
                "UPI QR Codes", "Credit Cards", "Debit Cards", "Card payments at PoS", "",
                "Online card payments", "",
            ],
            vec![
                "", "", "On-site", "Off-site", "Terminals", "", "", "", "", "", "Volume",
                "Value", "Volume", "Value",
            ],
            vec!["1", "SBI", "1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11", "12"],
        ]);

        assert!(map.is_complete(), "missing: {:?}", map.missing());
        assert_eq!(map.get(CanonicalField::BankName), Some(1));
        assert_eq!(map.get(CanonicalField::AtmOnsite), Some(2));
        assert_eq!(map.get(CanonicalField::AtmOffsite), Some(3));
        assert_eq!(map.get(CanonicalField::PosTerminals), Some(4));
        assert_eq!(map.get(CanonicalField::MicroAtms), Some(5));
        assert_eq!(map.get(CanonicalField::BharatQrCodes), Some(6));
        assert_eq!(map.get(CanonicalField::UpiQrCodes), Some(7));
        assert_eq!(map.get(CanonicalField::CreditCards), Some(8));
        assert_eq!(map.get(CanonicalField::DebitCards), Some(9));
        assert_eq!(map.get(CanonicalField::PosTxnVolume), Some(10));
        assert_eq!(map.get(CanonicalField::PosTxnValue), Some(11));
        assert_eq!(map.get(CanonicalField::OnlineTxnVolume), Some(12));
        assert_eq!(map.get(CanonicalField::OnlineTxnValue), Some(13));
        assert_eq!(map.get(CanonicalField::BankType), None);
    }

    #[test]
    fn test_cards_only_layout_reports_missing() {
        let map = map_grid(vec![
            vec!["Bank Name", "Credit Cards Outstanding", "Debit Cards Outstanding"],
            vec!["HDFC Bank", "100", "200"],
        ]);

        assert_eq!(map.get(CanonicalField::CreditCards), Some(1));
        assert_eq!(map.get(CanonicalField::DebitCards), Some(2));
        assert!(!map.is_complete());
        assert_eq!(map.missing().len(), 10);
        assert!(map.missing().contains(&CanonicalField::AtmOnsite));
        assert!(!map.missing().contains(&CanonicalField::BankType));
    }

    #[test]
    fn test_header_padded_to_data_width() {
        let map = map_grid(vec![
            vec!["Bank Name", "Debit Cards"],
            vec!["HDFC Bank", "200", "17", "99"],
        ]);

        assert_eq!(map.labels.len(), 4);
        assert_eq!(map.labels[2], "extra_col_2");
        assert_eq!(map.labels[3], "extra_col_3");
        assert_eq!(map.get(CanonicalField::DebitCards), Some(1));
    }

    #[test]
    fn test_header_truncated_to_data_width() {
        let map = map_grid(vec![
            vec!["Bank Name", "Credit Cards", "Debit Cards", "Remarks"],
            vec!["HDFC Bank", "100"],
        ]);

        assert_eq!(map.labels.len(), 2);
        assert_eq!(map.get(CanonicalField::CreditCards), Some(1));
        assert_eq!(map.get(CanonicalField::DebitCards), None);
    }

    #[test]
    fn test_transaction_columns_do_not_steal_card_counts() {
        let map = map_grid(vec![
            vec!["Bank Name", "Credit Card transactions at PoS", "", "Credit Cards"],
            vec!["", "Volume", "Value", ""],
            vec!["SBI", "1", "2", "3"],
        ]);

        assert_eq!(map.get(CanonicalField::CreditCards), Some(3));
        assert_eq!(map.get(CanonicalField::PosTxnVolume), Some(1));
        assert_eq!(map.get(CanonicalField::PosTxnValue), Some(2));
    }

    #[test]
    fn test_bank_type_column() {
        let map = map_grid(vec![
            vec!["Bank Type", "Bank Name", "Credit Cards"],
            vec!["Public Sector Banks", "SBI", "5"],
        ]);
        assert_eq!(map.get(CanonicalField::BankType), Some(0));
        assert_eq!(map.get(CanonicalField::BankName), Some(1));
    }

    #[test]
    fn test_field_names_round_trip() {
        for field in CanonicalField::ALL {
            assert_eq!(CanonicalField::from_name(field.name()), Some(field));
        }
        assert!(CanonicalField::PosTxnValue.is_amount());
        assert!(!CanonicalField::PosTxnVolume.is_amount());
    }
}
