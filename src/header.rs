// 🔎 Header Locator - find the header block of a release sheet
//
// Release layouts drift: title rows of varying height sit above the table,
// and later eras use two or three merged header rows ("ATMs" spanning
// "On-site" / "Off-site"). The locator anchors on the bank-name label, then
// a structural check picks the header strategy that decides the span.

use std::ops::Range;

use crate::error::{IngestError, IngestResult};
use crate::grid::{populated, Cell, RawGrid};
use crate::schema::mentions_field_keyword;

pub const DEFAULT_ANCHOR: &str = "bank name";
pub const DEFAULT_SCAN_ROWS: usize = 10;
pub const MAX_HEADER_ROWS: usize = 3;

// ============================================================================
// HEADER STRATEGY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderStrategy {
    /// One header row, data starts right below the anchor
    SingleRow,

    /// Anchor row plus one or two continuation rows of sub-labels
    MergedMultiRow,
}

impl HeaderStrategy {
    /// Does the row under the anchor continue the header?
    pub fn detect(grid: &RawGrid, anchor_row: usize, anchor_col: usize) -> Self {
        if is_continuation_row(grid.row(anchor_row + 1), anchor_col) {
            HeaderStrategy::MergedMultiRow
        } else {
            HeaderStrategy::SingleRow
        }
    }

    /// Number of header rows starting at the anchor (1..=3)
    pub fn span(&self, grid: &RawGrid, anchor_row: usize, anchor_col: usize) -> usize {
        match self {
            HeaderStrategy::SingleRow => 1,
            HeaderStrategy::MergedMultiRow => {
                let extra = (1..MAX_HEADER_ROWS)
                    .take_while(|offset| is_continuation_row(grid.row(anchor_row + offset), anchor_col))
                    .count();
                1 + extra
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HeaderStrategy::SingleRow => "single-row",
            HeaderStrategy::MergedMultiRow => "multi-row",
        }
    }
}

/// Cells that stand in for a missing figure in data rows
const PLACEHOLDERS: [&str; 8] = ["-", "--", "na", "n.a", "n.a.", "n/a", "nil", "*"];

fn is_placeholder(cell: &Cell) -> bool {
    cell.as_text()
        .map(|t| PLACEHOLDERS.contains(&t.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// A header continuation row carries at least two sub-labels, no numbers,
/// and nothing under the anchor (a bank name there means data has started).
/// Placeholder cells ("-", "NA") only pass alongside a recognised field label.
fn is_continuation_row(row: &[Cell], anchor_col: usize) -> bool {
    if row.get(anchor_col).is_some_and(|c| !c.is_blank()) {
        return false;
    }

    let cells: Vec<&Cell> = populated(row).map(|(_, c)| c).collect();
    if cells.len() < 2 || !cells.iter().all(|c| c.is_non_numeric_text()) {
        return false;
    }

    !cells.iter().any(|c| is_placeholder(c))
        || cells
            .iter()
            .any(|c| mentions_field_keyword(&normalize_label(&c.display())))
}

// ============================================================================
// HEADER LOCATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderLocation {
    /// Row holding the anchor label
    pub anchor_row: usize,

    /// Column holding the anchor label
    pub anchor_col: usize,

    /// Header rows spanned, anchor row included (1..=3)
    pub span: usize,

    pub strategy: HeaderStrategy,
}

impl HeaderLocation {
    pub fn rows(&self) -> Range<usize> {
        self.anchor_row..self.anchor_row + self.span
    }

    /// First row after the header block
    pub fn data_start(&self) -> usize {
        self.anchor_row + self.span
    }
}

// ============================================================================
// HEADER LOCATOR
// ============================================================================

pub struct HeaderLocator {
    anchor: String,
    scan_rows: usize,
}

impl HeaderLocator {
    pub fn new(anchor: &str, scan_rows: usize) -> Self {
        HeaderLocator {
            anchor: normalize_label(anchor),
            scan_rows,
        }
    }

    /// Scan the first `scan_rows` rows for the anchor label (case-insensitive)
    pub fn locate(&self, grid: &RawGrid) -> IngestResult<HeaderLocation> {
        let bound = self.scan_rows.min(grid.len());

        for row_idx in 0..bound {
            let hit = grid
                .row(row_idx)
                .iter()
                .position(|cell| normalize_label(&cell.display()).contains(&self.anchor));

            if let Some(anchor_col) = hit {
                let strategy = HeaderStrategy::detect(grid, row_idx, anchor_col);
                let span = strategy.span(grid, row_idx, anchor_col);

                tracing::debug!(
                    row = row_idx,
                    col = anchor_col,
                    span,
                    strategy = strategy.name(),
                    "header located"
                );

                return Ok(HeaderLocation {
                    anchor_row: row_idx,
                    anchor_col,
                    span,
                    strategy,
                });
            }
        }

        Err(IngestError::HeaderNotFound {
            anchor: self.anchor.clone(),
            scanned: bound,
        })
    }
}

impl Default for HeaderLocator {
    fn default() -> Self {
        HeaderLocator::new(DEFAULT_ANCHOR, DEFAULT_SCAN_ROWS)
    }
}

/// Lowercase and collapse whitespace (merged header cells often hold newlines)
pub fn normalize_label(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: Vec<Vec<&str>>) -> RawGrid {
        RawGrid::from_text_rows(rows)
    }

    #[test]
    fn test_single_row_header() {
        let g = grid(vec![
            vec!["Bank-wise ATM/POS/Card Statistics"],
            vec![],
            vec!["Sr", "Bank Name", "Credit Cards", "Debit Cards"],
            vec!["", "Public Sector Banks"],
            vec!["1", "State Bank of India", "100", "200"],
        ]);

        let loc = HeaderLocator::default().locate(&g).unwrap();
        assert_eq!(loc.anchor_row, 2);
        assert_eq!(loc.anchor_col, 1);
        assert_eq!(loc.span, 1);
        assert_eq!(loc.strategy, HeaderStrategy::SingleRow);
        assert_eq!(loc.data_start(), 3);
    }

    #[test]
    fn test_case_insensitive_with_newlines() {
        let g = grid(vec![
            vec![""],
            vec!["", ""],
            vec!["", ""],
            vec!["SR", "BANK\nNAME", "CREDIT CARDS"],
            vec!["1", "HDFC", "5"],
        ]);

        let loc = HeaderLocator::default().locate(&g).unwrap();
        assert_eq!(loc.anchor_row, 3);
    }

    #[test]
    fn test_multi_row_header() {
        let g = grid(vec![
            vec!["Title"],
            vec!["Sr", "Bank Name", "ATMs", "", "Number of outstanding cards", ""],
            vec!["", "", "On-site", "Off-site", "Credit Cards", "Debit Cards"],
            vec!["", "Public Sector Banks"],
            vec!["1", "SBI", "10", "20", "30", "40"],
        ]);

        let loc = HeaderLocator::default().locate(&g).unwrap();
        assert_eq!(loc.anchor_row, 1);
        assert_eq!(loc.strategy, HeaderStrategy::MergedMultiRow);
        assert_eq!(loc.span, 2);
        assert_eq!(loc.rows(), 1..3);
    }

    #[test]
    fn test_span_capped_at_three_rows() {
        let g = grid(vec![
            vec!["Bank Name", "Infrastructure", ""],
            vec!["", "ATMs", "POS"],
            vec!["", "On-site", "Terminals"],
            vec!["", "Extra", "Labels"],
            vec!["SBI", "1", "2"],
        ]);

        let loc = HeaderLocator::default().locate(&g).unwrap();
        assert_eq!(loc.span, MAX_HEADER_ROWS);
    }

    #[test]
    fn test_header_not_found_within_bound() {
        let mut rows: Vec<Vec<&str>> = (0..12).map(|_| vec!["filler"]).collect();
        rows.push(vec!["Bank Name", "Credit Cards"]);
        let g = grid(rows);

        let err = HeaderLocator::default().locate(&g).unwrap_err();
        match err {
            IngestError::HeaderNotFound { scanned, .. } => assert_eq!(scanned, 10),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_placeholder_data_row_is_not_header() {
        let g = grid(vec![
            vec!["Bank Name", "Credit Cards", "Debit Cards"],
            vec!["Paytm Payments Bank", "NA", "NA"],
            vec!["HDFC Bank", "5", "6"],
        ]);
        let loc = HeaderLocator::default().locate(&g).unwrap();
        assert_eq!(loc.span, 1);
        assert_eq!(loc.data_start(), 1);

        // Blank under the anchor but only a label and a dash: a banner row
        let g = grid(vec![
            vec!["Category", "Bank Name", "Debit Cards"],
            vec!["Co-operative", "", "-"],
            vec!["", "Kerala Gramin", "10"],
        ]);
        let loc = HeaderLocator::default().locate(&g).unwrap();
        assert_eq!(loc.strategy, HeaderStrategy::SingleRow);
    }

    #[test]
    fn test_sub_labels_with_placeholder_still_continue_header() {
        let g = grid(vec![
            vec!["Sr", "Bank Name", "ATMs", ""],
            vec!["-", "", "On-site", "Off-site"],
            vec!["1", "SBI", "10", "20"],
        ]);
        let loc = HeaderLocator::default().locate(&g).unwrap();
        assert_eq!(loc.span, 2);
    }

    #[test]
    fn test_custom_anchor() {
        let g = grid(vec![vec!["Name of the Bank", "Debit Cards"], vec!["SBI", "1"]]);
        assert!(HeaderLocator::default().locate(&g).is_err());

        let loc = HeaderLocator::new("Name of the Bank", 5).locate(&g).unwrap();
        assert_eq!(loc.anchor_row, 0);
    }
}
