// 🏷️ Bank Category - sector classification from banners, columns and names
//
// Sheets rarely carry a per-row sector column. Instead a banner row
// ("Public Sector Banks") heads each block of bank rows. The classifier keeps
// the active banner in an explicit `BannerState` that the extractor threads
// through row iteration, and falls back to a static name table only when no
// banner has been seen.
//
// Confidence order: Unknown < Inferred < Banner < Column < Manual

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::entities::bank::{comparison_key, contains_phrase};
use crate::grid::{populated, RawGrid};

// ============================================================================
// BANK CATEGORY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BankCategory {
    PublicSector,
    PrivateSector,
    Foreign,
    SmallFinance,
    Payments,

    /// Banner text that names no known sector, kept verbatim
    Other(String),

    Unknown,
}

impl BankCategory {
    pub fn label(&self) -> &str {
        match self {
            BankCategory::PublicSector => "Public Sector Banks",
            BankCategory::PrivateSector => "Private Sector Banks",
            BankCategory::Foreign => "Foreign Banks",
            BankCategory::SmallFinance => "Small Finance Banks",
            BankCategory::Payments => "Payment Banks",
            BankCategory::Other(text) => text,
            BankCategory::Unknown => "Unknown",
        }
    }

    /// Map free text (banner, column value, CLI argument) to a category
    pub fn from_label(text: &str) -> BankCategory {
        let key = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let upper = key.to_uppercase();

        if upper.is_empty() || upper == "UNKNOWN" {
            BankCategory::Unknown
        } else if upper.contains("SMALL FINANCE") {
            BankCategory::SmallFinance
        } else if upper.contains("PAYMENT") {
            BankCategory::Payments
        } else if upper.contains("FOREIGN") {
            BankCategory::Foreign
        } else if upper.contains("PRIVATE") {
            BankCategory::PrivateSector
        } else if upper.contains("PUBLIC") || upper.contains("NATIONALISED") {
            BankCategory::PublicSector
        } else {
            BankCategory::Other(key)
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, BankCategory::Unknown)
    }
}

impl fmt::Display for BankCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<String> for BankCategory {
    fn from(text: String) -> Self {
        BankCategory::from_label(&text)
    }
}

impl From<BankCategory> for String {
    fn from(category: BankCategory) -> Self {
        category.label().to_string()
    }
}

// ============================================================================
// CATEGORY SOURCE (confidence)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategorySource {
    Unknown,

    /// Static name table
    Inferred,

    /// Section banner in the sheet
    Banner,

    /// Per-row bank type column
    Column,

    /// Explicit reclassification
    Manual,
}

impl CategorySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategorySource::Unknown => "unknown",
            CategorySource::Inferred => "inferred",
            CategorySource::Banner => "banner",
            CategorySource::Column => "column",
            CategorySource::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> CategorySource {
        match s {
            "inferred" => CategorySource::Inferred,
            "banner" => CategorySource::Banner,
            "column" => CategorySource::Column,
            "manual" => CategorySource::Manual,
            _ => CategorySource::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub category: BankCategory,
    pub source: CategorySource,
}

// ============================================================================
// BANNERS
// ============================================================================

/// Words that name a sector of banks
const SECTOR_WORDS: [&str; 9] = [
    "PUBLIC",
    "PRIVATE",
    "FOREIGN",
    "PAYMENT",
    "PAYMENTS",
    "SMALL",
    "FINANCE",
    "NATIONALISED",
    "SECTOR",
];

/// Words a sector banner may carry besides sector words
const BANNER_FILLER: [&str; 9] = [
    "BANK", "BANKS", "NEW", "OLD", "OTHER", "SCHEDULED", "COMMERCIAL", "AND", "SFBS",
];

/// Banner text names a group of banks: either a plural group ("Regional
/// Rural Banks") or nothing but sector wording ("Public Sector Bank",
/// "Foreign Bank"). A bank name keeps some word of its own ("Airtel
/// Payments Bank", "Bank of America") and is not a banner.
pub fn is_banner_text(text: &str) -> bool {
    let key = comparison_key(text);
    let words: Vec<&str> = key.split_whitespace().collect();

    if words.last() == Some(&"BANKS") {
        return true;
    }

    let names_sector = words.iter().any(|w| SECTOR_WORDS.contains(w));
    let only_sector_words = words
        .iter()
        .all(|w| SECTOR_WORDS.contains(w) || BANNER_FILLER.contains(w));
    names_sector && only_sector_words
}

/// The banner text of a row whose sole populated cell is a banner
pub fn banner_in_row(row: &[crate::grid::Cell]) -> Option<String> {
    let mut cells = populated(row);
    let (_, only) = cells.next()?;
    if cells.next().is_some() {
        return None;
    }
    let text = only.as_text()?;
    if only.is_non_numeric_text() && is_banner_text(text) {
        Some(text.to_string())
    } else {
        None
    }
}

/// Active banner carried across the rows of one file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BannerState {
    active: Option<BankCategory>,
}

impl BannerState {
    pub fn new() -> Self {
        BannerState { active: None }
    }

    pub fn active(&self) -> Option<&BankCategory> {
        self.active.as_ref()
    }

    /// A new banner replaces the active one for all following rows
    pub fn with_banner(self, text: &str) -> BannerState {
        BannerState {
            active: Some(BankCategory::from_label(text)),
        }
    }
}

// ============================================================================
// NAME INFERENCE
// ============================================================================

/// First rule whose phrases hit the canonical name wins
struct InferenceRule {
    phrases: &'static [&'static str],
    category: BankCategory,
}

const INFERENCE_RULES: &[InferenceRule] = &[
    InferenceRule {
        phrases: &[
            "PAYMENTS BANK", "PAYMENT BANK", "PAYTM", "AIRTEL", "INDIA POST", "FINO", "JIO",
            "NSDL",
        ],
        category: BankCategory::Payments,
    },
    InferenceRule {
        phrases: &[
            "SMALL FINANCE", "EQUITAS", "UJJIVAN", "JANA", "SURYODAY", "ESAF", "FINCARE",
            "UTKARSH", "SHIVALIK", "UNITY",
        ],
        category: BankCategory::SmallFinance,
    },
    InferenceRule {
        phrases: &[
            "CITIBANK", "CITI", "HSBC", "STANDARD CHARTERED", "DBS", "DEUTSCHE", "BARCLAYS",
            "BANK OF AMERICA", "AMERICAN EXPRESS", "JPMORGAN", "MUFG", "MIZUHO", "SBM",
        ],
        category: BankCategory::Foreign,
    },
    InferenceRule {
        phrases: &[
            "STATE BANK OF INDIA", "PUNJAB NATIONAL BANK", "BANK OF BARODA", "CANARA",
            "UNION BANK OF INDIA", "BANK OF INDIA", "INDIAN BANK", "CENTRAL BANK OF INDIA",
            "INDIAN OVERSEAS BANK", "UCO BANK", "BANK OF MAHARASHTRA", "PUNJAB AND SIND",
        ],
        category: BankCategory::PublicSector,
    },
];

/// Category from the canonical name alone; unmatched names are private banks
pub fn infer_from_name(canonical_name: &str) -> BankCategory {
    let key = comparison_key(canonical_name);
    INFERENCE_RULES
        .iter()
        .find(|rule| rule.phrases.iter().any(|p| contains_phrase(&key, p)))
        .map(|rule| rule.category.clone())
        .unwrap_or(BankCategory::PrivateSector)
}

// ============================================================================
// CLASSIFIER
// ============================================================================

pub struct CategoryClassifier {
    window: usize,
}

impl CategoryClassifier {
    pub fn new(window: usize) -> Self {
        CategoryClassifier { window }
    }

    /// Classify data row `row_idx`. Returns the updated banner state with
    /// the row's classification.
    ///
    /// A bank type column wins outright. Otherwise the active banner is used;
    /// with no banner seen yet, the rows above (down to `data_start`, at most
    /// `window` rows) are searched for one. Name inference comes last.
    pub fn classify(
        &self,
        state: BannerState,
        grid: &RawGrid,
        row_idx: usize,
        data_start: usize,
        canonical_name: &str,
        type_column: Option<&str>,
    ) -> (BannerState, Classification) {
        if let Some(text) = type_column.map(str::trim).filter(|t| !t.is_empty()) {
            let category = BankCategory::from_label(text);
            if !category.is_unknown() {
                return (
                    state,
                    Classification {
                        category,
                        source: CategorySource::Column,
                    },
                );
            }
        }

        let state = match state.active() {
            Some(_) => state,
            None => match self.search_upward(grid, row_idx, data_start) {
                Some(text) => state.with_banner(&text),
                None => state,
            },
        };

        let classification = match state.active() {
            Some(category) => Classification {
                category: category.clone(),
                source: CategorySource::Banner,
            },
            None => Classification {
                category: infer_from_name(canonical_name),
                source: CategorySource::Inferred,
            },
        };

        (state, classification)
    }

    fn search_upward(&self, grid: &RawGrid, row_idx: usize, data_start: usize) -> Option<String> {
        let floor = row_idx.saturating_sub(self.window).max(data_start);
        (floor..row_idx)
            .rev()
            .find_map(|r| banner_in_row(grid.row(r)))
    }
}

impl Default for CategoryClassifier {
    fn default() -> Self {
        CategoryClassifier::new(10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_round_trip() {
        for category in [
            BankCategory::PublicSector,
            BankCategory::PrivateSector,
            BankCategory::Foreign,
            BankCategory::SmallFinance,
            BankCategory::Payments,
            BankCategory::Unknown,
        ] {
            assert_eq!(BankCategory::from_label(category.label()), category);
        }
    }

    #[test]
    fn test_banner_variants() {
        assert_eq!(
            BankCategory::from_label("  NEW PRIVATE SECTOR BANKS "),
            BankCategory::PrivateSector
        );
        assert_eq!(
            BankCategory::from_label("Nationalised Banks"),
            BankCategory::PublicSector
        );
        assert_eq!(
            BankCategory::from_label("Regional Rural Banks"),
            BankCategory::Other("Regional Rural Banks".to_string())
        );
    }

    #[test]
    fn test_banner_text_excludes_single_banks() {
        assert!(is_banner_text("Public Sector Banks"));
        assert!(is_banner_text("FOREIGN BANKS"));
        assert!(is_banner_text("Small Finance Banks (SFBs)"));
        assert!(is_banner_text("Regional Rural Banks"));
        assert!(!is_banner_text("Airtel Payments Bank"));
        assert!(!is_banner_text("AU Small Finance Bank"));
        assert!(!is_banner_text("HDFC Bank Ltd"));
        assert!(!is_banner_text("Bank of America"));
        assert!(!is_banner_text("State Bank of India"));
        assert!(!is_banner_text("Total"));
    }

    #[test]
    fn test_singular_sector_banners() {
        assert!(is_banner_text("Public Sector Bank"));
        assert!(is_banner_text("Foreign Bank"));
        assert!(is_banner_text("Private Sector"));
        assert!(!is_banner_text("Bank"));
    }

    #[test]
    fn test_source_confidence_order() {
        assert!(CategorySource::Unknown < CategorySource::Inferred);
        assert!(CategorySource::Inferred < CategorySource::Banner);
        assert!(CategorySource::Banner < CategorySource::Column);
        assert!(CategorySource::Column < CategorySource::Manual);
        assert_eq!(CategorySource::parse("banner"), CategorySource::Banner);
    }

    #[test]
    fn test_name_inference_table() {
        assert_eq!(infer_from_name("PAYTM PAYMENTS BANK"), BankCategory::Payments);
        assert_eq!(infer_from_name("Jana Small Finance Bank"), BankCategory::SmallFinance);
        assert_eq!(infer_from_name("CITIBANK"), BankCategory::Foreign);
        assert_eq!(infer_from_name("STATE BANK OF INDIA"), BankCategory::PublicSector);
        assert_eq!(infer_from_name("INDIAN OVERSEAS BANK"), BankCategory::PublicSector);
        assert_eq!(infer_from_name("HDFC BANK"), BankCategory::PrivateSector);
        // "JANA" is matched as a word, not inside another name
        assert_eq!(infer_from_name("JANATA SAHAKARI BANK"), BankCategory::PrivateSector);
    }

    #[test]
    fn test_banner_found_upward() {
        let grid = RawGrid::from_text_rows(vec![
            vec!["Sr", "Bank Name", "Credit Cards"],
            vec!["", "Foreign Banks"],
            vec!["1", "Citibank", "5"],
            vec!["2", "State Bank of India", "9"],
        ]);
        let classifier = CategoryClassifier::default();

        let (state, first) = classifier.classify(BannerState::new(), &grid, 2, 1, "CITIBANK", None);
        assert_eq!(first.category, BankCategory::Foreign);
        assert_eq!(first.source, CategorySource::Banner);

        // Banner beats name inference for the rows that follow
        let (_, second) = classifier.classify(state, &grid, 3, 1, "STATE BANK OF INDIA", None);
        assert_eq!(second.category, BankCategory::Foreign);
        assert_eq!(second.source, CategorySource::Banner);
    }

    #[test]
    fn test_no_banner_falls_back_to_inference() {
        let grid = RawGrid::from_text_rows(vec![
            vec!["Bank Name", "Credit Cards"],
            vec!["Paytm Payments Bank", "5"],
        ]);
        let (state, c) = CategoryClassifier::default().classify(
            BannerState::new(),
            &grid,
            1,
            1,
            "PAYTM PAYMENTS BANK",
            None,
        );
        assert!(state.active().is_none());
        assert_eq!(c.category, BankCategory::Payments);
        assert_eq!(c.source, CategorySource::Inferred);
    }

    #[test]
    fn test_upward_search_bounded_by_window() {
        let mut rows: Vec<Vec<&str>> = vec![vec!["Bank Name", "Debit Cards"], vec!["Public Sector Banks"]];
        for _ in 0..5 {
            rows.push(vec![]);
        }
        rows.push(vec!["HDFC", "1"]);
        let grid = RawGrid::from_text_rows(rows);

        let near = CategoryClassifier::new(10);
        let (_, c) = near.classify(BannerState::new(), &grid, 7, 1, "HDFC BANK", None);
        assert_eq!(c.source, CategorySource::Banner);

        let far = CategoryClassifier::new(3);
        let (_, c) = far.classify(BannerState::new(), &grid, 7, 1, "HDFC BANK", None);
        assert_eq!(c.source, CategorySource::Inferred);
        assert_eq!(c.category, BankCategory::PrivateSector);
    }

    #[test]
    fn test_type_column_wins() {
        let grid = RawGrid::from_text_rows(vec![vec!["Bank Name"], vec!["SBI"]]);
        let state = BannerState::new().with_banner("Foreign Banks");
        let (state, c) = CategoryClassifier::default().classify(
            state,
            &grid,
            1,
            1,
            "STATE BANK OF INDIA",
            Some("Public Sector Banks"),
        );
        assert_eq!(c.category, BankCategory::PublicSector);
        assert_eq!(c.source, CategorySource::Column);
        assert_eq!(state.active(), Some(&BankCategory::Foreign));
    }

    #[test]
    fn test_serde_as_label() {
        let json = serde_json::to_string(&BankCategory::SmallFinance).unwrap();
        assert_eq!(json, "\"Small Finance Banks\"");
        let back: BankCategory = serde_json::from_str(&json).unwrap();
        assert_eq!(back, BankCategory::SmallFinance);
    }
}
