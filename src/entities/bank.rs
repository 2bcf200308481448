// 🏦 Bank Entity - Stable identity + name normalization
//
// "SBI", "State Bank of India", "STATE BANK OF INDIA " → one bank entity.
// Two decades of releases spell the same bank a dozen ways; the canonical
// name is the identity every statistic hangs off.
//
// Normalization is a pure function of the raw string and the static rule
// table below. `BankNormalizer` adds a run-scoped cache on top.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::entities::category::{BankCategory, CategorySource};

// ============================================================================
// BANK ENTITY
// ============================================================================

/// Bank Entity - identity is the canonical name, the id is a stable UUID
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankEntity {
    /// Stable identity (UUID) - NEVER changes
    pub id: String,

    /// Unique canonical name
    pub canonical_name: String,

    pub bank_type: BankCategory,

    /// How `bank_type` was determined
    pub category_source: CategorySource,

    pub created_at: DateTime<Utc>,
}

impl BankEntity {
    pub fn new(canonical_name: String, bank_type: BankCategory, category_source: CategorySource) -> Self {
        // An Unknown type carries no confidence whatever the caller says
        let category_source = if bank_type.is_unknown() {
            CategorySource::Unknown
        } else {
            category_source
        };

        BankEntity {
            id: uuid::Uuid::new_v4().to_string(),
            canonical_name,
            bank_type,
            category_source,
            created_at: Utc::now(),
        }
    }

    /// Fill in the type of a bank still classified Unknown. Returns true
    /// when the type was set. An established type is left alone; only
    /// `reclassify` changes it.
    pub fn refine(&mut self, observed: &BankCategory, source: CategorySource) -> bool {
        if !self.bank_type.is_unknown() || observed.is_unknown() || source == CategorySource::Manual {
            return false;
        }

        self.bank_type = observed.clone();
        self.category_source = source;
        true
    }

    /// Explicit reclassification, the only way to override an established type
    pub fn reclassify(&mut self, category: BankCategory) {
        self.bank_type = category;
        self.category_source = CategorySource::Manual;
    }
}

// ============================================================================
// NAME RULES
// ============================================================================

/// Ordered (phrases → canonical name) table, first match wins.
/// Specific names sit above names they contain ("CENTRAL BANK OF INDIA"
/// before "BANK OF INDIA").
const NAME_RULES: &[(&[&str], &str)] = &[
    (&["SBI", "STATE BANK OF INDIA"], "STATE BANK OF INDIA"),
    (&["PNB", "PUNJAB NATIONAL BANK"], "PUNJAB NATIONAL BANK"),
    (&["PUNJAB AND SIND"], "PUNJAB AND SIND BANK"),
    (&["BOB", "BANK OF BARODA"], "BANK OF BARODA"),
    (&["CENTRAL BANK OF INDIA"], "CENTRAL BANK OF INDIA"),
    (&["UNION BANK OF INDIA", "UBI"], "UNION BANK OF INDIA"),
    (&["BOI", "BANK OF INDIA"], "BANK OF INDIA"),
    (&["BANK OF MAHARASHTRA"], "BANK OF MAHARASHTRA"),
    (&["CANARA"], "CANARA BANK"),
    (&["IOB", "INDIAN OVERSEAS"], "INDIAN OVERSEAS BANK"),
    (&["INDIAN BANK"], "INDIAN BANK"),
    (&["UCO"], "UCO BANK"),
    (&["HDFC"], "HDFC BANK"),
    (&["ICICI"], "ICICI BANK"),
    (&["AXIS", "UTI BANK"], "AXIS BANK"),
    (&["KOTAK"], "KOTAK MAHINDRA BANK"),
    (&["INDUSIND"], "INDUSIND BANK"),
    (&["YES BANK"], "YES BANK"),
    (&["IDFC"], "IDFC FIRST BANK"),
    (&["IDBI"], "IDBI BANK"),
    (&["FEDERAL BANK"], "FEDERAL BANK"),
    (&["RBL", "RATNAKAR"], "RBL BANK"),
    (&["CITIBANK", "CITI BANK"], "CITIBANK"),
    (&["HSBC", "HONGKONG AND SHANGHAI"], "HSBC"),
    (&["STANDARD CHARTERED"], "STANDARD CHARTERED BANK"),
    (&["DBS"], "DBS BANK"),
    (&["DEUTSCHE"], "DEUTSCHE BANK"),
    (&["AMERICAN EXPRESS", "AMEX"], "AMERICAN EXPRESS BANKING CORP"),
    (&["PAYTM"], "PAYTM PAYMENTS BANK"),
    (&["AIRTEL"], "AIRTEL PAYMENTS BANK"),
    (&["INDIA POST", "IPPB"], "INDIA POST PAYMENTS BANK"),
    (&["FINO"], "FINO PAYMENTS BANK"),
    (&["AU SMALL FINANCE", "AU SFB"], "AU SMALL FINANCE BANK"),
    (&["EQUITAS"], "EQUITAS SMALL FINANCE BANK"),
    (&["UJJIVAN"], "UJJIVAN SMALL FINANCE BANK"),
];

/// Comparison form: uppercase, '&' read as AND, dots dropped (H.D.F.C → HDFC),
/// other punctuation as spaces, whitespace collapsed
pub fn comparison_key(raw: &str) -> String {
    let mapped: String = raw
        .to_uppercase()
        .replace('&', " AND ")
        .chars()
        .filter(|c| *c != '.')
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whole-word phrase match on a comparison key ("SBI" must not hit "SBIN")
pub fn contains_phrase(key: &str, phrase: &str) -> bool {
    format!(" {} ", key).contains(&format!(" {} ", phrase))
}

/// Canonical name for a raw bank-name string
pub fn canonical_bank_name(raw: &str) -> String {
    let key = comparison_key(raw);

    for (phrases, canonical) in NAME_RULES {
        if phrases.iter().any(|p| contains_phrase(&key, p)) {
            return canonical.to_string();
        }
    }

    // No rule: original casing, whitespace collapsed
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ============================================================================
// BANK NORMALIZER
// ============================================================================

/// Run-scoped raw → canonical cache over `canonical_bank_name`
#[derive(Debug, Default)]
pub struct BankNormalizer {
    cache: HashMap<String, String>,
}

impl BankNormalizer {
    pub fn new() -> Self {
        BankNormalizer {
            cache: HashMap::new(),
        }
    }

    pub fn normalize(&mut self, raw: &str) -> String {
        if let Some(hit) = self.cache.get(raw) {
            return hit.clone();
        }
        let canonical = canonical_bank_name(raw);
        self.cache.insert(raw.to_string(), canonical.clone());
        canonical
    }

    /// Distinct raw spellings seen this run
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sbi_variants() {
        for raw in [
            "SBI",
            "State Bank of India",
            "  STATE   BANK OF INDIA ",
            "State Bank Of India\n",
            "S.B.I.",
        ] {
            assert_eq!(canonical_bank_name(raw), "STATE BANK OF INDIA", "raw: {raw:?}");
        }
    }

    #[test]
    fn test_specific_rules_before_general() {
        assert_eq!(canonical_bank_name("Central Bank of India"), "CENTRAL BANK OF INDIA");
        assert_eq!(canonical_bank_name("Union Bank of India"), "UNION BANK OF INDIA");
        assert_eq!(canonical_bank_name("Bank of India"), "BANK OF INDIA");
        assert_eq!(canonical_bank_name("Indian Overseas Bank"), "INDIAN OVERSEAS BANK");
        assert_eq!(canonical_bank_name("Indian Bank"), "INDIAN BANK");
        assert_eq!(canonical_bank_name("Punjab & Sind Bank"), "PUNJAB AND SIND BANK");
    }

    #[test]
    fn test_renamed_bank() {
        assert_eq!(canonical_bank_name("UTI Bank Ltd."), "AXIS BANK");
        assert_eq!(canonical_bank_name("Axis Bank Ltd"), "AXIS BANK");
    }

    #[test]
    fn test_whole_word_matching() {
        // "SBI" inside a longer token is not State Bank of India
        assert_eq!(canonical_bank_name("SBIN Cooperative"), "SBIN Cooperative");
        assert_eq!(canonical_bank_name("Bobcat Savings"), "Bobcat Savings");
    }

    #[test]
    fn test_unmatched_keeps_original_casing() {
        assert_eq!(
            canonical_bank_name("  The   Nainital Bank Ltd "),
            "The Nainital Bank Ltd"
        );
    }

    #[test]
    fn test_normalizer_idempotent() {
        let mut normalizer = BankNormalizer::new();
        let first = normalizer.normalize("HDFC Bank Ltd.");
        let second = normalizer.normalize("HDFC Bank Ltd.");
        assert_eq!(first, second);
        assert_eq!(first, "HDFC BANK");

        // Normalizing a canonical name yields itself
        assert_eq!(normalizer.normalize(&first), first);

        // A fresh normalizer (another run) agrees
        assert_eq!(BankNormalizer::new().normalize("HDFC Bank Ltd."), first);
        assert_eq!(normalizer.cached(), 2);
    }

    #[test]
    fn test_entity_refine_only_fills_unknown() {
        let mut bank = BankEntity::new(
            "HDFC BANK".to_string(),
            BankCategory::PrivateSector,
            CategorySource::Inferred,
        );

        // An established type stays, even against a stronger source
        assert!(!bank.refine(&BankCategory::Foreign, CategorySource::Banner));
        assert!(!bank.refine(&BankCategory::Foreign, CategorySource::Column));
        assert_eq!(bank.bank_type, BankCategory::PrivateSector);
        assert_eq!(bank.category_source, CategorySource::Inferred);

        let mut unknown = BankEntity::new("NEW BANK".to_string(), BankCategory::Unknown, CategorySource::Inferred);
        assert!(!unknown.refine(&BankCategory::Unknown, CategorySource::Column));
        assert!(!unknown.refine(&BankCategory::Foreign, CategorySource::Manual));
        assert!(unknown.bank_type.is_unknown());

        assert!(unknown.refine(&BankCategory::Foreign, CategorySource::Banner));
        assert_eq!(unknown.bank_type, BankCategory::Foreign);
        assert_eq!(unknown.category_source, CategorySource::Banner);

        // Once filled, only reclassify changes it
        assert!(!unknown.refine(&BankCategory::PrivateSector, CategorySource::Column));
        unknown.reclassify(BankCategory::PrivateSector);
        assert_eq!(unknown.bank_type, BankCategory::PrivateSector);
        assert_eq!(unknown.category_source, CategorySource::Manual);
    }

    #[test]
    fn test_unknown_entity_has_no_confidence() {
        let bank = BankEntity::new("X".to_string(), BankCategory::Unknown, CategorySource::Banner);
        assert_eq!(bank.category_source, CategorySource::Unknown);
        assert!(!bank.id.is_empty());
    }
}
