// Entity Models
//
// A bank's identity is its canonical name; its category is a value that
// is filled in once when first observed and changed only by explicit
// reclassification.

pub mod bank;
pub mod category;

pub use bank::{canonical_bank_name, BankEntity, BankNormalizer};
pub use category::{BankCategory, BannerState, CategoryClassifier, CategorySource, Classification};
