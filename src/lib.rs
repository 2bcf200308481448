// Bank Card Statistics - Core Library
// Ingestion, reconciliation and query layer shared by the CLI and API server

pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod export;
pub mod extract;
pub mod grid;
pub mod header;
pub mod pipeline;
pub mod reconciliation;
pub mod schema;
pub mod sync;

// Re-export commonly used types
pub use config::Config;
pub use db::{
    open_database, setup_database, query_statistics, list_banks, list_categories, list_months,
    month_over_month_growth, reclassify_bank, Event, GrowthPoint, StatisticRow, StatisticsFilter,
};
pub use entities::{
    canonical_bank_name, BankCategory, BankEntity, BankNormalizer, CategoryClassifier,
    CategorySource, Classification,
};
pub use error::{IngestError, IngestResult};
pub use extract::{Metrics, NormalizedRecord, RecordExtractor, SourceFile};
pub use grid::{load_grid, Cell, RawGrid};
pub use header::{HeaderLocation, HeaderLocator, HeaderStrategy};
pub use pipeline::{BatchReport, Pipeline};
pub use reconciliation::{MergeEngine, MergePolicy, MergeReport};
pub use schema::{CanonicalField, ColumnMap, SchemaMapper};
pub use sync::{MirrorListing, Release, ReleaseListing, SyncStatus, SyncTracker};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
