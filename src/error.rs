// 🚨 Ingestion errors
// One variant per failure kind the pipeline distinguishes. Degraded paths
// (missing columns, unparsable cells) are warnings, not errors - see
// `extract::ExtractionWarning`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    /// No row within the scan bound carries the anchor label
    #[error("header anchor '{anchor}' not found in the first {scanned} rows")]
    HeaderNotFound { anchor: String, scanned: usize },

    #[error("failed to read {}: {reason}", .path.display())]
    FileRead { path: PathBuf, reason: String },

    #[error("could not determine reporting month for {file}")]
    MonthUndetermined { file: String },

    /// The per-file transaction was rolled back
    #[error("merge transaction failed: {0}")]
    MergeTransaction(#[from] rusqlite::Error),

    #[error("no usable source files ({attempted} attempted)")]
    NoUsableFiles { attempted: usize },

    #[error("sync status error: {0}")]
    Status(String),
}

impl IngestError {
    pub fn file_read(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        IngestError::FileRead {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Short machine-friendly label used in logs and batch reports
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::HeaderNotFound { .. } => "HeaderNotFound",
            IngestError::FileRead { .. } => "FileReadFailure",
            IngestError::MonthUndetermined { .. } => "MonthUndetermined",
            IngestError::MergeTransaction(_) => "MergeTransactionFailure",
            IngestError::NoUsableFiles { .. } => "NoUsableFiles",
            IngestError::Status(_) => "Status",
        }
    }
}

pub type IngestResult<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let err = IngestError::HeaderNotFound {
            anchor: "bank name".to_string(),
            scanned: 10,
        };
        assert_eq!(err.kind(), "HeaderNotFound");
        assert!(err.to_string().contains("first 10 rows"));

        let err = IngestError::file_read("/tmp/ATMMarch2025.xlsx", "corrupt zip");
        assert_eq!(err.kind(), "FileReadFailure");
        assert!(err.to_string().contains("ATMMarch2025.xlsx"));
        assert!(err.to_string().contains("corrupt zip"));
    }
}
