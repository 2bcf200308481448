// 🚚 Pipeline - load → locate → map → extract → merge, one file at a time
//
// Files are ordered by (month, unrevised first) so a revision always meets
// the original it supersedes. A failing file is recorded and skipped; only a
// batch where nothing could be ingested is an error.

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::db;
use crate::entities::bank::BankNormalizer;
use crate::error::{IngestError, IngestResult};
use crate::extract::{RecordExtractor, SourceFile};
use crate::grid;
use crate::reconciliation::{MergeEngine, MergeReport};
use crate::sync::SyncStatus;

// ============================================================================
// BATCH REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub file: String,
    pub month: NaiveDate,
    pub is_revised: bool,
    pub records: usize,
    pub warnings: Vec<String>,
    pub schema_incomplete: bool,
    pub merge: MergeReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub file: String,
    pub kind: &'static str,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub attempted: usize,
    pub succeeded: Vec<FileOutcome>,
    pub failed: Vec<FileFailure>,
}

impl BatchReport {
    pub fn records(&self) -> usize {
        self.succeeded.iter().map(|f| f.records).sum()
    }

    pub fn degraded(&self) -> usize {
        self.succeeded.iter().filter(|f| !f.warnings.is_empty()).count()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} files attempted: {} ingested ({} degraded), {} failed, {} records",
            self.attempted,
            self.succeeded.len(),
            self.degraded(),
            self.failed.len(),
            self.records()
        )
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct Pipeline {
    extractor: RecordExtractor,
    engine: MergeEngine,
}

struct PlannedFile {
    path: PathBuf,
    source: SourceFile,
}

impl Pipeline {
    pub fn new(extractor: RecordExtractor, engine: MergeEngine) -> Self {
        Pipeline { extractor, engine }
    }

    pub fn from_config(config: &Config) -> Self {
        Pipeline::new(
            RecordExtractor::from_config(config),
            MergeEngine::new(config.merge_policy),
        )
    }

    /// Ingest every supported spreadsheet in `dir`
    pub fn ingest_dir(
        &self,
        conn: &mut Connection,
        dir: &Path,
        status: &SyncStatus,
    ) -> IngestResult<BatchReport> {
        let entries = fs::read_dir(dir).map_err(|e| IngestError::file_read(dir, e))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && grid::is_supported(p))
            .collect();
        files.sort();

        self.ingest_files(conn, &files, status)
    }

    /// Ingest the given files with per-file isolation
    pub fn ingest_files(
        &self,
        conn: &mut Connection,
        files: &[PathBuf],
        status: &SyncStatus,
    ) -> IngestResult<BatchReport> {
        let mut report = BatchReport {
            attempted: files.len(),
            ..BatchReport::default()
        };

        let mut planned = Vec::with_capacity(files.len());
        for path in files {
            match plan(path, status) {
                Ok(p) => planned.push(p),
                Err(e) => record_failure(&mut report, path, e),
            }
        }
        planned.sort_by(|a, b| {
            (a.source.reporting_month, a.source.is_revised, &a.source.name)
                .cmp(&(b.source.reporting_month, b.source.is_revised, &b.source.name))
        });

        let mut normalizer = BankNormalizer::new();

        for file in &planned {
            match self.ingest_one(conn, file, &mut normalizer) {
                Ok(outcome) => report.succeeded.push(outcome),
                Err(e) => record_failure(&mut report, &file.path, e),
            }
        }

        tracing::info!(
            attempted = report.attempted,
            ingested = report.succeeded.len(),
            failed = report.failed.len(),
            records = report.records(),
            bank_spellings = normalizer.cached(),
            "batch complete"
        );

        if report.succeeded.is_empty() {
            return Err(IngestError::NoUsableFiles {
                attempted: report.attempted,
            });
        }
        Ok(report)
    }

    fn ingest_one(
        &self,
        conn: &mut Connection,
        file: &PlannedFile,
        normalizer: &mut BankNormalizer,
    ) -> IngestResult<FileOutcome> {
        let bytes = fs::read(&file.path).map_err(|e| IngestError::file_read(&file.path, e))?;
        let hash = db::content_hash(&bytes);

        let grid = grid::load_grid(&file.path)?;
        let extraction = self.extractor.extract(&grid, &file.source, normalizer)?;
        let merge = self
            .engine
            .merge_file(conn, &file.source, &hash, &extraction.records)?;

        Ok(FileOutcome {
            file: file.source.name.clone(),
            month: file.source.reporting_month,
            is_revised: file.source.is_revised,
            records: extraction.records.len(),
            schema_incomplete: extraction.schema_incomplete(),
            warnings: extraction.warnings.iter().map(|w| w.to_string()).collect(),
            merge,
        })
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Month and revised flag for one file, before any I/O
fn plan(path: &Path, status: &SyncStatus) -> IngestResult<PlannedFile> {
    let name = file_name_of(path);
    let reporting_month = status
        .reporting_month(&name)
        .ok_or_else(|| IngestError::MonthUndetermined { file: name.clone() })?;
    let is_revised = status.is_revised(&name);

    Ok(PlannedFile {
        path: path.to_path_buf(),
        source: SourceFile {
            name,
            reporting_month,
            is_revised,
        },
    })
}

fn record_failure(report: &mut BatchReport, path: &Path, error: IngestError) {
    let file = file_name_of(path);
    tracing::warn!(file = %file, kind = error.kind(), error = %error, "file skipped");
    report.failed.push(FileFailure {
        file,
        kind: error.kind(),
        error: error.to_string(),
    });
}
