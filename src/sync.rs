// 🔄 Sync Tracker - which releases are new since the last run
//
// SyncStatus is the one piece of cross-run state. It is loaded at start
// (defaulted when absent), mutated by a check or sync cycle, and written
// back at the end of every cycle by atomic file replacement.
//
// A release is new iff its file name is absent from `known_files`. Content
// hashes play no part in that decision.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{IngestError, IngestResult};
use crate::extract::{is_revised_name, reporting_month_from_name};
use crate::grid;

pub const LISTING_FILE: &str = "listing.json";

// ============================================================================
// SYNC STATUS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub last_checked: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
    pub known_files: BTreeSet<String>,
    pub new_data_available: bool,

    /// Known files the listing marked as revisions
    #[serde(default)]
    pub revised_files: BTreeSet<String>,

    /// Reporting month read from each release's listing label
    #[serde(default)]
    pub release_months: BTreeMap<String, NaiveDate>,
}

impl SyncStatus {
    /// Load from `path`; a missing file is a fresh status
    pub fn load(path: &Path) -> IngestResult<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "no sync status yet, starting fresh");
            return Ok(SyncStatus::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| IngestError::Status(format!("read {}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| IngestError::Status(format!("parse {}: {}", path.display(), e)))
    }

    /// Write to a temp file beside `path`, then rename over it
    pub fn save(&self, path: &Path) -> IngestResult<()> {
        let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => parent.to_path_buf(),
            None => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)
            .map_err(|e| IngestError::Status(format!("create {}: {}", dir.display(), e)))?;

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| IngestError::Status(format!("serialize: {}", e)))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| IngestError::Status(format!("temp file in {}: {}", dir.display(), e)))?;
        tmp.write_all(json.as_bytes())
            .map_err(|e| IngestError::Status(format!("write: {}", e)))?;
        tmp.persist(path)
            .map_err(|e| IngestError::Status(format!("replace {}: {}", path.display(), e)))?;

        Ok(())
    }

    pub fn is_known(&self, file_name: &str) -> bool {
        self.known_files.contains(file_name)
    }

    /// Revised per the listing, or by its own name
    pub fn is_revised(&self, file_name: &str) -> bool {
        self.revised_files.contains(file_name) || is_revised_name(file_name)
    }

    /// Month from the file name, else the month its listing label gave
    pub fn reporting_month(&self, file_name: &str) -> Option<NaiveDate> {
        reporting_month_from_name(file_name).or_else(|| self.release_months.get(file_name).copied())
    }
}

// ============================================================================
// RELEASES & LISTINGS
// ============================================================================

/// One entry of the remote release listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    /// Display label, e.g. "November 2024 (Revised)"
    pub label: String,

    /// Where to fetch it from, relative to the listing
    pub locator: String,

    #[serde(default)]
    pub is_revised: bool,
}

impl Release {
    /// Local file name: last path segment of the locator, query dropped
    pub fn file_name(&self) -> String {
        let path = self.locator.split(['?', '#']).next().unwrap_or_default();
        path.rsplit(['/', '\\'])
            .find(|s| !s.is_empty())
            .unwrap_or(path)
            .to_string()
    }

    pub fn reporting_month(&self) -> Option<NaiveDate> {
        reporting_month_from_name(&self.label).or_else(|| reporting_month_from_name(&self.file_name()))
    }
}

/// Source of available releases. Network implementations live outside
/// this crate; `MirrorListing` serves a local directory.
pub trait ReleaseListing {
    fn list(&self) -> Result<Vec<Release>>;

    /// Place the release in `dest_dir` and return its path
    fn fetch(&self, release: &Release, dest_dir: &Path) -> Result<PathBuf>;
}

/// Local mirror of the release listing. Uses `listing.json` when present,
/// otherwise every spreadsheet file in the directory.
pub struct MirrorListing {
    root: PathBuf,
}

impl MirrorListing {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        MirrorListing { root: root.into() }
    }
}

impl ReleaseListing for MirrorListing {
    fn list(&self) -> Result<Vec<Release>> {
        let listing_path = self.root.join(LISTING_FILE);
        if listing_path.exists() {
            let content = fs::read_to_string(&listing_path)
                .with_context(|| format!("Failed to read listing: {}", listing_path.display()))?;
            let releases: Vec<Release> = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse listing: {}", listing_path.display()))?;
            return Ok(releases);
        }

        let mut releases = Vec::new();
        let entries = fs::read_dir(&self.root)
            .with_context(|| format!("Failed to read mirror directory: {}", self.root.display()))?;

        for entry in entries {
            let path = entry?.path();
            if !path.is_file() || !grid::is_supported(&path) {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            releases.push(Release {
                label: name.to_string(),
                locator: name.to_string(),
                is_revised: is_revised_name(name),
            });
        }

        releases.sort_by(|a, b| a.locator.cmp(&b.locator));
        Ok(releases)
    }

    fn fetch(&self, release: &Release, dest_dir: &Path) -> Result<PathBuf> {
        let from = self.root.join(&release.locator);
        let to = dest_dir.join(release.file_name());

        fs::create_dir_all(dest_dir)
            .with_context(|| format!("Failed to create {}", dest_dir.display()))?;
        fs::copy(&from, &to)
            .with_context(|| format!("Failed to copy {} to {}", from.display(), to.display()))?;
        Ok(to)
    }
}

// ============================================================================
// SYNC TRACKER
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CheckReport {
    pub remote_files: usize,
    pub new_files: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub downloaded: Vec<PathBuf>,
    pub failed: Vec<(String, String)>,
}

pub struct SyncTracker<L: ReleaseListing> {
    listing: L,
    status_path: PathBuf,
    status: SyncStatus,
    delay: Duration,
}

impl<L: ReleaseListing> SyncTracker<L> {
    pub fn new(listing: L, status_path: impl Into<PathBuf>, delay: Duration) -> IngestResult<Self> {
        let status_path = status_path.into();
        let status = SyncStatus::load(&status_path)?;
        Ok(SyncTracker {
            listing,
            status_path,
            status,
            delay,
        })
    }

    pub fn status(&self) -> &SyncStatus {
        &self.status
    }

    fn remote_names(releases: &[Release]) -> BTreeSet<String> {
        releases.iter().map(|r| r.file_name()).collect()
    }

    /// Compare the remote listing with `known_files` and persist the verdict.
    /// A failed listing still records the attempt before returning the error.
    pub fn check(&mut self) -> Result<CheckReport> {
        let releases = match self.listing.list() {
            Ok(releases) => releases,
            Err(e) => {
                tracing::warn!(error = %e, "release listing failed");
                self.status.new_data_available = false;
                self.status.last_checked = Some(Utc::now());
                self.status.save(&self.status_path)?;
                return Err(e);
            }
        };
        let remote = Self::remote_names(&releases);

        let new_files: Vec<String> = remote.difference(&self.status.known_files).cloned().collect();

        self.status.new_data_available = !new_files.is_empty();
        self.status.last_checked = Some(Utc::now());
        self.status.save(&self.status_path)?;

        tracing::info!(
            remote = remote.len(),
            new = new_files.len(),
            "release check complete"
        );

        Ok(CheckReport {
            remote_files: remote.len(),
            new_files,
        })
    }

    /// Fetch new releases (or all of them) into `dest_dir`.
    ///
    /// Afterwards `known_files` is the listed set minus any release that
    /// failed to fetch, so failures are retried next cycle.
    pub fn sync(&mut self, all: bool, dest_dir: &Path) -> Result<SyncReport> {
        let releases = self.listing.list()?;
        let targets: Vec<&Release> = releases
            .iter()
            .filter(|r| all || !self.status.is_known(&r.file_name()))
            .collect();

        tracing::info!(targets = targets.len(), full = all, "sync started");

        let mut report = SyncReport::default();
        for (i, release) in targets.iter().enumerate() {
            if i > 0 && !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }

            match self.listing.fetch(release, dest_dir) {
                Ok(path) => {
                    tracing::info!(release = %release.label, path = %path.display(), "release fetched");
                    report.downloaded.push(path);
                }
                Err(e) => {
                    tracing::warn!(release = %release.label, error = %e, "release fetch failed");
                    report.failed.push((release.file_name(), format!("{:#}", e)));
                }
            }
        }

        let failed: BTreeSet<&str> = report.failed.iter().map(|(name, _)| name.as_str()).collect();
        let mut known = Self::remote_names(&releases);
        known.retain(|name| !failed.contains(name.as_str()));

        for release in &releases {
            let name = release.file_name();
            if let Some(month) = release.reporting_month() {
                self.status.release_months.insert(name.clone(), month);
            }
            if release.is_revised {
                self.status.revised_files.insert(name);
            }
        }

        self.status.known_files = known;
        self.status.new_data_available = false;
        self.status.last_updated = Some(Utc::now());
        self.status.save(&self.status_path)?;

        Ok(report)
    }
}
