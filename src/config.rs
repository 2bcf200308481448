// ⚙️ Configuration - TOML file with defaults for every field

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::reconciliation::MergePolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding downloaded spreadsheet releases
    pub excel_dir: PathBuf,

    /// SQLite database for the canonical store
    pub db_path: PathBuf,

    /// JSON file persisting SyncStatus between runs
    pub status_file: PathBuf,

    /// Local directory mirroring the remote release listing
    pub mirror_dir: Option<PathBuf>,

    /// Case-insensitive label identifying the bank-name header cell
    pub anchor_label: String,

    /// How many rows from the top are scanned for the header anchor
    pub header_scan_rows: usize,

    /// How far upward the classifier looks for a section banner
    pub banner_window: usize,

    pub merge_policy: MergePolicy,

    /// Pause between fetches from the release listing
    pub request_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            excel_dir: PathBuf::from("data/excel"),
            db_path: PathBuf::from("data/card_stats.db"),
            status_file: PathBuf::from("data/update_status.json"),
            mirror_dir: None,
            anchor_label: "bank name".to_string(),
            header_scan_rows: 10,
            banner_window: 10,
            merge_policy: MergePolicy::LockAfterRevision,
            request_delay_ms: 0,
        }
    }
}

impl Config {
    /// Load config from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Config::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.header_scan_rows, 10);
        assert_eq!(config.banner_window, 10);
        assert_eq!(config.anchor_label, "bank name");
        assert_eq!(config.merge_policy, MergePolicy::LockAfterRevision);
        assert!(config.mirror_dir.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            excel_dir = "/srv/rbi/excel"
            merge_policy = "always_overwrite"
            request_delay_ms = 2000
            "#,
        )
        .unwrap();

        assert_eq!(config.excel_dir, PathBuf::from("/srv/rbi/excel"));
        assert_eq!(config.merge_policy, MergePolicy::AlwaysOverwrite);
        assert_eq!(config.request_delay(), Duration::from_secs(2));
        assert_eq!(config.header_scan_rows, 10);
    }

    #[test]
    fn test_missing_file_is_default() {
        let config = Config::load(Path::new("/definitely/not/here.toml")).unwrap();
        assert_eq!(config.db_path, PathBuf::from("data/card_stats.db"));
    }
}
