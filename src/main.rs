// 🏦 Bank Card Statistics - command line
//
//   ingest [DIR]            ingest every release in DIR (default: excel_dir)
//   check                   compare the release listing with known files
//   sync [--all]            fetch new releases, then ingest them
//   export <CSV>            write stored statistics as CSV
//   reclassify <BANK> <CAT> set a bank's category by hand
//   status                  show the persisted sync status

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use bank_card_stats::export::export_csv;
use bank_card_stats::{
    db, open_database, reclassify_bank, BankCategory, BatchReport, Config, MirrorListing,
    Pipeline, StatisticsFilter, SyncStatus, SyncTracker,
};

#[derive(Parser)]
#[command(name = "bank-card-stats", version, about = "Bank-wise ATM/POS/card statistics pipeline")]
struct Cli {
    /// TOML config file; defaults apply when it does not exist
    #[arg(long, short, default_value = "bank-card-stats.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest every spreadsheet release in a directory
    Ingest {
        dir: Option<PathBuf>,
    },

    /// Check the release listing for files not yet known
    Check,

    /// Fetch new releases into excel_dir and ingest them
    Sync {
        /// Fetch every listed release, not only new ones
        #[arg(long)]
        all: bool,
    },

    /// Export stored statistics as CSV
    Export {
        output: PathBuf,
        #[arg(long, value_parser = parse_month_arg)]
        from: Option<NaiveDate>,
        #[arg(long, value_parser = parse_month_arg)]
        to: Option<NaiveDate>,
        #[arg(long)]
        bank: Option<String>,
        #[arg(long)]
        category: Option<String>,
    },

    /// Manually set a bank's category; later observations never override it
    Reclassify {
        bank: String,
        category: String,
    },

    /// Show the persisted sync status
    Status,
}

/// "2024-11" or "2024-11-01"
fn parse_month_arg(raw: &str) -> Result<NaiveDate, String> {
    let full = if raw.len() == 7 { format!("{}-01", raw) } else { raw.to_string() };
    NaiveDate::parse_from_str(&full, "%Y-%m-%d")
        .map_err(|e| format!("expected YYYY-MM: {}", e))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Command::Ingest { dir } => run_ingest(&config, dir),
        Command::Check => run_check(&config),
        Command::Sync { all } => run_sync(&config, all),
        Command::Export {
            output,
            from,
            to,
            bank,
            category,
        } => {
            let conn = open_database(&config.db_path)?;
            let filter = StatisticsFilter {
                from,
                to,
                bank,
                category,
            };
            let count = export_csv(&conn, &filter, &output)?;
            println!("✓ Exported {} rows to {}", count, output.display());
            Ok(())
        }
        Command::Reclassify { bank, category } => {
            let conn = open_database(&config.db_path)?;
            let category = BankCategory::from_label(&category);
            if !reclassify_bank(&conn, &bank, category.clone())? {
                bail!("Unknown bank: {}", bank);
            }
            println!("✓ {} is now {}", bank, category);
            Ok(())
        }
        Command::Status => {
            let status = SyncStatus::load(&config.status_file)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
    }
}

fn run_ingest(config: &Config, dir: Option<PathBuf>) -> Result<()> {
    let dir = dir.unwrap_or_else(|| config.excel_dir.clone());
    let status = SyncStatus::load(&config.status_file)?;
    let mut conn = open_database(&config.db_path)?;

    println!("📂 Ingesting releases from {}", dir.display());
    let report = Pipeline::from_config(config).ingest_dir(&mut conn, &dir, &status)?;
    print_batch(&report);

    println!("✓ Store holds {} statistics", db::statistic_count(&conn)?);
    Ok(())
}

fn tracker(config: &Config) -> Result<SyncTracker<MirrorListing>> {
    let mirror = config
        .mirror_dir
        .as_ref()
        .context("mirror_dir is not configured")?;
    let tracker = SyncTracker::new(
        MirrorListing::new(mirror),
        &config.status_file,
        config.request_delay(),
    )?;
    Ok(tracker)
}

fn run_check(config: &Config) -> Result<()> {
    let report = tracker(config)?.check()?;

    if report.new_files.is_empty() {
        println!("✓ Up to date ({} releases listed)", report.remote_files);
    } else {
        println!("🆕 {} new releases:", report.new_files.len());
        for name in &report.new_files {
            println!("   {}", name);
        }
    }
    Ok(())
}

fn run_sync(config: &Config, all: bool) -> Result<()> {
    let mut tracker = tracker(config)?;
    let report = tracker.sync(all, &config.excel_dir)?;

    for (file, reason) in &report.failed {
        println!("⚠️  {}: {}", file, reason);
    }
    if report.downloaded.is_empty() {
        println!("✓ Nothing new to ingest");
        return Ok(());
    }
    println!("⬇️  Fetched {} releases", report.downloaded.len());

    let mut conn = open_database(&config.db_path)?;
    let batch = Pipeline::from_config(config).ingest_files(&mut conn, &report.downloaded, tracker.status())?;
    print_batch(&batch);
    Ok(())
}

fn print_batch(report: &BatchReport) {
    for file in &report.succeeded {
        println!("  ✓ {}", file.merge.summary());
        for warning in &file.warnings {
            println!("      ⚠️  {}", warning);
        }
    }
    for failure in &report.failed {
        println!("  ✗ {} [{}] {}", failure.file, failure.kind, failure.error);
    }
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("{}", report.summary());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_month_arg() {
        assert_eq!(parse_month_arg("2024-11"), Ok(NaiveDate::from_ymd_opt(2024, 11, 1).unwrap()));
        assert_eq!(parse_month_arg("2024-11-01"), Ok(NaiveDate::from_ymd_opt(2024, 11, 1).unwrap()));
        assert!(parse_month_arg("Nov 2024").is_err());
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["bank-card-stats", "sync", "--all"]).unwrap();
        assert!(matches!(cli.command, Command::Sync { all: true }));

        let cli = Cli::try_parse_from([
            "bank-card-stats",
            "--config",
            "x.toml",
            "export",
            "out.csv",
            "--from",
            "2024-01",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("x.toml"));
        assert!(matches!(cli.command, Command::Export { from: Some(_), .. }));
    }
}
