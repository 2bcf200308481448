// ⚖️ Reconciliation Engine - merge extracted records into the canonical store
//
// Releases arrive out of order and months get re-published as revisions.
// Per (bank, month):
//
//   nothing stored            → insert
//   unrevised + revised file  → overwrite all twelve metrics, mark revised
//   anything else             → no-op, the stored value is authoritative
//
// That is the lock-after-revision policy. `AlwaysOverwrite` is the
// alternative: every submission replaces the stored metrics.
//
// All writes for one file run in one SQLite transaction.

use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::{self, Event, SourceFileEntry};
use crate::entities::bank::BankEntity;
use crate::error::IngestResult;
use crate::extract::{NormalizedRecord, SourceFile};

const ACTOR: &str = "merge_engine";

// ============================================================================
// POLICY & OUTCOMES
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// First unrevised wins, one revision may supersede it, then locked
    #[default]
    LockAfterRevision,

    /// Every submission replaces the stored metrics
    AlwaysOverwrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeOutcome {
    Inserted,
    /// Revised record superseded an unrevised statistic
    Revised,
    /// Replaced under `AlwaysOverwrite`
    Overwritten,
    Unchanged,
}

impl MergePolicy {
    /// What to do with a record, given the stored statistic's revised flag
    /// (`None` when nothing is stored for the bank and month)
    pub fn decide(&self, stored_revised: Option<bool>, incoming_revised: bool) -> MergeOutcome {
        match (self, stored_revised) {
            (_, None) => MergeOutcome::Inserted,
            (MergePolicy::LockAfterRevision, Some(false)) if incoming_revised => MergeOutcome::Revised,
            (MergePolicy::LockAfterRevision, Some(_)) => MergeOutcome::Unchanged,
            (MergePolicy::AlwaysOverwrite, Some(_)) => MergeOutcome::Overwritten,
        }
    }
}

// ============================================================================
// MERGE REPORT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeReport {
    pub file: String,
    pub inserted: usize,
    pub revised: usize,
    pub overwritten: usize,
    pub unchanged: usize,
    pub banks_created: usize,
    pub banks_refined: usize,
}

impl MergeReport {
    fn count(&mut self, outcome: MergeOutcome) {
        match outcome {
            MergeOutcome::Inserted => self.inserted += 1,
            MergeOutcome::Revised => self.revised += 1,
            MergeOutcome::Overwritten => self.overwritten += 1,
            MergeOutcome::Unchanged => self.unchanged += 1,
        }
    }

    pub fn records(&self) -> usize {
        self.inserted + self.revised + self.overwritten + self.unchanged
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: {} inserted, {} revised, {} overwritten, {} unchanged, {} new banks",
            self.file, self.inserted, self.revised, self.overwritten, self.unchanged, self.banks_created
        )
    }
}

// ============================================================================
// MERGE ENGINE
// ============================================================================

pub struct MergeEngine {
    pub policy: MergePolicy,
}

impl MergeEngine {
    pub fn new(policy: MergePolicy) -> Self {
        MergeEngine { policy }
    }

    /// Merge every record of one file atomically, and record the file in the
    /// source ledger. Any failure rolls the whole file back.
    pub fn merge_file(
        &self,
        conn: &mut Connection,
        source: &SourceFile,
        content_hash: &str,
        records: &[NormalizedRecord],
    ) -> IngestResult<MergeReport> {
        let tx = conn.transaction()?;
        let mut report = MergeReport {
            file: source.name.clone(),
            ..MergeReport::default()
        };

        for record in records {
            let bank = self.resolve_bank(&tx, record, &mut report)?;
            let outcome = self.apply(&tx, &bank, record)?;
            report.count(outcome);
        }

        db::record_source_file(
            &tx,
            &SourceFileEntry {
                file_name: source.name.clone(),
                content_hash: content_hash.to_string(),
                month: source.reporting_month,
                is_revised: source.is_revised,
                record_count: records.len(),
                ingested_at: Utc::now(),
            },
        )?;

        tx.commit()?;

        tracing::info!(
            file = %report.file,
            inserted = report.inserted,
            revised = report.revised,
            overwritten = report.overwritten,
            unchanged = report.unchanged,
            banks_created = report.banks_created,
            "file merged"
        );
        Ok(report)
    }

    /// Find or create the bank; an observed category fills in an Unknown type
    fn resolve_bank(
        &self,
        conn: &Connection,
        record: &NormalizedRecord,
        report: &mut MergeReport,
    ) -> rusqlite::Result<BankEntity> {
        match db::find_bank(conn, &record.canonical_bank_name)? {
            Some(mut bank) => {
                let previous = bank.bank_type.clone();
                if bank.refine(&record.bank_type, record.category_source) {
                    db::update_bank_type(conn, &bank)?;
                    db::insert_event(
                        conn,
                        &Event::new(
                            "bank_type_refined",
                            "bank",
                            &bank.id,
                            serde_json::json!({
                                "bank": bank.canonical_name,
                                "from": previous.label(),
                                "to": bank.bank_type.label(),
                                "source": bank.category_source.as_str(),
                                "file": record.source_file,
                            }),
                            ACTOR,
                        ),
                    )?;
                    report.banks_refined += 1;
                }
                Ok(bank)
            }
            None => {
                let bank = BankEntity::new(
                    record.canonical_bank_name.clone(),
                    record.bank_type.clone(),
                    record.category_source,
                );
                db::insert_bank(conn, &bank)?;
                db::insert_event(
                    conn,
                    &Event::new(
                        "bank_created",
                        "bank",
                        &bank.id,
                        serde_json::json!({
                            "bank": bank.canonical_name,
                            "bank_type": bank.bank_type.label(),
                            "file": record.source_file,
                        }),
                        ACTOR,
                    ),
                )?;
                report.banks_created += 1;
                Ok(bank)
            }
        }
    }

    fn apply(
        &self,
        conn: &Connection,
        bank: &BankEntity,
        record: &NormalizedRecord,
    ) -> rusqlite::Result<MergeOutcome> {
        let stored = db::get_statistic(conn, &bank.id, record.reporting_month)?;
        let stored_revised = stored.as_ref().map(|s| s.is_revised);
        let outcome = self.policy.decide(stored_revised, record.is_revised);

        match outcome {
            MergeOutcome::Inserted => db::insert_statistic(conn, &bank.id, record)?,
            MergeOutcome::Revised | MergeOutcome::Overwritten => {
                let is_revised = record.is_revised || stored_revised.unwrap_or(false);
                db::overwrite_statistic(conn, &bank.id, record, is_revised)?;

                let event_type = if outcome == MergeOutcome::Revised {
                    "statistic_revised"
                } else {
                    "statistic_overwritten"
                };
                db::insert_event(
                    conn,
                    &Event::new(
                        event_type,
                        "statistic",
                        &format!("{}:{}", bank.id, db::month_key(record.reporting_month)),
                        serde_json::json!({
                            "bank": bank.canonical_name,
                            "previous_file": stored.as_ref().map(|s| s.source_file.clone()),
                            "file": record.source_file,
                        }),
                        ACTOR,
                    ),
                )?;
            }
            MergeOutcome::Unchanged => {
                tracing::debug!(
                    bank = %bank.canonical_name,
                    month = %record.reporting_month,
                    "stored statistic is authoritative, skipping"
                );
            }
        }

        Ok(outcome)
    }
}

impl Default for MergeEngine {
    fn default() -> Self {
        MergeEngine::new(MergePolicy::default())
    }
}
