//! Ingestion orchestrator: discovers statement files, runs them through
//! extraction, classification, validation and loading, and keeps the
//! processed-file markers up to date.
//!
//! The engine is synchronous aside from store I/O. The rule cache is the only
//! process-wide mutable state; callers running concurrent ingests for the
//! same owner must serialize them.

pub mod cache;

use std::path::{Path, PathBuf};
use std::time::Duration;

use centime_core::{validate_batch, ClassifiedTransaction, Money, Source, TxnKind};
use centime_import::{classify, fingerprint, ImportError, StatementProfiles};
use centime_storage::{
    amounts_by_kind, is_processed, load, mark_processed, transactions_for_reclassify,
    update_classification, DbPool, LoadStats, StorageError,
};
use chrono::Utc;
use thiserror::Error;

pub use cache::RuleCache;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Orchestrator configuration: the two statement profiles plus the rule
/// cache TTL.
pub struct PipelineConfig {
    pub profiles: StatementProfiles,
    pub rule_cache_ttl: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            profiles: StatementProfiles::default(),
            rule_cache_ttl: Duration::from_secs(60),
        }
    }
}

/// Counters for a folder run. File counts cover recognized statements only;
/// `errors` aggregates failed files, rejected rows and insert failures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub ledger_files: usize,
    pub card_files: usize,
    pub total_transactions: usize,
    pub inserted: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// Kind totals for a reporting period, with the leftover after expenses and
/// savings. Card refunds are tracked separately rather than netted against
/// expenses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeriodSummary {
    pub income: Money,
    pub expenses: Money,
    pub savings: Money,
    pub card_refunds: Money,
    pub unlabeled: Money,
    pub net: Money,
}

pub struct IngestionPipeline {
    pool: DbPool,
    profiles: StatementProfiles,
    rules: RuleCache,
}

impl IngestionPipeline {
    pub fn new(pool: DbPool, config: PipelineConfig) -> Self {
        IngestionPipeline {
            pool,
            profiles: config.profiles,
            rules: RuleCache::new(config.rule_cache_ttl),
        }
    }

    pub fn rule_cache(&self) -> &RuleCache {
        &self.rules
    }

    /// Ingest every recognized `*.csv` statement in `folder`. A failing file
    /// is logged and counted; only a setup failure (unreadable folder) stops
    /// the run.
    pub async fn run(
        &self,
        owner_id: i64,
        folder: &Path,
        force: bool,
    ) -> Result<RunStats, PipelineError> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(folder)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("csv")))
            .collect();
        paths.sort();

        let mut stats = RunStats::default();
        for path in paths {
            let filename = file_name(&path);
            let Some(source) = self.profiles.detect_source(&filename) else {
                tracing::debug!(file = %filename, "no source matches filename, ignoring");
                continue;
            };
            match source {
                Source::Ledger => stats.ledger_files += 1,
                Source::Card => stats.card_files += 1,
            }
            match self.process_file(owner_id, &path, force).await {
                Ok(Some(file_stats)) => {
                    stats.total_transactions += file_stats.total;
                    stats.inserted += file_stats.inserted;
                    stats.skipped += file_stats.skipped;
                    stats.errors += file_stats.errors;
                }
                Ok(None) => {
                    tracing::info!(file = %filename, "already processed, skipping");
                }
                Err(PipelineError::Storage(e)) => return Err(e.into()),
                Err(e) => {
                    tracing::error!(file = %filename, "statement failed: {e}");
                    stats.errors += 1;
                }
            }
        }

        tracing::info!(
            owner_id,
            ledger_files = stats.ledger_files,
            card_files = stats.card_files,
            inserted = stats.inserted,
            skipped = stats.skipped,
            errors = stats.errors,
            "ingestion run finished"
        );
        Ok(stats)
    }

    /// Run one statement file through extract, classify, validate, load and
    /// mark. Returns `None` when the file is unrecognized or already marked
    /// processed (unless `force`). Re-running with `force` re-evaluates the
    /// file, with the fingerprint check still preventing duplicate rows.
    pub async fn process_file(
        &self,
        owner_id: i64,
        path: &Path,
        force: bool,
    ) -> Result<Option<LoadStats>, PipelineError> {
        let filename = file_name(path);
        let Some(source) = self.profiles.detect_source(&filename) else {
            tracing::warn!(file = %filename, "no source matches filename, ignoring");
            return Ok(None);
        };

        if !force && is_processed(&self.pool, owner_id, &filename).await? {
            return Ok(None);
        }

        let raws = match source {
            Source::Ledger => {
                centime_import::ledger::extract(path, &self.profiles.ledger)?.transactions
            }
            Source::Card => {
                centime_import::invoice::extract(path, &self.profiles.invoice)?.transactions
            }
        };

        let rules = self.rules.get(&self.pool).await?;
        let classified: Vec<ClassifiedTransaction> = raws
            .iter()
            .map(|raw| {
                let (kind, category) = classify(raw, &rules);
                ClassifiedTransaction {
                    date: raw.date,
                    kind,
                    category,
                    amount: raw.amount,
                    polarity: raw.polarity,
                    description: raw.description.clone(),
                    source,
                    source_file: Some(filename.clone()),
                    fingerprint: fingerprint(raw),
                }
            })
            .collect();

        let (valid, rejected) = validate_batch(classified, Utc::now().date_naive());
        for r in &rejected {
            tracing::warn!(
                file = %filename,
                date = %r.transaction.date,
                "rejected transaction: {}",
                r.reason
            );
        }

        let valid_count = valid.len();
        let mut stats = load(&self.pool, owner_id, &valid).await?;
        stats.total += rejected.len();
        stats.errors += rejected.len();

        mark_processed(&self.pool, owner_id, &filename, source, valid_count as i64).await?;

        tracing::info!(
            file = %filename,
            inserted = stats.inserted,
            skipped = stats.skipped,
            errors = stats.errors,
            "statement processed"
        );
        Ok(Some(stats))
    }

    /// Re-run the user rules over every stored transaction for the owner.
    /// Rows matched by a rule take that rule's kind and category; unmatched
    /// rows keep their current classification. Returns the updated count.
    pub async fn reapply_rules(&self, owner_id: i64) -> Result<usize, PipelineError> {
        self.rules.invalidate().await;
        let rules = self.rules.get(&self.pool).await?;

        let mut updated = 0;
        for (id, description, amount) in transactions_for_reclassify(&self.pool, owner_id).await? {
            if let Some((kind, category)) =
                centime_import::apply_rules(&rules, &description, amount)
            {
                update_classification(&self.pool, id, kind, &category).await?;
                updated += 1;
            }
        }

        tracing::info!(owner_id, updated, "reapplied rules to stored transactions");
        Ok(updated)
    }

    /// Aggregate totals per kind for a year or a single month.
    pub async fn summary(
        &self,
        owner_id: i64,
        year: i32,
        month: Option<u8>,
    ) -> Result<PeriodSummary, PipelineError> {
        let mut summary = PeriodSummary::default();
        for (kind, amount) in amounts_by_kind(&self.pool, owner_id, year, month).await? {
            let bucket = match kind {
                TxnKind::Income => &mut summary.income,
                TxnKind::Expenses => &mut summary.expenses,
                TxnKind::Savings => &mut summary.savings,
                TxnKind::CardRefund => &mut summary.card_refunds,
                TxnKind::Unlabeled => &mut summary.unlabeled,
            };
            *bucket = *bucket + amount;
        }
        summary.net = summary.income - summary.expenses - summary.savings;
        Ok(summary)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}
