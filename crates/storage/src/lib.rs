pub mod budget;
pub mod db;
pub mod loader;
pub mod rules;

use thiserror::Error;

pub use budget::{delete_budget, get_budgets, resolve_budget, upsert_budget};
pub use db::{create_db, DbPool};
pub use loader::{
    amounts_by_kind, existing_fingerprints, is_processed, load, load_with, mark_processed,
    processed_files, transactions_for_reclassify, update_classification, LoadStats, MarkOutcome,
    ProcessedFile,
};
pub use rules::{delete_rule, get_rules, save_rule, update_rule};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("corrupt stored value: {0}")]
    Corrupt(String),
    #[error("invalid month: {0} (expected 1-12)")]
    InvalidMonth(u8),
    #[error("rule has no id")]
    MissingRuleId,
}
