pub mod classify;
pub mod fingerprint;
pub mod invoice;
pub mod ledger;
pub mod profile;
pub(crate) mod util;

use thiserror::Error;

pub use classify::{apply_rules, classify};
pub use fingerprint::fingerprint;
pub use invoice::InvoiceStatement;
pub use ledger::{LedgerMetadata, LedgerStatement};
pub use profile::{
    InvoiceProfile, LedgerProfile, StatementProfiles, TextEncoding,
};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Missing required column: {0}")]
    MissingColumn(String),
    #[error("Invalid date: {0}")]
    InvalidDate(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid profile: {0}")]
    InvalidProfile(String),
}
