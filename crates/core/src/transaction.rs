use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::money::Money;

/// Statement origin, the closed set of supported statement sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    /// Checking-account ledger statement.
    Ledger,
    /// Credit-card invoice statement.
    Card,
}

impl Source {
    /// Tag used in fingerprints and storage.
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Ledger => "ledger",
            Source::Card => "card",
        }
    }
}

impl std::str::FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ledger" => Ok(Source::Ledger),
            "card" => Ok(Source::Card),
            other => Err(format!("Unknown statement source: '{other}'")),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a transaction, kept separate from its (always non-negative)
/// magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Polarity {
    Credit,
    Debit,
}

impl Polarity {
    pub fn token(self) -> &'static str {
        match self {
            Polarity::Credit => "credit",
            Polarity::Debit => "debit",
        }
    }
}

/// Semantic classification of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxnKind {
    Income,
    Expenses,
    Savings,
    /// Card refund / card payment settlement.
    CardRefund,
    /// Not matched by any rule or heuristic; needs manual review.
    Unlabeled,
}

impl TxnKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TxnKind::Income => "Income",
            TxnKind::Expenses => "Expenses",
            TxnKind::Savings => "Savings",
            TxnKind::CardRefund => "CardRefund",
            TxnKind::Unlabeled => "Unlabeled",
        }
    }
}

impl std::str::FromStr for TxnKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "income" => Ok(TxnKind::Income),
            "expenses" => Ok(TxnKind::Expenses),
            "savings" => Ok(TxnKind::Savings),
            "cardrefund" | "card-refund" => Ok(TxnKind::CardRefund),
            "unlabeled" => Ok(TxnKind::Unlabeled),
            other => Err(format!("Unknown transaction kind: '{other}'")),
        }
    }
}

impl fmt::Display for TxnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source-specific raw fields retained from the statement row.
///
/// These feed the fingerprint and the built-in heuristics; everything is
/// already lower-cased by extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SourceFields {
    Ledger {
        description1: Option<String>,
        description2: Option<String>,
        description3: Option<String>,
        transaction_no: Option<String>,
    },
    Card {
        sector: Option<String>,
        booking_text: Option<String>,
    },
}

impl SourceFields {
    pub fn source(&self) -> Source {
        match self {
            SourceFields::Ledger { .. } => Source::Ledger,
            SourceFields::Card { .. } => Source::Card,
        }
    }
}

/// An unclassified record straight from statement parsing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTransaction {
    pub date: NaiveDate,
    /// Absolute magnitude; direction lives in `polarity`.
    pub amount: Money,
    pub polarity: Polarity,
    /// Assembled, lower-cased description used for rule matching.
    pub description: String,
    pub fields: SourceFields,
}

impl RawTransaction {
    pub fn source(&self) -> Source {
        self.fields.source()
    }
}

/// A raw transaction after type/category assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedTransaction {
    pub date: NaiveDate,
    pub kind: TxnKind,
    pub category: String,
    pub amount: Money,
    pub polarity: Polarity,
    pub description: String,
    pub source: Source,
    pub source_file: Option<String>,
    /// Deduplication key: lowercase hex SHA-256 of the canonical row string.
    pub fingerprint: String,
}

// ── Validation ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("amount must be positive: {0}")]
    NonPositiveAmount(String),
    #[error("date is in the future: {0}")]
    FutureDate(NaiveDate),
}

/// A transaction excluded from loading, with the reason it was rejected.
#[derive(Debug, Clone)]
pub struct RejectedTransaction {
    pub transaction: ClassifiedTransaction,
    pub reason: ValidationError,
}

/// Split a classified batch into loadable transactions and structured
/// rejections. Nothing is silently dropped: every excluded record appears in
/// the rejection list. `today` is explicit so the future-date check is
/// deterministic under test.
pub fn validate_batch(
    transactions: Vec<ClassifiedTransaction>,
    today: NaiveDate,
) -> (Vec<ClassifiedTransaction>, Vec<RejectedTransaction>) {
    let mut valid = Vec::with_capacity(transactions.len());
    let mut rejected = Vec::new();

    for tx in transactions {
        match validate_single(&tx, today) {
            None => valid.push(tx),
            Some(reason) => rejected.push(RejectedTransaction { transaction: tx, reason }),
        }
    }

    (valid, rejected)
}

fn validate_single(tx: &ClassifiedTransaction, today: NaiveDate) -> Option<ValidationError> {
    if !tx.amount.is_positive() {
        return Some(ValidationError::NonPositiveAmount(tx.amount.to_string()));
    }
    if tx.date > today {
        return Some(ValidationError::FutureDate(tx.date));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn classified(amount_cents: i64, d: NaiveDate) -> ClassifiedTransaction {
        ClassifiedTransaction {
            date: d,
            kind: TxnKind::Expenses,
            category: "Groceries".to_string(),
            amount: Money::from_cents(amount_cents),
            polarity: Polarity::Debit,
            description: "coop genf".to_string(),
            source: Source::Ledger,
            source_file: None,
            fingerprint: "00".repeat(32),
        }
    }

    #[test]
    fn kind_round_trip() {
        for kind in [
            TxnKind::Income,
            TxnKind::Expenses,
            TxnKind::Savings,
            TxnKind::CardRefund,
            TxnKind::Unlabeled,
        ] {
            assert_eq!(TxnKind::from_str(kind.as_str()).unwrap(), kind);
        }
    }

    #[test]
    fn kind_rejects_unknown_label() {
        assert!(TxnKind::from_str("Unknown").is_err());
        assert!(TxnKind::from_str("").is_err());
    }

    #[test]
    fn source_round_trip() {
        assert_eq!(Source::from_str("ledger").unwrap(), Source::Ledger);
        assert_eq!(Source::from_str("card").unwrap(), Source::Card);
        assert!(Source::from_str("ofx").is_err());
    }

    #[test]
    fn validate_accepts_positive_past_dated() {
        let today = date(2025, 6, 1);
        let (valid, rejected) = validate_batch(vec![classified(500, date(2025, 5, 30))], today);
        assert_eq!(valid.len(), 1);
        assert!(rejected.is_empty());
    }

    #[test]
    fn validate_rejects_zero_amount() {
        let today = date(2025, 6, 1);
        let (valid, rejected) = validate_batch(vec![classified(0, date(2025, 5, 30))], today);
        assert!(valid.is_empty());
        assert_eq!(rejected.len(), 1);
        assert!(matches!(rejected[0].reason, ValidationError::NonPositiveAmount(_)));
    }

    #[test]
    fn validate_rejects_future_date() {
        let today = date(2025, 6, 1);
        let (valid, rejected) = validate_batch(vec![classified(500, date(2025, 6, 2))], today);
        assert!(valid.is_empty());
        assert!(matches!(rejected[0].reason, ValidationError::FutureDate(_)));
    }

    #[test]
    fn validate_partitions_mixed_batch() {
        let today = date(2025, 6, 1);
        let batch = vec![
            classified(500, date(2025, 5, 30)),
            classified(0, date(2025, 5, 30)),
            classified(700, date(2025, 1, 2)),
        ];
        let (valid, rejected) = validate_batch(batch, today);
        assert_eq!(valid.len(), 2);
        assert_eq!(rejected.len(), 1);
    }
}
