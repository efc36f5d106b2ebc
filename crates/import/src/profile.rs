use serde::{Deserialize, Serialize};

use centime_core::Source;

use crate::ImportError;

/// Text encoding of a statement export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
    /// UTF-8, tolerating a leading byte-order mark.
    Utf8,
    Latin1,
}

/// Column names for the checking-account ledger export, matched against
/// normalized (lower-cased, trimmed) headers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerColumns {
    pub date: String,
    pub credit: String,
    pub debit: String,
    pub description1: String,
    pub description2: String,
    pub description3: String,
    pub transaction_no: String,
}

impl Default for LedgerColumns {
    fn default() -> Self {
        Self {
            date: "trade date".to_string(),
            credit: "credit".to_string(),
            debit: "debit".to_string(),
            description1: "description1".to_string(),
            description2: "description2".to_string(),
            description3: "description3".to_string(),
            transaction_no: "transaction no.".to_string(),
        }
    }
}

/// Format profile for checking-account ledger statements.
///
/// The statement file opens with a `key;value` metadata block (account and
/// period information) followed by the data table. All of this is
/// configuration, not code: banks change their export format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerProfile {
    pub delimiter: String,
    pub encoding: TextEncoding,
    /// Leading non-data rows before the column header.
    pub skip_rows: usize,
    /// How many of the leading rows form the metadata block.
    pub metadata_rows: usize,
    pub date_format: String,
    pub columns: LedgerColumns,
    /// Lower-cased filename substrings identifying this source.
    pub filename_tokens: Vec<String>,
}

impl Default for LedgerProfile {
    fn default() -> Self {
        Self {
            delimiter: ";".to_string(),
            encoding: TextEncoding::Utf8,
            skip_rows: 9,
            metadata_rows: 8,
            date_format: "%Y-%m-%d".to_string(),
            columns: LedgerColumns::default(),
            filename_tokens: vec!["ledger".to_string(), "account".to_string()],
        }
    }
}

/// Column names for the credit-card invoice export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceColumns {
    pub date: String,
    pub amount: String,
    pub credit: String,
    pub sector: String,
    pub booking_text: String,
}

impl Default for InvoiceColumns {
    fn default() -> Self {
        Self {
            date: "purchase date".to_string(),
            amount: "amount".to_string(),
            credit: "credit".to_string(),
            sector: "sector".to_string(),
            booking_text: "booking text".to_string(),
        }
    }
}

/// Format profile for credit-card invoice statements.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InvoiceProfile {
    pub delimiter: String,
    pub encoding: TextEncoding,
    /// Leading non-data rows (the `sep=;` hint line).
    pub skip_rows: usize,
    pub date_format: String,
    pub columns: InvoiceColumns,
    pub filename_tokens: Vec<String>,
}

impl Default for InvoiceProfile {
    fn default() -> Self {
        Self {
            delimiter: ";".to_string(),
            encoding: TextEncoding::Latin1,
            skip_rows: 1,
            date_format: "%d.%m.%Y".to_string(),
            columns: InvoiceColumns::default(),
            filename_tokens: vec!["card".to_string(), "invoice".to_string()],
        }
    }
}

/// Both statement profiles, TOML-loadable so a bank format change is a config
/// edit rather than a code edit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StatementProfiles {
    pub ledger: LedgerProfile,
    pub invoice: InvoiceProfile,
}

impl StatementProfiles {
    pub fn from_toml(content: &str) -> Result<Self, ImportError> {
        toml::from_str(content).map_err(|e| ImportError::InvalidProfile(e.to_string()))
    }

    /// Identify a statement's source from its filename, by token match.
    pub fn detect_source(&self, filename: &str) -> Option<Source> {
        let name = filename.to_lowercase();
        if self.ledger.filename_tokens.iter().any(|t| name.contains(t)) {
            Some(Source::Ledger)
        } else if self.invoice.filename_tokens.iter().any(|t| name.contains(t)) {
            Some(Source::Card)
        } else {
            None
        }
    }
}

pub(crate) fn delimiter_byte(delimiter: &str) -> u8 {
    delimiter.as_bytes().first().copied().unwrap_or(b';')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_known_exports() {
        let p = StatementProfiles::default();
        assert_eq!(p.ledger.skip_rows, 9);
        assert_eq!(p.ledger.metadata_rows, 8);
        assert_eq!(p.invoice.skip_rows, 1);
        assert_eq!(p.invoice.encoding, TextEncoding::Latin1);
    }

    #[test]
    fn detect_source_by_filename_token() {
        let p = StatementProfiles::default();
        assert_eq!(p.detect_source("2025-03_account_export.csv"), Some(Source::Ledger));
        assert_eq!(p.detect_source("CARD_invoice_march.csv"), Some(Source::Card));
        assert_eq!(p.detect_source("notes.csv"), None);
    }

    #[test]
    fn from_toml_overrides_defaults() {
        let toml = r#"
            [ledger]
            skip_rows = 4
            metadata_rows = 3

            [invoice]
            delimiter = ","
            encoding = "utf8"
        "#;
        let p = StatementProfiles::from_toml(toml).unwrap();
        assert_eq!(p.ledger.skip_rows, 4);
        assert_eq!(p.invoice.encoding, TextEncoding::Utf8);
        // Untouched fields keep defaults.
        assert_eq!(p.ledger.columns.date, "trade date");
    }

    #[test]
    fn from_toml_rejects_garbage() {
        assert!(StatementProfiles::from_toml("ledger = 3").is_err());
    }
}
