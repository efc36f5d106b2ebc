use std::path::Path;

use centime_core::{Money, Polarity, RawTransaction, SourceFields};
use rust_decimal::Decimal;

use crate::profile::{delimiter_byte, LedgerProfile};
use crate::util::{decode_bytes, parse_amount, parse_date, ColumnIndex};
use crate::ImportError;

/// Account metadata from the statement's leading `key;value` block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerMetadata {
    pub account_number: Option<String>,
    pub iban: Option<String>,
    pub period_from: Option<String>,
    pub period_until: Option<String>,
    pub opening_balance: Option<Decimal>,
    pub closing_balance: Option<Decimal>,
    pub transaction_count: Option<i64>,
}

/// Extraction result: header metadata plus the ordered normalized rows.
#[derive(Debug)]
pub struct LedgerStatement {
    pub metadata: LedgerMetadata,
    pub transactions: Vec<RawTransaction>,
    /// Rows dropped for a missing date or no usable credit/debit value.
    pub skipped_rows: usize,
}

pub fn extract(path: &Path, profile: &LedgerProfile) -> Result<LedgerStatement, ImportError> {
    let bytes = std::fs::read(path)?;
    extract_from_bytes(&bytes, profile)
}

pub fn extract_from_bytes(
    data: &[u8],
    profile: &LedgerProfile,
) -> Result<LedgerStatement, ImportError> {
    let text = decode_bytes(data, profile.encoding);
    let metadata = parse_metadata(&text, profile);

    // The data table starts after the leading non-data rows.
    let table: String = text
        .lines()
        .skip(profile.skip_rows)
        .collect::<Vec<_>>()
        .join("\n");

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter_byte(&profile.delimiter))
        .has_headers(true)
        .flexible(true)
        .from_reader(table.as_bytes());

    let columns = ColumnIndex::from_headers(reader.headers()?);
    if !columns.contains(&profile.columns.date) {
        return Err(ImportError::MissingColumn(profile.columns.date.clone()));
    }

    let mut transactions = Vec::new();
    let mut skipped_rows = 0;

    for result in reader.records() {
        let record = result?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        match parse_row(&record, &columns, profile) {
            Some(tx) => transactions.push(tx),
            None => skipped_rows += 1,
        }
    }

    if skipped_rows > 0 {
        tracing::warn!(skipped_rows, "ledger extraction dropped unusable rows");
    }

    Ok(LedgerStatement { metadata, transactions, skipped_rows })
}

fn parse_row(
    record: &csv::StringRecord,
    columns: &ColumnIndex,
    profile: &LedgerProfile,
) -> Option<RawTransaction> {
    let cols = &profile.columns;

    let date_field = columns.get(record, &cols.date)?;
    let date = parse_date(&date_field, &profile.date_format).ok()?;

    let credit = columns.get(record, &cols.credit).and_then(|v| parse_amount(&v).ok());
    let debit = columns.get(record, &cols.debit).and_then(|v| parse_amount(&v).ok());

    // A positive credit is income-polarity; a negative debit is
    // expense-polarity. Anything else has no usable amount.
    let (amount, polarity) = match (credit, debit) {
        (Some(c), _) if c > Decimal::ZERO => (c, Polarity::Credit),
        (_, Some(d)) if d < Decimal::ZERO => (d.abs(), Polarity::Debit),
        _ => return None,
    };

    let description1 = columns.get(record, &cols.description1);
    let description2 = columns.get(record, &cols.description2);
    let description3 = columns.get(record, &cols.description3);
    let transaction_no = columns.get(record, &cols.transaction_no);

    let description = [&description1, &description2, &description3]
        .iter()
        .filter_map(|d| d.as_deref())
        .collect::<Vec<_>>()
        .join(" | ");

    Some(RawTransaction {
        date,
        amount: Money::from_decimal(amount),
        polarity,
        description,
        fields: SourceFields::Ledger {
            description1,
            description2,
            description3,
            transaction_no,
        },
    })
}

/// Parse the metadata block. A malformed header degrades to an empty
/// metadata struct with a warning; it never fails extraction.
fn parse_metadata(text: &str, profile: &LedgerProfile) -> LedgerMetadata {
    let delim = delimiter_byte(&profile.delimiter) as char;
    let mut meta = LedgerMetadata::default();
    let mut seen_any = false;

    for line in text.lines().take(profile.metadata_rows) {
        let Some((key, value)) = line.split_once(delim) else {
            continue;
        };
        let key = key.trim().trim_end_matches(':').trim().to_lowercase();
        let value = value.trim().trim_matches(delim).trim();
        if value.is_empty() {
            continue;
        }
        seen_any = true;

        match key.as_str() {
            "account number" => meta.account_number = Some(value.to_string()),
            "iban" => meta.iban = Some(value.to_string()),
            "from" => meta.period_from = Some(value.to_string()),
            "until" => meta.period_until = Some(value.to_string()),
            "opening balance" => meta.opening_balance = parse_amount(value).ok(),
            "closing balance" => meta.closing_balance = parse_amount(value).ok(),
            "numbers of transactions in this period" => {
                meta.transaction_count = value.parse().ok();
            }
            _ => {}
        }
    }

    if !seen_any {
        tracing::warn!("could not extract ledger statement metadata");
    }
    meta
}
