use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;

use crate::profile::TextEncoding;
use crate::ImportError;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Decode statement bytes to text per the profile's encoding.
pub fn decode_bytes(data: &[u8], encoding: TextEncoding) -> String {
    match encoding {
        TextEncoding::Utf8 => {
            let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);
            String::from_utf8_lossy(data).into_owned()
        }
        // Latin-1 maps each byte to the code point of the same value.
        TextEncoding::Latin1 => data.iter().map(|&b| b as char).collect(),
    }
}

/// Parse a date with the profile format first, then a small set of common
/// bank-export fallbacks.
pub fn parse_date(s: &str, format: &str) -> Result<NaiveDate, ImportError> {
    let s = s.trim();

    if let Ok(date) = NaiveDate::parse_from_str(s, format) {
        return Ok(date);
    }

    for fmt in &["%Y-%m-%d", "%d.%m.%Y", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(date);
        }
    }

    Err(ImportError::InvalidDate(s.to_string()))
}

/// Parse a statement amount into an exact decimal.
///
/// Tolerates accounting parentheses, currency symbols, apostrophe/comma
/// thousands separators and a decimal comma.
pub fn parse_amount(s: &str) -> Result<Decimal, ImportError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(ImportError::InvalidAmount(s.to_string()));
    }

    let (negative, s) = if s.starts_with('(') && s.ends_with(')') {
        (true, &s[1..s.len() - 1])
    } else {
        (false, s)
    };

    let mut cleaned = s.replace(['\'', '$', ' '], "").replace("chf", "");
    if cleaned.contains(',') {
        if cleaned.contains('.') {
            // 1,234.56: comma is a thousands separator.
            cleaned = cleaned.replace(',', "");
        } else {
            // 1234,56: comma is the decimal separator.
            cleaned = cleaned.replace(',', ".");
        }
    }

    let mut dec =
        Decimal::from_str(&cleaned).map_err(|_| ImportError::InvalidAmount(s.to_string()))?;
    if negative {
        dec = -dec;
    }
    Ok(dec)
}

/// Take the first `n` characters (not bytes; descriptions are not ASCII).
pub fn truncate_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

/// Header-name → column-index lookup over normalized (lower-cased, trimmed)
/// header names.
pub struct ColumnIndex(HashMap<String, usize>);

impl ColumnIndex {
    pub fn from_headers(headers: &csv::StringRecord) -> Self {
        ColumnIndex(
            headers
                .iter()
                .enumerate()
                .map(|(i, h)| (h.trim().to_lowercase(), i))
                .collect(),
        )
    }

    /// A trimmed, lower-cased field value; None when the column is absent or
    /// the field is empty.
    pub fn get(&self, record: &csv::StringRecord, column: &str) -> Option<String> {
        let idx = *self.0.get(&column.trim().to_lowercase())?;
        let value = record.get(idx)?.trim();
        if value.is_empty() {
            None
        } else {
            Some(value.to_lowercase())
        }
    }

    pub fn contains(&self, column: &str) -> bool {
        self.0.contains_key(&column.trim().to_lowercase())
    }
}
