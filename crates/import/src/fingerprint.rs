use sha2::{Digest, Sha256};

use centime_core::{RawTransaction, SourceFields};

use crate::util::truncate_chars;

/// Build the deduplication fingerprint for a raw transaction: a lowercase-hex
/// SHA-256 of the canonical row string.
///
/// The canonical string is `date|amount|source|polarity|d1|d2` where the two
/// trailing fields disambiguate same-day same-amount rows: for ledger rows
/// the truncated primary description plus the transaction number, for card
/// rows the truncated sector plus truncated booking text. Two rows a human
/// would consider the same bank-reported event hash identically.
pub fn fingerprint(raw: &RawTransaction) -> String {
    let mut parts = vec![
        raw.date.format("%Y-%m-%d").to_string(),
        format!("{:.2}", raw.amount.as_decimal()),
        raw.source().as_str().to_string(),
        raw.polarity.token().to_string(),
    ];

    match &raw.fields {
        SourceFields::Ledger { description1, transaction_no, .. } => {
            parts.push(truncate_chars(description1.as_deref().unwrap_or(""), 50));
            parts.push(transaction_no.clone().unwrap_or_default());
        }
        SourceFields::Card { sector, booking_text } => {
            parts.push(truncate_chars(sector.as_deref().unwrap_or(""), 30));
            parts.push(truncate_chars(booking_text.as_deref().unwrap_or(""), 30));
        }
    }

    let canonical = parts.join("|");
    let hash: [u8; 32] = Sha256::digest(canonical.as_bytes()).into();
    hash.iter().map(|b| format!("{b:02x}")).collect()
}
