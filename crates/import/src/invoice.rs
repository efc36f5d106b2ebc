use std::path::Path;

use centime_core::{Money, Polarity, RawTransaction, SourceFields};
use rust_decimal::Decimal;

use crate::profile::{delimiter_byte, InvoiceProfile};
use crate::util::{decode_bytes, parse_amount, parse_date, ColumnIndex};
use crate::ImportError;

/// Extraction result for a credit-card invoice file.
#[derive(Debug)]
pub struct InvoiceStatement {
    pub transactions: Vec<RawTransaction>,
    /// Rows dropped for a missing date or a zero resulting amount.
    pub skipped_rows: usize,
}

pub fn extract(path: &Path, profile: &InvoiceProfile) -> Result<InvoiceStatement, ImportError> {
    let bytes = std::fs::read(path)?;
    extract_from_bytes(&bytes, profile)
}

pub fn extract_from_bytes(
    data: &[u8],
    profile: &InvoiceProfile,
) -> Result<InvoiceStatement, ImportError> {
    let text = decode_bytes(data, profile.encoding);

    // Skip the leading `sep=;` hint row(s) before the header.
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
        tracing::warn!(skipped_rows, "invoice extraction dropped unusable rows");
    }

    Ok(InvoiceStatement { transactions, skipped_rows })
}

fn parse_row(
    record: &csv::StringRecord,
    columns: &ColumnIndex,
    profile: &InvoiceProfile,
) -> Option<RawTransaction> {
    let cols = &profile.columns;

    let date_field = columns.get(record, &cols.date)?;
    let date = parse_date(&date_field, &profile.date_format).ok()?;

    let credit = columns.get(record, &cols.credit).and_then(|v| parse_amount(&v).ok());
    let charge = columns.get(record, &cols.amount).and_then(|v| parse_amount(&v).ok());

    // A positive credit marks a card payment or refund; otherwise the
    // (possibly signed) amount column is an expense magnitude.
    let (amount, polarity) = match credit {
        Some(c) if c > Decimal::ZERO => (c, Polarity::Credit),
        _ => (charge.unwrap_or(Decimal::ZERO).abs(), Polarity::Debit),
    };
    if amount.is_zero() {
        return None;
    }

    let sector = columns.get(record, &cols.sector);
    let booking_text = columns.get(record, &cols.booking_text);

    let description = format!(
        "{} - {}",
        sector.as_deref().unwrap_or(""),
        booking_text.as_deref().unwrap_or("")
    )
    .trim_matches(|c| c == ' ' || c == '-')
    .to_string();

    Some(RawTransaction {
        date,
        amount: Money::from_decimal(amount),
        polarity,
        description,
        fields: SourceFields::Card { sector, booking_text },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use centime_core::Source;
    use chrono::NaiveDate;

    const FIXTURE: &str = "\
sep=;
Account number;Card number;Purchase date;Booking text;Sector;Amount;Original currency;Rate;Currency;Debit;Credit
0123;4567;05.01.2025;MIGROS GENEVE;Grocery stores;54.30;;;CHF;54.30;
0123;4567;08.01.2025;NETFLIX.COM;Digital goods;15.99;;;CHF;15.99;
0123;4567;15.01.2025;VOTRE PAIEMENT QR;;;;;CHF;;850.00
0123;4567;18.01.2025;PENDING AUTH;;0.00;;;CHF;;
0123;4567;;NO DATE ROW;Restaurants;12.00;;;CHF;12.00;
";

    fn extract_fixture() -> InvoiceStatement {
        extract_from_bytes(FIXTURE.as_bytes(), &InvoiceProfile::default()).unwrap()
    }

    #[test]
    fn charges_are_debit_polarity() {
        let stmt = extract_fixture();
        let charge = &stmt.transactions[0];
        assert_eq!(charge.polarity, Polarity::Debit);
        assert_eq!(charge.amount, Money::from_cents(5_430));
        assert_eq!(charge.date, NaiveDate::from_ymd_opt(2025, 1, 5).unwrap());
        assert_eq!(charge.source(), Source::Card);
    }

    #[test]
    fn positive_credit_is_card_refund_polarity() {
        let stmt = extract_fixture();
        let payment = &stmt.transactions[2];
        assert_eq!(payment.polarity, Polarity::Credit);
        assert_eq!(payment.amount, Money::from_cents(85_000));
    }

    #[test]
    fn zero_amount_and_dateless_rows_are_dropped() {
        let stmt = extract_fixture();
        assert_eq!(stmt.transactions.len(), 3);
        assert_eq!(stmt.skipped_rows, 2);
    }

    #[test]
    fn description_is_sector_dash_booking_text() {
        let stmt = extract_fixture();
        assert_eq!(stmt.transactions[0].description, "grocery stores - migros geneve");
        // Missing sector leaves no dangling separator.
        assert_eq!(stmt.transactions[2].description, "votre paiement qr");
    }

    #[test]
    fn card_fields_retained_for_hashing() {
        let stmt = extract_fixture();
        match &stmt.transactions[1].fields {
            SourceFields::Card { sector, booking_text } => {
                assert_eq!(sector.as_deref(), Some("digital goods"));
                assert_eq!(booking_text.as_deref(), Some("netflix.com"));
            }
            _ => panic!("expected card fields"),
        }
    }

    #[test]
    fn latin1_booking_text_decodes() {
        let mut data: Vec<u8> = b"sep=;\nPurchase date;Booking text;Sector;Amount;Credit\n05.01.2025;CAF".to_vec();
        data.push(0xC9); // É in Latin-1
        data.extend_from_slice(b" DU SOLEIL;Restaurants;9.50;\n");
        let stmt = extract_from_bytes(&data, &InvoiceProfile::default()).unwrap();
        assert_eq!(stmt.transactions[0].description, "restaurants - café du soleil");
    }
}
