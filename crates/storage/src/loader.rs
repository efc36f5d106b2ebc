use chrono::{Datelike, NaiveDateTime};
use rust_decimal::Decimal;
use sqlx::SqliteConnection;
use std::collections::HashSet;
use std::str::FromStr;

use centime_core::{ClassifiedTransaction, Money, Source, TxnKind};

use crate::db::DbPool;
use crate::StorageError;

/// Per-batch load statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub total: usize,
    pub inserted: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// Outcome of marking a file processed. Re-marking is expected during forced
/// re-runs, so it is a variant rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    Marked,
    AlreadyMarked,
}

#[derive(Debug, Clone)]
pub struct ProcessedFile {
    pub id: i64,
    pub owner_id: i64,
    pub filename: String,
    pub source: Source,
    pub record_count: i64,
    pub processed_at: Option<NaiveDateTime>,
}

/// Load a classified batch for one owner inside a single transaction:
/// commit once at the end, roll back entirely on infrastructure failure.
pub async fn load(
    pool: &DbPool,
    owner_id: i64,
    transactions: &[ClassifiedTransaction],
) -> Result<LoadStats, StorageError> {
    let mut tx = pool.begin().await?;
    let stats = load_with(tx.as_mut(), owner_id, transactions).await?;
    tx.commit().await?;
    Ok(stats)
}

/// Load within a caller-owned connection/transaction, so callers can combine
/// the load with other writes atomically.
///
/// The owner's existing fingerprint set is read once; freshly inserted
/// fingerprints are added to it so within-batch duplicates are skipped, not
/// just cross-run ones. A single-row insert failure is counted and does not
/// abort the batch.
pub async fn load_with(
    conn: &mut SqliteConnection,
    owner_id: i64,
    transactions: &[ClassifiedTransaction],
) -> Result<LoadStats, StorageError> {
    let mut existing = existing_fingerprints(&mut *conn, owner_id).await?;

    let mut stats = LoadStats { total: transactions.len(), ..Default::default() };

    for tx in transactions {
        if existing.contains(&tx.fingerprint) {
            stats.skipped += 1;
            continue;
        }

        match insert_transaction(&mut *conn, owner_id, tx).await {
            Ok(()) => {
                existing.insert(tx.fingerprint.clone());
                stats.inserted += 1;
            }
            Err(e) => {
                tracing::error!(fingerprint = %tx.fingerprint, "failed to insert transaction: {e}");
                stats.errors += 1;
            }
        }
    }

    tracing::info!(
        inserted = stats.inserted,
        skipped = stats.skipped,
        errors = stats.errors,
        "loaded transaction batch"
    );
    Ok(stats)
}

/// The owner's full fingerprint set, read once per batch for deduplication.
pub async fn existing_fingerprints(
    conn: &mut SqliteConnection,
    owner_id: i64,
) -> Result<HashSet<String>, StorageError> {
    let rows: Vec<String> =
        sqlx::query_scalar("SELECT fingerprint FROM transactions WHERE owner_id = ?")
            .bind(owner_id)
            .fetch_all(conn)
            .await?;
    Ok(rows.into_iter().collect())
}

async fn insert_transaction(
    conn: &mut SqliteConnection,
    owner_id: i64,
    tx: &ClassifiedTransaction,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO transactions
         (owner_id, date, kind, category, amount, polarity, description, source, month, year, source_file, fingerprint)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(owner_id)
    .bind(tx.date.format("%Y-%m-%d").to_string())
    .bind(tx.kind.as_str())
    .bind(&tx.category)
    .bind(tx.amount.to_string())
    .bind(tx.polarity.token())
    .bind(&tx.description)
    .bind(tx.source.as_str())
    .bind(tx.date.month() as i64)
    .bind(tx.date.year())
    .bind(&tx.source_file)
    .bind(&tx.fingerprint)
    .execute(conn)
    .await
    .map(|_| ())
}

// ── Processed-file markers ────────────────────────────────────────────────────

pub async fn is_processed(
    pool: &DbPool,
    owner_id: i64,
    filename: &str,
) -> Result<bool, StorageError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM processed_files WHERE owner_id = ? AND filename = ?",
    )
    .bind(owner_id)
    .bind(filename)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

/// Mark a file as fully ingested. Idempotent: a unique-constraint violation
/// on re-marking is the expected `AlreadyMarked` outcome, never an error.
pub async fn mark_processed(
    pool: &DbPool,
    owner_id: i64,
    filename: &str,
    source: Source,
    record_count: i64,
) -> Result<MarkOutcome, StorageError> {
    let result = sqlx::query(
        "INSERT INTO processed_files (owner_id, filename, source, record_count)
         VALUES (?, ?, ?, ?)",
    )
    .bind(owner_id)
    .bind(filename)
    .bind(source.as_str())
    .bind(record_count)
    .execute(pool)
    .await;

    match result {
        Ok(_) => {
            tracing::info!(filename, record_count, "marked file processed");
            Ok(MarkOutcome::Marked)
        }
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            tracing::warn!(filename, "file already marked processed");
            Ok(MarkOutcome::AlreadyMarked)
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn processed_files(
    pool: &DbPool,
    owner_id: i64,
) -> Result<Vec<ProcessedFile>, StorageError> {
    let rows = sqlx::query_as::<_, (i64, i64, String, String, i64, String)>(
        "SELECT id, owner_id, filename, source, record_count, processed_at
         FROM processed_files WHERE owner_id = ? ORDER BY processed_at",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(id, owner_id, filename, source, record_count, processed_at)| {
            let source = Source::from_str(&source)
                .map_err(|e| StorageError::Corrupt(format!("processed file {filename}: {e}")))?;
            Ok(ProcessedFile {
                id,
                owner_id,
                filename,
                source,
                record_count,
                processed_at: NaiveDateTime::parse_from_str(&processed_at, "%Y-%m-%d %H:%M:%S")
                    .ok(),
            })
        })
        .collect()
}

// ── Reclassification support ──────────────────────────────────────────────────

/// (id, description, magnitude) for every persisted transaction of an owner;
/// feeds the bulk "re-apply rules" operation.
pub async fn transactions_for_reclassify(
    pool: &DbPool,
    owner_id: i64,
) -> Result<Vec<(i64, String, Money)>, StorageError> {
    let rows = sqlx::query_as::<_, (i64, Option<String>, String)>(
        "SELECT id, description, amount FROM transactions WHERE owner_id = ?",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(id, description, amount)| {
            let amount = Decimal::from_str(&amount)
                .map_err(|_| StorageError::Corrupt(format!("transaction {id} amount: {amount}")))?;
            Ok((id, description.unwrap_or_default(), Money::from_decimal(amount)))
        })
        .collect()
}

pub async fn update_classification(
    pool: &DbPool,
    transaction_id: i64,
    kind: TxnKind,
    category: &str,
) -> Result<(), StorageError> {
    sqlx::query("UPDATE transactions SET kind = ?, category = ? WHERE id = ?")
        .bind(kind.as_str())
        .bind(category)
        .bind(transaction_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// (kind, amount) rows for a period; callers fold these into exact totals
/// instead of relying on SQLite's lossy numeric coercion of TEXT amounts.
pub async fn amounts_by_kind(
    pool: &DbPool,
    owner_id: i64,
    year: i32,
    month: Option<u8>,
) -> Result<Vec<(TxnKind, Money)>, StorageError> {
    let rows: Vec<(String, String)> = match month {
        Some(m) => {
            sqlx::query_as(
                "SELECT kind, amount FROM transactions
                 WHERE owner_id = ? AND year = ? AND month = ?",
            )
            .bind(owner_id)
            .bind(year)
            .bind(m as i64)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as("SELECT kind, amount FROM transactions WHERE owner_id = ? AND year = ?")
                .bind(owner_id)
                .bind(year)
                .fetch_all(pool)
                .await?
        }
    };

    let mut out = Vec::with_capacity(rows.len());
    for (kind, amount) in rows {
        let kind = TxnKind::from_str(&kind)
            .map_err(|e| StorageError::Corrupt(format!("transaction kind: {e}")))?;
        let amount = Decimal::from_str(&amount)
            .map_err(|_| StorageError::Corrupt(format!("transaction amount: {amount}")))?;
        out.push((kind, Money::from_decimal(amount)));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use centime_core::Polarity;
    use chrono::NaiveDate;

    fn classified(fingerprint: &str, cents: i64) -> ClassifiedTransaction {
        ClassifiedTransaction {
            date: NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(),
            kind: TxnKind::Expenses,
            category: "Groceries".to_string(),
            amount: Money::from_cents(cents),
            polarity: Polarity::Debit,
            description: "coop genf".to_string(),
            source: Source::Ledger,
            source_file: Some("ledger_jan.csv".to_string()),
            fingerprint: fingerprint.to_string(),
        }
    }

    #[tokio::test]
    async fn load_inserts_and_counts() {
        let (_dir, pool) = test_db().await;
        let stats = load(&pool, 1, &[classified("fp-1", 100), classified("fp-2", 200)])
            .await
            .unwrap();
        assert_eq!(stats, LoadStats { total: 2, inserted: 2, skipped: 0, errors: 0 });
    }

    #[tokio::test]
    async fn load_skips_within_batch_duplicates() {
        let (_dir, pool) = test_db().await;
        let stats = load(&pool, 1, &[classified("fp-1", 100), classified("fp-1", 100)])
            .await
            .unwrap();
        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.skipped, 1);
    }

    #[tokio::test]
    async fn load_skips_cross_run_duplicates() {
        let (_dir, pool) = test_db().await;
        load(&pool, 1, &[classified("fp-1", 100)]).await.unwrap();
        let stats = load(&pool, 1, &[classified("fp-1", 100), classified("fp-2", 200)])
            .await
            .unwrap();
        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.skipped, 1);
    }

    #[tokio::test]
    async fn single_row_failure_does_not_abort_the_batch() {
        let (_dir, pool) = test_db().await;
        // Make one specific row's insert fail at the database level; the
        // surrounding rows must still load.
        sqlx::query(
            "CREATE TRIGGER reject_one_fingerprint BEFORE INSERT ON transactions
             WHEN NEW.fingerprint = 'fp-2'
             BEGIN SELECT RAISE(ABORT, 'rejected by trigger'); END",
        )
        .execute(&pool)
        .await
        .unwrap();

        let batch =
            [classified("fp-1", 100), classified("fp-2", 200), classified("fp-3", 300)];
        let stats = load(&pool, 1, &batch).await.unwrap();
        assert_eq!(stats, LoadStats { total: 3, inserted: 2, skipped: 0, errors: 1 });

        let persisted: Vec<String> =
            sqlx::query_scalar("SELECT fingerprint FROM transactions WHERE owner_id = 1")
                .fetch_all(&pool)
                .await
                .unwrap();
        assert_eq!(persisted, vec!["fp-1".to_string(), "fp-3".to_string()]);
    }

    #[tokio::test]
    async fn dedupe_is_scoped_per_owner() {
        let (_dir, pool) = test_db().await;
        load(&pool, 1, &[classified("fp-1", 100)]).await.unwrap();
        let stats = load(&pool, 2, &[classified("fp-1", 100)]).await.unwrap();
        assert_eq!(stats.inserted, 1);
    }

    #[tokio::test]
    async fn marker_round_trip_and_idempotence() {
        let (_dir, pool) = test_db().await;
        assert!(!is_processed(&pool, 1, "jan.csv").await.unwrap());

        let first = mark_processed(&pool, 1, "jan.csv", Source::Ledger, 10).await.unwrap();
        assert_eq!(first, MarkOutcome::Marked);
        assert!(is_processed(&pool, 1, "jan.csv").await.unwrap());

        let second = mark_processed(&pool, 1, "jan.csv", Source::Ledger, 10).await.unwrap();
        assert_eq!(second, MarkOutcome::AlreadyMarked);

        let files = processed_files(&pool, 1).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filename, "jan.csv");
        assert_eq!(files[0].source, Source::Ledger);
    }

    #[tokio::test]
    async fn markers_are_scoped_per_owner() {
        let (_dir, pool) = test_db().await;
        mark_processed(&pool, 1, "jan.csv", Source::Card, 5).await.unwrap();
        assert!(!is_processed(&pool, 2, "jan.csv").await.unwrap());
    }

    #[tokio::test]
    async fn reclassify_round_trip() {
        let (_dir, pool) = test_db().await;
        load(&pool, 1, &[classified("fp-1", 5430)]).await.unwrap();

        let rows = transactions_for_reclassify(&pool, 1).await.unwrap();
        assert_eq!(rows.len(), 1);
        let (id, description, amount) = &rows[0];
        assert_eq!(description, "coop genf");
        assert_eq!(*amount, Money::from_cents(5430));

        update_classification(&pool, *id, TxnKind::Savings, "Emergency Fund").await.unwrap();
        let kinds = amounts_by_kind(&pool, 1, 2025, Some(1)).await.unwrap();
        assert_eq!(kinds, vec![(TxnKind::Savings, Money::from_cents(5430))]);
    }

    #[tokio::test]
    async fn amounts_by_kind_filters_period() {
        let (_dir, pool) = test_db().await;
        load(&pool, 1, &[classified("fp-1", 100)]).await.unwrap();
        assert!(amounts_by_kind(&pool, 1, 2025, Some(2)).await.unwrap().is_empty());
        assert!(amounts_by_kind(&pool, 1, 2024, None).await.unwrap().is_empty());
        assert_eq!(amounts_by_kind(&pool, 1, 2025, None).await.unwrap().len(), 1);
    }
}
