use rust_decimal::Decimal;
use sqlx::SqliteConnection;
use std::collections::HashMap;
use std::str::FromStr;

use centime_core::{BudgetEntry, Money, TxnKind};

use crate::db::DbPool;
use crate::StorageError;

/// Create or update a budget entry and reconcile the complementary
/// granularity. The whole operation runs in one transaction: callers never
/// observe a partial fan-out (e.g. 8 of 12 months updated).
///
/// - Yearly entry (no month): after the upsert, all 12 monthly rows are
///   unconditionally overwritten with `amount / 12`.
/// - Monthly entry: after the upsert, iff all 12 months now exist for the
///   (owner, year, kind, category), the yearly row is upserted to their exact
///   sum; with fewer than 12 months the yearly row is left untouched.
///
/// `auto_populate = false` upserts only the entry itself.
pub async fn upsert_budget(
    pool: &DbPool,
    entry: &BudgetEntry,
    auto_populate: bool,
) -> Result<BudgetEntry, StorageError> {
    if let Some(m) = entry.month {
        if !(1..=12).contains(&m) {
            return Err(StorageError::InvalidMonth(m));
        }
    }

    let mut tx = pool.begin().await?;
    let saved = upsert_row(tx.as_mut(), entry).await?;

    if auto_populate {
        match entry.month {
            None => {
                let monthly_amount = entry.amount.split_monthly();
                for month in 1..=12u8 {
                    let monthly = BudgetEntry {
                        id: None,
                        month: Some(month),
                        amount: monthly_amount,
                        ..entry.clone()
                    };
                    upsert_row(tx.as_mut(), &monthly).await?;
                }
                tracing::info!(
                    year = entry.year,
                    category = %entry.category,
                    "propagated yearly budget to 12 monthly entries"
                );
            }
            Some(_) => {
                let monthly_amounts: Vec<String> = sqlx::query_scalar(
                    "SELECT amount FROM budget_plans
                     WHERE owner_id = ? AND year = ? AND kind = ? AND category = ?
                       AND month IS NOT NULL",
                )
                .bind(entry.owner_id)
                .bind(entry.year)
                .bind(entry.kind.as_str())
                .bind(&entry.category)
                .fetch_all(tx.as_mut())
                .await?;

                if monthly_amounts.len() == 12 {
                    let mut total = Money::zero();
                    for amount in &monthly_amounts {
                        total = total + parse_amount(amount)?;
                    }
                    let yearly =
                        BudgetEntry { id: None, month: None, amount: total, ..entry.clone() };
                    upsert_row(tx.as_mut(), &yearly).await?;
                    tracing::info!(
                        year = entry.year,
                        category = %entry.category,
                        total = %total,
                        "all 12 months present, updated yearly budget"
                    );
                }
            }
        }
    }

    tx.commit().await?;
    Ok(saved)
}

/// Select-then-write upsert keyed on (owner, year, month-or-null, kind,
/// category). SQLite UNIQUE indexes treat NULL months as distinct, so
/// uniqueness of the yearly row is enforced here rather than by constraint.
async fn upsert_row(
    conn: &mut SqliteConnection,
    entry: &BudgetEntry,
) -> Result<BudgetEntry, StorageError> {
    let existing: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM budget_plans
         WHERE owner_id = ? AND year = ? AND month IS ? AND kind = ? AND category = ?",
    )
    .bind(entry.owner_id)
    .bind(entry.year)
    .bind(entry.month.map(|m| m as i64))
    .bind(entry.kind.as_str())
    .bind(&entry.category)
    .fetch_optional(&mut *conn)
    .await?;

    let id = match existing {
        Some(id) => {
            sqlx::query(
                "UPDATE budget_plans SET amount = ?, updated_at = datetime('now') WHERE id = ?",
            )
            .bind(entry.amount.to_string())
            .bind(id)
            .execute(&mut *conn)
            .await?;
            id
        }
        None => {
            sqlx::query(
                "INSERT INTO budget_plans (owner_id, year, month, kind, category, amount)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(entry.owner_id)
            .bind(entry.year)
            .bind(entry.month.map(|m| m as i64))
            .bind(entry.kind.as_str())
            .bind(&entry.category)
            .bind(entry.amount.to_string())
            .execute(&mut *conn)
            .await?
            .last_insert_rowid()
        }
    };

    Ok(BudgetEntry { id: Some(id), ..entry.clone() })
}

/// Resolve the effective budget per (kind, category) for a reporting period.
///
/// Single month: the monthly row if present, else the yearly row divided by
/// 12, else no entry. Full year: the yearly row if present, even when
/// individually edited monthly rows diverge from yearly/12; else the sum of
/// whatever monthly rows exist.
pub async fn resolve_budget(
    pool: &DbPool,
    owner_id: i64,
    year: i32,
    month: Option<u8>,
) -> Result<HashMap<(TxnKind, String), Money>, StorageError> {
    let rows: Vec<(Option<i64>, String, String, String)> = match month {
        Some(m) => {
            sqlx::query_as(
                "SELECT month, kind, category, amount FROM budget_plans
                 WHERE owner_id = ? AND year = ? AND (month IS NULL OR month = ?)",
            )
            .bind(owner_id)
            .bind(year)
            .bind(m as i64)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as(
                "SELECT month, kind, category, amount FROM budget_plans
                 WHERE owner_id = ? AND year = ?",
            )
            .bind(owner_id)
            .bind(year)
            .fetch_all(pool)
            .await?
        }
    };

    let mut parsed = Vec::with_capacity(rows.len());
    for (row_month, kind, category, amount) in rows {
        let kind = match TxnKind::from_str(&kind) {
            Ok(k) => k,
            Err(e) => {
                tracing::warn!("skipping budget row with unparseable kind: {e}");
                continue;
            }
        };
        parsed.push((row_month, kind, category, parse_amount(&amount)?));
    }

    let mut resolved = HashMap::new();
    match month {
        Some(_) => {
            // Yearly fallback first, then monthly rows override it.
            for (row_month, kind, category, amount) in &parsed {
                if row_month.is_none() {
                    resolved.insert((*kind, category.clone()), amount.split_monthly());
                }
            }
            for (row_month, kind, category, amount) in parsed {
                if row_month.is_some() {
                    resolved.insert((kind, category), amount);
                }
            }
        }
        None => {
            let mut monthly_sums: HashMap<(TxnKind, String), Money> = HashMap::new();
            let mut yearly: HashMap<(TxnKind, String), Money> = HashMap::new();
            for (row_month, kind, category, amount) in parsed {
                let key = (kind, category);
                match row_month {
                    None => {
                        yearly.insert(key, amount);
                    }
                    Some(_) => {
                        let entry = monthly_sums.entry(key).or_insert_with(Money::zero);
                        *entry = *entry + amount;
                    }
                }
            }
            // A yearly row takes precedence over the monthly sum.
            resolved = monthly_sums;
            resolved.extend(yearly);
        }
    }

    Ok(resolved)
}

pub async fn get_budgets(
    pool: &DbPool,
    owner_id: i64,
    year: Option<i32>,
) -> Result<Vec<BudgetEntry>, StorageError> {
    let rows: Vec<(i64, i32, Option<i64>, String, String, String)> = match year {
        Some(y) => {
            sqlx::query_as(
                "SELECT id, year, month, kind, category, amount FROM budget_plans
                 WHERE owner_id = ? AND year = ?
                 ORDER BY year, month, kind, category",
            )
            .bind(owner_id)
            .bind(y)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as(
                "SELECT id, year, month, kind, category, amount FROM budget_plans
                 WHERE owner_id = ?
                 ORDER BY year, month, kind, category",
            )
            .bind(owner_id)
            .fetch_all(pool)
            .await?
        }
    };

    let mut entries = Vec::with_capacity(rows.len());
    for (id, year, month, kind, category, amount) in rows {
        let kind = match TxnKind::from_str(&kind) {
            Ok(k) => k,
            Err(e) => {
                tracing::warn!(budget_id = id, "skipping budget row with unparseable kind: {e}");
                continue;
            }
        };
        entries.push(BudgetEntry {
            id: Some(id),
            owner_id,
            year,
            month: month.map(|m| m as u8),
            kind,
            category,
            amount: parse_amount(&amount)?,
        });
    }
    Ok(entries)
}

pub async fn delete_budget(pool: &DbPool, owner_id: i64, id: i64) -> Result<bool, StorageError> {
    let result = sqlx::query("DELETE FROM budget_plans WHERE id = ? AND owner_id = ?")
        .bind(id)
        .bind(owner_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

fn parse_amount(s: &str) -> Result<Money, StorageError> {
    Decimal::from_str(s)
        .map(Money::from_decimal)
        .map_err(|_| StorageError::Corrupt(format!("budget amount: {s}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;

    fn yearly(cents: i64) -> BudgetEntry {
        BudgetEntry::yearly(1, 2025, TxnKind::Expenses, "Rent", Money::from_cents(cents))
    }

    fn monthly(month: u8, cents: i64) -> BudgetEntry {
        BudgetEntry::monthly(1, 2025, month, TxnKind::Savings, "Emergency Fund", Money::from_cents(cents))
    }

    #[tokio::test]
    async fn yearly_fan_out_creates_12_monthly_entries() {
        let (_dir, pool) = test_db().await;
        upsert_budget(&pool, &yearly(120_000), true).await.unwrap();

        let entries = get_budgets(&pool, 1, Some(2025)).await.unwrap();
        assert_eq!(entries.len(), 13);
        let monthly: Vec<_> = entries.iter().filter(|e| e.month.is_some()).collect();
        assert_eq!(monthly.len(), 12);
        assert!(monthly.iter().all(|e| e.amount == Money::from_cents(10_000)));
    }

    #[tokio::test]
    async fn yearly_update_overwrites_all_monthly_entries() {
        let (_dir, pool) = test_db().await;
        upsert_budget(&pool, &yearly(120_000), true).await.unwrap();
        upsert_budget(&pool, &yearly(240_000), true).await.unwrap();

        let entries = get_budgets(&pool, 1, Some(2025)).await.unwrap();
        // Still 13 rows: the select-then-write upsert never duplicates.
        assert_eq!(entries.len(), 13);
        for e in entries {
            match e.month {
                None => assert_eq!(e.amount, Money::from_cents(240_000)),
                Some(_) => assert_eq!(e.amount, Money::from_cents(20_000)),
            }
        }
    }

    #[tokio::test]
    async fn monthly_fan_in_requires_all_12_months() {
        let (_dir, pool) = test_db().await;
        for m in 1..=11 {
            upsert_budget(&pool, &monthly(m, 5_000), true).await.unwrap();
        }
        let entries = get_budgets(&pool, 1, Some(2025)).await.unwrap();
        assert!(entries.iter().all(|e| e.month.is_some()), "no yearly row with 11 months");

        upsert_budget(&pool, &monthly(12, 5_000), true).await.unwrap();
        let entries = get_budgets(&pool, 1, Some(2025)).await.unwrap();
        let yearly_row = entries.iter().find(|e| e.month.is_none()).expect("yearly row");
        assert_eq!(yearly_row.amount, Money::from_cents(60_000));
    }

    #[tokio::test]
    async fn no_auto_populate_upserts_only_the_entry() {
        let (_dir, pool) = test_db().await;
        upsert_budget(&pool, &yearly(120_000), false).await.unwrap();
        assert_eq!(get_budgets(&pool, 1, Some(2025)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_month_is_rejected() {
        let (_dir, pool) = test_db().await;
        let bad = BudgetEntry::monthly(1, 2025, 13, TxnKind::Expenses, "Rent", Money::zero());
        assert!(matches!(
            upsert_budget(&pool, &bad, true).await,
            Err(StorageError::InvalidMonth(13))
        ));
    }

    #[tokio::test]
    async fn monthly_resolution_prefers_monthly_row() {
        let (_dir, pool) = test_db().await;
        upsert_budget(&pool, &yearly(120_000), false).await.unwrap();
        let march =
            BudgetEntry::monthly(1, 2025, 3, TxnKind::Expenses, "Rent", Money::from_cents(15_000));
        upsert_budget(&pool, &march, false).await.unwrap();

        let key = (TxnKind::Expenses, "Rent".to_string());

        // March has its own row.
        let march_view = resolve_budget(&pool, 1, 2025, Some(3)).await.unwrap();
        assert_eq!(march_view[&key], Money::from_cents(15_000));

        // April falls back to yearly / 12.
        let april_view = resolve_budget(&pool, 1, 2025, Some(4)).await.unwrap();
        assert_eq!(april_view[&key], Money::from_cents(10_000));
    }

    #[tokio::test]
    async fn yearly_resolution_prefers_yearly_row() {
        let (_dir, pool) = test_db().await;
        upsert_budget(&pool, &yearly(120_000), false).await.unwrap();
        // A diverging monthly edit does not change the full-year figure.
        let march =
            BudgetEntry::monthly(1, 2025, 3, TxnKind::Expenses, "Rent", Money::from_cents(15_000));
        upsert_budget(&pool, &march, false).await.unwrap();

        let year_view = resolve_budget(&pool, 1, 2025, None).await.unwrap();
        assert_eq!(year_view[&(TxnKind::Expenses, "Rent".to_string())], Money::from_cents(120_000));
    }

    #[tokio::test]
    async fn yearly_resolution_sums_monthlies_when_yearly_absent() {
        let (_dir, pool) = test_db().await;
        upsert_budget(&pool, &monthly(1, 5_000), false).await.unwrap();
        upsert_budget(&pool, &monthly(2, 7_000), false).await.unwrap();

        let year_view = resolve_budget(&pool, 1, 2025, None).await.unwrap();
        assert_eq!(
            year_view[&(TxnKind::Savings, "Emergency Fund".to_string())],
            Money::from_cents(12_000)
        );
    }

    #[tokio::test]
    async fn resolution_empty_when_no_rows() {
        let (_dir, pool) = test_db().await;
        assert!(resolve_budget(&pool, 1, 2025, Some(1)).await.unwrap().is_empty());
        assert!(resolve_budget(&pool, 1, 2025, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn budgets_are_scoped_per_owner() {
        let (_dir, pool) = test_db().await;
        upsert_budget(&pool, &yearly(120_000), true).await.unwrap();
        assert!(get_budgets(&pool, 2, Some(2025)).await.unwrap().is_empty());
        assert!(resolve_budget(&pool, 2, 2025, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_budget_by_id() {
        let (_dir, pool) = test_db().await;
        let saved = upsert_budget(&pool, &yearly(120_000), false).await.unwrap();
        assert!(delete_budget(&pool, 1, saved.id.unwrap()).await.unwrap());
        assert!(!delete_budget(&pool, 1, saved.id.unwrap()).await.unwrap());
    }
}
