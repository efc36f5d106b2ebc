use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use std::str::FromStr;

use centime_core::{AmountOp, CategorizationRule, TxnKind};

use crate::db::DbPool;
use crate::StorageError;

/// Fetch categorization rules in evaluation order: priority descending, then
/// creation time descending (id descending as the stable recency tiebreak
/// within one timestamp second).
///
/// Rows whose stored kind or operator no longer parses are skipped with a
/// warning rather than failing the whole fetch.
pub async fn get_rules(
    pool: &DbPool,
    active_only: bool,
) -> Result<Vec<CategorizationRule>, StorageError> {
    let query = if active_only {
        "SELECT id, pattern, case_sensitive, amount_op, amount_value, kind, category,
                priority, is_active, created_at, updated_at
         FROM categorization_rules WHERE is_active = 1
         ORDER BY priority DESC, created_at DESC, id DESC"
    } else {
        "SELECT id, pattern, case_sensitive, amount_op, amount_value, kind, category,
                priority, is_active, created_at, updated_at
         FROM categorization_rules
         ORDER BY priority DESC, created_at DESC, id DESC"
    };

    type Row = (
        i64,
        String,
        i64,
        Option<String>,
        Option<String>,
        String,
        String,
        i64,
        i64,
        String,
        String,
    );
    let rows: Vec<Row> = sqlx::query_as(query).fetch_all(pool).await?;

    let mut rules = Vec::with_capacity(rows.len());
    for (id, pattern, case_sensitive, op, value, kind, category, priority, is_active, created, updated) in
        rows
    {
        let kind = match TxnKind::from_str(&kind) {
            Ok(k) => k,
            Err(e) => {
                tracing::warn!(rule_id = id, "skipping rule with unparseable kind: {e}");
                continue;
            }
        };
        let amount_op = match op.as_deref().map(AmountOp::from_str).transpose() {
            Ok(op) => op,
            Err(e) => {
                tracing::warn!(rule_id = id, "skipping rule with unparseable operator: {e}");
                continue;
            }
        };
        let amount_value = value.as_deref().and_then(|v| Decimal::from_str(v).ok());

        rules.push(CategorizationRule {
            id: Some(id),
            pattern,
            case_sensitive: case_sensitive != 0,
            amount_op,
            amount_value,
            kind,
            category,
            priority: priority as i32,
            is_active: is_active != 0,
            created_at: NaiveDateTime::parse_from_str(&created, "%Y-%m-%d %H:%M:%S").ok(),
            updated_at: NaiveDateTime::parse_from_str(&updated, "%Y-%m-%d %H:%M:%S").ok(),
        });
    }

    Ok(rules)
}

pub async fn save_rule(pool: &DbPool, rule: &CategorizationRule) -> Result<i64, StorageError> {
    let result = sqlx::query(
        "INSERT INTO categorization_rules
         (pattern, case_sensitive, amount_op, amount_value, kind, category, priority, is_active)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&rule.pattern)
    .bind(rule.case_sensitive as i64)
    .bind(rule.amount_op.map(|op| op.as_str()))
    .bind(rule.amount_value.map(|v| v.to_string()))
    .bind(rule.kind.as_str())
    .bind(&rule.category)
    .bind(rule.priority)
    .bind(rule.is_active as i64)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn update_rule(pool: &DbPool, rule: &CategorizationRule) -> Result<(), StorageError> {
    let id = rule.id.ok_or(StorageError::MissingRuleId)?;
    sqlx::query(
        "UPDATE categorization_rules
         SET pattern = ?, case_sensitive = ?, amount_op = ?, amount_value = ?,
             kind = ?, category = ?, priority = ?, is_active = ?,
             updated_at = datetime('now')
         WHERE id = ?",
    )
    .bind(&rule.pattern)
    .bind(rule.case_sensitive as i64)
    .bind(rule.amount_op.map(|op| op.as_str()))
    .bind(rule.amount_value.map(|v| v.to_string()))
    .bind(rule.kind.as_str())
    .bind(&rule.category)
    .bind(rule.priority)
    .bind(rule.is_active as i64)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_rule(pool: &DbPool, rule_id: i64) -> Result<bool, StorageError> {
    let result = sqlx::query("DELETE FROM categorization_rules WHERE id = ?")
        .bind(rule_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
