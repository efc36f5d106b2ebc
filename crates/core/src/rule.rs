use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::transaction::TxnKind;

/// Comparison operator for a rule's optional amount predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AmountOp {
    Eq,
    Gte,
    Lte,
    Gt,
    Lt,
}

impl AmountOp {
    pub fn as_str(self) -> &'static str {
        match self {
            AmountOp::Eq => "eq",
            AmountOp::Gte => "gte",
            AmountOp::Lte => "lte",
            AmountOp::Gt => "gt",
            AmountOp::Lt => "lt",
        }
    }

    pub fn compare(self, lhs: Decimal, rhs: Decimal) -> bool {
        match self {
            AmountOp::Eq => lhs == rhs,
            AmountOp::Gte => lhs >= rhs,
            AmountOp::Lte => lhs <= rhs,
            AmountOp::Gt => lhs > rhs,
            AmountOp::Lt => lhs < rhs,
        }
    }
}

impl std::str::FromStr for AmountOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "eq" => Ok(AmountOp::Eq),
            "gte" => Ok(AmountOp::Gte),
            "lte" => Ok(AmountOp::Lte),
            "gt" => Ok(AmountOp::Gt),
            "lt" => Ok(AmountOp::Lt),
            other => Err(format!("Unknown amount operator: '{other}'")),
        }
    }
}

/// A user-editable categorization rule: a substring pattern plus an optional
/// amount predicate, mapped to a (kind, category) pair.
///
/// Evaluation order is priority descending, then creation time descending
/// (most recently created wins ties). Inactive rules are never evaluated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorizationRule {
    pub id: Option<i64>,
    pub pattern: String,
    pub case_sensitive: bool,
    pub amount_op: Option<AmountOp>,
    pub amount_value: Option<Decimal>,
    pub kind: TxnKind,
    pub category: String,
    pub priority: i32,
    pub is_active: bool,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

impl CategorizationRule {
    /// True when the pattern is a substring of `description` (under the
    /// rule's case-sensitivity setting) and the amount predicate, if set,
    /// holds against the non-negative magnitude.
    pub fn matches(&self, description: &str, amount: Money) -> bool {
        if self.pattern.is_empty() || description.is_empty() {
            return false;
        }

        let hit = if self.case_sensitive {
            description.contains(&self.pattern)
        } else {
            description.to_lowercase().contains(&self.pattern.to_lowercase())
        };
        if !hit {
            return false;
        }

        match (self.amount_op, self.amount_value) {
            (Some(op), Some(value)) => op.compare(amount.as_decimal(), value),
            _ => true,
        }
    }
}
