use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::transaction::TxnKind;

/// A planned budget amount for a (kind, category), at either yearly
/// granularity (`month` = None) or monthly granularity (`month` = 1–12).
///
/// Unique per (owner, year, month, kind, category).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetEntry {
    pub id: Option<i64>,
    pub owner_id: i64,
    pub year: i32,
    pub month: Option<u8>,
    pub kind: TxnKind,
    pub category: String,
    pub amount: Money,
}

impl BudgetEntry {
    pub fn yearly(owner_id: i64, year: i32, kind: TxnKind, category: &str, amount: Money) -> Self {
        BudgetEntry {
            id: None,
            owner_id,
            year,
            month: None,
            kind,
            category: category.to_string(),
            amount,
        }
    }

    pub fn monthly(
        owner_id: i64,
        year: i32,
        month: u8,
        kind: TxnKind,
        category: &str,
        amount: Money,
    ) -> Self {
        BudgetEntry { month: Some(month), ..Self::yearly(owner_id, year, kind, category, amount) }
    }

    pub fn is_yearly(&self) -> bool {
        self.month.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yearly_has_no_month() {
        let e = BudgetEntry::yearly(1, 2025, TxnKind::Expenses, "Housing", Money::from_cents(120_000));
        assert!(e.is_yearly());
        assert_eq!(e.month, None);
    }

    #[test]
    fn monthly_carries_month() {
        let e = BudgetEntry::monthly(1, 2025, 3, TxnKind::Savings, "Emergency Fund", Money::from_cents(5_000));
        assert!(!e.is_yearly());
        assert_eq!(e.month, Some(3));
    }
}
