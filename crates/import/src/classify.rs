use centime_core::{CategorizationRule, Money, Polarity, RawTransaction, SourceFields, TxnKind};

pub const UNCATEGORIZED: &str = "Uncategorized";
pub const CARD_REFUND_CATEGORY: &str = "Card Refund";

/// Card-invoice sector → category lookup, tried as substring-in-sector.
const SECTOR_CATEGORIES: &[(&str, &str)] = &[
    ("grocery stores", "Groceries"),
    ("restaurants", "Restaurants"),
    ("bakeries", "Restaurants"),
    ("fast-food restaurants", "Restaurants"),
    ("fast food restaurant", "Restaurants"),
    ("gasoline service stations", "Car"),
    ("pharmacies", "Health Other"),
    ("digital goods", "Digital Goods"),
    ("computer software stores", "Digital Goods"),
    ("electronics stores", "Digital Goods"),
    ("department stores", "Extras"),
    ("book stores", "Extras"),
    ("barber or beauty shops", "Wellbeing"),
    ("recreation services", "Sport"),
    // Food delivery platforms book under taxicabs.
    ("taxicabs", "Restaurants"),
    ("package stores", "Extras"),
    ("retail business", "Extras"),
];

/// Assign a (kind, category) to a raw transaction.
///
/// Layered evaluation, first match wins: the supplied user rules (already in
/// priority-desc, created-desc order), then the built-in per-source
/// heuristics, then the unlabeled fallback. Pure function of the
/// transaction's description, magnitude, source and polarity plus the rule
/// slice, with no side effects.
pub fn classify(raw: &RawTransaction, rules: &[CategorizationRule]) -> (TxnKind, String) {
    if let Some(hit) = apply_rules(rules, &raw.description, raw.amount) {
        return hit;
    }

    match (&raw.fields, raw.polarity) {
        (SourceFields::Ledger { description1, description2, description3, .. }, polarity) => {
            let d1 = description1.as_deref().unwrap_or("");
            let d2 = description2.as_deref().unwrap_or("");
            let d3 = description3.as_deref().unwrap_or("");
            match polarity {
                Polarity::Credit => (TxnKind::Income, ledger_income(d1, d2, d3).to_string()),
                Polarity::Debit => ledger_expense(d1, d2),
            }
        }
        (SourceFields::Card { .. }, Polarity::Credit) => {
            (TxnKind::CardRefund, CARD_REFUND_CATEGORY.to_string())
        }
        (SourceFields::Card { sector, booking_text }, Polarity::Debit) => card_expense(
            sector.as_deref().unwrap_or(""),
            booking_text.as_deref().unwrap_or(""),
        ),
    }
}

/// The user-rule pass alone: first active rule matching both the pattern and
/// the amount predicate wins. Also used by the bulk "re-apply rules to
/// existing transactions" operation.
pub fn apply_rules(
    rules: &[CategorizationRule],
    description: &str,
    amount: Money,
) -> Option<(TxnKind, String)> {
    rules
        .iter()
        .filter(|r| r.is_active)
        .find(|r| r.matches(description, amount))
        .map(|r| (r.kind, r.category.clone()))
}

fn ledger_income(d1: &str, d2: &str, d3: &str) -> &'static str {
    // Salary: known employer in the payer field plus the salary memo.
    if d1.contains("webloyalty sarl") && d3.contains("salaire") {
        return "Employment";
    }
    if d2.contains("credit ubs twint") {
        return "Extras / Twint Chargeback";
    }
    if d1.contains("etat de vaud") || d1.contains("civil et mil") {
        return "Side Hustle";
    }
    if d3.contains("loyer") {
        return "Side Hustle";
    }
    // Catch-all for unrecognized income.
    "Side Hustle"
}

fn ledger_expense(d1: &str, d2: &str) -> (TxnKind, String) {
    // Card-center settlement is the card side of a refund, not an expense.
    if d1.contains("card center") {
        return (TxnKind::CardRefund, CARD_REFUND_CATEGORY.to_string());
    }

    let category = if d1.contains("sbb") {
        "Train"
    } else if d1.contains("pilet + renaud") {
        "Housing"
    } else if d1.contains("assura") {
        "Health Insurance"
    } else if d1.contains("swisscom") {
        "Internet + Mobile"
    } else if d1.contains("coop") || d1.contains("migros") {
        // Convenience-store chains also run gas stations.
        if d1.contains("pronto") && (d1.contains("tankstelle") || d1.contains("gasoline")) {
            "Car"
        } else {
            "Groceries"
        }
    } else if d1.contains("services industriels") {
        "Home Utils"
    } else if d2.contains("bancomat") || d2.contains("withdrawal") {
        "Withdraw"
    } else if d1.contains("balance closing") || d1.contains("service prices") {
        "CC fees"
    } else if d2.contains("debit ubs twint") {
        "Extras"
    } else {
        return (TxnKind::Unlabeled, UNCATEGORIZED.to_string());
    };

    (TxnKind::Expenses, category.to_string())
}

fn card_expense(sector: &str, booking_text: &str) -> (TxnKind, String) {
    for (pattern, category) in SECTOR_CATEGORIES {
        if sector.contains(pattern) {
            return (TxnKind::Expenses, (*category).to_string());
        }
    }

    // Interest and fee charges come through without a sector.
    if sector.is_empty() && (booking_text.contains("interets") || booking_text.contains("interest"))
    {
        return (TxnKind::Expenses, "CC fees".to_string());
    }

    (TxnKind::Unlabeled, UNCATEGORIZED.to_string())
}
