pub mod budget;
pub mod money;
pub mod rule;
pub mod transaction;

pub use budget::BudgetEntry;
pub use money::Money;
pub use rule::{AmountOp, CategorizationRule};
pub use transaction::{
    validate_batch, ClassifiedTransaction, Polarity, RawTransaction, RejectedTransaction, Source,
    SourceFields, TxnKind, ValidationError,
};
