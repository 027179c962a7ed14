//! SQL text inspection: statement classification and affected-rows estimation.

pub mod classifier;
pub mod estimator;

pub use classifier::{OperationKind, classify_operation, is_read_statement, is_transactional};
pub use estimator::{RowEstimate, UNKNOWN_ROWS, estimate_affected_rows};
