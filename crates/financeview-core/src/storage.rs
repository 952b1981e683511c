use thiserror::Error;

use crate::models::{write::CreateExpenseCommand, Expense, RecordId};
use crate::money::MoneyError;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to app database: {0}")]
    Connection(String),
    #[error("{context}: {message}")]
    Query { context: String, message: String },
    #[error("failed to convert amount: {0}")]
    Amount(#[from] MoneyError),
    #[error("failed to convert date: {0}")]
    Date(String),
    #[error("storage lock poisoned")]
    LockPoisoned,
    #[error("inconsistent stored data: {0}")]
    Inconsistent(String),
}

impl StorageError {
    /// Wraps a driver error with the operation that produced it.
    pub fn query(context: impl Into<String>, err: impl std::fmt::Display) -> Self {
        StorageError::Query {
            context: context.into(),
            message: err.to_string(),
        }
    }
}

/// Write-side capabilities the expense normalizer depends on.
///
/// Lookups return `Ok(None)` when no row matches; that is never an error.
pub trait ExpenseWriter: Send + Sync {
    fn find_description_id(&self, description: &str) -> Result<Option<RecordId>, StorageError>;
    fn create_description(&self, description: &str) -> Result<RecordId, StorageError>;
    fn create_expense(&self, command: &CreateExpenseCommand) -> Result<RecordId, StorageError>;
    fn find_category_id(&self, name: &str) -> Result<Option<RecordId>, StorageError>;
    fn create_category(&self, name: &str) -> Result<RecordId, StorageError>;
    fn link_expense_category(&self, expense_id: RecordId, category_id: RecordId) -> Result<RecordId, StorageError>;
}

pub trait ExpenseReader: Send + Sync {
    /// All expenses ordered by id, each with its categories ordered by category id.
    fn list_expenses(&self) -> Result<Vec<Expense>, StorageError>;

    /// Cheapest round trip proving the store can serve requests.
    fn ping(&self) -> Result<(), StorageError>;
}

pub trait ExpenseStore: ExpenseWriter + ExpenseReader {}

impl<T: ExpenseWriter + ExpenseReader> ExpenseStore for T {}
