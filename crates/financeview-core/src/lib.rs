//! Core types and traits for FinanceView storage backends.
//!
//! This crate provides the `ExpenseWriter` / `ExpenseReader` traits and all
//! associated types, enabling pluggable storage implementations in separate crates.

pub mod models;
pub mod money;
pub mod storage;

// Re-export key types at crate root for convenience
pub use models::{Category, Expense, NewExpense, RecordId};
pub use models::write::CreateExpenseCommand;
pub use models::{format_expense_date, parse_expense_date, EXPENSE_DATE_FORMAT};
pub use money::{format_money, parse_money, to_decimal, MoneyError, CURRENCY_SYMBOL};
pub use storage::{ExpenseReader, ExpenseStore, ExpenseWriter, StorageError};
