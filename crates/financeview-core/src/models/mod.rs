use serde::{Deserialize, Serialize};
use time::{format_description::FormatItem, macros::format_description, Date};

pub mod write;

/// Identifier assigned by the store to every persisted row.
pub type RecordId = i32;

/// Wire format for expense dates, e.g. `02-21-2022`.
pub const EXPENSE_DATE_FORMAT: &[FormatItem<'static>] = format_description!("[month]-[day]-[year]");

pub fn parse_expense_date(input: &str) -> Result<Date, time::error::Parse> {
    Date::parse(input, EXPENSE_DATE_FORMAT)
}

pub fn format_expense_date(date: Date) -> Result<String, time::error::Format> {
    date.format(EXPENSE_DATE_FORMAT)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(async_graphql::SimpleObject))]
#[cfg_attr(feature = "graphql", graphql(rename_fields = "PascalCase"))]
pub struct Category {
    pub id: RecordId,
    pub name: String,
}

/// Denormalized expense as exposed to API callers: description and categories
/// are inlined, the date is already formatted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(async_graphql::SimpleObject))]
#[cfg_attr(feature = "graphql", graphql(rename_fields = "PascalCase"))]
pub struct Expense {
    pub id: RecordId,
    pub date: String,
    pub description: String,
    pub amount: f64,
    pub categories: Vec<Category>,
    pub comment: String,
}

/// A request to record a new expense.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(async_graphql::InputObject))]
pub struct NewExpense {
    pub date: String,
    pub description: String,
    pub amount: f64,
    pub categories: Vec<String>,
    pub comment: Option<String>,
}
