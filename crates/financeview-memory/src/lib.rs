//! In-memory storage backend for FinanceView.
//!
//! Mirrors the relational layout of the SQL backends: amounts are kept in
//! their currency-formatted form and parsed back on read, and expense and link
//! rows must reference existing parents.

use std::{
    collections::BTreeMap,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use time::Date;

use financeview_core::{
    format_expense_date, format_money, parse_money, Category, CreateExpenseCommand, Expense,
    ExpenseReader, ExpenseWriter, RecordId, StorageError,
};

#[derive(Clone)]
struct ExpenseRow {
    date: Date,
    description_id: RecordId,
    amount: String,
    comment: String,
}

#[derive(Clone)]
struct LinkRow {
    expense_id: RecordId,
    category_id: RecordId,
}

#[derive(Default)]
struct Tables {
    descriptions: BTreeMap<RecordId, String>,
    categories: BTreeMap<RecordId, String>,
    expenses: BTreeMap<RecordId, ExpenseRow>,
    links: BTreeMap<RecordId, LinkRow>,
}

fn next_id<V>(table: &BTreeMap<RecordId, V>) -> RecordId {
    table.keys().next_back().map_or(1, |id| id + 1)
}

fn find_by_text(table: &BTreeMap<RecordId, String>, text: &str) -> Option<RecordId> {
    table.iter().find(|(_, v)| v.as_str() == text).map(|(k, _)| *k)
}

pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StorageError> {
        self.tables.read().map_err(|_| StorageError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StorageError> {
        self.tables.write().map_err(|_| StorageError::LockPoisoned)
    }

    pub fn expense_count(&self) -> Result<usize, StorageError> {
        Ok(self.read()?.expenses.len())
    }

    pub fn description_count(&self) -> Result<usize, StorageError> {
        Ok(self.read()?.descriptions.len())
    }

    pub fn category_count(&self) -> Result<usize, StorageError> {
        Ok(self.read()?.categories.len())
    }

    pub fn link_count(&self) -> Result<usize, StorageError> {
        Ok(self.read()?.links.len())
    }
}

impl ExpenseWriter for InMemoryStore {
    fn find_description_id(&self, description: &str) -> Result<Option<RecordId>, StorageError> {
        Ok(find_by_text(&self.read()?.descriptions, description))
    }

    fn create_description(&self, description: &str) -> Result<RecordId, StorageError> {
        let mut tables = self.write()?;
        let id = next_id(&tables.descriptions);
        tables.descriptions.insert(id, description.to_string());
        tracing::trace!(id, "description row inserted");
        Ok(id)
    }

    fn create_expense(&self, command: &CreateExpenseCommand) -> Result<RecordId, StorageError> {
        let amount = format_money(command.amount)?;
        let mut tables = self.write()?;
        if !tables.descriptions.contains_key(&command.description_id) {
            return Err(StorageError::query(
                "failed to insert new expense into database",
                format!("description {} does not exist", command.description_id),
            ));
        }
        let id = next_id(&tables.expenses);
        tables.expenses.insert(
            id,
            ExpenseRow {
                date: command.date,
                description_id: command.description_id,
                amount,
                comment: command.comment.clone(),
            },
        );
        tracing::trace!(id, "expense row inserted");
        Ok(id)
    }

    fn find_category_id(&self, name: &str) -> Result<Option<RecordId>, StorageError> {
        Ok(find_by_text(&self.read()?.categories, name))
    }

    fn create_category(&self, name: &str) -> Result<RecordId, StorageError> {
        let mut tables = self.write()?;
        let id = next_id(&tables.categories);
        tables.categories.insert(id, name.to_string());
        tracing::trace!(id, "category row inserted");
        Ok(id)
    }

    fn link_expense_category(&self, expense_id: RecordId, category_id: RecordId) -> Result<RecordId, StorageError> {
        let mut tables = self.write()?;
        if !tables.expenses.contains_key(&expense_id) || !tables.categories.contains_key(&category_id) {
            return Err(StorageError::query(
                "failed to insert new expense_category into database",
                format!("expense {} or category {} does not exist", expense_id, category_id),
            ));
        }
        let id = next_id(&tables.links);
        tables.links.insert(id, LinkRow { expense_id, category_id });
        Ok(id)
    }
}

impl ExpenseReader for InMemoryStore {
    fn list_expenses(&self) -> Result<Vec<Expense>, StorageError> {
        let tables = self.read()?;
        let mut expenses = Vec::with_capacity(tables.expenses.len());

        for (id, row) in tables.expenses.iter() {
            let description = tables.descriptions.get(&row.description_id).ok_or_else(|| {
                StorageError::Inconsistent(format!(
                    "expense {} references missing description {}",
                    id, row.description_id
                ))
            })?;

            let mut categories = tables
                .links
                .values()
                .filter(|link| link.expense_id == *id)
                .map(|link| {
                    tables
                        .categories
                        .get(&link.category_id)
                        .map(|name| Category {
                            id: link.category_id,
                            name: name.clone(),
                        })
                        .ok_or_else(|| {
                            StorageError::Inconsistent(format!(
                                "expense {} linked to missing category {}",
                                id, link.category_id
                            ))
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            categories.sort_by_key(|c| c.id);

            expenses.push(Expense {
                id: *id,
                date: format_expense_date(row.date).map_err(|e| StorageError::Date(e.to_string()))?,
                description: description.clone(),
                amount: parse_money(&row.amount)?,
                categories,
                comment: row.comment.clone(),
            });
        }

        Ok(expenses)
    }

    fn ping(&self) -> Result<(), StorageError> {
        self.read().map(|_| ())
    }
}
