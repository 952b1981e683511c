//! Recording new expenses.
//!
//! A save is a fixed sequence of store round trips: resolve the description,
//! parse the date, insert the expense, then resolve and link each category.
//! The sequence is not atomic. A failure part way through leaves earlier rows
//! in place (a new description, new categories, or an expense missing some of
//! its links); nothing is compensated.

use financeview_core::{
    parse_expense_date, Category, CreateExpenseCommand, Expense, NewExpense,
    RecordId,
};
use thiserror::Error;

use crate::storage::{ExpenseWriter, StorageError};

/// Broad classes of save failure, used to pick the error code shown to API callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    CallerContract,
    Storage,
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("new expense has no comment")]
    MissingComment,
    #[error("failed to get description_id for new expense: {0}")]
    DescriptionLookup(#[source] StorageError),
    #[error("failed to create new description: {0}")]
    DescriptionCreate(#[source] StorageError),
    #[error("failed to parse new expense date {input:?}: {source}")]
    InvalidDate {
        input: String,
        #[source]
        source: time::error::Parse,
    },
    #[error("failed to save new expense data: {0}")]
    ExpenseCreate(#[source] StorageError),
    #[error("failed to get category_id for {name:?}: {source}")]
    CategoryLookup {
        name: String,
        #[source]
        source: StorageError,
    },
    #[error("failed to create new category {name:?}: {source}")]
    CategoryCreate {
        name: String,
        #[source]
        source: StorageError,
    },
    #[error("failed to link expense {expense_id} and category {category_id}: {source}")]
    Link {
        expense_id: RecordId,
        category_id: RecordId,
        #[source]
        source: StorageError,
    },
}

impl SaveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SaveError::MissingComment => ErrorKind::CallerContract,
            SaveError::InvalidDate { .. } => ErrorKind::Validation,
            SaveError::DescriptionLookup(_)
            | SaveError::DescriptionCreate(_)
            | SaveError::ExpenseCreate(_)
            | SaveError::CategoryLookup { .. }
            | SaveError::CategoryCreate { .. }
            | SaveError::Link { .. } => ErrorKind::Storage,
        }
    }
}

fn resolve_description<W: ExpenseWriter + ?Sized>(writer: &W, description: &str) -> Result<RecordId, SaveError> {
    if let Some(id) = writer
        .find_description_id(description)
        .map_err(SaveError::DescriptionLookup)?
    {
        return Ok(id);
    }
    let id = writer
        .create_description(description)
        .map_err(SaveError::DescriptionCreate)?;
    tracing::debug!(id, description, "Created description");
    Ok(id)
}

fn resolve_category<W: ExpenseWriter + ?Sized>(writer: &W, name: &str) -> Result<RecordId, SaveError> {
    let found = writer
        .find_category_id(name)
        .map_err(|source| SaveError::CategoryLookup {
            name: name.to_string(),
            source,
        })?;
    if let Some(id) = found {
        return Ok(id);
    }
    let id = writer
        .create_category(name)
        .map_err(|source| SaveError::CategoryCreate {
            name: name.to_string(),
            source,
        })?;
    tracing::debug!(id, name, "Created category");
    Ok(id)
}

/// Persists `input` and returns it as an expense view.
///
/// Categories in the result keep the order they were supplied in; listing
/// the same expense later orders them by id instead.
#[tracing::instrument(skip_all, fields(description = %input.description, categories = input.categories.len()))]
pub fn save_expense<W: ExpenseWriter + ?Sized>(writer: &W, input: &NewExpense) -> Result<Expense, SaveError> {
    let comment = input.comment.as_ref().ok_or(SaveError::MissingComment)?;

    let description_id = resolve_description(writer, &input.description)?;

    let date = parse_expense_date(&input.date).map_err(|source| SaveError::InvalidDate {
        input: input.date.clone(),
        source,
    })?;

    let expense_id = writer
        .create_expense(&CreateExpenseCommand {
            date,
            description_id,
            amount: input.amount,
            comment: comment.clone(),
        })
        .map_err(SaveError::ExpenseCreate)?;
    tracing::debug!(expense_id, description_id, "Created expense");

    let mut categories = Vec::with_capacity(input.categories.len());
    for name in &input.categories {
        let category_id = resolve_category(writer, name)?;
        writer
            .link_expense_category(expense_id, category_id)
            .map_err(|source| SaveError::Link {
                expense_id,
                category_id,
                source,
            })?;
        categories.push(Category {
            id: category_id,
            name: name.clone(),
        });
    }

    // The parser accepts only the canonical `MM-DD-YYYY` form, so the input
    // already reads exactly as the stored date does.
    Ok(Expense {
        id: expense_id,
        date: input.date.clone(),
        description: input.description.clone(),
        amount: input.amount,
        categories,
        comment: comment.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use financeview_core::ExpenseReader;
    use financeview_memory::InMemoryStore;

    fn new_expense(categories: &[&str]) -> NewExpense {
        NewExpense {
            date: "02-21-2022".to_string(),
            description: "test desc".to_string(),
            amount: 12.45,
            categories: categories.iter().map(|c| c.to_string()).collect(),
            comment: Some("test comment".to_string()),
        }
    }

    #[test]
    fn test_new_and_existing_category_existing_description() {
        let store = InMemoryStore::new();
        let did = store.create_description("test desc").unwrap();
        let existing = store.create_category("test cat").unwrap();

        let actual = save_expense(&store, &new_expense(&["test cat", "a new cat"])).unwrap();

        assert_eq!(actual.date, "02-21-2022");
        assert_eq!(actual.description, "test desc");
        assert_eq!(actual.amount, 12.45);
        assert_eq!(actual.comment, "test comment");
        assert_eq!(actual.categories.len(), 2);
        assert_eq!(actual.categories[0], Category { id: existing, name: "test cat".to_string() });
        assert_eq!(actual.categories[1].name, "a new cat");
        assert_ne!(actual.categories[1].id, existing);

        assert_eq!(store.find_description_id("test desc").unwrap(), Some(did));
        assert_eq!(store.description_count().unwrap(), 1);
        assert_eq!(store.category_count().unwrap(), 2);
        assert_eq!(store.link_count().unwrap(), 2);
    }

    #[test]
    fn test_existing_categories_new_description() {
        let store = InMemoryStore::new();
        let cat_b = store.create_category("cat b").unwrap();
        let cat_a = store.create_category("cat a").unwrap();

        let actual = save_expense(&store, &new_expense(&["cat b", "cat a"])).unwrap();

        assert_eq!(
            actual.categories,
            vec![
                Category { id: cat_b, name: "cat b".to_string() },
                Category { id: cat_a, name: "cat a".to_string() },
            ]
        );
        assert!(store.find_description_id("test desc").unwrap().is_some());
        assert_eq!(store.category_count().unwrap(), 2);
    }

    #[test]
    fn test_saved_expense_is_listed() {
        let store = InMemoryStore::new();
        let saved = save_expense(&store, &new_expense(&["food"])).unwrap();
        assert_eq!(store.list_expenses().unwrap(), vec![saved]);
    }

    #[test]
    fn test_returned_date_matches_listed_date() {
        let store = InMemoryStore::new();
        for date in ["12-31-1999", "01-01-0999", "02-29-2024"] {
            let mut input = new_expense(&[]);
            input.date = date.to_string();
            let saved = save_expense(&store, &input).unwrap();
            assert_eq!(saved.date, date);
        }
        let listed: Vec<String> = store.list_expenses().unwrap().into_iter().map(|e| e.date).collect();
        assert_eq!(listed, vec!["12-31-1999", "01-01-0999", "02-29-2024"]);

        // non-canonical spellings never reach the store
        for date in ["2-21-2022", "02-21-22", " 02-21-2022", "02-21-2022 "] {
            let mut input = new_expense(&[]);
            input.date = date.to_string();
            let err = save_expense(&store, &input).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "accepted {:?}", date);
        }
        assert_eq!(store.expense_count().unwrap(), 3);
    }

    #[test]
    fn test_malformed_date_creates_no_expense() {
        let store = InMemoryStore::new();
        let mut input = new_expense(&["food"]);
        input.date = "2022-02-21".to_string();

        let err = save_expense(&store, &input).unwrap_err();
        assert!(matches!(err, SaveError::InvalidDate { .. }));
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(store.expense_count().unwrap(), 0);
        assert_eq!(store.category_count().unwrap(), 0);
        // the description was already resolved before the date was parsed
        assert_eq!(store.description_count().unwrap(), 1);
    }

    #[test]
    fn test_missing_comment_touches_nothing() {
        let store = InMemoryStore::new();
        let mut input = new_expense(&["food"]);
        input.comment = None;

        let err = save_expense(&store, &input).unwrap_err();
        assert!(matches!(err, SaveError::MissingComment));
        assert_eq!(err.kind(), ErrorKind::CallerContract);
        assert_eq!(store.description_count().unwrap(), 0);
    }

    #[test]
    fn test_empty_comment_is_accepted() {
        let store = InMemoryStore::new();
        let mut input = new_expense(&[]);
        input.comment = Some(String::new());
        let saved = save_expense(&store, &input).unwrap();
        assert_eq!(saved.comment, "");
        assert!(saved.categories.is_empty());
    }

    #[test]
    fn test_repeated_category_is_linked_twice() {
        let store = InMemoryStore::new();
        let saved = save_expense(&store, &new_expense(&["food", "food"])).unwrap();
        assert_eq!(saved.categories[0], saved.categories[1]);
        assert_eq!(store.category_count().unwrap(), 1);
        assert_eq!(store.link_count().unwrap(), 2);
    }

    /// Delegates to an in-memory store but fails the n-th link.
    struct FailingLinks {
        inner: InMemoryStore,
        fail_at: usize,
        links: AtomicUsize,
    }

    impl ExpenseWriter for FailingLinks {
        fn find_description_id(&self, d: &str) -> Result<Option<RecordId>, StorageError> {
            self.inner.find_description_id(d)
        }
        fn create_description(&self, d: &str) -> Result<RecordId, StorageError> {
            self.inner.create_description(d)
        }
        fn create_expense(&self, c: &CreateExpenseCommand) -> Result<RecordId, StorageError> {
            self.inner.create_expense(c)
        }
        fn find_category_id(&self, n: &str) -> Result<Option<RecordId>, StorageError> {
            self.inner.find_category_id(n)
        }
        fn create_category(&self, n: &str) -> Result<RecordId, StorageError> {
            self.inner.create_category(n)
        }
        fn link_expense_category(&self, e: RecordId, c: RecordId) -> Result<RecordId, StorageError> {
            if self.links.fetch_add(1, Ordering::SeqCst) == self.fail_at {
                return Err(StorageError::query("failed to insert new expense_category into database", "connection reset"));
            }
            self.inner.link_expense_category(e, c)
        }
    }

    #[test]
    fn test_link_failure_leaves_partial_expense() {
        let store = FailingLinks {
            inner: InMemoryStore::new(),
            fail_at: 1,
            links: AtomicUsize::new(0),
        };

        let err = save_expense(&store, &new_expense(&["first", "second"])).unwrap_err();
        assert!(matches!(err, SaveError::Link { .. }));
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(err.to_string().starts_with("failed to link expense"));

        // no compensation: the expense and the first link stay behind
        assert_eq!(store.inner.expense_count().unwrap(), 1);
        assert_eq!(store.inner.link_count().unwrap(), 1);
        assert_eq!(store.inner.category_count().unwrap(), 2);
    }
}
