//! GraphQL surface: `createExpense` and `expenses`.

use async_graphql::{Context, EmptySubscription, ErrorExtensions, Object, Schema};
use financeview_core::{Expense, NewExpense};
use thiserror::Error;

use crate::{
    expense::{save_expense, ErrorKind, SaveError},
    storage::{ExpenseReader, SharedStore, StorageError},
};

pub type FinanceSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("failed to save input new expense: {0}")]
    Save(#[from] SaveError),
    #[error("failed to get expenses: {0}")]
    List(#[source] StorageError),
    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Save(e) => match e.kind() {
                ErrorKind::Validation => "VALIDATION",
                ErrorKind::CallerContract => "CALLER_CONTRACT",
                ErrorKind::Storage => "STORAGE",
            },
            ApiError::List(_) => "STORAGE",
            ApiError::Task(_) => "INTERNAL",
        }
    }
}

impl ErrorExtensions for ApiError {
    fn extend(&self) -> async_graphql::Error {
        async_graphql::Error::new(self.to_string()).extend_with(|_, e| e.set("code", self.code()))
    }
}

/// Store calls block, so they run on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

pub async fn record_expense(store: SharedStore, input: NewExpense) -> Result<Expense, ApiError> {
    blocking(move || save_expense(store.as_ref(), &input).map_err(ApiError::from)).await
}

pub async fn load_expenses(store: SharedStore) -> Result<Vec<Expense>, ApiError> {
    blocking(move || store.list_expenses().map_err(ApiError::List)).await
}

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// Every recorded expense, oldest first.
    async fn expenses(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<Expense>> {
        let store = ctx.data::<SharedStore>()?.clone();
        match load_expenses(store).await {
            Ok(expenses) => Ok(expenses),
            Err(e) => {
                tracing::warn!(error = %e, "Listing expenses failed");
                metrics::increment_counter!("financeview_expense_list_failures_total");
                Err(e.extend())
            }
        }
    }
}

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    async fn create_expense(&self, ctx: &Context<'_>, input: NewExpense) -> async_graphql::Result<Expense> {
        let store = ctx.data::<SharedStore>()?.clone();
        match record_expense(store, input).await {
            Ok(expense) => {
                tracing::info!(id = expense.id, "Expense recorded");
                metrics::increment_counter!("financeview_expenses_created_total");
                Ok(expense)
            }
            Err(e) => {
                tracing::warn!(error = %e, code = e.code(), "Saving expense failed");
                metrics::increment_counter!("financeview_expense_save_failures_total");
                Err(e.extend())
            }
        }
    }
}

pub fn build_schema(store: SharedStore) -> FinanceSchema {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(store)
        .finish()
}
