use std::{
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use postgres::{Client, NoTls, Row};
use time::Date;

use financeview_core::{
    format_expense_date, parse_money, to_decimal, Category, CreateExpenseCommand, Expense,
    ExpenseReader, ExpenseWriter, RecordId, StorageError,
};

#[derive(Debug, Clone)]
pub struct PostgresOptions {
    /// Create the `financeview` schema and tables when missing.
    pub init_schema: bool,
    /// Upper bound for every statement issued on this session.
    pub statement_timeout: Option<Duration>,
}

impl Default for PostgresOptions {
    fn default() -> Self {
        Self {
            init_schema: true,
            statement_timeout: None,
        }
    }
}

pub struct PostgresStore {
    client: Mutex<Client>,
}

impl PostgresStore {
    pub fn new(connection_string: &str) -> Result<Self, StorageError> {
        Self::connect(connection_string, &PostgresOptions::default())
    }

    pub fn connect(connection_string: &str, options: &PostgresOptions) -> Result<Self, StorageError> {
        let mut client = Client::connect(connection_string, NoTls)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        if let Some(timeout) = options.statement_timeout {
            client
                .batch_execute(&format!("SET statement_timeout = {}", timeout.as_millis()))
                .map_err(|e| StorageError::Connection(e.to_string()))?;
        }

        let store = Self {
            client: Mutex::new(client),
        };
        if options.init_schema {
            store.init_schema()?;
        }
        tracing::debug!("PostgreSQL store connected");
        Ok(store)
    }

    fn client(&self) -> Result<MutexGuard<'_, Client>, StorageError> {
        self.client.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        let mut client = self.client()?;
        client
            .batch_execute(
                "
            CREATE SCHEMA IF NOT EXISTS financeview;

            CREATE TABLE IF NOT EXISTS financeview.description (
                id SERIAL PRIMARY KEY,
                description TEXT NOT NULL,
                createdate TIMESTAMP NOT NULL DEFAULT (now() AT TIME ZONE 'utc')
            );

            CREATE TABLE IF NOT EXISTS financeview.category (
                id SERIAL PRIMARY KEY,
                name TEXT NOT NULL,
                createdate TIMESTAMP NOT NULL DEFAULT (now() AT TIME ZONE 'utc')
            );

            CREATE TABLE IF NOT EXISTS financeview.expense (
                id SERIAL PRIMARY KEY,
                date DATE NOT NULL,
                description_id INTEGER NOT NULL REFERENCES financeview.description(id),
                amount MONEY NOT NULL,
                comment TEXT,
                createdate TIMESTAMP NOT NULL DEFAULT (now() AT TIME ZONE 'utc')
            );

            CREATE TABLE IF NOT EXISTS financeview.expense_category (
                id SERIAL PRIMARY KEY,
                expense_id INTEGER NOT NULL REFERENCES financeview.expense(id),
                category_id INTEGER NOT NULL REFERENCES financeview.category(id),
                createdate TIMESTAMP NOT NULL DEFAULT (now() AT TIME ZONE 'utc')
            );

            CREATE INDEX IF NOT EXISTS idx_description_text
                ON financeview.description(description);

            CREATE INDEX IF NOT EXISTS idx_category_name
                ON financeview.category(name);

            CREATE INDEX IF NOT EXISTS idx_expense_category_expense
                ON financeview.expense_category(expense_id);
            ",
            )
            .map_err(|e| StorageError::query("failed to initialize schema", e))?;
        Ok(())
    }

    fn returned_id(row: Row, context: &str) -> Result<RecordId, StorageError> {
        row.try_get(0).map_err(|e| StorageError::query(context, e))
    }

    fn categories_for(client: &mut Client, expense_id: RecordId) -> Result<Vec<Category>, StorageError> {
        let rows = client
            .query(
                "SELECT c.id, c.name
                 FROM financeview.category AS c
                 INNER JOIN financeview.expense_category AS ec
                 ON c.id = ec.category_id AND ec.expense_id = $1
                 ORDER BY c.id",
                &[&expense_id],
            )
            .map_err(|e| {
                StorageError::query(
                    format!("failed to select categories for expense_id={} from database", expense_id),
                    e,
                )
            })?;

        rows.iter()
            .map(|row| {
                Ok(Category {
                    id: row.try_get(0)?,
                    name: row.try_get(1)?,
                })
            })
            .collect::<Result<Vec<_>, postgres::Error>>()
            .map_err(|e| {
                StorageError::query(
                    format!("failed to scan categories for expense_id={} from database", expense_id),
                    e,
                )
            })
    }
}

impl ExpenseWriter for PostgresStore {
    fn find_description_id(&self, description: &str) -> Result<Option<RecordId>, StorageError> {
        const CONTEXT: &str = "failed to query description table";
        let row = self
            .client()?
            .query_opt(
                "SELECT id FROM financeview.description WHERE description = $1 ORDER BY id LIMIT 1",
                &[&description],
            )
            .map_err(|e| StorageError::query(CONTEXT, e))?;
        row.map(|r| Self::returned_id(r, CONTEXT)).transpose()
    }

    fn create_description(&self, description: &str) -> Result<RecordId, StorageError> {
        const CONTEXT: &str = "failed to insert new description into database";
        let row = self
            .client()?
            .query_one(
                "INSERT INTO financeview.description (description) VALUES ($1) RETURNING id",
                &[&description],
            )
            .map_err(|e| StorageError::query(CONTEXT, e))?;
        Self::returned_id(row, CONTEXT)
    }

    fn create_expense(&self, command: &CreateExpenseCommand) -> Result<RecordId, StorageError> {
        const CONTEXT: &str = "failed to insert new expense into database";
        let amount = to_decimal(command.amount)?;
        let row = self
            .client()?
            .query_one(
                "INSERT INTO financeview.expense (date, description_id, amount, comment)
                 VALUES ($1, $2, $3::numeric::money, $4) RETURNING id",
                &[&command.date, &command.description_id, &amount, &command.comment],
            )
            .map_err(|e| StorageError::query(CONTEXT, e))?;
        Self::returned_id(row, CONTEXT)
    }

    fn find_category_id(&self, name: &str) -> Result<Option<RecordId>, StorageError> {
        const CONTEXT: &str = "failed to query database for category";
        let row = self
            .client()?
            .query_opt(
                "SELECT id FROM financeview.category WHERE name = $1 ORDER BY id LIMIT 1",
                &[&name],
            )
            .map_err(|e| StorageError::query(CONTEXT, e))?;
        row.map(|r| Self::returned_id(r, CONTEXT)).transpose()
    }

    fn create_category(&self, name: &str) -> Result<RecordId, StorageError> {
        const CONTEXT: &str = "failed to insert new category into database";
        let row = self
            .client()?
            .query_one(
                "INSERT INTO financeview.category (name) VALUES ($1) RETURNING id",
                &[&name],
            )
            .map_err(|e| StorageError::query(CONTEXT, e))?;
        Self::returned_id(row, CONTEXT)
    }

    fn link_expense_category(&self, expense_id: RecordId, category_id: RecordId) -> Result<RecordId, StorageError> {
        const CONTEXT: &str = "failed to insert new expense_category into database";
        let row = self
            .client()?
            .query_one(
                "INSERT INTO financeview.expense_category (expense_id, category_id) VALUES ($1, $2) RETURNING id",
                &[&expense_id, &category_id],
            )
            .map_err(|e| StorageError::query(CONTEXT, e))?;
        Self::returned_id(row, CONTEXT)
    }
}

impl ExpenseReader for PostgresStore {
    fn list_expenses(&self) -> Result<Vec<Expense>, StorageError> {
        let mut client = self.client()?;
        let rows = client
            .query(
                "SELECT e.id, e.date, d.description, e.amount::text, e.comment
                 FROM financeview.expense AS e
                 INNER JOIN financeview.description AS d
                 ON e.description_id = d.id
                 ORDER BY e.id",
                &[],
            )
            .map_err(|e| StorageError::query("failed to select expenses from database", e))?;

        let mut expenses = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            let scan = |e: postgres::Error| StorageError::query("failed to scan response from database", e);
            let id: RecordId = row.try_get(0).map_err(scan)?;
            let date: Date = row.try_get(1).map_err(scan)?;
            let description: String = row.try_get(2).map_err(scan)?;
            let amount: String = row.try_get(3).map_err(scan)?;
            let comment: Option<String> = row.try_get(4).map_err(scan)?;

            expenses.push(Expense {
                id,
                date: format_expense_date(date).map_err(|e| StorageError::Date(e.to_string()))?,
                description,
                amount: parse_money(&amount)?,
                categories: Vec::new(),
                comment: comment.unwrap_or_default(),
            });
        }

        for expense in expenses.iter_mut() {
            expense.categories = Self::categories_for(&mut client, expense.id)?;
        }

        Ok(expenses)
    }

    fn ping(&self) -> Result<(), StorageError> {
        self.client()?
            .simple_query("SELECT 1")
            .map_err(|e| StorageError::query("failed to ping database", e))?;
        Ok(())
    }
}
