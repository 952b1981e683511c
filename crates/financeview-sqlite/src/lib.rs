use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use time::{format_description::FormatItem, macros::format_description, Date};

use financeview_core::{
    format_expense_date, format_money, parse_money, Category, CreateExpenseCommand, Expense,
    ExpenseReader, ExpenseWriter, RecordId, StorageError,
};

const ISO_DATE: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) the database at `path`; `:memory:` gives a private in-memory database.
    pub fn new(path: &str) -> Result<Self, StorageError> {
        Self::open(path, true)
    }

    pub fn open(path: &str, init_schema: bool) -> Result<Self, StorageError> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        if init_schema {
            store.init_schema()?;
        }
        tracing::debug!(path, "SQLite store opened");
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.conn()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS description (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                description TEXT NOT NULL,
                createdate TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS category (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                createdate TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS expense (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT NOT NULL,
                description_id INTEGER NOT NULL REFERENCES description(id),
                amount TEXT NOT NULL,
                comment TEXT,
                createdate TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS expense_category (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                expense_id INTEGER NOT NULL REFERENCES expense(id),
                category_id INTEGER NOT NULL REFERENCES category(id),
                createdate TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX IF NOT EXISTS idx_description_text ON description(description);
            CREATE INDEX IF NOT EXISTS idx_category_name ON category(name);
            CREATE INDEX IF NOT EXISTS idx_expense_category_expense ON expense_category(expense_id);
            ",
        )
        .map_err(|e| StorageError::query("failed to initialize schema", e))?;
        Ok(())
    }

    fn categories_for(conn: &Connection, expense_id: RecordId) -> Result<Vec<Category>, StorageError> {
        let context = || format!("failed to select categories for expense_id={} from database", expense_id);
        let mut stmt = conn
            .prepare(
                "SELECT c.id, c.name
                 FROM category AS c
                 INNER JOIN expense_category AS ec ON c.id = ec.category_id
                 WHERE ec.expense_id = ?1
                 ORDER BY c.id",
            )
            .map_err(|e| StorageError::query(context(), e))?;
        let rows = stmt
            .query_map(params![expense_id], |row| {
                Ok(Category {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })
            .map_err(|e| StorageError::query(context(), e))?;

        let mut categories = Vec::new();
        for row in rows {
            categories.push(row.map_err(|e| StorageError::query(context(), e))?);
        }
        Ok(categories)
    }
}

impl ExpenseWriter for SqliteStore {
    fn find_description_id(&self, description: &str) -> Result<Option<RecordId>, StorageError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id FROM description WHERE description = ?1 ORDER BY id LIMIT 1",
            params![description],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| StorageError::query("failed to query description table", e))
    }

    fn create_description(&self, description: &str) -> Result<RecordId, StorageError> {
        let conn = self.conn()?;
        conn.query_row(
            "INSERT INTO description (description) VALUES (?1) RETURNING id",
            params![description],
            |row| row.get(0),
        )
        .map_err(|e| StorageError::query("failed to insert new description into database", e))
    }

    fn create_expense(&self, command: &CreateExpenseCommand) -> Result<RecordId, StorageError> {
        let amount = format_money(command.amount)?;
        let date = command
            .date
            .format(ISO_DATE)
            .map_err(|e| StorageError::Date(e.to_string()))?;
        let conn = self.conn()?;
        conn.query_row(
            "INSERT INTO expense (date, description_id, amount, comment) VALUES (?1, ?2, ?3, ?4) RETURNING id",
            params![date, command.description_id, amount, command.comment],
            |row| row.get(0),
        )
        .map_err(|e| StorageError::query("failed to insert new expense into database", e))
    }

    fn find_category_id(&self, name: &str) -> Result<Option<RecordId>, StorageError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id FROM category WHERE name = ?1 ORDER BY id LIMIT 1",
            params![name],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| StorageError::query("failed to query database for category", e))
    }

    fn create_category(&self, name: &str) -> Result<RecordId, StorageError> {
        let conn = self.conn()?;
        conn.query_row(
            "INSERT INTO category (name) VALUES (?1) RETURNING id",
            params![name],
            |row| row.get(0),
        )
        .map_err(|e| StorageError::query("failed to insert new category into database", e))
    }

    fn link_expense_category(&self, expense_id: RecordId, category_id: RecordId) -> Result<RecordId, StorageError> {
        let conn = self.conn()?;
        conn.query_row(
            "INSERT INTO expense_category (expense_id, category_id) VALUES (?1, ?2) RETURNING id",
            params![expense_id, category_id],
            |row| row.get(0),
        )
        .map_err(|e| StorageError::query("failed to insert new expense_category into database", e))
    }
}

impl ExpenseReader for SqliteStore {
    fn list_expenses(&self) -> Result<Vec<Expense>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT e.id, e.date, d.description, e.amount, e.comment
                 FROM expense AS e
                 INNER JOIN description AS d ON e.description_id = d.id
                 ORDER BY e.id",
            )
            .map_err(|e| StorageError::query("failed to select expenses from database", e))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, RecordId>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            })
            .map_err(|e| StorageError::query("failed to select expenses from database", e))?;

        let mut expenses = Vec::new();
        for row in rows {
            let (id, date, description, amount, comment) =
                row.map_err(|e| StorageError::query("failed to scan response from database", e))?;
            let date = Date::parse(&date, ISO_DATE).map_err(|e| StorageError::Date(e.to_string()))?;
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
            expense.categories = Self::categories_for(&conn, expense.id)?;
        }

        Ok(expenses)
    }

    fn ping(&self) -> Result<(), StorageError> {
        self.conn()?
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(|e| StorageError::query("failed to ping database", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Month;

    fn store() -> SqliteStore {
        SqliteStore::new(":memory:").unwrap()
    }

    #[test]
    fn test_sqlite_description_lookup_and_create() {
        let store = store();
        assert_eq!(store.find_description_id("does not exist").unwrap(), None);

        let id = store.create_description("a test description").unwrap();
        assert_eq!(store.find_description_id("a test description").unwrap(), Some(id));
        assert_eq!(store.find_description_id("does not exist").unwrap(), None);
    }

    #[test]
    fn test_sqlite_category_lookup_and_create() {
        let store = store();
        assert_eq!(store.find_category_id("test category").unwrap(), None);
        let id = store.create_category("test category").unwrap();
        assert_eq!(store.find_category_id("test category").unwrap(), Some(id));
    }

    #[test]
    fn test_sqlite_duplicate_descriptions_resolve_to_lowest_id() {
        let store = store();
        let first = store.create_description("dup").unwrap();
        let second = store.create_description("dup").unwrap();
        assert!(second > first);
        assert_eq!(store.find_description_id("dup").unwrap(), Some(first));
    }

    #[test]
    fn test_sqlite_expense_amount_is_stored_as_money_text() {
        let store = store();
        let did = store.create_description("test desc").unwrap();
        let eid = store
            .create_expense(&CreateExpenseCommand {
                date: Date::from_calendar_date(2022, Month::February, 21).unwrap(),
                description_id: did,
                amount: 25.08,
                comment: "test comment".to_string(),
            })
            .unwrap();

        let conn = store.conn().unwrap();
        let (date, stored_did, amount, comment): (String, RecordId, String, String) = conn
            .query_row(
                "SELECT date, description_id, amount, comment FROM expense WHERE id = ?1",
                params![eid],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .unwrap();
        assert_eq!(date, "2022-02-21");
        assert_eq!(stored_did, did);
        assert_eq!(amount, "$25.08");
        assert_eq!(parse_money(&amount).unwrap(), 25.08);
        assert_eq!(comment, "test comment");
    }

    #[test]
    fn test_sqlite_expense_with_unknown_description_fails() {
        let store = store();
        let result = store.create_expense(&CreateExpenseCommand {
            date: Date::from_calendar_date(2022, Month::February, 21).unwrap(),
            description_id: 5,
            amount: 25.08,
            comment: "test comment".to_string(),
        });
        assert!(matches!(result, Err(StorageError::Query { .. })));
    }

    #[test]
    fn test_sqlite_list_all_expenses() {
        let store = store();
        let desc = store.create_description("test desc").unwrap();
        let other_desc = store.create_description("another desc").unwrap();
        let cat = store.create_category("test cat").unwrap();
        let cat2 = store.create_category("cat 2").unwrap();
        let cat3 = store.create_category("cat 3").unwrap();
        let date = Date::from_calendar_date(2022, Month::February, 26).unwrap();

        let e1 = store
            .create_expense(&CreateExpenseCommand {
                date,
                description_id: desc,
                amount: 105.65,
                comment: "test comment".to_string(),
            })
            .unwrap();
        let e2 = store
            .create_expense(&CreateExpenseCommand {
                date,
                description_id: other_desc,
                amount: -4.88,
                comment: "test comment 2".to_string(),
            })
            .unwrap();
        store.link_expense_category(e1, cat).unwrap();
        store.link_expense_category(e2, cat3).unwrap();
        store.link_expense_category(e2, cat2).unwrap();

        let expenses = store.list_expenses().unwrap();
        assert_eq!(
            expenses,
            vec![
                Expense {
                    id: e1,
                    date: "02-26-2022".to_string(),
                    description: "test desc".to_string(),
                    amount: 105.65,
                    categories: vec![Category { id: cat, name: "test cat".to_string() }],
                    comment: "test comment".to_string(),
                },
                Expense {
                    id: e2,
                    date: "02-26-2022".to_string(),
                    description: "another desc".to_string(),
                    amount: -4.88,
                    categories: vec![
                        Category { id: cat2, name: "cat 2".to_string() },
                        Category { id: cat3, name: "cat 3".to_string() },
                    ],
                    comment: "test comment 2".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_sqlite_list_fails_on_unparseable_amount() {
        let store = store();
        let did = store.create_description("d").unwrap();
        {
            let conn = store.conn().unwrap();
            conn.execute(
                "INSERT INTO expense (date, description_id, amount, comment) VALUES ('2022-02-21', ?1, 'twelve', '')",
                params![did],
            )
            .unwrap();
        }
        assert!(matches!(store.list_expenses(), Err(StorageError::Amount(_))));
    }

    #[test]
    fn test_sqlite_ping() {
        store().ping().unwrap();
    }
}
