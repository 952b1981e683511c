use std::sync::Arc;

use financeview_memory::InMemoryStore;
use financeview_postgres::{PostgresOptions, PostgresStore};
use financeview_sqlite::SqliteStore;

use crate::config::{ConfigError, StorageBackend, StorageConfig};

// Re-export core storage types so callers only need this module
pub use financeview_core::storage::{ExpenseReader, ExpenseStore, ExpenseWriter, StorageError};

pub type SharedStore = Arc<dyn ExpenseStore>;

#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to open {backend:?} store: {source}")]
    Storage {
        backend: StorageBackend,
        #[source]
        source: StorageError,
    },
}

/// Opens the configured backend. Blocking: the Postgres client connects synchronously.
pub fn open_store(config: &StorageConfig) -> Result<SharedStore, OpenError> {
    let backend = config.backend;
    let wrap = |source: StorageError| OpenError::Storage { backend, source };

    let store: SharedStore = match backend {
        StorageBackend::Postgres => {
            let options = PostgresOptions {
                init_schema: config.init_schema,
                statement_timeout: config.statement_timeout(),
            };
            Arc::new(PostgresStore::connect(config.require_url()?, &options).map_err(wrap)?)
        }
        StorageBackend::Sqlite => {
            Arc::new(SqliteStore::open(config.require_url()?, config.init_schema).map_err(wrap)?)
        }
        StorageBackend::Memory => Arc::new(InMemoryStore::new()),
    };

    tracing::info!(?backend, "Storage backend ready");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_memory_store() {
        let config = StorageConfig {
            backend: StorageBackend::Memory,
            ..StorageConfig::default()
        };
        let store = open_store(&config).unwrap();
        assert!(store.list_expenses().unwrap().is_empty());
    }

    #[test]
    fn test_open_sqlite_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("expenses.db");
        let config = StorageConfig {
            backend: StorageBackend::Sqlite,
            url: Some(path.to_str().unwrap().to_string()),
            ..StorageConfig::default()
        };
        let store = open_store(&config).unwrap();
        let id = store.create_description("rent").unwrap();
        assert_eq!(store.find_description_id("rent").unwrap(), Some(id));
    }

    #[test]
    fn test_open_postgres_without_url_fails() {
        let config = StorageConfig::default();
        assert!(matches!(
            open_store(&config),
            Err(OpenError::Config(ConfigError::MissingUrl(StorageBackend::Postgres)))
        ));
    }
}
