//! Storage implementations.

use std::sync::Arc;

use tracing::{error, info};

use crate::config::{StorageConfig, StorageType};
use crate::interfaces::{ResponseStore, StorageError};

pub mod helpers;
pub mod idempotency;
pub mod schema;
pub mod sql;

#[cfg(feature = "postgres")]
pub use sql::postgres::PostgresResponseStore;
#[cfg(feature = "sqlite")]
pub use sql::sqlite::SqliteResponseStore;

/// SQLite path that keeps the database in process memory.
pub const SQLITE_MEMORY_PATH: &str = ":memory:";

/// Initialize storage based on configuration.
///
/// Connects with exponential backoff while the failure is transient, then
/// applies migrations.
pub async fn init_storage(config: &StorageConfig) -> Result<Arc<dyn ResponseStore>, StorageError> {
    let store: Arc<dyn ResponseStore> = match config.storage_type {
        #[cfg(feature = "sqlite")]
        StorageType::Sqlite => {
            info!(storage = %config.storage_type, path = %config.sqlite.path, "Opening response store");
            Arc::new(SqliteResponseStore::new(connect_sqlite(config).await?))
        }
        #[cfg(feature = "postgres")]
        StorageType::Postgres => {
            info!(storage = %config.storage_type, "Opening response store");
            Arc::new(PostgresResponseStore::new(connect_postgres(config).await?))
        }
        #[allow(unreachable_patterns)]
        other => {
            error!(storage = %other, "Storage backend requested but its feature is not enabled");
            return Err(StorageError::Unavailable(format!(
                "{other} support is not compiled in"
            )));
        }
    };

    store.init_schema().await?;
    Ok(store)
}

#[cfg(feature = "sqlite")]
async fn connect_sqlite(config: &StorageConfig) -> Result<sqlx::SqlitePool, StorageError> {
    use std::time::Duration;

    use backon::Retryable;
    use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
    use tracing::warn;

    use crate::utils::retry::connection_backoff;

    let path = config.sqlite.path.as_str();
    let in_memory = path == SQLITE_MEMORY_PATH;

    let mut opts = SqliteConnectOptions::new()
        .filename(path)
        .busy_timeout(Duration::from_secs(config.busy_timeout_secs))
        .foreign_keys(true)
        .create_if_missing(true);

    let mut pool_opts = SqlitePoolOptions::new();
    if in_memory {
        // Each connection to :memory: is a separate database.
        pool_opts = pool_opts
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    } else {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StorageError::Unavailable(format!("cannot create {}: {e}", parent.display()))
                })?;
            }
        }
        opts = opts.journal_mode(SqliteJournalMode::Wal);
        pool_opts = pool_opts.max_connections(config.max_connections);
    }

    let pool = (|| {
        let opts = opts.clone();
        let pool_opts = pool_opts.clone();
        async move { pool_opts.connect_with(opts).await }
    })
    .retry(connection_backoff())
    .when(helpers::is_retryable)
    .notify(|err: &sqlx::Error, dur: Duration| {
        warn!(storage = "sqlite", error = %err, delay = ?dur, "Connection failed, retrying");
    })
    .await?;

    Ok(pool)
}

#[cfg(feature = "postgres")]
async fn connect_postgres(config: &StorageConfig) -> Result<sqlx::PgPool, StorageError> {
    use std::time::Duration;

    use backon::Retryable;
    use sqlx::postgres::PgPoolOptions;
    use tracing::warn;

    use crate::utils::retry::connection_backoff;

    let uri = config.postgres.uri.clone();
    let max_connections = config.max_connections;

    let pool = (|| {
        let uri = uri.clone();
        async move {
            PgPoolOptions::new()
                .max_connections(max_connections)
                .connect(&uri)
                .await
        }
    })
    .retry(connection_backoff())
    .when(helpers::is_retryable)
    .notify(|err: &sqlx::Error, dur: Duration| {
        warn!(storage = "postgres", error = %err, delay = ?dur, "Connection failed, retrying");
    })
    .await?;

    Ok(pool)
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::config::Config;

    #[tokio::test]
    async fn test_init_storage_in_memory() {
        let config = Config::for_test();
        let store = init_storage(&config.storage).await.unwrap();
        assert!(store.list_responses().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_init_storage_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::for_test();
        config.storage.sqlite.path = dir
            .path()
            .join("nested/responses.db")
            .to_string_lossy()
            .into_owned();

        let store = init_storage(&config.storage).await.unwrap();
        assert!(store.list_buckets(None).await.unwrap().is_empty());
        assert!(dir.path().join("nested/responses.db").exists());
    }

    #[cfg(not(feature = "postgres"))]
    #[tokio::test]
    async fn test_init_storage_rejects_disabled_backend() {
        let mut config = Config::for_test();
        config.storage.storage_type = StorageType::Postgres;
        assert!(matches!(
            init_storage(&config.storage).await,
            Err(StorageError::Unavailable(_))
        ));
    }
}
