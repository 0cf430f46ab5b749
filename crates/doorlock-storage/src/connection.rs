//! SQLite pool for the card registry.
//!
//! The registry is small and read-mostly: one scan means two indexed lookups.
//! The pool therefore stays small, and a file database is always created on
//! first use and brought up to date with the embedded migrations.

use crate::error::{StorageError, StorageResult};
use doorlock_core::config::RegistryConfig;
use sqlx::ConnectOptions;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Where the registry lives and how many connections may read it at once.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path of the SQLite file; parent directories are created as needed.
    pub path: String,

    /// Upper bound of pooled connections.
    pub max_connections: u32,

    /// How long a statement waits on a lock held by another writer.
    pub busy_timeout: Duration,
}

impl DatabaseConfig {
    /// Settings for the file at `path` with the registry's pool defaults.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            max_connections: 4,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&RegistryConfig> for DatabaseConfig {
    fn from(config: &RegistryConfig) -> Self {
        Self::new(config.database.clone())
    }
}

/// Handle to the registry database. Clones share the pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open the registry file and apply pending migrations.
    ///
    /// ```no_run
    /// use doorlock_storage::{Database, DatabaseConfig};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let db = Database::new(DatabaseConfig::new("/var/lib/doorlock/registry.db")).await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    /// `Configuration` if the directory cannot be created or the path is not
    /// a valid SQLite URL, `Database`/`Migration` if opening or migrating fails.
    pub async fn new(config: DatabaseConfig) -> StorageResult<Self> {
        if let Some(parent) = Path::new(&config.path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Configuration(format!(
                    "Cannot create registry directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", config.path))
            .map_err(|e| StorageError::Configuration(format!("Invalid registry path: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(config.busy_timeout)
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        info!(path = %config.path, "Registry database opened");
        Ok(db)
    }

    /// Migrated private database that disappears with the handle.
    pub async fn in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        // Every connection to :memory: is a separate database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Apply the embedded migrations; already applied ones are skipped.
    pub async fn migrate(&self) -> StorageResult<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Wait for checked-out connections to return, then close the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
