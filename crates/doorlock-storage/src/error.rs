use thiserror::Error;

/// Errors raised by the card/user registry.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database connection or query execution failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration execution failed
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A record with the same unique key already exists
    #[error("Duplicate {entity}: {value}")]
    Duplicate { entity: &'static str, value: String },

    /// Entity not found
    #[error("Entity not found: {entity} with {field}={value}")]
    NotFound {
        entity: &'static str,
        field: &'static str,
        value: String,
    },

    /// Invalid database location or pool settings
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl StorageError {
    pub fn duplicate(entity: &'static str, value: impl Into<String>) -> Self {
        Self::Duplicate {
            entity,
            value: value.into(),
        }
    }

    pub fn not_found(entity: &'static str, field: &'static str, value: impl ToString) -> Self {
        Self::NotFound {
            entity,
            field,
            value: value.to_string(),
        }
    }

    /// Map a unique-constraint violation to [`StorageError::Duplicate`].
    pub(crate) fn from_insert(error: sqlx::Error, entity: &'static str, value: &str) -> Self {
        match &error {
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::duplicate(entity, value),
            _ => Self::Database(error),
        }
    }
}

/// Specialized result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
