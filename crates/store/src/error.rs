use domain::RepositoryError;
use thiserror::Error;

/// Errors raised inside the PostgreSQL adapter.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored row does not describe a valid entity.
    #[error("Corrupt {entity} row: {detail}")]
    Corrupt { entity: &'static str, detail: String },
}

impl StoreError {
    pub(crate) fn corrupt(entity: &'static str, detail: impl ToString) -> Self {
        StoreError::Corrupt {
            entity,
            detail: detail.to_string(),
        }
    }
}

impl From<StoreError> for RepositoryError {
    fn from(e: StoreError) -> Self {
        RepositoryError::Storage(Box::new(e))
    }
}

/// Result type for adapter internals.
pub type Result<T> = std::result::Result<T, StoreError>;
