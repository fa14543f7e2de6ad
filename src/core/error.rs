use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Concurrency conflict: {type_name} '{key}' was changed by another writer")]
    ConcurrencyConflict { type_name: String, key: String },

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Commit failed: {0}")]
    Commit(#[source] Box<DbError>),

    #[error("Schema error on '{type_name}': {message}")]
    Schema { type_name: String, message: String },

    #[error("Reader unavailable: {0}")]
    ReaderUnavailable(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

impl DbError {
    /// Wraps a schema failure with the name of the type being reconciled.
    pub fn schema(type_name: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Schema {
            type_name: type_name.into(),
            message: err.to_string(),
        }
    }

    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

impl<T> From<std::sync::PoisonError<T>> for DbError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Driver(err.to_string())
    }
}
