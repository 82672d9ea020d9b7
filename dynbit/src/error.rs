use std::sync::PoisonError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {

    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Static misconfiguration of a model or field, raised at declaration or first use.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested name matches no static field and no dynamic field pattern.
    #[error("No such field: {0}")]
    NoSuchField(String),

    #[error("Usage error: {0}")]
    Usage(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Wrong type for key `{key}`: expected {expected}, found {found}")]
    WrongType { key: String, expected: &'static str, found: &'static str },

    #[error("Unexpected reply: expected {expected}, got {got}")]
    UnexpectedReply { expected: &'static str, got: String },

    #[error("Custom error: {0}")]
    Custom(String),
}

impl AppError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        AppError::Configuration(msg.into())
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        AppError::Usage(msg.into())
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, AppError::Configuration(_))
    }

    pub fn is_no_such_field(&self) -> bool {
        matches!(self, AppError::NoSuchField(_))
    }

    pub fn is_usage(&self) -> bool {
        matches!(self, AppError::Usage(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }
}

impl<T> From<PoisonError<T>> for AppError
{
    fn from(e: PoisonError<T>) -> Self {
        AppError::Custom(format!("Poison error: {:?}", e.to_string()))
    }
}

impl From<regex::Error> for AppError {
    fn from(e: regex::Error) -> Self {
        AppError::Configuration(format!("invalid field name pattern: {}", e))
    }
}
