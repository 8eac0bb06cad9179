use thiserror::Error;

use crate::domain::entities::HandleState;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Invalid lock configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
    #[error("Lock '{name}' handle is no longer usable ({state})")]
    HandleConsumed { name: String, state: HandleState },
    #[error("The task is not executed under a lock: {0}")]
    NotLocked(String),
    #[error("Lock '{0}' could not be extended")]
    ExtensionFailed(String),
    #[error("Backend '{0}' does not support database time")]
    UnsupportedDbTime(String),
}

impl LockError {
    pub fn storage(message: impl Into<String>) -> Self {
        LockError::Storage {
            message: message.into(),
            source: None,
        }
    }

    pub fn storage_with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        LockError::Storage {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

impl From<sqlx::Error> for LockError {
    fn from(err: sqlx::Error) -> Self {
        let message = match &err {
            sqlx::Error::Database(db_err) => format!("Database error: {}", db_err.message()),
            sqlx::Error::PoolTimedOut => "Timed out waiting for a database connection".to_string(),
            other => other.to_string(),
        };
        LockError::storage_with_source(message, err)
    }
}

impl From<redis::RedisError> for LockError {
    fn from(err: redis::RedisError) -> Self {
        LockError::storage_with_source(format!("Redis error: {}", err), err)
    }
}

pub type LockResult<T> = Result<T, LockError>;
