//! Error types for SQLite operations.

use thiserror::Error;
use tiller_migrate::MigrationError;

/// Result type for SQLite operations.
pub type SqliteResult<T> = Result<T, SqliteError>;

/// Error type for SQLite operations.
#[derive(Debug, Error)]
pub enum SqliteError {
    /// SQLite driver error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Transaction misuse, e.g. commit without begin.
    #[error("Transaction error: {0}")]
    Transaction(String),
}

impl SqliteError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a transaction error.
    pub fn transaction(msg: impl Into<String>) -> Self {
        Self::Transaction(msg.into())
    }
}

impl From<rusqlite::Error> for SqliteError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Sqlite(tokio_rusqlite::Error::Rusqlite(err))
    }
}

impl From<SqliteError> for MigrationError {
    fn from(err: SqliteError) -> Self {
        match err {
            SqliteError::Config(msg) | SqliteError::Connection(msg) => {
                MigrationError::connection(msg)
            }
            SqliteError::Sqlite(tokio_rusqlite::Error::ConnectionClosed) => {
                MigrationError::connection("connection closed")
            }
            SqliteError::Sqlite(e) => MigrationError::database(e.to_string()),
            SqliteError::Transaction(msg) => MigrationError::database(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SqliteError::config("invalid path");
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("invalid path"));
    }

    #[test]
    fn test_error_conversion() {
        let err: MigrationError = SqliteError::connection("unable to open").into();
        assert!(matches!(err, MigrationError::ConnectionFailure(_)));

        let err: MigrationError = SqliteError::from(rusqlite::Error::InvalidQuery).into();
        assert!(matches!(err, MigrationError::Database(_)));

        let err: MigrationError = SqliteError::transaction("no transaction is open").into();
        assert!(matches!(err, MigrationError::Database(msg) if msg.contains("no transaction")));
    }
}
