//! Storage error types
//!
//! Defines the error taxonomy for the storage core. Every failure that
//! crosses the crate boundary carries the engine's diagnostic text; absence
//! of a row in a lookup is not an error (see
//! [`Database::get_from_local_storage`](crate::Database::get_from_local_storage)).

use thiserror::Error;

/// Storage error type
#[derive(Debug, Error)]
pub enum StorageError {
    /// The connection could not be established. Fatal to the instance.
    #[error("Failed to open database: {0}")]
    Open(String),

    #[error("Wrong encryption key or database not encrypted")]
    WrongKeyOrNotEncrypted,

    #[error("Database encryption error: {0}")]
    Encryption(String),

    #[error("Database connection error: {0}")]
    Connection(String),

    /// Operation issued after the connection was closed.
    #[error("Connection is closed")]
    ConnectionClosed,

    /// Statement preparation failed: malformed SQL or closed connection.
    #[error("Failed to prepare statement: {0}")]
    Prepare(String),

    #[error("Database query error: {0}")]
    Query(String),

    /// Begin/commit/rollback failure. A failed commit has already triggered
    /// a rollback attempt by the time this surfaces.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Migration precondition violated: the stored user-version marker does
    /// not match the version the migration set starts from.
    #[error("Schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch { expected: i32, found: i32 },

    /// The engine refused the reset-database defensive-config toggle.
    #[error("Failed to toggle reset database mode: {0}")]
    ResetConfig(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Rusqlite(#[from] rusqlite::Error),
}

/// Storage result type
pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    /// Check if this error is transient lock contention worth retrying.
    ///
    /// Only SQLite BUSY and LOCKED conditions qualify; everything else in
    /// the taxonomy indicates a caller bug or an instance-fatal state.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Rusqlite(err) => matches!(
                err.sqlite_error_code(),
                Some(rusqlite::ErrorCode::DatabaseBusy)
                    | Some(rusqlite::ErrorCode::DatabaseLocked)
            ),
            _ => false,
        }
    }

    /// Check if this error leaves the instance unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Open(_)
                | Self::WrongKeyOrNotEncrypted
                | Self::Encryption(_)
                | Self::ConnectionClosed
                | Self::ResetConfig(_)
        )
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for error.
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::Open("unable to open database file".to_string());
        assert_eq!(err.to_string(), "Failed to open database: unable to open database file");

        let err = StorageError::WrongKeyOrNotEncrypted;
        assert_eq!(err.to_string(), "Wrong encryption key or database not encrypted");

        let err = StorageError::ConnectionClosed;
        assert_eq!(err.to_string(), "Connection is closed");
    }

    #[test]
    fn test_schema_version_mismatch_display() {
        let err = StorageError::SchemaVersionMismatch { expected: 11, found: 10 };
        assert_eq!(err.to_string(), "Schema version mismatch: expected 11, found 10");
    }

    #[test]
    fn test_error_retryability() {
        assert!(!StorageError::WrongKeyOrNotEncrypted.is_retryable());
        assert!(!StorageError::Prepare("syntax error".to_string()).is_retryable());
        assert!(!StorageError::SchemaVersionMismatch { expected: 2, found: 1 }.is_retryable());
    }

    #[test]
    fn test_error_fatality() {
        assert!(StorageError::Open("io error".to_string()).is_fatal());
        assert!(StorageError::WrongKeyOrNotEncrypted.is_fatal());
        assert!(StorageError::ConnectionClosed.is_fatal());
        assert!(!StorageError::Prepare("syntax error".to_string()).is_fatal());
        assert!(!StorageError::SchemaVersionMismatch { expected: 2, found: 1 }.is_fatal());
    }
}
