use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A unique constraint rejected the write; carries the offending column.
    #[error("Duplicate value for {0}")]
    DuplicateKey(String),

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A query expected exactly one row but found none.
    #[error("Record not found")]
    NotFound,

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// A stored document could not be encoded or decoded.
    #[error("Document error: {0}")]
    Document(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Map a failed write, turning unique-constraint violations into
/// [`StoreError::DuplicateKey`].
pub(crate) fn map_write_error(err: rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(code, Some(message)) = &err {
        if code.code == rusqlite::ErrorCode::ConstraintViolation && message.contains("UNIQUE") {
            // "UNIQUE constraint failed: specimens.occurrence_id"
            let column = message
                .rsplit('.')
                .next()
                .unwrap_or(message.as_str())
                .to_string();
            return StoreError::DuplicateKey(column);
        }
    }
    StoreError::Sqlite(err)
}
