//! Error types for the FIM database core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by the FIM database core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] fimdb_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The journal is damaged.
    #[error("journal corruption: {message}")]
    JournalCorruption {
        /// Description of the damage.
        message: String,
    },

    /// A journal record failed its CRC check.
    #[error("checksum mismatch at offset {offset}: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Offset of the record.
        offset: u64,
        /// Stored checksum.
        expected: u32,
        /// Computed checksum.
        actual: u32,
    },

    /// Attribute payload could not be encoded or decoded.
    #[error("codec error: {message}")]
    Codec {
        /// Codec failure detail.
        message: String,
    },

    /// The schema DDL is invalid or conflicts with an existing table.
    #[error("schema error: {message}")]
    Schema {
        /// What is wrong with the schema.
        message: String,
    },

    /// The on-disk database is held by another process.
    #[error("database locked: {path} is in use by another process")]
    DatabaseLocked {
        /// Path of the locked database.
        path: String,
    },

    /// Inserting a new row would exceed the table's limit.
    #[error("table {table} is full: limit of {limit} rows reached")]
    RowLimitExceeded {
        /// Table name.
        table: String,
        /// Configured limit.
        limit: u64,
    },

    /// The table does not exist in the schema.
    #[error("table not found: {name}")]
    TableNotFound {
        /// Requested table name.
        name: String,
    },

    /// The transaction handle is unknown or already closed.
    #[error("invalid transaction handle {handle}")]
    InvalidHandle {
        /// The offending handle.
        handle: u64,
    },

    /// A transaction is already open on the table.
    #[error("table {table} already has an active transaction")]
    TransactionInProgress {
        /// Table name.
        table: String,
    },

    /// Operation not permitted on this transaction.
    #[error("invalid transaction operation: {message}")]
    InvalidOperation {
        /// Why the operation was refused.
        message: String,
    },
}

/// Coarse classification of a [`CoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The store failed: I/O, corruption, codec or schema fault.
    Storage,
    /// The table reached its row limit.
    RowLimit,
    /// The handle or operation is not valid.
    Transaction,
}

impl CoreError {
    /// Creates a journal corruption error.
    pub fn journal_corruption(message: impl Into<String>) -> Self {
        Self::JournalCorruption {
            message: message.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates a schema error.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Creates a table-not-found error.
    pub fn table_not_found(name: impl Into<String>) -> Self {
        Self::TableNotFound { name: name.into() }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns the coarse kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RowLimitExceeded { .. } => ErrorKind::RowLimit,
            Self::TableNotFound { .. }
            | Self::InvalidHandle { .. }
            | Self::TransactionInProgress { .. }
            | Self::InvalidOperation { .. } => ErrorKind::Transaction,
            Self::Storage(_)
            | Self::Io(_)
            | Self::JournalCorruption { .. }
            | Self::ChecksumMismatch { .. }
            | Self::Codec { .. }
            | Self::Schema { .. }
            | Self::DatabaseLocked { .. } => ErrorKind::Storage,
        }
    }
}

/// Closed status set reported to the scan layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FimDbStatus {
    /// The operation succeeded.
    Ok,
    /// The table is at its row limit; stop feeding new rows.
    Full,
    /// The operation failed.
    Err,
}

impl FimDbStatus {
    /// Collapses an operation result into a status.
    pub fn of<T>(result: &CoreResult<T>) -> Self {
        match result {
            Ok(_) => Self::Ok,
            Err(err) if err.kind() == ErrorKind::RowLimit => Self::Full,
            Err(_) => Self::Err,
        }
    }
}
