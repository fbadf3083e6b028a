//! Storage adapter: the contract the diff engine needs from a store.
//!
//! The engine only ever asks for five things: create the schema, open a
//! table-scoped transaction, upsert a row while marking it touched, stream the
//! rows nobody touched, and close the transaction. [`StorageAdapter`] names
//! that contract; [`SnapshotStore`] is the journal-backed implementation used
//! by [`crate::FimDb`].

mod snapshot;
mod table;

pub use snapshot::{SnapshotStore, StoreOptions};

use crate::error::CoreResult;
use crate::schema::TableSchema;
use crate::types::TxnHandle;
use std::fmt;

/// Composite primary key of a stored row.
///
/// One component per primary key column, in schema order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowKey(Vec<String>);

impl RowKey {
    /// Creates a key from its components.
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    /// Returns the key components.
    #[must_use]
    pub fn parts(&self) -> &[String] {
        &self.0
    }

    /// Returns the number of components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the key has no components.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [single] => f.write_str(single),
            parts => write!(f, "({})", parts.join(", ")),
        }
    }
}

/// A stored row: identity plus encoded attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// Primary key.
    pub key: RowKey,
    /// Encoded attribute payload.
    pub payload: Vec<u8>,
}

impl Row {
    /// Creates a row.
    #[must_use]
    pub fn new(key: RowKey, payload: Vec<u8>) -> Self {
        Self { key, payload }
    }
}

/// What an upsert did to the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The identity was unseen and a row was created.
    Inserted,
    /// The identity existed and its attributes changed.
    Modified,
    /// The identity existed with identical attributes.
    Unchanged,
}

/// Contract between the diff engine and the underlying store.
///
/// Implementations serialize access internally; every method blocks until the
/// store operation completes. Callbacks passed to
/// [`StorageAdapter::enumerate_untouched`] are never invoked while internal
/// locks are held, so they may call back into the adapter.
pub trait StorageAdapter: Send + Sync {
    /// Ensures every table described by `ddl` exists.
    ///
    /// Re-creating a table with the same definition is a no-op.
    ///
    /// # Errors
    ///
    /// Returns a schema error if the DDL is invalid or redefines an existing
    /// table differently.
    fn create_schema(&self, ddl: &str) -> CoreResult<()>;

    /// Returns the schema of `table`, if it exists.
    fn table_schema(&self, table: &str) -> Option<TableSchema>;

    /// Returns the names of all tables, sorted.
    fn table_names(&self) -> Vec<String>;

    /// Sets the maximum row count of `table` (0 = unlimited).
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist.
    fn set_table_max_rows(&self, table: &str, max_rows: u64) -> CoreResult<()>;

    /// Opens a transaction scoped to `table`.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist or the transaction cannot
    /// be recorded.
    fn begin_transaction(&self, table: &str) -> CoreResult<TxnHandle>;

    /// Inserts or replaces `row` and marks it touched.
    ///
    /// # Errors
    ///
    /// - `RowLimitExceeded` if the row is new and the table is full
    /// - a transaction error if the handle is not open or the key does not
    ///   fit the table's primary key
    /// - a storage error if the journal write fails
    fn upsert(&self, txn: TxnHandle, row: Row) -> CoreResult<UpsertOutcome>;

    /// Hands every row of the transaction's table that was not touched to
    /// `callback`, in storage order, and removes each row the callback
    /// accepted.
    ///
    /// Rows delivered before a failure stay delivered and removed. The row
    /// whose callback failed stays stored, as does a row whose removal could
    /// not be journaled after delivery; both are handed out again by the
    /// next enumeration.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is not open, a removal cannot be
    /// journaled, or `callback` fails.
    fn enumerate_untouched(
        &self,
        txn: TxnHandle,
        callback: &mut dyn FnMut(Row) -> CoreResult<()>,
    ) -> CoreResult<()>;

    /// Closes the transaction; its handle becomes invalid.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is not open or the journal cannot be
    /// flushed.
    fn close_transaction(&self, txn: TxnHandle) -> CoreResult<()>;

    /// Reads one row by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist.
    fn get(&self, table: &str, key: &RowKey) -> CoreResult<Option<Row>>;

    /// Returns the number of rows in `table`.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist.
    fn count(&self, table: &str) -> CoreResult<u64>;

    /// Removes one row outside any transaction, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist or the removal cannot be
    /// journaled.
    fn remove(&self, table: &str, key: &RowKey) -> CoreResult<bool>;
}
