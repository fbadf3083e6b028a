//! The scoped transaction object.

use crate::diff::ChangeEvent;
use crate::error::CoreResult;
use crate::logging::Logger;
use crate::store::StorageAdapter;
use crate::types::{Table, TxnHandle};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Receives insert, modify and delete events of a transaction.
pub type ChangeCallback = Box<dyn FnMut(ChangeEvent) + Send>;

/// Where a transaction is in its scan cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Accepting rows.
    Active,
    /// Deleted rows have been computed. Rows synced from here on were
    /// already judged for deletion.
    Enumerated,
    /// The handle has been released.
    Closed,
}

/// Per-scan counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxnStats {
    /// New identities stored.
    pub inserted: u64,
    /// Existing identities whose attributes changed.
    pub modified: u64,
    /// Existing identities resubmitted unchanged.
    pub unchanged: u64,
    /// Rows refused because the table was full.
    pub rejected: u64,
    /// Rows reported deleted.
    pub deleted: u64,
}

/// Releases a table's "in transaction" mark when dropped.
pub(crate) struct ActiveSlot {
    table: Table,
    active: Arc<Mutex<HashSet<Table>>>,
}

impl ActiveSlot {
    pub(crate) fn new(table: Table, active: Arc<Mutex<HashSet<Table>>>) -> Self {
        Self { table, active }
    }
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        self.active.lock().remove(&self.table);
    }
}

/// One scan cycle over one table.
///
/// Created by [`crate::TransactionManager::start`]. Rows are submitted with
/// [`Transaction::sync_row`], vanished rows are collected with
/// [`Transaction::get_deleted_rows`], and the handle is released by
/// [`Transaction::close`] or when the transaction is dropped.
pub struct Transaction {
    pub(crate) handle: TxnHandle,
    pub(crate) table: Table,
    pub(crate) state: TransactionState,
    pub(crate) stats: TxnStats,
    pub(crate) adapter: Arc<dyn StorageAdapter>,
    pub(crate) logger: Logger,
    pub(crate) on_change: Option<ChangeCallback>,
    _slot: ActiveSlot,
}

impl Transaction {
    pub(crate) fn new(
        handle: TxnHandle,
        table: Table,
        adapter: Arc<dyn StorageAdapter>,
        logger: Logger,
        on_change: Option<ChangeCallback>,
        slot: ActiveSlot,
    ) -> Self {
        Self {
            handle,
            table,
            state: TransactionState::Active,
            stats: TxnStats::default(),
            adapter,
            logger,
            on_change,
            _slot: slot,
        }
    }

    /// Returns the adapter handle.
    #[must_use]
    pub fn handle(&self) -> TxnHandle {
        self.handle
    }

    /// Returns the table this transaction is bound to.
    #[must_use]
    pub fn table(&self) -> Table {
        self.table
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Returns the counters accumulated so far.
    #[must_use]
    pub fn stats(&self) -> TxnStats {
        self.stats
    }

    /// Closes the transaction and releases its handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot record the close.
    pub fn close(mut self) -> CoreResult<()> {
        self.release()
    }

    fn release(&mut self) -> CoreResult<()> {
        if self.state == TransactionState::Closed {
            return Ok(());
        }
        self.state = TransactionState::Closed;
        tracing::debug!(
            txn = %self.handle,
            table = %self.table,
            inserted = self.stats.inserted,
            modified = self.stats.modified,
            unchanged = self.stats.unchanged,
            rejected = self.stats.rejected,
            deleted = self.stats.deleted,
            "closing transaction"
        );
        self.adapter.close_transaction(self.handle)
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            self.logger.error(&format!("DB error, closing {}: {e}", self.handle));
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("handle", &self.handle)
            .field("table", &self.table)
            .field("state", &self.state)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
