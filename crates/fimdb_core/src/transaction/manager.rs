//! Transaction manager.

use crate::error::{CoreError, CoreResult};
use crate::logging::Logger;
use crate::store::StorageAdapter;
use crate::transaction::state::{ActiveSlot, ChangeCallback, Transaction};
use crate::types::Table;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Opens scoped transactions over a [`StorageAdapter`].
///
/// At most one transaction may be open per table. A second `start` on a busy
/// table is refused with `TransactionInProgress`; it never waits.
pub struct TransactionManager {
    adapter: Arc<dyn StorageAdapter>,
    active: Arc<Mutex<HashSet<Table>>>,
    logger: Logger,
}

impl TransactionManager {
    /// Creates a manager over `adapter`.
    pub fn new(adapter: Arc<dyn StorageAdapter>, logger: Logger) -> Self {
        Self {
            adapter,
            active: Arc::new(Mutex::new(HashSet::new())),
            logger,
        }
    }

    /// Returns the underlying adapter.
    #[must_use]
    pub fn adapter(&self) -> &Arc<dyn StorageAdapter> {
        &self.adapter
    }

    /// Sets the row limit of `table` (0 = unlimited).
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist in the store.
    pub fn set_row_limit(&self, table: Table, limit: u64) -> CoreResult<()> {
        self.adapter.set_table_max_rows(table.name(), limit)?;
        tracing::debug!(%table, limit, "row limit set");
        Ok(())
    }

    /// Whether a transaction is currently open on `table`.
    #[must_use]
    pub fn is_active(&self, table: Table) -> bool {
        self.active.lock().contains(&table)
    }

    /// Opens a transaction on `table`.
    ///
    /// # Errors
    ///
    /// - `TransactionInProgress` if `table` already has an open transaction
    /// - `TableNotFound` if the store has no such table
    /// - a storage error if the store cannot record the transaction
    pub fn start(&self, table: Table) -> CoreResult<Transaction> {
        self.open(table, None)
    }

    /// Opens a transaction whose inserts, modifications and deletions are
    /// also reported to `on_change`.
    ///
    /// # Errors
    ///
    /// Same as [`TransactionManager::start`].
    pub fn start_with_callback(
        &self,
        table: Table,
        on_change: ChangeCallback,
    ) -> CoreResult<Transaction> {
        self.open(table, Some(on_change))
    }

    fn open(&self, table: Table, on_change: Option<ChangeCallback>) -> CoreResult<Transaction> {
        let slot = {
            let mut active = self.active.lock();
            if !active.insert(table) {
                return Err(CoreError::TransactionInProgress {
                    table: table.name().to_string(),
                });
            }
            ActiveSlot::new(table, Arc::clone(&self.active))
        };
        let handle = self.adapter.begin_transaction(table.name())?;
        tracing::debug!(txn = %handle, %table, "transaction started");
        Ok(Transaction::new(
            handle,
            table,
            Arc::clone(&self.adapter),
            self.logger.clone(),
            on_change,
            slot,
        ))
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("active", &*self.active.lock())
            .finish_non_exhaustive()
    }
}
