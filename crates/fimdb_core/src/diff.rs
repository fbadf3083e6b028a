//! Change detection for a scan.
//!
//! [`Transaction::sync_row`] decides whether an observed entity is new,
//! modified or unchanged and stores it. [`Transaction::get_deleted_rows`]
//! reports every stored entity the scan did not observe, removing it from
//! the snapshot.

use crate::entity::Entity;
use crate::error::{CoreError, CoreResult, ErrorKind};
use crate::store::UpsertOutcome;
use crate::transaction::{Transaction, TransactionState};

/// What happened to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// First seen in this scan.
    Inserted,
    /// Seen before with different attributes.
    Modified,
    /// Stored before but not seen in this scan.
    Deleted,
}

/// A change reported to a transaction's change callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// What happened.
    pub kind: ChangeKind,
    /// The entity as stored after an insert or modify, or as last stored
    /// for a delete.
    pub entity: Entity,
}

impl Transaction {
    /// Stores an observed entity and marks it seen in this scan.
    ///
    /// # Errors
    ///
    /// - `RowLimitExceeded` if the entity is new and its table is full
    /// - `InvalidOperation` if the entity belongs to another table
    /// - a storage or codec error if the row cannot be written
    pub fn sync_row(&mut self, entity: &Entity) -> CoreResult<UpsertOutcome> {
        if self.state == TransactionState::Enumerated {
            self.logger.warn(&format!(
                "{}: row {} synced after deleted rows were collected",
                self.handle,
                entity.key()
            ));
        }

        match self.upsert(entity) {
            Ok(outcome) => {
                let kind = match outcome {
                    UpsertOutcome::Inserted => {
                        self.stats.inserted += 1;
                        Some(ChangeKind::Inserted)
                    }
                    UpsertOutcome::Modified => {
                        self.stats.modified += 1;
                        Some(ChangeKind::Modified)
                    }
                    UpsertOutcome::Unchanged => {
                        self.stats.unchanged += 1;
                        None
                    }
                };
                if let (Some(kind), Some(on_change)) = (kind, self.on_change.as_mut()) {
                    on_change(ChangeEvent {
                        kind,
                        entity: entity.clone(),
                    });
                }
                Ok(outcome)
            }
            Err(e) if e.kind() == ErrorKind::RowLimit => {
                self.stats.rejected += 1;
                tracing::debug!(txn = %self.handle, key = %entity.key(), "table full");
                Err(e)
            }
            Err(e) => {
                self.logger.error(&format!("DB error, {e}"));
                Err(e)
            }
        }
    }

    fn upsert(&self, entity: &Entity) -> CoreResult<UpsertOutcome> {
        if entity.table() != self.table {
            return Err(CoreError::invalid_operation(format!(
                "{} entity {} submitted to a {} transaction",
                entity.table(),
                entity.key(),
                self.table
            )));
        }
        let row = entity.to_row()?;
        self.adapter.upsert(self.handle, row)
    }

    /// Reports every stored entity of this table that was not synced in
    /// this transaction, removing each from the snapshot.
    ///
    /// `callback` runs once per deleted entity, synchronously, in key order.
    /// Returns the number of entities delivered.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or a row cannot be decoded.
    /// Entities delivered before the failure stay delivered and deleted.
    /// If journaling the removal of the entity just delivered fails, that
    /// entity stays in the snapshot and is reported again by the next scan,
    /// so delivery is at-least-once on that path.
    pub fn get_deleted_rows<F>(&mut self, mut callback: F) -> CoreResult<usize>
    where
        F: FnMut(Entity),
    {
        if self.state == TransactionState::Enumerated {
            self.logger.warn(&format!(
                "{}: deleted rows collected more than once",
                self.handle
            ));
        }
        self.state = TransactionState::Enumerated;

        let table = self.table;
        let stats = &mut self.stats;
        let on_change = &mut self.on_change;
        let mut delivered = 0usize;

        let result = self.adapter.enumerate_untouched(self.handle, &mut |row| {
            let entity = Entity::from_row(table, &row)?;
            stats.deleted += 1;
            delivered += 1;
            if let Some(on_change) = on_change.as_mut() {
                on_change(ChangeEvent {
                    kind: ChangeKind::Deleted,
                    entity: entity.clone(),
                });
            }
            callback(entity);
            Ok(())
        });

        match result {
            Ok(()) => {
                tracing::debug!(txn = %self.handle, delivered, "deleted rows collected");
                Ok(delivered)
            }
            Err(e) => {
                self.logger
                    .error(&format!("DB error, {e} (after {delivered} deleted rows)"));
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Arch, FileAttributes, FileEntry, RegistryKeyAttributes, RegistryKeyEntry};
    use crate::error::FimDbStatus;
    use crate::logging::Logger;
    use crate::schema::create_statement;
    use crate::store::{SnapshotStore, StorageAdapter};
    use crate::transaction::TransactionManager;
    use crate::types::Table;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn manager() -> TransactionManager {
        let store = SnapshotStore::in_memory();
        store.create_schema(&create_statement(true)).unwrap();
        TransactionManager::new(Arc::new(store), Logger::default())
    }

    fn file(path: &str, size: u64) -> Entity {
        Entity::File(FileEntry::new(
            path,
            FileAttributes {
                size,
                ..FileAttributes::default()
            },
        ))
    }

    #[test]
    fn outcomes_and_stats() {
        let manager = manager();
        let mut txn = manager.start(Table::FileEntry).unwrap();
        assert_eq!(txn.sync_row(&file("/a", 1)).unwrap(), UpsertOutcome::Inserted);
        assert_eq!(txn.sync_row(&file("/a", 1)).unwrap(), UpsertOutcome::Unchanged);
        assert_eq!(txn.sync_row(&file("/a", 2)).unwrap(), UpsertOutcome::Modified);
        let stats = txn.stats();
        assert_eq!((stats.inserted, stats.unchanged, stats.modified), (1, 1, 1));
    }

    #[test]
    fn entity_from_other_table_is_refused() {
        let manager = manager();
        let mut txn = manager.start(Table::FileEntry).unwrap();
        let key = Entity::RegistryKey(RegistryKeyEntry::new(
            Arch::X64,
            "HKEY_LOCAL_MACHINE\\Software",
            RegistryKeyAttributes::default(),
        ));
        let result = txn.sync_row(&key);
        assert!(matches!(result, Err(CoreError::InvalidOperation { .. })));
        assert_eq!(FimDbStatus::of(&result), FimDbStatus::Err);
    }

    #[test]
    fn full_table_reports_full() {
        let manager = manager();
        manager.set_row_limit(Table::FileEntry, 1).unwrap();
        let mut txn = manager.start(Table::FileEntry).unwrap();
        txn.sync_row(&file("/a", 1)).unwrap();
        let result = txn.sync_row(&file("/b", 1));
        assert_eq!(FimDbStatus::of(&result), FimDbStatus::Full);
        assert_eq!(txn.stats().rejected, 1);
    }

    #[test]
    fn deleted_rows_are_the_unsynced_ones() {
        let manager = manager();
        let mut txn = manager.start(Table::FileEntry).unwrap();
        for path in ["/a", "/b", "/c"] {
            txn.sync_row(&file(path, 7)).unwrap();
        }
        txn.close().unwrap();

        let mut txn = manager.start(Table::FileEntry).unwrap();
        txn.sync_row(&file("/b", 7)).unwrap();
        txn.sync_row(&file("/a", 7)).unwrap();
        let mut deleted = Vec::new();
        let count = txn.get_deleted_rows(|entity| deleted.push(entity)).unwrap();
        assert_eq!(count, 1);
        assert_eq!(deleted, vec![file("/c", 7)]);
        assert_eq!(txn.stats().deleted, 1);
        assert_eq!(txn.state(), TransactionState::Enumerated);
        assert_eq!(manager.adapter().count("file_entry").unwrap(), 2);
    }

    #[test]
    fn change_callback_sees_inserts_modifies_and_deletes() {
        let manager = manager();
        let mut txn = manager.start(Table::FileEntry).unwrap();
        txn.sync_row(&file("/a", 1)).unwrap();
        txn.sync_row(&file("/b", 1)).unwrap();
        txn.sync_row(&file("/d", 1)).unwrap();
        txn.close().unwrap();

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let mut txn = manager
            .start_with_callback(
                Table::FileEntry,
                Box::new(move |event: ChangeEvent| sink.lock().push(event.kind)),
            )
            .unwrap();
        txn.sync_row(&file("/a", 1)).unwrap();
        txn.sync_row(&file("/b", 2)).unwrap();
        txn.sync_row(&file("/c", 1)).unwrap();
        assert_eq!(txn.get_deleted_rows(|_| {}).unwrap(), 1);
        txn.close().unwrap();

        assert_eq!(
            *events.lock(),
            vec![ChangeKind::Modified, ChangeKind::Inserted, ChangeKind::Deleted]
        );
        assert_eq!(manager.adapter().count("file_entry").unwrap(), 3);
    }

    #[test]
    fn second_collection_finds_nothing() {
        let manager = manager();
        let mut txn = manager.start(Table::FileEntry).unwrap();
        txn.sync_row(&file("/a", 1)).unwrap();
        txn.close().unwrap();

        let mut txn = manager.start(Table::FileEntry).unwrap();
        assert_eq!(txn.get_deleted_rows(|_| {}).unwrap(), 1);
        assert_eq!(txn.get_deleted_rows(|_| {}).unwrap(), 0);
    }
}
