//! The FIM database service object.

use crate::config::{Config, StorageMode};
use crate::entity::{Entity, EntityKind, EntryKey};
use crate::error::{CoreError, CoreResult};
use crate::lock::DbLock;
use crate::logging::{LogCallback, LogLevel, Logger};
use crate::remote::{RemoteSync, SyncCallback};
use crate::schema;
use crate::store::{SnapshotStore, StorageAdapter, StoreOptions};
use crate::transaction::{ChangeCallback, Transaction, TransactionManager};
use crate::types::Table;
use fimdb_storage::{FileBackend, InMemoryBackend, StorageBackend};
use std::fmt;
use std::sync::Arc;

/// Host callbacks registered at init.
#[derive(Clone, Default)]
pub struct Callbacks {
    /// Receives synchronization messages.
    pub sync: Option<SyncCallback>,
    /// Receives log messages.
    pub log: Option<LogCallback>,
}

impl Callbacks {
    /// No callbacks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sync callback.
    #[must_use]
    pub fn sync(mut self, callback: SyncCallback) -> Self {
        self.sync = Some(callback);
        self
    }

    /// Sets the log callback.
    #[must_use]
    pub fn log(mut self, callback: LogCallback) -> Self {
        self.log = Some(callback);
        self
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("sync", &self.sync.is_some())
            .field("log", &self.log.is_some())
            .finish()
    }
}

/// An open FIM database.
///
/// Owns the snapshot store, the transaction manager and the remote
/// synchronization handle. Dropping it releases the on-disk lock.
///
/// ```rust
/// use fimdb_core::{Callbacks, Config, Entity, FileAttributes, FileEntry, FimDb};
///
/// let db = FimDb::open(Config::in_memory(), Callbacks::new()).unwrap();
/// let mut txn = db.start_transaction("file_entry").unwrap();
/// let entry = Entity::from(FileEntry::new("/etc/hosts", FileAttributes::default()));
/// txn.sync_row(&entry).unwrap();
/// assert_eq!(txn.get_deleted_rows(|_| {}).unwrap(), 0);
/// txn.close().unwrap();
/// ```
pub struct FimDb {
    config: Config,
    store: Arc<SnapshotStore>,
    manager: TransactionManager,
    remote: RemoteSync,
    logger: Logger,
    _lock: Option<DbLock>,
}

impl FimDb {
    /// Opens the database, reporting failure through the log callback.
    ///
    /// On failure the error is logged as `"DB error, ..."` at
    /// [`LogLevel::ErrorExit`] and `None` is returned.
    #[must_use]
    pub fn init(config: Config, callbacks: Callbacks) -> Option<Self> {
        let logger = Logger::new(callbacks.log.clone());
        match Self::open(config, callbacks) {
            Ok(db) => Some(db),
            Err(e) => {
                logger.log(LogLevel::ErrorExit, &format!("DB error, {e}"));
                None
            }
        }
    }

    /// Opens the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is locked by another handle, the
    /// journal cannot be read or is corrupt, or the schema is inconsistent.
    pub fn open(config: Config, callbacks: Callbacks) -> CoreResult<Self> {
        let logger = Logger::new(callbacks.log);

        let (backend, lock): (Box<dyn StorageBackend>, Option<DbLock>) = match &config.storage {
            StorageMode::Memory => (Box::new(InMemoryBackend::new()), None),
            StorageMode::Disk(path) => {
                let backend = FileBackend::open_with_create_dirs(path)?;
                let lock = DbLock::acquire(path)?;
                (Box::new(backend), Some(lock))
            }
        };

        let store = SnapshotStore::open(backend, StoreOptions::from(&config))?;
        store.create_schema(&schema::create_statement(config.registry))?;
        check_key_columns(&store, config.registry)?;

        let store = Arc::new(store);
        let adapter: Arc<dyn StorageAdapter> = store.clone();
        let manager = TransactionManager::new(adapter, logger.clone());
        manager.set_row_limit(Table::FileEntry, config.file_limit)?;
        if config.registry {
            manager.set_row_limit(Table::RegistryValue, config.value_limit)?;
        }

        let remote = RemoteSync::new(config.sync_interval, callbacks.sync);
        tracing::info!(
            storage = ?config.storage,
            registry = config.registry,
            file_limit = config.file_limit,
            value_limit = config.value_limit,
            "FIM database opened"
        );

        Ok(Self {
            config,
            store,
            manager,
            remote,
            logger,
            _lock: lock,
        })
    }

    /// Builds the schema DDL for the enabled entity kinds.
    #[must_use]
    pub fn create_statement(registry: bool) -> String {
        schema::create_statement(registry)
    }

    /// Opens a transaction on the table named `table`.
    ///
    /// # Errors
    ///
    /// Returns `TableNotFound` for unknown or disabled tables and
    /// `TransactionInProgress` if the table already has one open.
    pub fn start_transaction(&self, table: &str) -> CoreResult<Transaction> {
        self.manager.start(table.parse()?)
    }

    /// Like [`FimDb::start_transaction`], reporting changes to `on_change`.
    ///
    /// # Errors
    ///
    /// Same as [`FimDb::start_transaction`].
    pub fn start_transaction_with_callback(
        &self,
        table: &str,
        on_change: ChangeCallback,
    ) -> CoreResult<Transaction> {
        self.manager.start_with_callback(table.parse()?, on_change)
    }

    /// Reads one entity by identity.
    ///
    /// # Errors
    ///
    /// Returns an error if its table is disabled or the row cannot be decoded.
    pub fn get_entry(&self, key: &EntryKey) -> CoreResult<Option<Entity>> {
        let table = key.table();
        self.store
            .get(table.name(), &key.to_row_key())?
            .map(|row| Entity::from_row(table, &row))
            .transpose()
    }

    /// Number of stored entities in `table`.
    ///
    /// # Errors
    ///
    /// Returns an error if the table is disabled.
    pub fn count_entries(&self, table: Table) -> CoreResult<u64> {
        self.store.count(table.name())
    }

    /// Removes one entity outside any scan, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if its table is disabled or the removal cannot be
    /// journaled.
    pub fn remove_entry(&self, key: &EntryKey) -> CoreResult<bool> {
        let removed = self.store.remove(key.table().name(), &key.to_row_key())?;
        if removed {
            self.logger
                .log(LogLevel::Debug, &format!("removed entry {key}"));
        }
        Ok(removed)
    }

    /// The configuration the database was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The remote synchronization handle.
    #[must_use]
    pub fn remote_sync(&self) -> &RemoteSync {
        &self.remote
    }

    /// The transaction manager.
    #[must_use]
    pub fn transaction_manager(&self) -> &TransactionManager {
        &self.manager
    }

    /// The underlying snapshot store.
    #[must_use]
    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }
}

impl fmt::Debug for FimDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FimDb")
            .field("config", &self.config)
            .field("remote", &self.remote)
            .finish_non_exhaustive()
    }
}

fn check_key_columns(store: &SnapshotStore, registry: bool) -> CoreResult<()> {
    for table in Table::ALL {
        if table.is_registry() && !registry {
            continue;
        }
        let kind = EntityKind::for_table(table);
        let schema = store
            .table_schema(table.name())
            .ok_or_else(|| CoreError::schema(format!("table {table} was not created")))?;
        if schema.primary_key != kind.key_columns() {
            return Err(CoreError::schema(format!(
                "table {table} keys on {:?}, entries are identified by {:?}",
                schema.primary_key,
                kind.key_columns()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{FileAttributes, FileEntry};

    #[test]
    fn registry_tables_follow_config() {
        let db = FimDb::open(Config::in_memory().registry(false), Callbacks::new()).unwrap();
        assert_eq!(db.store().table_names(), ["file_entry"]);
        assert!(matches!(
            db.start_transaction("registry_key"),
            Err(CoreError::TableNotFound { .. })
        ));

        let db = FimDb::open(Config::in_memory().registry(true), Callbacks::new()).unwrap();
        assert_eq!(db.store().table_names().len(), 3);
        db.start_transaction("registry_value").unwrap().close().unwrap();
    }

    #[test]
    fn disk_open_builds_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue").join("fim").join("db").join("fim.db");

        let config = Config::new().storage(StorageMode::Disk(path.clone()));
        let db = FimDb::open(config, Callbacks::new()).unwrap();
        assert!(path.is_file());
        assert!(DbLock::lock_path(&path).is_file());
        drop(db);
    }

    #[test]
    fn unknown_table_name() {
        let db = FimDb::open(Config::in_memory(), Callbacks::new()).unwrap();
        assert!(db.start_transaction("processes").is_err());
    }

    #[test]
    fn entry_helpers() {
        let db = FimDb::open(Config::in_memory(), Callbacks::new()).unwrap();
        let entry = Entity::from(FileEntry::new(
            "/etc/hosts",
            FileAttributes {
                size: 42,
                ..FileAttributes::default()
            },
        ));
        let mut txn = db.start_transaction("file_entry").unwrap();
        txn.sync_row(&entry).unwrap();
        txn.close().unwrap();

        let key = EntryKey::file("/etc/hosts");
        assert_eq!(db.get_entry(&key).unwrap(), Some(entry));
        assert_eq!(db.count_entries(Table::FileEntry).unwrap(), 1);
        assert!(db.remove_entry(&key).unwrap());
        assert!(!db.remove_entry(&key).unwrap());
        assert_eq!(db.get_entry(&key).unwrap(), None);
    }

    #[test]
    fn limits_are_applied() {
        let db = FimDb::open(Config::in_memory().file_limit(1), Callbacks::new()).unwrap();
        let mut txn = db.start_transaction("file_entry").unwrap();
        txn.sync_row(&Entity::from(FileEntry::new("/a", FileAttributes::default())))
            .unwrap();
        assert!(matches!(
            txn.sync_row(&Entity::from(FileEntry::new("/b", FileAttributes::default()))),
            Err(CoreError::RowLimitExceeded { limit: 1, .. })
        ));
    }
}
