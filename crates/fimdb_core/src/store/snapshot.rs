//! Journal-backed snapshot store.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::journal::{Journal, JournalRecord};
use crate::schema::{parse_ddl, TableSchema};
use crate::store::table::{digest, Table};
use crate::store::{Row, RowKey, StorageAdapter, UpsertOutcome};
use crate::types::TxnHandle;
use fimdb_storage::{InMemoryBackend, StorageBackend};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Durability and compaction settings of a [`SnapshotStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Force journal data to disk when a transaction closes.
    pub sync_on_close: bool,
    /// Journal size in bytes above which closing a transaction compacts it
    /// (0 = never).
    pub compact_threshold: u64,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for StoreOptions {
    fn from(config: &Config) -> Self {
        Self {
            sync_on_close: config.sync_on_close,
            compact_threshold: config.compact_threshold,
        }
    }
}

struct TxnContext {
    table: String,
    touched: HashSet<RowKey>,
}

struct Inner {
    tables: BTreeMap<String, Table>,
    txns: HashMap<TxnHandle, TxnContext>,
    next_handle: u64,
    journal: Journal,
    /// Rows replayed from the journal, waiting for their table to be created.
    recovered: BTreeMap<String, BTreeMap<RowKey, Vec<u8>>>,
}

impl Inner {
    fn table(&self, name: &str) -> CoreResult<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| CoreError::table_not_found(name))
    }

    fn table_mut(&mut self, name: &str) -> CoreResult<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| CoreError::table_not_found(name))
    }

    fn txn(&self, txn: TxnHandle) -> CoreResult<&TxnContext> {
        self.txns.get(&txn).ok_or(CoreError::InvalidHandle {
            handle: txn.as_u64(),
        })
    }

    /// One upsert per stored row, including replayed rows whose table has
    /// not been created yet.
    fn live_records(&self) -> Vec<JournalRecord> {
        let stored = self.tables.values().flat_map(|table| {
            table.rows().map(|row| JournalRecord::Upsert {
                table: table.name().to_string(),
                key: row.key,
                payload: row.payload,
            })
        });
        let pending = self.recovered.iter().flat_map(|(table, rows)| {
            rows.iter().map(|(key, payload)| JournalRecord::Upsert {
                table: table.clone(),
                key: key.clone(),
                payload: payload.clone(),
            })
        });
        stored.chain(pending).collect()
    }
}

/// The snapshot of the last scan: one in-memory table per entity kind, made
/// durable by an append-only [`Journal`].
///
/// Every mutation is journaled before it is applied. Opening a store replays
/// the journal; rows are adopted when [`StorageAdapter::create_schema`]
/// creates their table, and rows of tables the schema does not define are
/// dropped with a warning.
pub struct SnapshotStore {
    inner: Mutex<Inner>,
    options: StoreOptions,
}

impl SnapshotStore {
    /// Opens a store over `backend`, replaying whatever it already holds.
    ///
    /// A torn tail left by an interrupted append is cut off so that new
    /// records follow the last complete one.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal is corrupt or cannot be read.
    pub fn open(backend: Box<dyn StorageBackend>, options: StoreOptions) -> CoreResult<Self> {
        let mut journal = Journal::new(backend);
        let mut recovered: BTreeMap<String, BTreeMap<RowKey, Vec<u8>>> = BTreeMap::new();
        let mut last_handle = 0;
        let mut records = 0usize;

        let mut reader = journal.records()?;
        for item in reader.by_ref() {
            let (_, record) = item?;
            records += 1;
            match record {
                JournalRecord::Begin { txn, .. } | JournalRecord::Close { txn } => {
                    last_handle = last_handle.max(txn.as_u64());
                }
                JournalRecord::Upsert {
                    table,
                    key,
                    payload,
                } => {
                    recovered.entry(table).or_default().insert(key, payload);
                }
                JournalRecord::Delete { table, key } => {
                    if let Some(rows) = recovered.get_mut(&table) {
                        rows.remove(&key);
                    }
                }
            }
        }
        let valid_end = reader.offset();
        let size = journal.size()?;
        if valid_end < size {
            tracing::warn!(
                offset = valid_end,
                discarded = size - valid_end,
                "truncating torn journal tail"
            );
            journal.truncate(valid_end)?;
        }
        tracing::debug!(
            records,
            rows = recovered.values().map(BTreeMap::len).sum::<usize>(),
            "journal replayed"
        );

        Ok(Self {
            inner: Mutex::new(Inner {
                tables: BTreeMap::new(),
                txns: HashMap::new(),
                next_handle: last_handle + 1,
                journal,
                recovered,
            }),
            options,
        })
    }

    /// Creates an empty store that lives only in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            inner: Mutex::new(Inner {
                tables: BTreeMap::new(),
                txns: HashMap::new(),
                next_handle: 1,
                journal: Journal::new(Box::new(InMemoryBackend::new())),
                recovered: BTreeMap::new(),
            }),
            options: StoreOptions::default(),
        }
    }

    /// Returns every row of `table`, in key order.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist.
    pub fn rows(&self, table: &str) -> CoreResult<Vec<Row>> {
        Ok(self.inner.lock().table(table)?.rows().collect())
    }

    /// Current journal size in bytes.
    pub fn journal_size(&self) -> CoreResult<u64> {
        self.inner.lock().journal.size()
    }

    /// Rewrites the journal as one upsert per live row.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal cannot be rewritten.
    pub fn compact(&self) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        Self::compact_locked(&mut inner)
    }

    fn compact_locked(inner: &mut Inner) -> CoreResult<()> {
        let before = inner.journal.size()?;
        let live = inner.live_records();
        inner.journal.rewrite(&live)?;
        tracing::debug!(before, after = inner.journal.size()?, rows = live.len(), "journal compacted");
        Ok(())
    }
}

impl StorageAdapter for SnapshotStore {
    fn create_schema(&self, ddl: &str) -> CoreResult<()> {
        let schemas = parse_ddl(ddl)?;
        let mut inner = self.inner.lock();

        for schema in &schemas {
            if let Some(existing) = inner.tables.get(&schema.name) {
                if existing.schema() != schema {
                    return Err(CoreError::schema(format!(
                        "table {} already exists with a different definition",
                        schema.name
                    )));
                }
            }
        }

        for schema in schemas {
            if inner.tables.contains_key(&schema.name) {
                continue;
            }
            let mut table = Table::new(schema);
            if let Some(rows) = inner.recovered.remove(table.name()) {
                for (key, payload) in rows {
                    if table.check_key(&key).is_err() {
                        tracing::warn!(table = table.name(), %key, "skipping journal row with wrong key arity");
                        continue;
                    }
                    table.put(key, payload);
                }
            }
            tracing::debug!(table = table.name(), rows = table.len(), "table created");
            inner.tables.insert(table.name().to_string(), table);
        }

        for (table, rows) in std::mem::take(&mut inner.recovered) {
            tracing::warn!(%table, rows = rows.len(), "skipping journal rows for unknown table");
        }
        Ok(())
    }

    fn table_schema(&self, table: &str) -> Option<TableSchema> {
        self.inner
            .lock()
            .tables
            .get(table)
            .map(|t| t.schema().clone())
    }

    fn table_names(&self) -> Vec<String> {
        self.inner.lock().tables.keys().cloned().collect()
    }

    fn set_table_max_rows(&self, table: &str, max_rows: u64) -> CoreResult<()> {
        self.inner.lock().table_mut(table)?.set_max_rows(max_rows);
        Ok(())
    }

    fn begin_transaction(&self, table: &str) -> CoreResult<TxnHandle> {
        let mut inner = self.inner.lock();
        inner.table(table)?;
        let txn = TxnHandle::new(inner.next_handle);
        inner.journal.append(&JournalRecord::Begin {
            txn,
            table: table.to_string(),
        })?;
        inner.next_handle += 1;
        inner.txns.insert(
            txn,
            TxnContext {
                table: table.to_string(),
                touched: HashSet::new(),
            },
        );
        tracing::debug!(%txn, table, "transaction opened");
        Ok(txn)
    }

    fn upsert(&self, txn: TxnHandle, row: Row) -> CoreResult<UpsertOutcome> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let table_name = inner.txn(txn)?.table.clone();
        let row_digest = digest(&row.payload);
        let outcome = inner.table(&table_name)?.classify(&row.key, &row_digest)?;

        if outcome != UpsertOutcome::Unchanged {
            inner.journal.append(&JournalRecord::Upsert {
                table: table_name.clone(),
                key: row.key.clone(),
                payload: row.payload.clone(),
            })?;
            inner.table_mut(&table_name)?.put(row.key.clone(), row.payload);
        }
        if let Some(ctx) = inner.txns.get_mut(&txn) {
            ctx.touched.insert(row.key);
        }
        Ok(outcome)
    }

    fn enumerate_untouched(
        &self,
        txn: TxnHandle,
        callback: &mut dyn FnMut(Row) -> CoreResult<()>,
    ) -> CoreResult<()> {
        let (table_name, keys) = {
            let inner = self.inner.lock();
            let ctx = inner.txn(txn)?;
            let keys = inner.table(&ctx.table)?.untouched(&ctx.touched);
            (ctx.table.clone(), keys)
        };

        for key in keys {
            let row = {
                let inner = self.inner.lock();
                if inner.txn(txn)?.touched.contains(&key) {
                    continue;
                }
                match inner.table(&table_name)?.get(&key) {
                    Some(row) => row,
                    None => continue,
                }
            };
            callback(row)?;

            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            if inner.table(&table_name)?.get(&key).is_some() {
                inner.journal.append(&JournalRecord::Delete {
                    table: table_name.clone(),
                    key: key.clone(),
                })?;
                inner.table_mut(&table_name)?.remove(&key);
            }
        }
        Ok(())
    }

    fn close_transaction(&self, txn: TxnHandle) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        let ctx = inner.txns.remove(&txn).ok_or(CoreError::InvalidHandle {
            handle: txn.as_u64(),
        })?;
        inner.journal.append(&JournalRecord::Close { txn })?;
        if self.options.sync_on_close {
            inner.journal.sync()?;
        } else {
            inner.journal.flush()?;
        }
        tracing::debug!(%txn, table = %ctx.table, touched = ctx.touched.len(), "transaction closed");

        let threshold = self.options.compact_threshold;
        if threshold > 0 && inner.journal.size()? > threshold {
            Self::compact_locked(&mut inner)?;
        }
        Ok(())
    }

    fn get(&self, table: &str, key: &RowKey) -> CoreResult<Option<Row>> {
        let inner = self.inner.lock();
        let table = inner.table(table)?;
        table.check_key(key)?;
        Ok(table.get(key))
    }

    fn count(&self, table: &str) -> CoreResult<u64> {
        Ok(self.inner.lock().table(table)?.len())
    }

    fn remove(&self, table: &str, key: &RowKey) -> CoreResult<bool> {
        let mut inner = self.inner.lock();
        let existing = inner.table(table)?;
        existing.check_key(key)?;
        if existing.get(key).is_none() {
            return Ok(false);
        }
        inner.journal.append(&JournalRecord::Delete {
            table: table.to_string(),
            key: key.clone(),
        })?;
        inner.table_mut(table)?.remove(key);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::create_statement;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    const FILES: &str = "file_entry";

    fn key(path: &str) -> RowKey {
        RowKey::new([path])
    }

    fn row(path: &str, payload: &[u8]) -> Row {
        Row::new(key(path), payload.to_vec())
    }

    fn store_on(backend: &InMemoryBackend) -> SnapshotStore {
        let store =
            SnapshotStore::open(Box::new(backend.clone()), StoreOptions::default()).unwrap();
        store.create_schema(&create_statement(true)).unwrap();
        store
    }

    fn deleted(store: &SnapshotStore, txn: TxnHandle) -> BTreeSet<RowKey> {
        let mut out = BTreeSet::new();
        store
            .enumerate_untouched(txn, &mut |row| {
                out.insert(row.key);
                Ok(())
            })
            .unwrap();
        out
    }

    #[test]
    fn create_schema_is_idempotent() {
        let store = SnapshotStore::in_memory();
        store.create_schema(&create_statement(false)).unwrap();
        store.create_schema(&create_statement(false)).unwrap();
        assert_eq!(store.table_names(), [FILES]);
        store.create_schema(&create_statement(true)).unwrap();
        assert_eq!(
            store.table_names(),
            ["file_entry", "registry_key", "registry_value"]
        );
    }

    #[test]
    fn conflicting_definition_is_schema_error() {
        let store = SnapshotStore::in_memory();
        store.create_schema(&create_statement(false)).unwrap();
        let err = store
            .create_schema("CREATE TABLE file_entry (path TEXT PRIMARY KEY);")
            .unwrap_err();
        assert!(matches!(err, CoreError::Schema { .. }));
    }

    #[test]
    fn begin_on_unknown_table_fails() {
        let store = SnapshotStore::in_memory();
        store.create_schema(&create_statement(false)).unwrap();
        assert!(matches!(
            store.begin_transaction("registry_key"),
            Err(CoreError::TableNotFound { .. })
        ));
    }

    #[test]
    fn upsert_outcomes_and_last_write_wins() {
        let store = store_on(&InMemoryBackend::new());
        let txn = store.begin_transaction(FILES).unwrap();
        assert_eq!(store.upsert(txn, row("/a", b"1")).unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.upsert(txn, row("/a", b"1")).unwrap(), UpsertOutcome::Unchanged);
        assert_eq!(store.upsert(txn, row("/a", b"2")).unwrap(), UpsertOutcome::Modified);
        assert_eq!(store.get(FILES, &key("/a")).unwrap().unwrap().payload, b"2");
        assert_eq!(store.count(FILES).unwrap(), 1);
        store.close_transaction(txn).unwrap();
    }

    #[test]
    fn untouched_rows_are_removed_and_delivered() {
        let store = store_on(&InMemoryBackend::new());
        let txn = store.begin_transaction(FILES).unwrap();
        for path in ["/a", "/b", "/c"] {
            store.upsert(txn, row(path, b"x")).unwrap();
        }
        store.close_transaction(txn).unwrap();

        let txn = store.begin_transaction(FILES).unwrap();
        store.upsert(txn, row("/a", b"x")).unwrap();
        store.upsert(txn, row("/b", b"x")).unwrap();
        assert_eq!(deleted(&store, txn), BTreeSet::from([key("/c")]));
        assert_eq!(store.count(FILES).unwrap(), 2);
        assert!(deleted(&store, txn).is_empty());
        store.close_transaction(txn).unwrap();
    }

    #[test]
    fn callback_failure_keeps_earlier_deliveries() {
        let store = store_on(&InMemoryBackend::new());
        let txn = store.begin_transaction(FILES).unwrap();
        for path in ["/a", "/b", "/c"] {
            store.upsert(txn, row(path, b"x")).unwrap();
        }
        store.close_transaction(txn).unwrap();

        let txn = store.begin_transaction(FILES).unwrap();
        let mut seen = 0;
        let result = store.enumerate_untouched(txn, &mut |_| {
            seen += 1;
            if seen == 2 {
                Err(CoreError::invalid_operation("stop"))
            } else {
                Ok(())
            }
        });
        assert!(result.is_err());
        assert_eq!(seen, 2);
        assert_eq!(store.count(FILES).unwrap(), 2);
        assert!(store.get(FILES, &key("/a")).unwrap().is_none());
    }

    #[test]
    fn row_limit_counts_only_new_rows() {
        let store = store_on(&InMemoryBackend::new());
        store.set_table_max_rows(FILES, 2).unwrap();
        let txn = store.begin_transaction(FILES).unwrap();
        store.upsert(txn, row("/a", b"1")).unwrap();
        store.upsert(txn, row("/b", b"1")).unwrap();
        assert!(matches!(
            store.upsert(txn, row("/c", b"1")),
            Err(CoreError::RowLimitExceeded { limit: 2, .. })
        ));
        assert_eq!(store.upsert(txn, row("/a", b"2")).unwrap(), UpsertOutcome::Modified);
        assert_eq!(store.count(FILES).unwrap(), 2);
    }

    #[test]
    fn closed_handle_is_invalid() {
        let store = store_on(&InMemoryBackend::new());
        let txn = store.begin_transaction(FILES).unwrap();
        store.close_transaction(txn).unwrap();
        assert!(matches!(
            store.upsert(txn, row("/a", b"1")),
            Err(CoreError::InvalidHandle { .. })
        ));
        assert!(store.close_transaction(txn).is_err());
    }

    #[test]
    fn reopen_replays_rows_and_handles() {
        let backend = InMemoryBackend::new();
        let first_txn = {
            let store = store_on(&backend);
            let txn = store.begin_transaction(FILES).unwrap();
            store.upsert(txn, row("/a", b"1")).unwrap();
            store.upsert(txn, row("/b", b"1")).unwrap();
            store.remove(FILES, &key("/b")).unwrap();
            store.close_transaction(txn).unwrap();
            txn
        };

        let store = store_on(&backend);
        assert_eq!(store.count(FILES).unwrap(), 1);
        assert!(store.get(FILES, &key("/a")).unwrap().is_some());
        let txn = store.begin_transaction(FILES).unwrap();
        assert!(txn.as_u64() > first_txn.as_u64());
    }

    #[test]
    fn rows_of_unknown_tables_are_dropped() {
        let backend = InMemoryBackend::new();
        {
            let store = store_on(&backend);
            let txn = store.begin_transaction("registry_key").unwrap();
            store
                .upsert(txn, Row::new(RowKey::new(["[x64]", "HKLM"]), vec![1]))
                .unwrap();
            store.close_transaction(txn).unwrap();
        }
        let store = SnapshotStore::open(Box::new(backend), StoreOptions::default()).unwrap();
        store.create_schema(&create_statement(false)).unwrap();
        assert_eq!(store.table_names(), [FILES]);
    }

    #[test]
    fn compaction_on_close_shrinks_journal() {
        let backend = InMemoryBackend::new();
        let options = StoreOptions {
            sync_on_close: false,
            compact_threshold: 1,
        };
        let store = SnapshotStore::open(Box::new(backend.clone()), options).unwrap();
        store.create_schema(&create_statement(false)).unwrap();
        let txn = store.begin_transaction(FILES).unwrap();
        for i in 0..5u8 {
            store.upsert(txn, row("/a", &[i])).unwrap();
        }
        store.close_transaction(txn).unwrap();

        let compacted = SnapshotStore::open(Box::new(backend.clone()), options).unwrap();
        compacted.create_schema(&create_statement(false)).unwrap();
        assert_eq!(compacted.rows(FILES).unwrap(), vec![row("/a", &[4])]);
        assert_eq!(
            crate::journal::JournalReader::new(&backend).unwrap().count(),
            1
        );
    }

    #[test]
    fn compaction_keeps_rows_awaiting_schema() {
        let backend = InMemoryBackend::new();
        {
            let store = store_on(&backend);
            let txn = store.begin_transaction(FILES).unwrap();
            store.upsert(txn, row("/a", b"1")).unwrap();
            store.close_transaction(txn).unwrap();
        }

        let replayed =
            SnapshotStore::open(Box::new(backend.clone()), StoreOptions::default()).unwrap();
        replayed.compact().unwrap();
        drop(replayed);

        let reopened = store_on(&backend);
        assert_eq!(reopened.rows(FILES).unwrap(), vec![row("/a", b"1")]);
    }

    #[test]
    fn reopen_cuts_torn_tail_before_appending() {
        let backend = InMemoryBackend::new();
        {
            let store = store_on(&backend);
            let txn = store.begin_transaction(FILES).unwrap();
            store.upsert(txn, row("/a", b"1")).unwrap();
            store.upsert(txn, row("/b", b"2")).unwrap();
            store.close_transaction(txn).unwrap();
        }
        let full = backend.contents().len();
        backend.cut(full - 3);

        {
            let store = store_on(&backend);
            let reader_end = {
                let mut reader = crate::journal::JournalReader::new(&backend).unwrap();
                reader.by_ref().for_each(drop);
                reader.offset()
            };
            assert_eq!(backend.contents().len() as u64, reader_end);

            let txn = store.begin_transaction(FILES).unwrap();
            store.upsert(txn, row("/c", b"3")).unwrap();
            store.close_transaction(txn).unwrap();
        }

        let store = store_on(&backend);
        assert_eq!(store.count(FILES).unwrap(), 3);
    }

    struct FlakyBackend {
        inner: InMemoryBackend,
        fail_appends: Arc<AtomicBool>,
    }

    impl StorageBackend for FlakyBackend {
        fn read_at(&self, offset: u64, len: usize) -> fimdb_storage::StorageResult<Vec<u8>> {
            self.inner.read_at(offset, len)
        }

        fn append(&mut self, data: &[u8]) -> fimdb_storage::StorageResult<u64> {
            if self.fail_appends.load(Ordering::SeqCst) {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full").into());
            }
            self.inner.append(data)
        }

        fn flush(&mut self) -> fimdb_storage::StorageResult<()> {
            self.inner.flush()
        }

        fn sync(&mut self) -> fimdb_storage::StorageResult<()> {
            self.inner.sync()
        }

        fn size(&self) -> fimdb_storage::StorageResult<u64> {
            self.inner.size()
        }

        fn rewrite(&mut self, data: &[u8]) -> fimdb_storage::StorageResult<()> {
            self.inner.rewrite(data)
        }

        fn truncate(&mut self, new_size: u64) -> fimdb_storage::StorageResult<()> {
            self.inner.truncate(new_size)
        }
    }

    #[test]
    fn unjournaled_removal_is_reported_again() {
        let fail_appends = Arc::new(AtomicBool::new(false));
        let backend = FlakyBackend {
            inner: InMemoryBackend::new(),
            fail_appends: Arc::clone(&fail_appends),
        };
        let store = SnapshotStore::open(Box::new(backend), StoreOptions::default()).unwrap();
        store.create_schema(&create_statement(false)).unwrap();

        let txn = store.begin_transaction(FILES).unwrap();
        store.upsert(txn, row("/a", b"1")).unwrap();
        store.close_transaction(txn).unwrap();

        let txn = store.begin_transaction(FILES).unwrap();
        fail_appends.store(true, Ordering::SeqCst);
        let mut delivered = Vec::new();
        let result = store.enumerate_untouched(txn, &mut |row| {
            delivered.push(row.key);
            Ok(())
        });
        assert!(matches!(result, Err(CoreError::Storage(_))));
        assert_eq!(delivered, vec![key("/a")]);
        assert!(store.get(FILES, &key("/a")).unwrap().is_some());

        fail_appends.store(false, Ordering::SeqCst);
        store.close_transaction(txn).unwrap();
        let txn = store.begin_transaction(FILES).unwrap();
        assert_eq!(deleted(&store, txn), BTreeSet::from([key("/a")]));
    }
}
