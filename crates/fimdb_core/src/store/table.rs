//! One table of the snapshot.

use crate::error::{CoreError, CoreResult};
use crate::schema::TableSchema;
use crate::store::{Row, RowKey, UpsertOutcome};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};

/// SHA-256 of a row payload, used to tell modified rows from unchanged ones.
pub(crate) type PayloadDigest = [u8; 32];

pub(crate) fn digest(payload: &[u8]) -> PayloadDigest {
    Sha256::digest(payload).into()
}

#[derive(Debug, Clone)]
struct StoredRow {
    payload: Vec<u8>,
    digest: PayloadDigest,
}

/// Rows of one table, ordered by primary key.
#[derive(Debug)]
pub(crate) struct Table {
    schema: TableSchema,
    rows: BTreeMap<RowKey, StoredRow>,
    max_rows: u64,
}

impl Table {
    pub(crate) fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: BTreeMap::new(),
            max_rows: 0,
        }
    }

    pub(crate) fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub(crate) fn name(&self) -> &str {
        &self.schema.name
    }

    pub(crate) fn set_max_rows(&mut self, max_rows: u64) {
        self.max_rows = max_rows;
    }

    pub(crate) fn len(&self) -> u64 {
        self.rows.len() as u64
    }

    /// Rejects keys whose arity differs from the primary key.
    pub(crate) fn check_key(&self, key: &RowKey) -> CoreResult<()> {
        let expected = self.schema.primary_key.len();
        if key.len() == expected {
            Ok(())
        } else {
            Err(CoreError::invalid_operation(format!(
                "key {key} has {} components, table {} expects {expected}",
                key.len(),
                self.name()
            )))
        }
    }

    /// Classifies an upsert without applying it.
    ///
    /// Fails with `RowLimitExceeded` when `key` is new and the table is full.
    pub(crate) fn classify(&self, key: &RowKey, digest: &PayloadDigest) -> CoreResult<UpsertOutcome> {
        self.check_key(key)?;
        match self.rows.get(key) {
            Some(stored) if &stored.digest == digest => Ok(UpsertOutcome::Unchanged),
            Some(_) => Ok(UpsertOutcome::Modified),
            None if self.max_rows > 0 && self.len() >= self.max_rows => {
                Err(CoreError::RowLimitExceeded {
                    table: self.name().to_string(),
                    limit: self.max_rows,
                })
            }
            None => Ok(UpsertOutcome::Inserted),
        }
    }

    /// Stores a row unconditionally. Replay and compaction go through here.
    pub(crate) fn put(&mut self, key: RowKey, payload: Vec<u8>) {
        let digest = digest(&payload);
        self.rows.insert(key, StoredRow { payload, digest });
    }

    pub(crate) fn get(&self, key: &RowKey) -> Option<Row> {
        self.rows
            .get(key)
            .map(|stored| Row::new(key.clone(), stored.payload.clone()))
    }

    pub(crate) fn remove(&mut self, key: &RowKey) -> Option<Row> {
        self.rows
            .remove_entry(key)
            .map(|(key, stored)| Row::new(key, stored.payload))
    }

    /// Keys not present in `touched`, in key order.
    pub(crate) fn untouched(&self, touched: &HashSet<RowKey>) -> Vec<RowKey> {
        self.rows
            .keys()
            .filter(|key| !touched.contains(*key))
            .cloned()
            .collect()
    }

    pub(crate) fn rows(&self) -> impl Iterator<Item = Row> + '_ {
        self.rows
            .iter()
            .map(|(key, stored)| Row::new(key.clone(), stored.payload.clone()))
    }
}
