//! Journal writer.

use crate::error::CoreResult;
use crate::journal::reader::JournalReader;
use crate::journal::record::JournalRecord;
use fimdb_storage::StorageBackend;

/// Append-only record log over a [`StorageBackend`].
///
/// The journal does no locking of its own; [`crate::SnapshotStore`] owns it
/// behind its state mutex.
pub struct Journal {
    backend: Box<dyn StorageBackend>,
}

impl Journal {
    /// Wraps a backend.
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Appends a record, returning the offset it was written at.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be encoded or written.
    pub fn append(&mut self, record: &JournalRecord) -> CoreResult<u64> {
        let data = record.encode()?;
        Ok(self.backend.append(&data)?)
    }

    /// Pushes buffered writes to the operating system.
    pub fn flush(&mut self) -> CoreResult<()> {
        Ok(self.backend.flush()?)
    }

    /// Flushes and waits for the data to reach durable storage.
    pub fn sync(&mut self) -> CoreResult<()> {
        Ok(self.backend.sync()?)
    }

    /// Current journal size in bytes.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.size()?)
    }

    /// Discards everything past `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be truncated.
    pub fn truncate(&mut self, offset: u64) -> CoreResult<()> {
        Ok(self.backend.truncate(offset)?)
    }

    /// Returns a reader over the records written so far.
    pub fn records(&self) -> CoreResult<JournalReader<'_>> {
        JournalReader::new(self.backend.as_ref())
    }

    /// Replaces the whole journal with `records`.
    ///
    /// Used by compaction. The replacement is atomic for backends whose
    /// `rewrite` is.
    ///
    /// # Errors
    ///
    /// Returns an error if a record cannot be encoded or the backend fails.
    pub fn rewrite<'r, I>(&mut self, records: I) -> CoreResult<()>
    where
        I: IntoIterator<Item = &'r JournalRecord>,
    {
        let mut data = Vec::new();
        for record in records {
            data.extend(record.encode()?);
        }
        self.backend.rewrite(&data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RowKey;
    use crate::types::TxnHandle;
    use fimdb_storage::{FileBackend, InMemoryBackend};
    use tempfile::tempdir;

    fn upsert(path: &str) -> JournalRecord {
        JournalRecord::Upsert {
            table: "file_entry".into(),
            key: RowKey::new([path]),
            payload: path.as_bytes().to_vec(),
        }
    }

    #[test]
    fn append_returns_increasing_offsets() {
        let mut journal = Journal::new(Box::new(InMemoryBackend::new()));
        let first = journal.append(&upsert("/a")).unwrap();
        let second = journal.append(&upsert("/b")).unwrap();
        assert_eq!(first, 0);
        assert!(second > first);
        assert_eq!(journal.records().unwrap().count(), 2);
    }

    #[test]
    fn rewrite_replaces_contents() {
        let mut journal = Journal::new(Box::new(InMemoryBackend::new()));
        for path in ["/a", "/b", "/c"] {
            journal.append(&upsert(path)).unwrap();
        }
        journal
            .append(&JournalRecord::Close {
                txn: TxnHandle::new(1),
            })
            .unwrap();
        let before = journal.size().unwrap();

        let live = [upsert("/c")];
        journal.rewrite(&live).unwrap();

        assert!(journal.size().unwrap() < before);
        let records: Vec<_> = journal
            .records()
            .unwrap()
            .map(|r| r.unwrap().1)
            .collect();
        assert_eq!(records, live);
    }

    #[test]
    fn file_journal_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fim.db");
        {
            let mut journal = Journal::new(Box::new(FileBackend::open(&path).unwrap()));
            journal.append(&upsert("/etc/hosts")).unwrap();
            journal.sync().unwrap();
        }
        let journal = Journal::new(Box::new(FileBackend::open(&path).unwrap()));
        let (_, record) = journal.records().unwrap().next().unwrap().unwrap();
        assert_eq!(record, upsert("/etc/hosts"));
    }
}
