//! Sequential journal reader.
//!
//! A record cut short by a crash mid-append (incomplete header or payload at
//! the end of the journal) ends the iteration cleanly. Anything else that
//! does not parse is corruption and stops the iteration with an error.

use crate::error::{CoreError, CoreResult};
use crate::journal::record::{
    compute_crc32, JournalRecord, RecordType, CRC_SIZE, HEADER_SIZE, JOURNAL_MAGIC,
    JOURNAL_VERSION,
};
use fimdb_storage::StorageBackend;

/// Iterator over `(offset, record)` pairs of a journal.
pub struct JournalReader<'a> {
    backend: &'a dyn StorageBackend,
    size: u64,
    offset: u64,
    finished: bool,
}

impl<'a> JournalReader<'a> {
    /// Starts reading `backend` from offset zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend size cannot be determined.
    pub fn new(backend: &'a dyn StorageBackend) -> CoreResult<Self> {
        Ok(Self {
            size: backend.size()?,
            backend,
            offset: 0,
            finished: false,
        })
    }

    /// Offset just past the last record returned.
    ///
    /// After the iterator is exhausted this is where valid data ends; any
    /// bytes beyond it are a torn tail.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn remaining(&self) -> u64 {
        self.size - self.offset
    }

    fn read_next(&mut self) -> CoreResult<Option<(u64, JournalRecord)>> {
        let start = self.offset;
        if self.remaining() < HEADER_SIZE as u64 {
            return Ok(None);
        }

        let header = self.backend.read_at(start, HEADER_SIZE)?;
        if header[0..4] != JOURNAL_MAGIC {
            return Err(CoreError::journal_corruption(format!(
                "invalid magic at offset {start}"
            )));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version > JOURNAL_VERSION {
            return Err(CoreError::journal_corruption(format!(
                "unsupported version {version} at offset {start}"
            )));
        }
        let type_byte = header[6];
        let record_type = RecordType::from_byte(type_byte).ok_or_else(|| {
            CoreError::journal_corruption(format!(
                "unknown record type {type_byte} at offset {start}"
            ))
        })?;
        let len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as usize;

        let body_len = len + CRC_SIZE;
        if self.remaining() - (HEADER_SIZE as u64) < body_len as u64 {
            return Ok(None);
        }
        let body = self.backend.read_at(start + HEADER_SIZE as u64, body_len)?;
        let (payload, crc_bytes) = body.split_at(len);

        let mut covered = header;
        covered.extend_from_slice(payload);
        let actual = compute_crc32(&covered);
        let expected = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        if actual != expected {
            return Err(CoreError::ChecksumMismatch {
                offset: start,
                expected,
                actual,
            });
        }

        let record = JournalRecord::decode_payload(record_type, payload)?;
        self.offset = start + (HEADER_SIZE + body_len) as u64;
        Ok(Some((start, record)))
    }
}

impl Iterator for JournalReader<'_> {
    type Item = CoreResult<(u64, JournalRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_next() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
