//! In-memory storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::Arc;

/// A backend that keeps its bytes in memory.
///
/// Backs the `":memory:"` storage mode: the snapshot lives only as long as
/// the process. Cloning the backend yields a second handle onto the same
/// buffer, which lets tests reopen a journal or tamper with it.
///
/// ```rust
/// use fimdb_storage::{InMemoryBackend, StorageBackend};
///
/// let mut writer = InMemoryBackend::new();
/// let reader = writer.clone();
/// writer.append(b"abc").unwrap();
/// assert_eq!(reader.size().unwrap(), 3);
/// ```
#[derive(Debug, Default, Clone)]
pub struct InMemoryBackend {
    data: Arc<RwLock<Vec<u8>>>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend holding `data`.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
        }
    }

    /// Returns a copy of the stored bytes.
    #[must_use]
    pub fn contents(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// Overwrites the byte at `offset`, returning whether it existed.
    ///
    /// Only meant for corruption tests.
    pub fn poke(&self, offset: usize, value: u8) -> bool {
        match self.data.write().get_mut(offset) {
            Some(byte) => {
                *byte = value;
                true
            }
            None => false,
        }
    }

    /// Drops everything after the first `len` bytes.
    ///
    /// Simulates a write torn by a crash.
    pub fn cut(&self, len: usize) {
        self.data.write().truncate(len);
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.data.read();
        let size = data.len() as u64;
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        match start.checked_add(len) {
            Some(end) if end <= data.len() => Ok(data[start..end].to_vec()),
            _ => Err(StorageError::ReadPastEnd { offset, len, size }),
        }
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn rewrite(&mut self, bytes: &[u8]) -> StorageResult<()> {
        *self.data.write() = bytes.to_vec();
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut data = self.data.write();
        let size = data.len() as u64;
        if new_size > size {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("cannot truncate to size {new_size} which is greater than current size {size}"),
            )));
        }
        data.truncate(new_size as usize);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_reports_previous_size() {
        let mut backend = InMemoryBackend::new();
        assert_eq!(backend.append(b"file").unwrap(), 0);
        assert_eq!(backend.append(b"_entry").unwrap(), 4);
        assert_eq!(backend.size().unwrap(), 10);
        assert_eq!(backend.read_all().unwrap(), b"file_entry");
    }

    #[test]
    fn read_outside_content_fails() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"12345").unwrap();

        assert!(matches!(
            backend.read_at(3, 4),
            Err(StorageError::ReadPastEnd { size: 5, .. })
        ));
        assert!(matches!(
            backend.read_at(u64::MAX, 1),
            Err(StorageError::ReadPastEnd { .. })
        ));
        assert!(backend.read_at(5, 0).unwrap().is_empty());
    }

    #[test]
    fn clones_share_the_buffer() {
        let mut backend = InMemoryBackend::new();
        let view = backend.clone();
        backend.append(b"shared").unwrap();
        assert_eq!(view.contents(), b"shared");
    }

    #[test]
    fn rewrite_replaces_content() {
        let mut backend = InMemoryBackend::with_data(b"old journal".to_vec());
        backend.rewrite(b"new").unwrap();
        assert_eq!(backend.contents(), b"new");
        assert_eq!(backend.append(b"!").unwrap(), 3);
    }

    #[test]
    fn truncate_keeps_prefix() {
        let mut backend = InMemoryBackend::with_data(b"record+torn".to_vec());
        backend.truncate(6).unwrap();
        assert_eq!(backend.contents(), b"record");
        assert!(matches!(backend.truncate(7), Err(StorageError::Io(_))));
    }

    #[test]
    fn poke_and_cut_tamper_with_data() {
        let backend = InMemoryBackend::with_data(b"abcdef".to_vec());
        assert!(backend.poke(0, b'z'));
        assert!(!backend.poke(99, b'z'));
        backend.cut(3);
        assert_eq!(backend.contents(), b"zbc");
    }
}
