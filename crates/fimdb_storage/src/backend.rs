//! Storage backend trait definition.

use crate::error::StorageResult;

/// An append-only byte store.
///
/// The FIM database journals every snapshot mutation into a backend and
/// replays it on open. Backends are opaque: they never interpret the bytes.
///
/// # Invariants
///
/// - `append` returns the offset the data starts at, which equals the size
///   before the call
/// - `read_at` returns exactly the bytes previously appended at that range
/// - `rewrite` either fully replaces the content or leaves it untouched
/// - a failed `append` leaves the size it had before the call
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ReadPastEnd`] if the range is not fully
    /// stored, or an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Reads the whole content.
    ///
    /// # Errors
    ///
    /// Returns an error if the content cannot be read.
    fn read_all(&self) -> StorageResult<Vec<u8>> {
        let size = self.size()?;
        let len = usize::try_from(size).map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::OutOfMemory,
                format!("storage of {size} bytes does not fit in memory"),
            )
        })?;
        self.read_at(0, len)
    }

    /// Appends `data` and returns the offset it was written at.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes buffered writes to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Makes all data and metadata durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns the current size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Atomically replaces the whole content with `data`.
    ///
    /// Used for journal compaction. A crash during `rewrite` leaves either
    /// the old or the new content, never a mix.
    ///
    /// # Errors
    ///
    /// Returns an error if the replacement could not be completed; the old
    /// content is then still in place.
    fn rewrite(&mut self, data: &[u8]) -> StorageResult<()>;

    /// Discards everything past `new_size`.
    ///
    /// Cuts a torn journal tail off before new records are appended.
    ///
    /// # Errors
    ///
    /// Returns an error if the truncation fails or `new_size` is greater
    /// than the current size.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;
}
