//! CLI command implementations.

pub mod dump;
pub mod inspect;
pub mod verify;

use fimdb_core::{schema, SnapshotStore, StorageAdapter, StoreOptions};
use fimdb_storage::{FileBackend, InMemoryBackend, StorageBackend};
use std::path::Path;

/// Opens the journal file, refusing to create one that does not exist.
pub fn open_journal(path: &Path) -> Result<FileBackend, Box<dyn std::error::Error>> {
    if !path.is_file() {
        return Err(format!("No database found at {}", path.display()).into());
    }
    Ok(FileBackend::open(path)?)
}

/// Replays the journal into a store with every table defined.
///
/// The store works on an in-memory copy, so a torn tail is never cut off
/// the file being inspected.
pub fn open_snapshot(path: &Path) -> Result<SnapshotStore, Box<dyn std::error::Error>> {
    let backend = open_journal(path)?;
    let copy = InMemoryBackend::with_data(backend.read_all()?);
    let store = SnapshotStore::open(Box::new(copy), StoreOptions::default())?;
    store.create_schema(&schema::create_statement(true))?;
    Ok(store)
}
