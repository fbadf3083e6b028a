//! # FIMDB Storage
//!
//! Byte-store backends underneath the FIM snapshot database.
//!
//! A backend knows nothing about journals, tables or entities. It stores an
//! append-only run of bytes, hands back ranges of it, and can atomically
//! replace its whole content when the journal above it is compacted.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - ephemeral `":memory:"` databases and tests
//! - [`FileBackend`] - the on-disk database file
//!
//! ## Example
//!
//! ```rust
//! use fimdb_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"snapshot").unwrap();
//! assert_eq!(backend.read_at(offset, 8).unwrap(), b"snapshot");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
