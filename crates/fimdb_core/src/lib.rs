//! # FIMDB Core
//!
//! Transactional snapshot-diff engine of a file integrity monitoring agent.
//!
//! The database keeps the snapshot of the last scan: one table of files and,
//! when registry monitoring is enabled, tables of registry keys and values.
//! Each scan runs as one [`Transaction`] per table:
//!
//! 1. every observed entity is submitted with [`Transaction::sync_row`],
//!    which stores it and reports whether it was inserted, modified or
//!    unchanged;
//! 2. [`Transaction::get_deleted_rows`] hands over every stored entity the
//!    scan did not observe and removes it from the snapshot;
//! 3. the transaction is closed.
//!
//! Results collapse to [`FimDbStatus`] (`Ok`, `Full`, `Err`) for callers that
//! only need the status.
//!
//! This crate provides:
//! - the entity model and its table representations
//! - schema DDL parsing
//! - an append-only, CRC-checked journal
//! - the [`StorageAdapter`] contract and its [`SnapshotStore`] implementation
//! - table-scoped transactions and change detection
//! - the [`FimDb`] service object

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod database;
mod diff;
mod entity;
mod error;
pub mod journal;
mod lock;
mod logging;
mod remote;
pub mod schema;
mod store;
mod transaction;
mod types;

pub use config::{Config, StorageMode, DEFAULT_DISK_PATH};
pub use database::{Callbacks, FimDb};
pub use diff::{ChangeEvent, ChangeKind};
pub use entity::{
    Arch, Entity, EntityKind, EntryKey, FileAttributes, FileEntry, RegistryKeyAttributes,
    RegistryKeyEntry, RegistryValueAttributes, RegistryValueEntry,
};
pub use error::{CoreError, CoreResult, ErrorKind, FimDbStatus};
pub use lock::DbLock;
pub use logging::{LogCallback, LogLevel, Logger};
pub use remote::{RemoteSync, SyncCallback};
pub use store::{Row, RowKey, SnapshotStore, StorageAdapter, StoreOptions, UpsertOutcome};
pub use transaction::{ChangeCallback, Transaction, TransactionManager, TransactionState, TxnStats};
pub use types::{Table, TxnHandle};

/// Crate version, as reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
