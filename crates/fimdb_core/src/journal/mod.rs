//! Append-only journal backing the snapshot.
//!
//! ## Record format
//!
//! ```text
//! | magic "FIMJ" (4) | version (2) | type (1) | length (4) | payload (N) | crc32 (4) |
//! ```
//!
//! All integers are little-endian. The CRC covers everything before it.
//!
//! ## Replay
//!
//! Records are applied in order. Upserts and deletes take effect when they
//! are written; a missing `Close` does not roll anything back.
//!
//! - An incomplete record at the end of the journal is a torn write and
//!   ends replay cleanly.
//! - Bad magic, an unknown record type, a future version or a CRC mismatch
//!   is corruption and refuses the open.

mod reader;
mod record;
mod writer;

pub use reader::JournalReader;
pub use record::{compute_crc32, JournalRecord, RecordType, JOURNAL_MAGIC, JOURNAL_VERSION};
pub use writer::Journal;
