//! Verify command implementation.

use crate::commands::open_journal;
use fimdb_core::journal::JournalReader;
use fimdb_storage::StorageBackend;
use std::path::Path;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of valid records.
    pub valid_records: usize,
    /// Bytes after the last complete record.
    pub torn_tail: u64,
    /// The first fatal problem found, if any.
    pub error: Option<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs the verify command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying journal at {}", path.display());
    println!();

    let result = verify(&open_journal(path)?)?;
    println!("  Valid records: {}", result.valid_records);
    if result.torn_tail > 0 {
        println!(
            "  Torn tail:     {} bytes (discarded on next open)",
            result.torn_tail
        );
    }
    if let Some(error) = &result.error {
        println!("  Error:         {error}");
    }

    println!();
    if result.is_ok() {
        println!("✓ Journal verification passed");
        Ok(())
    } else {
        println!("✗ Journal verification failed");
        Err("Verification failed".into())
    }
}

fn verify(backend: &dyn StorageBackend) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    let mut result = VerifyResult::default();
    let mut reader = JournalReader::new(backend)?;
    for item in reader.by_ref() {
        match item {
            Ok(_) => result.valid_records += 1,
            Err(e) => {
                result.error = Some(e.to_string());
                return Ok(result);
            }
        }
    }
    result.torn_tail = backend.size()? - reader.offset();
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fimdb_core::journal::JournalRecord;
    use fimdb_core::TxnHandle;
    use fimdb_storage::InMemoryBackend;

    fn journal() -> InMemoryBackend {
        let mut data = Vec::new();
        for txn in 1..=3 {
            data.extend(
                JournalRecord::Close {
                    txn: TxnHandle::new(txn),
                }
                .encode()
                .unwrap(),
            );
        }
        InMemoryBackend::with_data(data)
    }

    #[test]
    fn clean_journal_passes() {
        let result = verify(&journal()).unwrap();
        assert!(result.is_ok());
        assert_eq!(result.valid_records, 3);
        assert_eq!(result.torn_tail, 0);
    }

    #[test]
    fn torn_tail_is_reported_but_passes() {
        let backend = journal();
        let len = backend.contents().len();
        backend.cut(len - 1);
        let result = verify(&backend).unwrap();
        assert!(result.is_ok());
        assert_eq!(result.valid_records, 2);
        assert!(result.torn_tail > 0);
    }

    #[test]
    fn checksum_mismatch_fails() {
        let backend = journal();
        backend.poke(12, 0xAA);
        let result = verify(&backend).unwrap();
        assert!(!result.is_ok());
        assert!(result.error.unwrap().contains("checksum mismatch"));
    }
}
