//! Inspect command implementation.

use crate::commands::{open_journal, open_snapshot};
use fimdb_core::journal::{JournalReader, JournalRecord};
use fimdb_core::StorageAdapter;
use fimdb_storage::StorageBackend;
use serde::Serialize;
use std::path::Path;

/// Database inspection result.
#[derive(Debug, Default, Serialize)]
pub struct InspectResult {
    /// Database path.
    pub path: String,
    /// Journal size in bytes.
    pub journal_size: u64,
    /// Number of journal records.
    pub record_count: usize,
    /// Records by type.
    pub records: RecordCounts,
    /// Live rows per table.
    pub tables: Vec<TableStats>,
}

/// Journal record counts by type.
#[derive(Debug, Default, Serialize)]
pub struct RecordCounts {
    /// Transactions opened.
    pub begin: usize,
    /// Rows written.
    pub upsert: usize,
    /// Rows removed.
    pub delete: usize,
    /// Transactions closed.
    pub close: usize,
}

/// Statistics for a single table.
#[derive(Debug, Serialize)]
pub struct TableStats {
    /// Table name.
    pub name: String,
    /// Number of live rows.
    pub rows: u64,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(path)?;
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }
    Ok(())
}

fn inspect(path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let backend = open_journal(path)?;
    let mut result = InspectResult {
        path: path.display().to_string(),
        journal_size: backend.size()?,
        ..InspectResult::default()
    };

    for item in JournalReader::new(&backend)? {
        let (_, record) = item?;
        result.record_count += 1;
        match record {
            JournalRecord::Begin { .. } => result.records.begin += 1,
            JournalRecord::Upsert { .. } => result.records.upsert += 1,
            JournalRecord::Delete { .. } => result.records.delete += 1,
            JournalRecord::Close { .. } => result.records.close += 1,
        }
    }

    let store = open_snapshot(path)?;
    for name in store.table_names() {
        let rows = store.count(&name)?;
        result.tables.push(TableStats { name, rows });
    }
    Ok(result)
}

fn print_text_output(result: &InspectResult) {
    println!("FIM Database Inspection");
    println!("=======================");
    println!();
    println!("Path: {}", result.path);
    println!("Journal size: {}", format_size(result.journal_size));
    println!();
    println!("Records: {}", result.record_count);
    println!("  begin:  {}", result.records.begin);
    println!("  upsert: {}", result.records.upsert);
    println!("  delete: {}", result.records.delete);
    println!("  close:  {}", result.records.close);
    println!();
    println!("Tables:");
    for table in &result.tables {
        println!("  {:<16} {} rows", table.name, table.rows);
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} bytes")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
