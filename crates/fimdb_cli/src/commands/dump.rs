//! Dump command implementation.

use crate::commands::open_snapshot;
use fimdb_core::{Entity, SnapshotStore, Table};
use serde::Serialize;
use std::path::Path;

/// One stored entry for output.
#[derive(Debug, Serialize)]
pub struct EntryInfo {
    /// Table name.
    pub table: String,
    /// Identity of the entry.
    pub key: String,
    /// Stored attributes.
    pub attributes: serde_json::Value,
}

/// Runs the dump command.
pub fn run(
    path: &Path,
    table: Option<&str>,
    limit: Option<usize>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let tables = match table {
        Some(name) => vec![name.parse::<Table>()?],
        None => Table::ALL.to_vec(),
    };
    let store = open_snapshot(path)?;
    let entries = collect(&store, &tables, limit.unwrap_or(usize::MAX))?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        _ => {
            print_text_output(&entries);
        }
    }
    Ok(())
}

fn collect(
    store: &SnapshotStore,
    tables: &[Table],
    limit: usize,
) -> Result<Vec<EntryInfo>, Box<dyn std::error::Error>> {
    let mut entries = Vec::new();
    for &table in tables {
        for row in store.rows(table.name())?.iter().take(limit) {
            let entity = Entity::from_row(table, row)?;
            let attributes = match &entity {
                Entity::File(file) => serde_json::to_value(&file.attributes)?,
                Entity::RegistryKey(key) => serde_json::to_value(&key.attributes)?,
                Entity::RegistryValue(value) => serde_json::to_value(&value.attributes)?,
            };
            entries.push(EntryInfo {
                table: table.name().to_string(),
                key: entity.key().to_string(),
                attributes,
            });
        }
    }
    Ok(entries)
}

fn print_text_output(entries: &[EntryInfo]) {
    println!("Entries ({} total)", entries.len());
    println!("=================");
    for entry in entries {
        println!("[{}] {}", entry.table, entry.key);
        if let serde_json::Value::Object(fields) = &entry.attributes {
            for (name, value) in fields {
                println!("    {name}: {value}");
            }
        }
    }
}
