//! Core type definitions.

use crate::error::CoreError;
use std::fmt;
use std::str::FromStr;

/// Opaque token identifying one open transaction.
///
/// Handles are allocated by the storage adapter, increase monotonically and
/// are never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxnHandle(u64);

impl TxnHandle {
    /// Creates a handle from its raw value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TxnHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// A monitored table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Table {
    /// Monitored files.
    FileEntry,
    /// Monitored registry keys.
    RegistryKey,
    /// Monitored registry values.
    RegistryValue,
}

impl Table {
    /// Every table, file table first.
    pub const ALL: [Self; 3] = [Self::FileEntry, Self::RegistryKey, Self::RegistryValue];

    /// Returns the table name used in the schema and the journal.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::FileEntry => "file_entry",
            Self::RegistryKey => "registry_key",
            Self::RegistryValue => "registry_value",
        }
    }

    /// Looks a table up by name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|table| table.name() == name)
    }

    /// Whether the table only exists when registry monitoring is enabled.
    #[must_use]
    pub const fn is_registry(self) -> bool {
        matches!(self, Self::RegistryKey | Self::RegistryValue)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Table {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| CoreError::table_not_found(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_roundtrip() {
        for table in Table::ALL {
            assert_eq!(table.name().parse::<Table>().unwrap(), table);
        }
        assert!(matches!(
            "packages".parse::<Table>(),
            Err(CoreError::TableNotFound { .. })
        ));
    }

    #[test]
    fn only_registry_tables_are_gated() {
        assert!(!Table::FileEntry.is_registry());
        assert!(Table::RegistryKey.is_registry());
        assert!(Table::RegistryValue.is_registry());
    }

    #[test]
    fn handle_display() {
        assert_eq!(TxnHandle::new(3).to_string(), "txn:3");
        assert!(TxnHandle::new(1) < TxnHandle::new(2));
    }
}
