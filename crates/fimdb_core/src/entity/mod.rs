//! Monitored entities and their stored representation.
//!
//! Each entity kind maps to its own table with its own primary key:
//!
//! | kind            | table            | primary key               |
//! |-----------------|------------------|---------------------------|
//! | file            | `file_entry`     | `path`                    |
//! | registry key    | `registry_key`   | `arch, path`              |
//! | registry value  | `registry_value` | `arch, key_path, name`    |
//!
//! Attributes are stored as a CBOR payload next to the key.

mod file;
mod registry;

pub use file::{FileAttributes, FileEntry};
pub use registry::{
    Arch, RegistryKeyAttributes, RegistryKeyEntry, RegistryValueAttributes, RegistryValueEntry,
};

use crate::error::{CoreError, CoreResult};
use crate::store::{Row, RowKey};
use crate::types::Table;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

/// Kind of monitored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// A file.
    File,
    /// A registry key.
    RegistryKey,
    /// A registry value.
    RegistryValue,
}

impl EntityKind {
    /// Returns the table holding this kind.
    #[must_use]
    pub const fn table(self) -> Table {
        match self {
            Self::File => Table::FileEntry,
            Self::RegistryKey => Table::RegistryKey,
            Self::RegistryValue => Table::RegistryValue,
        }
    }

    /// Returns the kind stored in `table`.
    #[must_use]
    pub const fn for_table(table: Table) -> Self {
        match table {
            Table::FileEntry => Self::File,
            Table::RegistryKey => Self::RegistryKey,
            Table::RegistryValue => Self::RegistryValue,
        }
    }

    /// Primary key columns, in key order.
    #[must_use]
    pub const fn key_columns(self) -> &'static [&'static str] {
        match self {
            Self::File => &["path"],
            Self::RegistryKey => &["arch", "path"],
            Self::RegistryValue => &["arch", "key_path", "name"],
        }
    }
}

/// Identity of a monitored object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntryKey {
    /// A file path.
    File {
        /// Normalized path.
        path: String,
    },
    /// A registry key.
    RegistryKey {
        /// Registry view.
        arch: Arch,
        /// Key path.
        path: String,
    },
    /// A registry value.
    RegistryValue {
        /// Registry view.
        arch: Arch,
        /// Owning key path.
        key_path: String,
        /// Value name.
        name: String,
    },
}

impl EntryKey {
    /// Shorthand for a file identity.
    pub fn file(path: impl Into<String>) -> Self {
        Self::File { path: path.into() }
    }

    /// Returns the kind this identity belongs to.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::File { .. } => EntityKind::File,
            Self::RegistryKey { .. } => EntityKind::RegistryKey,
            Self::RegistryValue { .. } => EntityKind::RegistryValue,
        }
    }

    /// Returns the table holding this identity.
    #[must_use]
    pub const fn table(&self) -> Table {
        self.kind().table()
    }

    /// Builds the stored primary key.
    #[must_use]
    pub fn to_row_key(&self) -> RowKey {
        match self {
            Self::File { path } => RowKey::new([path.as_str()]),
            Self::RegistryKey { arch, path } => RowKey::new([arch.as_str(), path.as_str()]),
            Self::RegistryValue {
                arch,
                key_path,
                name,
            } => RowKey::new([arch.as_str(), key_path.as_str(), name.as_str()]),
        }
    }

    /// Rebuilds an identity from a stored primary key.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the key does not fit the table.
    pub fn from_row_key(table: Table, key: &RowKey) -> CoreResult<Self> {
        match (table, key.parts()) {
            (Table::FileEntry, [path]) => Ok(Self::file(path.clone())),
            (Table::RegistryKey, [arch, path]) => Ok(Self::RegistryKey {
                arch: Arch::parse(arch)?,
                path: path.clone(),
            }),
            (Table::RegistryValue, [arch, key_path, name]) => Ok(Self::RegistryValue {
                arch: Arch::parse(arch)?,
                key_path: key_path.clone(),
                name: name.clone(),
            }),
            _ => Err(CoreError::codec(format!(
                "key {key} does not fit table {table}"
            ))),
        }
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File { path } => f.write_str(path),
            Self::RegistryKey { arch, path } => write!(f, "{arch} {path}"),
            Self::RegistryValue {
                arch,
                key_path,
                name,
            } => write!(f, "{arch} {key_path}\\{name}"),
        }
    }
}

/// A monitored object as observed by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    /// A file.
    File(FileEntry),
    /// A registry key.
    RegistryKey(RegistryKeyEntry),
    /// A registry value.
    RegistryValue(RegistryValueEntry),
}

impl Entity {
    /// Returns the entity kind.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::File(_) => EntityKind::File,
            Self::RegistryKey(_) => EntityKind::RegistryKey,
            Self::RegistryValue(_) => EntityKind::RegistryValue,
        }
    }

    /// Returns the table this entity is stored in.
    #[must_use]
    pub const fn table(&self) -> Table {
        self.kind().table()
    }

    /// Returns the identity.
    #[must_use]
    pub fn key(&self) -> EntryKey {
        match self {
            Self::File(file) => EntryKey::file(file.path.clone()),
            Self::RegistryKey(key) => EntryKey::RegistryKey {
                arch: key.arch,
                path: key.path.clone(),
            },
            Self::RegistryValue(value) => EntryKey::RegistryValue {
                arch: value.arch,
                key_path: value.key_path.clone(),
                name: value.name.clone(),
            },
        }
    }

    /// Encodes the entity into its table representation.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the attributes cannot be encoded.
    pub fn to_row(&self) -> CoreResult<Row> {
        let payload = match self {
            Self::File(file) => encode(&file.attributes)?,
            Self::RegistryKey(key) => encode(&key.attributes)?,
            Self::RegistryValue(value) => encode(&value.attributes)?,
        };
        Ok(Row::new(self.key().to_row_key(), payload))
    }

    /// Decodes an entity from a row of `table`.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the key or payload does not fit the table.
    pub fn from_row(table: Table, row: &Row) -> CoreResult<Self> {
        let entity = match EntryKey::from_row_key(table, &row.key)? {
            EntryKey::File { path } => Self::File(FileEntry::new(path, decode(&row.payload)?)),
            EntryKey::RegistryKey { arch, path } => {
                Self::RegistryKey(RegistryKeyEntry::new(arch, path, decode(&row.payload)?))
            }
            EntryKey::RegistryValue {
                arch,
                key_path,
                name,
            } => Self::RegistryValue(RegistryValueEntry::new(
                arch,
                key_path,
                name,
                decode(&row.payload)?,
            )),
        };
        Ok(entity)
    }
}

impl From<FileEntry> for Entity {
    fn from(entry: FileEntry) -> Self {
        Self::File(entry)
    }
}

impl From<RegistryKeyEntry> for Entity {
    fn from(entry: RegistryKeyEntry) -> Self {
        Self::RegistryKey(entry)
    }
}

impl From<RegistryValueEntry> for Entity {
    fn from(entry: RegistryValueEntry) -> Self {
        Self::RegistryValue(entry)
    }
}

fn encode<T: Serialize>(attributes: &T) -> CoreResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(attributes, &mut buf).map_err(|e| CoreError::codec(e.to_string()))?;
    Ok(buf)
}

fn decode<T: DeserializeOwned>(payload: &[u8]) -> CoreResult<T> {
    ciborium::from_reader(payload).map_err(|e| CoreError::codec(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_file() -> Entity {
        FileEntry::new(
            "/etc/hosts",
            FileAttributes {
                size: 220,
                perm: "rw-r--r--".into(),
                uid: "0".into(),
                user_name: "root".into(),
                inode: 1_234,
                mtime: 1_700_000_000,
                hash_sha256: "ab".repeat(32),
                ..FileAttributes::default()
            },
        )
        .into()
    }

    #[test]
    fn file_row_roundtrip() {
        let entity = sample_file();
        let row = entity.to_row().unwrap();
        assert_eq!(row.key, RowKey::new(["/etc/hosts"]));
        assert_eq!(Entity::from_row(Table::FileEntry, &row).unwrap(), entity);
    }

    #[test]
    fn registry_kinds_keep_their_own_representation() {
        let key: Entity = RegistryKeyEntry::new(
            Arch::X64,
            "HKEY_LOCAL_MACHINE\\Software\\Test",
            RegistryKeyAttributes {
                user_name: "SYSTEM".into(),
                ..RegistryKeyAttributes::default()
            },
        )
        .into();
        let value: Entity = RegistryValueEntry::new(
            Arch::X32,
            "HKEY_LOCAL_MACHINE\\Software\\Test",
            "Version",
            RegistryValueAttributes {
                value_type: 1,
                size: 8,
                ..RegistryValueAttributes::default()
            },
        )
        .into();

        let key_row = key.to_row().unwrap();
        let value_row = value.to_row().unwrap();
        assert_eq!(key_row.key.len(), 2);
        assert_eq!(value_row.key.parts()[2], "Version");
        assert_eq!(Entity::from_row(Table::RegistryKey, &key_row).unwrap(), key);
        assert_eq!(
            Entity::from_row(Table::RegistryValue, &value_row).unwrap(),
            value
        );
        assert_eq!(value.table(), Table::RegistryValue);
    }

    #[test]
    fn row_from_wrong_table_is_rejected() {
        let row = sample_file().to_row().unwrap();
        assert!(matches!(
            Entity::from_row(Table::RegistryKey, &row),
            Err(CoreError::Codec { .. })
        ));
    }

    #[test]
    fn garbage_payload_is_a_codec_error() {
        let row = Row::new(RowKey::new(["/bin/ls"]), vec![0xff, 0x00, 0x13]);
        assert!(matches!(
            Entity::from_row(Table::FileEntry, &row),
            Err(CoreError::Codec { .. })
        ));
    }

    #[test]
    fn key_columns_match_row_key_arity() {
        for table in Table::ALL {
            let kind = EntityKind::for_table(table);
            assert_eq!(kind.table(), table);
        }
        let key = EntryKey::RegistryValue {
            arch: Arch::X64,
            key_path: "HKLM\\A".into(),
            name: "v".into(),
        };
        assert_eq!(key.to_row_key().len(), key.kind().key_columns().len());
        assert_eq!(key.to_string(), "[x64] HKLM\\A\\v");
        assert!(matches!(Arch::parse("[arm]"), Err(CoreError::Codec { .. })));
    }
}
