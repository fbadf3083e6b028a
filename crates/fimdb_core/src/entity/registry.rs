//! Registry key and registry value entries.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Registry view a key was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Arch {
    /// 32-bit view.
    X32,
    /// 64-bit view.
    X64,
}

impl Arch {
    /// Returns the tag stored in the key column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::X32 => "[x32]",
            Self::X64 => "[x64]",
        }
    }

    /// Parses a stored tag.
    ///
    /// # Errors
    ///
    /// Returns a codec error for an unknown tag.
    pub fn parse(tag: &str) -> CoreResult<Self> {
        match tag {
            "[x32]" => Ok(Self::X32),
            "[x64]" => Ok(Self::X64),
            other => Err(CoreError::codec(format!("unknown registry arch {other:?}"))),
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attributes recorded for a registry key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryKeyAttributes {
    /// Security descriptor dump.
    pub perm: String,
    /// Owner id.
    pub uid: String,
    /// Group id.
    pub gid: String,
    /// Owner name.
    pub user_name: String,
    /// Group name.
    pub group_name: String,
    /// Last write time, seconds since the epoch.
    pub mtime: i64,
}

/// A monitored registry key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryKeyEntry {
    /// Registry view.
    pub arch: Arch,
    /// Full key path.
    pub path: String,
    /// Observed attributes.
    pub attributes: RegistryKeyAttributes,
}

impl RegistryKeyEntry {
    /// Creates a registry key entry.
    pub fn new(arch: Arch, path: impl Into<String>, attributes: RegistryKeyAttributes) -> Self {
        Self {
            arch,
            path: path.into(),
            attributes,
        }
    }
}

/// Attributes recorded for a registry value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryValueAttributes {
    /// `REG_*` type code.
    pub value_type: u32,
    /// Data size in bytes.
    pub size: u64,
    /// MD5 of the data, hex.
    pub hash_md5: String,
    /// SHA-1 of the data, hex.
    pub hash_sha1: String,
    /// SHA-256 of the data, hex.
    pub hash_sha256: String,
}

/// A monitored registry value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryValueEntry {
    /// Registry view of the owning key.
    pub arch: Arch,
    /// Path of the owning key.
    pub key_path: String,
    /// Value name.
    pub name: String,
    /// Observed attributes.
    pub attributes: RegistryValueAttributes,
}

impl RegistryValueEntry {
    /// Creates a registry value entry.
    pub fn new(
        arch: Arch,
        key_path: impl Into<String>,
        name: impl Into<String>,
        attributes: RegistryValueAttributes,
    ) -> Self {
        Self {
            arch,
            key_path: key_path.into(),
            name: name.into(),
            attributes,
        }
    }
}
