//! File entries.

use serde::{Deserialize, Serialize};

/// Attributes recorded for a monitored file.
///
/// Fields that a scan did not collect stay at their default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttributes {
    /// Size in bytes.
    pub size: u64,
    /// Permission string (mode bits or ACL dump).
    pub perm: String,
    /// Platform attribute string (Windows file attributes).
    pub attributes: String,
    /// Owner id.
    pub uid: String,
    /// Group id.
    pub gid: String,
    /// Owner name.
    pub user_name: String,
    /// Group name.
    pub group_name: String,
    /// Inode number.
    pub inode: u64,
    /// Device number.
    pub device: u64,
    /// Modification time, seconds since the epoch.
    pub mtime: i64,
    /// MD5 of the content, hex.
    pub hash_md5: String,
    /// SHA-1 of the content, hex.
    pub hash_sha1: String,
    /// SHA-256 of the content, hex.
    pub hash_sha256: String,
}

/// A monitored file: normalized path plus attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Normalized absolute path, the row identity.
    pub path: String,
    /// Observed attributes.
    pub attributes: FileAttributes,
}

impl FileEntry {
    /// Creates a file entry.
    pub fn new(path: impl Into<String>, attributes: FileAttributes) -> Self {
        Self {
            path: path.into(),
            attributes,
        }
    }
}
