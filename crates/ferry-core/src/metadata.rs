//! File metadata as seen by the engine.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use crate::location::Location;

/// Type of a filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link (not followed).
    Symlink,
    /// Device, socket, fifo or anything else.
    Other,
}

/// Metadata for a single entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    /// Entry name for display (lossy when not UTF-8).
    pub name: CompactString,
    /// Entry name exactly as stored on disk.
    pub file_name: OsString,
    /// Entry type.
    pub kind: FileKind,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Last modification time.
    pub modified: Option<SystemTime>,
    /// Unix mode bits (0 where unavailable).
    pub mode: u32,
    /// Owning user id, where available.
    pub uid: Option<u32>,
    /// Owning group id, where available.
    pub gid: Option<u32>,
    /// Whether the entry is read-only for everyone.
    pub readonly: bool,
    /// Target of a symbolic link.
    pub symlink_target: Option<PathBuf>,
}

impl Metadata {
    /// Build from `std::fs::Metadata`.
    pub fn from_std(
        name: impl Into<CompactString>,
        metadata: &std::fs::Metadata,
        symlink_target: Option<PathBuf>,
    ) -> Self {
        let file_type = metadata.file_type();
        let kind = if file_type.is_symlink() {
            FileKind::Symlink
        } else if file_type.is_dir() {
            FileKind::Directory
        } else if file_type.is_file() {
            FileKind::File
        } else {
            FileKind::Other
        };

        #[cfg(unix)]
        let (mode, uid, gid) = {
            use std::os::unix::fs::MetadataExt;
            (metadata.mode(), Some(metadata.uid()), Some(metadata.gid()))
        };
        #[cfg(not(unix))]
        let (mode, uid, gid) = (0, None, None);

        let name = name.into();
        Self {
            file_name: OsString::from(name.as_str()),
            name,
            kind,
            size: if kind == FileKind::Directory {
                0
            } else {
                metadata.len()
            },
            modified: metadata.modified().ok(),
            mode,
            uid,
            gid,
            readonly: metadata.permissions().readonly(),
            symlink_target,
        }
    }

    /// Use the on-disk name, which may differ from the display name.
    pub fn with_file_name(mut self, file_name: OsString) -> Self {
        self.file_name = file_name;
        self
    }

    /// This entry's location inside `dir`.
    pub fn child_of(&self, dir: &Location) -> Location {
        dir.child(&self.file_name)
    }

    /// Whether this entry is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    /// Whether this entry is a symbolic link.
    pub fn is_symlink(&self) -> bool {
        self.kind == FileKind::Symlink
    }

    /// Modification time in whole seconds since the epoch.
    pub fn mtime_secs(&self) -> Option<u64> {
        self.modified
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
    }
}
