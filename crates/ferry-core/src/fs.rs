//! The filesystem capability consumed by the engine.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::FsResult;
use crate::location::Location;
use crate::metadata::Metadata;

/// Iterator over the children of a directory.
///
/// Each item may fail independently, which the engine treats as an error
/// part-way through enumeration.
pub type DirEntries<'a> = Box<dyn Iterator<Item = FsResult<Metadata>> + Send + 'a>;

/// Flags for copy and move.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferFlags {
    /// Copy symbolic links rather than their targets.
    pub no_follow_symlinks: bool,
    /// Replace an existing target.
    pub overwrite: bool,
    /// Fail with `NotSupported` instead of copying when a rename is impossible.
    pub no_fallback_for_move: bool,
    /// Give copies default permissions instead of the source's.
    pub target_default_perms: bool,
}

impl TransferFlags {
    /// Flags used by every engine transfer: never follow symlinks.
    pub fn nofollow() -> Self {
        Self {
            no_follow_symlinks: true,
            ..Default::default()
        }
    }

    /// Set the overwrite flag.
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Set the no-fallback-for-move flag.
    pub fn no_fallback(mut self, no_fallback: bool) -> Self {
        self.no_fallback_for_move = no_fallback;
        self
    }

    /// Set the default-permissions flag.
    pub fn default_perms(mut self, default_perms: bool) -> Self {
        self.target_default_perms = default_perms;
        self
    }
}

/// An item currently in the trash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrashEntry {
    /// Backend-specific identifier.
    pub id: String,
    /// Name of the entry inside the trash.
    pub name: String,
    /// Where the item lived before it was trashed.
    pub original: Location,
    /// Deletion time in seconds since the epoch.
    pub deleted_at: Option<i64>,
    /// Modification time of the trashed item in seconds since the epoch.
    pub modified: Option<u64>,
}

/// Filesystem operations the engine needs.
///
/// All methods are blocking; the engine calls them from worker threads.
pub trait FileSystem: Send + Sync {
    /// Query metadata, optionally following a final symlink.
    fn stat(&self, location: &Location, follow_symlinks: bool) -> FsResult<Metadata>;

    /// Enumerate the children of a directory.
    fn enumerate(&self, dir: &Location) -> FsResult<DirEntries<'_>>;

    /// Copy a file or symlink. Directories report `WouldRecurse`/`WouldMerge`.
    ///
    /// `progress` receives the cumulative number of bytes written.
    fn copy(
        &self,
        source: &Location,
        destination: &Location,
        flags: TransferFlags,
        cancel: &CancellationToken,
        progress: &mut dyn FnMut(u64),
    ) -> FsResult<()>;

    /// Move (rename) an entry.
    fn move_to(
        &self,
        source: &Location,
        destination: &Location,
        flags: TransferFlags,
        cancel: &CancellationToken,
    ) -> FsResult<()>;

    /// Delete a file, symlink or empty directory.
    fn delete(&self, location: &Location) -> FsResult<()>;

    /// Move an entry to the trash.
    fn trash(&self, location: &Location) -> FsResult<()>;

    /// Create a single directory.
    fn make_dir(&self, location: &Location) -> FsResult<()>;

    /// Create a symbolic link at `location` pointing at `target`.
    fn make_symlink(&self, target: &Path, location: &Location) -> FsResult<()>;

    /// Create a new file, failing with `Exists` if it is already there.
    fn create_file(&self, location: &Location, template: Option<&Location>) -> FsResult<()>;

    /// Rename an entry within its directory, returning the new location.
    fn rename(&self, location: &Location, new_name: &str) -> FsResult<Location>;

    /// Copy permissions and timestamps from `source` to `destination`.
    fn copy_attributes(&self, source: &Location, destination: &Location) -> FsResult<()>;

    /// An identifier that is equal for locations on the same filesystem.
    fn query_filesystem_id(&self, location: &Location) -> FsResult<String>;

    /// The filesystem type name (e.g. `ext4`, `vfat`).
    fn query_filesystem_type(&self, location: &Location) -> FsResult<String>;

    /// Whether the filesystem holding `location` is mounted read-only.
    fn query_filesystem_readonly(&self, location: &Location) -> FsResult<bool>;

    /// Maximum length of a single name on the filesystem, if known.
    fn max_name_length(&self, location: &Location) -> Option<usize>;

    /// Whether the entry can be written to.
    fn is_writable(&self, location: &Location) -> bool;

    /// List the items currently in the trash.
    fn list_trash(&self) -> FsResult<Vec<TrashEntry>>;

    /// Move a trashed item back to its original location.
    fn restore_from_trash(&self, entry: &TrashEntry) -> FsResult<()>;

    /// Permanently remove everything in the trash, returning the item count.
    fn empty_trash(&self) -> FsResult<usize>;

    /// Set unix permission bits.
    fn set_permissions(&self, location: &Location, mode: u32) -> FsResult<()>;

    /// Change the owning user (name or numeric id).
    fn set_owner(&self, location: &Location, owner: &str) -> FsResult<()>;

    /// Change the owning group (name or numeric id).
    fn set_group(&self, location: &Location, group: &str) -> FsResult<()>;

    /// Whether anything exists at `location` (symlinks are not followed).
    fn exists(&self, location: &Location) -> bool {
        self.stat(location, false).is_ok()
    }
}
