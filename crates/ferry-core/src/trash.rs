//! Trash backends.
//!
//! [`TrashBackend::System`] uses the platform trash through the `trash`
//! crate. [`TrashBackend::Directory`] keeps a freedesktop-style trash
//! (`files/` plus `info/<name>.trashinfo`) under an arbitrary directory,
//! which is what tests and sandboxed setups use.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime, TimeZone};

use crate::error::{FsError, FsResult};
use crate::fs::TrashEntry;
use crate::location::Location;

const INFO_SUFFIX: &str = ".trashinfo";
const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Where trashed items go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrashBackend {
    /// The desktop's trash.
    System,
    /// A freedesktop-layout trash rooted at the given directory.
    Directory(PathBuf),
}

impl TrashBackend {
    /// The directory holding trashed items, when it is reachable as a path.
    pub fn files_dir(&self) -> Option<PathBuf> {
        match self {
            Self::Directory(root) => Some(root.join("files")),
            Self::System => system_files_dir(),
        }
    }

    /// Move `path` into the trash.
    pub fn trash(&self, path: &Path) -> FsResult<()> {
        match self {
            Self::System => trash::delete(path).map_err(|e| trash_error(path, e)),
            Self::Directory(root) => directory_trash(root, path),
        }
    }

    /// List trashed items.
    pub fn list(&self) -> FsResult<Vec<TrashEntry>> {
        match self {
            Self::System => system_list(),
            Self::Directory(root) => directory_list(root),
        }
    }

    /// Restore a trashed item to its original location.
    pub fn restore(&self, entry: &TrashEntry) -> FsResult<()> {
        let original = entry.original.path();
        if fs::symlink_metadata(original).is_ok() {
            return Err(FsError::Exists {
                path: original.to_path_buf(),
            });
        }

        match self {
            Self::System => system_restore(entry),
            Self::Directory(root) => {
                if let Some(parent) = original.parent() {
                    fs::create_dir_all(parent).map_err(|e| FsError::io(parent, e))?;
                }
                let stored = root.join("files").join(&entry.name);
                fs::rename(&stored, original).map_err(|e| FsError::io(&stored, e))?;
                self.forget(&entry.name);
                Ok(())
            }
        }
    }

    /// Permanently delete every trashed item.
    pub fn purge(&self) -> FsResult<usize> {
        match self {
            Self::System => system_purge(),
            Self::Directory(root) => {
                let entries = directory_list(root)?;
                for entry in &entries {
                    let stored = root.join("files").join(&entry.name);
                    let removed = match fs::symlink_metadata(&stored) {
                        Ok(md) if md.is_dir() => fs::remove_dir_all(&stored),
                        Ok(_) => fs::remove_file(&stored),
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                        Err(e) => Err(e),
                    };
                    removed.map_err(|e| FsError::io(&stored, e))?;
                    self.forget(&entry.name);
                }
                Ok(entries.len())
            }
        }
    }

    /// Drop the bookkeeping for a top-level trash entry that left the trash
    /// by other means (moved out or deleted).
    pub fn forget(&self, name: &str) {
        if let Self::Directory(root) = self {
            let info = root.join("info").join(format!("{name}{INFO_SUFFIX}"));
            match fs::remove_file(&info) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                    tracing::warn!(target: "ferry::trash", path = %info.display(), error = %e, "failed to remove trash info");
                }
                _ => {}
            }
        }
    }
}

fn trash_error(path: &Path, error: trash::Error) -> FsError {
    FsError::other(format!("Cannot move {} to the trash: {error}", path.display()))
}

fn directory_trash(root: &Path, path: &Path) -> FsResult<()> {
    let files = root.join("files");
    let info = root.join("info");
    fs::create_dir_all(&files).map_err(|e| FsError::io(&files, e))?;
    fs::create_dir_all(&info).map_err(|e| FsError::io(&info, e))?;

    let base = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| FsError::not_supported("cannot trash a filesystem root"))?;

    // Reserve a name by creating the info file exclusively.
    let mut counter = 1u32;
    let (name, mut info_file, info_path) = loop {
        let name = if counter == 1 {
            base.clone()
        } else {
            format!("{base}.{counter}")
        };
        let info_path = info.join(format!("{name}{INFO_SUFFIX}"));
        if fs::symlink_metadata(files.join(&name)).is_err() {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&info_path)
            {
                Ok(file) => break (name, file, info_path),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(FsError::io(&info_path, e)),
            }
        }
        counter += 1;
    };

    let contents = format!(
        "[Trash Info]\nPath={}\nDeletionDate={}\n",
        path.display(),
        Local::now().format(DATE_FORMAT)
    );
    if let Err(e) = info_file.write_all(contents.as_bytes()) {
        let _ = fs::remove_file(&info_path);
        return Err(FsError::io(&info_path, e));
    }

    let stored = files.join(&name);
    if let Err(e) = fs::rename(path, &stored) {
        let _ = fs::remove_file(&info_path);
        return Err(match e.kind() {
            std::io::ErrorKind::CrossesDevices => {
                FsError::not_supported("the trash is on a different filesystem")
            }
            _ => FsError::io(path, e),
        });
    }

    tracing::debug!(target: "ferry::trash", from = %path.display(), to = %stored.display(), "trashed");
    Ok(())
}

fn directory_list(root: &Path) -> FsResult<Vec<TrashEntry>> {
    let info = root.join("info");
    let entries = match fs::read_dir(&info) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(FsError::io(&info, e)),
    };

    let mut items = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| FsError::io(&info, e))?;
        let file_name = entry.file_name().to_string_lossy().into_owned();
        let Some(name) = file_name.strip_suffix(INFO_SUFFIX) else {
            continue;
        };
        let contents = match fs::read_to_string(entry.path()) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::warn!(target: "ferry::trash", path = %entry.path().display(), error = %e, "unreadable trash info");
                continue;
            }
        };
        let Some((original, deleted_at)) = parse_trash_info(&contents) else {
            continue;
        };

        let stored = root.join("files").join(name);
        let modified = fs::symlink_metadata(&stored)
            .ok()
            .and_then(|md| crate::Metadata::from_std(name, &md, None).mtime_secs());

        items.push(TrashEntry {
            id: name.to_string(),
            name: name.to_string(),
            original: Location::local(original),
            deleted_at,
            modified,
        });
    }
    items.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(items)
}

fn parse_trash_info(contents: &str) -> Option<(PathBuf, Option<i64>)> {
    let mut path = None;
    let mut deleted_at = None;
    for line in contents.lines() {
        if let Some(value) = line.strip_prefix("Path=") {
            path = Some(PathBuf::from(value.trim()));
        } else if let Some(value) = line.strip_prefix("DeletionDate=") {
            deleted_at = NaiveDateTime::parse_from_str(value.trim(), DATE_FORMAT)
                .ok()
                .and_then(|naive| Local.from_local_datetime(&naive).single())
                .map(|dt| dt.timestamp());
        }
    }
    path.map(|p| (p, deleted_at))
}

#[cfg(target_os = "linux")]
fn system_files_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("Trash").join("files"))
}

#[cfg(not(target_os = "linux"))]
fn system_files_dir() -> Option<PathBuf> {
    None
}

#[cfg(any(
    target_os = "windows",
    all(
        unix,
        not(target_os = "macos"),
        not(target_os = "ios"),
        not(target_os = "android")
    )
))]
mod system {
    use std::path::PathBuf;

    use crate::error::{FsError, FsResult};
    use crate::fs::TrashEntry;
    use crate::location::Location;

    fn list_items() -> FsResult<Vec<trash::TrashItem>> {
        trash::os_limited::list().map_err(|e| FsError::other(format!("Cannot list the trash: {e}")))
    }

    /// On freedesktop systems the item id is the path of its info file; the
    /// payload lives next to it under `files/`.
    fn stored_mtime(item: &trash::TrashItem) -> Option<u64> {
        let info = PathBuf::from(&item.id);
        let name = info.file_stem()?;
        let stored = info.parent()?.parent()?.join("files").join(name);
        let md = std::fs::symlink_metadata(stored).ok()?;
        crate::Metadata::from_std("", &md, None).mtime_secs()
    }

    pub(super) fn list() -> FsResult<Vec<TrashEntry>> {
        Ok(list_items()?
            .into_iter()
            .map(|item| TrashEntry {
                id: item.id.to_string_lossy().into_owned(),
                name: item.name.to_string_lossy().into_owned(),
                original: Location::local(item.original_path()),
                deleted_at: Some(item.time_deleted),
                modified: stored_mtime(&item),
            })
            .collect())
    }

    pub(super) fn restore(entry: &TrashEntry) -> FsResult<()> {
        let item = list_items()?
            .into_iter()
            .find(|item| item.id.to_string_lossy() == entry.id)
            .ok_or_else(|| FsError::NotFound {
                path: entry.original.path().to_path_buf(),
            })?;
        trash::os_limited::restore_all(vec![item])
            .map_err(|e| FsError::other(format!("Cannot restore {}: {e}", entry.name)))
    }

    pub(super) fn purge() -> FsResult<usize> {
        let items = list_items()?;
        let count = items.len();
        trash::os_limited::purge_all(items)
            .map_err(|e| FsError::other(format!("Cannot empty the trash: {e}")))?;
        Ok(count)
    }
}

#[cfg(any(
    target_os = "windows",
    all(
        unix,
        not(target_os = "macos"),
        not(target_os = "ios"),
        not(target_os = "android")
    )
))]
use system::{list as system_list, purge as system_purge, restore as system_restore};

#[cfg(not(any(
    target_os = "windows",
    all(
        unix,
        not(target_os = "macos"),
        not(target_os = "ios"),
        not(target_os = "android")
    )
)))]
fn system_list() -> FsResult<Vec<TrashEntry>> {
    Err(FsError::not_supported("listing the system trash"))
}

#[cfg(not(any(
    target_os = "windows",
    all(
        unix,
        not(target_os = "macos"),
        not(target_os = "ios"),
        not(target_os = "android")
    )
)))]
fn system_restore(_entry: &TrashEntry) -> FsResult<()> {
    Err(FsError::not_supported("restoring from the system trash"))
}

#[cfg(not(any(
    target_os = "windows",
    all(
        unix,
        not(target_os = "macos"),
        not(target_os = "ios"),
        not(target_os = "android")
    )
)))]
fn system_purge() -> FsResult<usize> {
    Err(FsError::not_supported("emptying the system trash"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_directory_trash_round_trip() {
        let temp = TempDir::new().unwrap();
        let backend = TrashBackend::Directory(temp.path().join("trash"));
        let file = temp.path().join("doomed.txt");
        fs::write(&file, "bye").unwrap();

        backend.trash(&file).unwrap();
        assert!(!file.exists());

        let items = backend.list().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].original, Location::local(&file));
        assert!(items[0].modified.is_some());
        assert!(items[0].deleted_at.is_some());

        backend.restore(&items[0]).unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "bye");
        assert!(backend.list().unwrap().is_empty());
    }

    #[test]
    fn test_directory_trash_name_collision() {
        let temp = TempDir::new().unwrap();
        let backend = TrashBackend::Directory(temp.path().join("trash"));
        for _ in 0..2 {
            let file = temp.path().join("same.txt");
            fs::write(&file, "x").unwrap();
            backend.trash(&file).unwrap();
        }
        let names: Vec<_> = backend.list().unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["same.txt".to_string(), "same.txt.2".to_string()]);
        assert_eq!(backend.purge().unwrap(), 2);
        assert!(backend.list().unwrap().is_empty());
    }
}
