//! `FileSystem` implementation over `std::fs`.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::error::{FsError, FsResult};
use crate::fs::{DirEntries, FileSystem, TransferFlags, TrashEntry};
use crate::location::{Location, Scheme};
use crate::metadata::Metadata;
use crate::trash::TrashBackend;

/// Buffer size for streaming file contents.
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// The local filesystem.
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    trash: TrashBackend,
    max_name_length: usize,
}

impl Default for LocalFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalFileSystem {
    /// Local filesystem using the platform trash.
    pub fn new() -> Self {
        Self {
            trash: TrashBackend::System,
            max_name_length: 255,
        }
    }

    /// Local filesystem with a directory-backed trash.
    pub fn with_trash_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            trash: TrashBackend::Directory(dir.into()),
            ..Self::new()
        }
    }

    /// Build from engine configuration.
    pub fn from_config(config: &EngineConfig) -> Self {
        let trash = match &config.trash_dir {
            Some(dir) => TrashBackend::Directory(dir.clone()),
            None => TrashBackend::System,
        };
        Self {
            trash,
            max_name_length: config.max_name_length,
        }
    }

    /// The trash backend in use.
    pub fn trash_backend(&self) -> &TrashBackend {
        &self.trash
    }

    /// Map a location onto a physical path.
    fn resolve(&self, location: &Location) -> FsResult<PathBuf> {
        match location.scheme() {
            Scheme::File => Ok(location.path().to_path_buf()),
            Scheme::Trash => {
                let files = self
                    .trash
                    .files_dir()
                    .ok_or_else(|| FsError::not_supported("the trash is not reachable as a path"))?;
                let relative = location.path().strip_prefix("/").unwrap_or(location.path());
                Ok(files.join(relative))
            }
            Scheme::Burn => Err(FsError::not_supported(format!(
                "{} is not a local location",
                location.uri()
            ))),
        }
    }

    /// For a top-level trash entry, its name inside the trash.
    fn trash_entry_name(location: &Location) -> Option<String> {
        if !location.is_trash() {
            return None;
        }
        match location.parent() {
            Some(parent) if parent.is_root() => location.file_name().map(str::to_string),
            _ => None,
        }
    }

    fn stat_path(path: &Path, follow_symlinks: bool) -> FsResult<Metadata> {
        let md = if follow_symlinks {
            fs::metadata(path)
        } else {
            fs::symlink_metadata(path)
        }
        .map_err(|e| FsError::io(path, e))?;

        let target = if md.file_type().is_symlink() {
            fs::read_link(path).ok()
        } else {
            None
        };
        let Some(file_name) = path.file_name() else {
            return Ok(Metadata::from_std("/", &md, target));
        };
        Ok(Metadata::from_std(file_name.to_string_lossy().as_ref(), &md, target)
            .with_file_name(file_name.to_os_string()))
    }

    fn copy_contents(
        source: &Path,
        destination: &Path,
        overwrite: bool,
        cancel: &CancellationToken,
        progress: &mut dyn FnMut(u64),
    ) -> FsResult<()> {
        let mut reader = File::open(source).map_err(|e| FsError::io(source, e))?;
        let mut options = OpenOptions::new();
        options.write(true);
        if overwrite {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        let mut writer = options
            .open(destination)
            .map_err(|e| FsError::io(destination, e))?;

        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
        let mut written = 0u64;
        loop {
            if cancel.is_cancelled() {
                drop(writer);
                let _ = fs::remove_file(destination);
                return Err(FsError::Cancelled);
            }
            let read = reader
                .read(&mut buffer)
                .map_err(|e| FsError::io(source, e))?;
            if read == 0 {
                break;
            }
            writer
                .write_all(&buffer[..read])
                .map_err(|e| FsError::io(destination, e))?;
            written += read as u64;
            progress(written);
        }
        writer.flush().map_err(|e| FsError::io(destination, e))
    }

    fn apply_attributes(source_md: &fs::Metadata, destination: &Path, permissions: bool) -> FsResult<()> {
        if permissions {
            fs::set_permissions(destination, source_md.permissions())
                .map_err(|e| FsError::io(destination, e))?;
        }
        if let Ok(modified) = source_md.modified() {
            File::open(destination)
                .and_then(|f| f.set_modified(modified))
                .map_err(|e| FsError::io(destination, e))?;
        }
        Ok(())
    }

    #[cfg(unix)]
    fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
        std::os::unix::fs::symlink(target, link)
    }

    #[cfg(windows)]
    fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
        if target.is_dir() {
            std::os::windows::fs::symlink_dir(target, link)
        } else {
            std::os::windows::fs::symlink_file(target, link)
        }
    }

    #[cfg(not(any(unix, windows)))]
    fn symlink(_target: &Path, _link: &Path) -> std::io::Result<()> {
        Err(std::io::Error::from(std::io::ErrorKind::Unsupported))
    }

    fn remove_entry(path: &Path, md: &fs::Metadata) -> FsResult<()> {
        if md.is_dir() {
            fs::remove_dir(path)
        } else {
            fs::remove_file(path)
        }
        .map_err(|e| FsError::io(path, e))
    }
}

impl FileSystem for LocalFileSystem {
    fn stat(&self, location: &Location, follow_symlinks: bool) -> FsResult<Metadata> {
        Self::stat_path(&self.resolve(location)?, follow_symlinks)
    }

    fn enumerate(&self, dir: &Location) -> FsResult<DirEntries<'_>> {
        let path = self.resolve(dir)?;
        let entries = fs::read_dir(&path).map_err(|e| FsError::io(&path, e))?;
        Ok(Box::new(entries.map(move |entry| {
            let entry = entry.map_err(|e| FsError::io(&path, e))?;
            Self::stat_path(&entry.path(), false)
        })))
    }

    fn copy(
        &self,
        source: &Location,
        destination: &Location,
        flags: TransferFlags,
        cancel: &CancellationToken,
        progress: &mut dyn FnMut(u64),
    ) -> FsResult<()> {
        if cancel.is_cancelled() {
            return Err(FsError::Cancelled);
        }
        let src = self.resolve(source)?;
        let dst = self.resolve(destination)?;

        let src_md = if flags.no_follow_symlinks {
            fs::symlink_metadata(&src)
        } else {
            fs::metadata(&src)
        }
        .map_err(|e| FsError::io(&src, e))?;
        let dst_md = fs::symlink_metadata(&dst).ok();

        if src_md.is_dir() {
            return Err(match dst_md {
                None => FsError::WouldRecurse { path: src },
                Some(_) if !flags.overwrite => FsError::Exists { path: dst },
                Some(md) if md.is_dir() => FsError::WouldMerge { path: dst },
                Some(_) => FsError::WouldRecurse { path: src },
            });
        }

        if let Some(md) = &dst_md {
            if !flags.overwrite {
                return Err(FsError::Exists { path: dst });
            }
            if md.is_dir() {
                return Err(FsError::IsDirectory { path: dst });
            }
        }

        if src_md.file_type().is_symlink() {
            let target = fs::read_link(&src).map_err(|e| FsError::io(&src, e))?;
            if dst_md.is_some() {
                fs::remove_file(&dst).map_err(|e| FsError::io(&dst, e))?;
            }
            return Self::symlink(&target, &dst).map_err(|e| FsError::io(&dst, e));
        }

        Self::copy_contents(&src, &dst, flags.overwrite, cancel, progress)?;
        if let Err(e) = Self::apply_attributes(&src_md, &dst, !flags.target_default_perms) {
            tracing::warn!(target: "ferry::fs", path = %dst.display(), error = %e, "could not preserve attributes");
        }
        Ok(())
    }

    fn move_to(
        &self,
        source: &Location,
        destination: &Location,
        flags: TransferFlags,
        cancel: &CancellationToken,
    ) -> FsResult<()> {
        if cancel.is_cancelled() {
            return Err(FsError::Cancelled);
        }
        let src = self.resolve(source)?;
        let dst = self.resolve(destination)?;

        let src_md = fs::symlink_metadata(&src).map_err(|e| FsError::io(&src, e))?;
        if let Ok(dst_md) = fs::symlink_metadata(&dst) {
            if !flags.overwrite {
                return Err(FsError::Exists { path: dst });
            }
            if dst_md.is_dir() {
                return Err(if src_md.is_dir() {
                    FsError::WouldMerge { path: dst }
                } else {
                    FsError::IsDirectory { path: dst }
                });
            }
            if src_md.is_dir() {
                return Err(FsError::WouldRecurse { path: src });
            }
        }

        match fs::rename(&src, &dst) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
                if flags.no_fallback_for_move {
                    return Err(FsError::not_supported("move across filesystems"));
                }
                if src_md.is_dir() {
                    return Err(FsError::WouldRecurse { path: src });
                }
                self.copy(source, destination, flags.overwrite(true), cancel, &mut |_| {})?;
                fs::remove_file(&src).map_err(|e| FsError::io(&src, e))?;
            }
            Err(e) => return Err(FsError::io(&src, e)),
        }

        if let Some(name) = Self::trash_entry_name(source) {
            self.trash.forget(&name);
        }
        Ok(())
    }

    fn delete(&self, location: &Location) -> FsResult<()> {
        let path = self.resolve(location)?;
        let md = fs::symlink_metadata(&path).map_err(|e| FsError::io(&path, e))?;
        Self::remove_entry(&path, &md)?;
        if let Some(name) = Self::trash_entry_name(location) {
            self.trash.forget(&name);
        }
        Ok(())
    }

    fn trash(&self, location: &Location) -> FsResult<()> {
        if location.is_trash() {
            return Err(FsError::not_supported("the item is already in the trash"));
        }
        let path = self.resolve(location)?;
        fs::symlink_metadata(&path).map_err(|e| FsError::io(&path, e))?;
        self.trash.trash(&path)
    }

    fn make_dir(&self, location: &Location) -> FsResult<()> {
        let path = self.resolve(location)?;
        fs::create_dir(&path).map_err(|e| FsError::io(&path, e))
    }

    fn make_symlink(&self, target: &Path, location: &Location) -> FsResult<()> {
        if !location.is_native() {
            return Err(FsError::not_supported(
                "Symbolic links only supported for local files",
            ));
        }
        let path = self.resolve(location)?;
        Self::symlink(target, &path).map_err(|e| FsError::io(&path, e))
    }

    fn create_file(&self, location: &Location, template: Option<&Location>) -> FsResult<()> {
        let path = self.resolve(location)?;
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| FsError::io(&path, e))?;

        if let Some(template) = template {
            let template_path = self.resolve(template)?;
            let mut reader = File::open(&template_path).map_err(|e| FsError::io(&template_path, e))?;
            std::io::copy(&mut reader, &mut file).map_err(|e| FsError::io(&path, e))?;
        }
        Ok(())
    }

    fn rename(&self, location: &Location, new_name: &str) -> FsResult<Location> {
        if new_name.is_empty() || new_name.contains('/') || new_name.contains('\0') {
            return Err(FsError::InvalidFilename {
                path: PathBuf::from(new_name),
            });
        }
        let parent = location.parent().ok_or_else(|| FsError::not_supported("cannot rename a root"))?;
        let target = parent.child(new_name);
        if target == *location {
            return Ok(target);
        }

        let src = self.resolve(location)?;
        let dst = self.resolve(&target)?;
        if fs::symlink_metadata(&dst).is_ok() {
            return Err(FsError::Exists { path: dst });
        }
        fs::rename(&src, &dst).map_err(|e| FsError::io(&src, e))?;
        if let Some(name) = Self::trash_entry_name(location) {
            self.trash.forget(&name);
        }
        Ok(target)
    }

    fn copy_attributes(&self, source: &Location, destination: &Location) -> FsResult<()> {
        let src = self.resolve(source)?;
        let dst = self.resolve(destination)?;
        let md = fs::metadata(&src).map_err(|e| FsError::io(&src, e))?;
        Self::apply_attributes(&md, &dst, true)
    }

    fn query_filesystem_id(&self, location: &Location) -> FsResult<String> {
        let path = self.resolve(location)?;
        let md = fs::metadata(&path).map_err(|e| FsError::io(&path, e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            Ok(format!("dev:{}", md.dev()))
        }
        #[cfg(not(unix))]
        {
            let _ = md;
            Ok("local".to_string())
        }
    }

    fn query_filesystem_type(&self, location: &Location) -> FsResult<String> {
        let path = self.resolve(location)?;
        Ok(mounts::lookup(&path)
            .map(|mount| mount.fs_type)
            .unwrap_or_else(|| "unknown".to_string()))
    }

    fn query_filesystem_readonly(&self, location: &Location) -> FsResult<bool> {
        let path = self.resolve(location)?;
        Ok(mounts::lookup(&path).is_some_and(|mount| mount.readonly))
    }

    fn max_name_length(&self, _location: &Location) -> Option<usize> {
        Some(self.max_name_length)
    }

    fn is_writable(&self, location: &Location) -> bool {
        self.resolve(location)
            .ok()
            .and_then(|path| fs::metadata(path).ok())
            .is_some_and(|md| !md.permissions().readonly())
    }

    fn list_trash(&self) -> FsResult<Vec<TrashEntry>> {
        self.trash.list()
    }

    fn restore_from_trash(&self, entry: &TrashEntry) -> FsResult<()> {
        self.trash.restore(entry)
    }

    fn empty_trash(&self) -> FsResult<usize> {
        self.trash.purge()
    }

    fn set_permissions(&self, location: &Location, mode: u32) -> FsResult<()> {
        let path = self.resolve(location)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(mode))
                .map_err(|e| FsError::io(&path, e))
        }
        #[cfg(not(unix))]
        {
            let _ = (path, mode);
            Err(FsError::not_supported("unix permissions"))
        }
    }

    fn set_owner(&self, location: &Location, owner: &str) -> FsResult<()> {
        let path = self.resolve(location)?;
        #[cfg(unix)]
        {
            let uid = ids::resolve("/etc/passwd", owner)
                .ok_or_else(|| FsError::other(format!("Unknown user: {owner}")))?;
            std::os::unix::fs::lchown(&path, Some(uid), None).map_err(|e| FsError::io(&path, e))
        }
        #[cfg(not(unix))]
        {
            let _ = (path, owner);
            Err(FsError::not_supported("changing owners"))
        }
    }

    fn set_group(&self, location: &Location, group: &str) -> FsResult<()> {
        let path = self.resolve(location)?;
        #[cfg(unix)]
        {
            let gid = ids::resolve("/etc/group", group)
                .ok_or_else(|| FsError::other(format!("Unknown group: {group}")))?;
            std::os::unix::fs::lchown(&path, None, Some(gid)).map_err(|e| FsError::io(&path, e))
        }
        #[cfg(not(unix))]
        {
            let _ = (path, group);
            Err(FsError::not_supported("changing groups"))
        }
    }
}

/// Mount table lookups.
mod mounts {
    use std::path::{Path, PathBuf};

    pub(super) struct Mount {
        pub fs_type: String,
        pub readonly: bool,
    }

    /// Find the mount holding `path` (longest mount point prefix).
    #[cfg(target_os = "linux")]
    pub(super) fn lookup(path: &Path) -> Option<Mount> {
        let table = std::fs::read_to_string("/proc/self/mounts").ok()?;
        let path = std::fs::canonicalize(path)
            .or_else(|_| path.parent().map_or(Ok(PathBuf::from("/")), std::fs::canonicalize))
            .ok()?;

        table
            .lines()
            .filter_map(|line| {
                let mut fields = line.split_whitespace();
                let _device = fields.next()?;
                let mount_point = PathBuf::from(fields.next()?.replace("\\040", " "));
                let fs_type = fields.next()?.to_string();
                let options = fields.next()?;
                Some((mount_point, fs_type, options.split(',').any(|o| o == "ro")))
            })
            .filter(|(mount_point, _, _)| path.starts_with(mount_point))
            .max_by_key(|(mount_point, _, _)| mount_point.components().count())
            .map(|(_, fs_type, readonly)| Mount { fs_type, readonly })
    }

    #[cfg(not(target_os = "linux"))]
    pub(super) fn lookup(_path: &Path) -> Option<Mount> {
        None
    }
}

/// User and group name resolution from the flat databases.
#[cfg(unix)]
mod ids {
    /// Resolve a name or numeric id against `/etc/passwd`-style files.
    pub(super) fn resolve(database: &str, name_or_id: &str) -> Option<u32> {
        if let Ok(id) = name_or_id.parse() {
            return Some(id);
        }
        let contents = std::fs::read_to_string(database).ok()?;
        contents.lines().find_map(|line| {
            let mut fields = line.split(':');
            let name = fields.next()?;
            let _password = fields.next()?;
            let id = fields.next()?;
            (name == name_or_id).then(|| id.parse().ok()).flatten()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, LocalFileSystem) {
        let temp = TempDir::new().unwrap();
        let fs = LocalFileSystem::with_trash_dir(temp.path().join(".trash"));
        (temp, fs)
    }

    #[test]
    fn test_copy_reports_structural_errors() {
        let (temp, fs) = setup();
        let cancel = CancellationToken::new();
        let dir = Location::local(temp.path().join("dir"));
        let file = Location::local(temp.path().join("file.txt"));
        std::fs::create_dir(dir.path()).unwrap();
        std::fs::write(file.path(), "abc").unwrap();

        let target = Location::local(temp.path().join("copy"));
        let err = fs
            .copy(&dir, &target, TransferFlags::nofollow(), &cancel, &mut |_| {})
            .unwrap_err();
        assert!(matches!(err, FsError::WouldRecurse { .. }));

        let other_dir = Location::local(temp.path().join("other"));
        std::fs::create_dir(other_dir.path()).unwrap();
        let err = fs
            .copy(&dir, &other_dir, TransferFlags::nofollow(), &cancel, &mut |_| {})
            .unwrap_err();
        assert!(matches!(err, FsError::Exists { .. }));
        let err = fs
            .copy(
                &dir,
                &other_dir,
                TransferFlags::nofollow().overwrite(true),
                &cancel,
                &mut |_| {},
            )
            .unwrap_err();
        assert!(matches!(err, FsError::WouldMerge { .. }));

        let err = fs
            .copy(
                &file,
                &other_dir,
                TransferFlags::nofollow().overwrite(true),
                &cancel,
                &mut |_| {},
            )
            .unwrap_err();
        assert!(matches!(err, FsError::IsDirectory { .. }));
    }

    #[test]
    fn test_copy_file_with_progress() {
        let (temp, fs) = setup();
        let src = Location::local(temp.path().join("a.txt"));
        let dst = Location::local(temp.path().join("b.txt"));
        std::fs::write(src.path(), "hello").unwrap();

        let mut seen = 0;
        fs.copy(
            &src,
            &dst,
            TransferFlags::nofollow(),
            &CancellationToken::new(),
            &mut |bytes| seen = bytes,
        )
        .unwrap();
        assert_eq!(seen, 5);
        assert_eq!(std::fs::read_to_string(dst.path()).unwrap(), "hello");

        let err = fs
            .copy(&src, &dst, TransferFlags::nofollow(), &CancellationToken::new(), &mut |_| {})
            .unwrap_err();
        assert!(matches!(err, FsError::Exists { .. }));
    }

    #[test]
    fn test_cancelled_copy() {
        let (temp, fs) = setup();
        let src = Location::local(temp.path().join("a.txt"));
        std::fs::write(src.path(), "hello").unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = fs
            .copy(&src, &src.parent().unwrap().child("b.txt"), TransferFlags::nofollow(), &cancel, &mut |_| {})
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_move_and_rename() {
        let (temp, fs) = setup();
        let cancel = CancellationToken::new();
        let src = Location::local(temp.path().join("a.txt"));
        std::fs::write(src.path(), "x").unwrap();
        let dst = Location::local(temp.path().join("b.txt"));

        fs.move_to(&src, &dst, TransferFlags::nofollow(), &cancel).unwrap();
        assert!(!fs.exists(&src));

        let renamed = fs.rename(&dst, "c.txt").unwrap();
        assert_eq!(renamed.file_name(), Some("c.txt"));
        assert!(matches!(
            fs.rename(&renamed, "bad/name"),
            Err(FsError::InvalidFilename { .. })
        ));
    }

    #[test]
    fn test_trash_scheme_resolves_into_trash() {
        let (temp, fs) = setup();
        let file = Location::local(temp.path().join("gone.txt"));
        std::fs::write(file.path(), "x").unwrap();
        fs.trash(&file).unwrap();

        let in_trash = Location::trash_root().child("gone.txt");
        assert!(fs.exists(&in_trash));
        fs.delete(&in_trash).unwrap();
        assert!(fs.list_trash().unwrap().is_empty());
    }
}
