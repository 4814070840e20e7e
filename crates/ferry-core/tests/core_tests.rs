use std::fs;
use std::sync::Mutex;

use ferry_core::{
    ChangeEvent, ChangeNotifier, ChangeQueue, EngineConfig, FileSystem, FsError, LocalFileSystem, Location, Scheme,
    TransferFlags,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

#[test]
fn test_location_parsing_and_normalization() {
    let file = Location::parse("file:///a/./b/../c").unwrap();
    assert_eq!(file, Location::local("/a/c"));
    assert_eq!(file.uri(), "file:///a/c");
    assert_eq!(file.to_string(), "/a/c");

    let trashed = Location::parse("trash:///x").unwrap();
    assert_eq!(trashed.scheme(), Scheme::Trash);
    assert!(trashed.is_trash());
    assert_eq!(trashed.parent(), Some(Location::trash_root()));
    assert_eq!(trashed.to_string(), "trash:///x");

    assert!(Location::parse("nope:///x").is_err());
    assert!(Location::local("/a").is_ancestor_of(&Location::local("/a/b/c")));
    assert!(!Location::local("/a").is_ancestor_of(&Location::local("/a")));
    assert!(!Location::local("/a").is_ancestor_of(&Location::trash_root().child("a/b")));
}

#[test]
fn test_copy_respects_overwrite_flag() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("src"), "new").unwrap();
    fs::write(temp.path().join("dst"), "old").unwrap();

    let local = LocalFileSystem::new();
    let cancel = CancellationToken::new();
    let src = Location::local(temp.path().join("src"));
    let dst = Location::local(temp.path().join("dst"));

    let mut reported = 0;
    let result = local.copy(&src, &dst, TransferFlags::nofollow(), &cancel, &mut |n| reported = n);
    assert!(matches!(result, Err(FsError::Exists { .. })));
    assert_eq!(fs::read_to_string(temp.path().join("dst")).unwrap(), "old");

    local
        .copy(&src, &dst, TransferFlags::nofollow().overwrite(true), &cancel, &mut |n| reported = n)
        .unwrap();
    assert_eq!(fs::read_to_string(temp.path().join("dst")).unwrap(), "new");
    assert_eq!(reported, 3);
}

#[test]
fn test_cancelled_copy_leaves_no_target() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("src"), "data").unwrap();

    let local = LocalFileSystem::new();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = local.copy(
        &Location::local(temp.path().join("src")),
        &Location::local(temp.path().join("dst")),
        TransferFlags::default(),
        &cancel,
        &mut |_| {},
    );
    assert!(result.is_err_and(|e| e.is_cancelled()));
    assert!(!temp.path().join("dst").exists());
}

#[test]
fn test_directory_trash_round_trip() {
    let temp = TempDir::new().unwrap();
    let work = temp.path().join("work");
    fs::create_dir(&work).unwrap();
    fs::write(work.join("doc.txt"), "keep").unwrap();

    let local = LocalFileSystem::with_trash_dir(temp.path().join("trash"));
    let doc = Location::local(work.join("doc.txt"));
    local.trash(&doc).unwrap();
    assert!(!work.join("doc.txt").exists());

    let entries = local.list_trash().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].original, doc);
    assert!(entries[0].modified.is_some());

    // Trashed entries are reachable through trash: locations.
    let md = local.stat(&Location::trash_root().child(&entries[0].name), false).unwrap();
    assert_eq!(md.size, 4);

    local.restore_from_trash(&entries[0]).unwrap();
    assert_eq!(fs::read_to_string(work.join("doc.txt")).unwrap(), "keep");
    assert!(local.list_trash().unwrap().is_empty());
}

#[test]
fn test_trashing_twice_keeps_both() {
    let temp = TempDir::new().unwrap();
    let local = LocalFileSystem::with_trash_dir(temp.path().join("trash"));
    let doc = Location::local(temp.path().join("doc"));

    for contents in ["first", "second"] {
        fs::write(doc.path(), contents).unwrap();
        local.trash(&doc).unwrap();
    }

    assert_eq!(local.list_trash().unwrap().len(), 2);
    assert_eq!(local.empty_trash().unwrap(), 2);
    assert!(local.list_trash().unwrap().is_empty());
}

#[derive(Default)]
struct Counter {
    batches: Mutex<Vec<usize>>,
}

impl ChangeNotifier for Counter {
    fn files_added(&self, files: &[Location]) {
        self.batches.lock().unwrap().push(files.len());
    }
    fn files_changed(&self, files: &[Location]) {
        self.batches.lock().unwrap().push(files.len());
    }
    fn files_removed(&self, files: &[Location]) {
        self.batches.lock().unwrap().push(files.len());
    }
    fn files_moved(&self, moves: &[(Location, Location)]) {
        self.batches.lock().unwrap().push(moves.len());
    }
}

#[test]
fn test_change_queue_batches() {
    let queue = ChangeQueue::new(2);
    for i in 0..5 {
        queue.enqueue(ChangeEvent::added(Location::local(format!("/f{i}"))));
    }
    queue.enqueue(ChangeEvent::removed(Location::local("/gone")));

    let counter = Counter::default();
    queue.flush(false, &counter);
    assert_eq!(*counter.batches.lock().unwrap(), vec![2, 2, 1, 1]);
    assert!(queue.is_empty());
}

#[test]
fn test_config_file_fills_defaults() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    fs::write(&path, "undo_levels = 3\nconfirm_delete = false\n").unwrap();

    let config = EngineConfig::load_from(&path).unwrap();
    assert_eq!(config.undo_levels, 3);
    assert!(!config.confirm_delete);
    assert_eq!(config.change_batch_size, EngineConfig::default().change_batch_size);

    fs::write(&path, "undo_levels = 0\n").unwrap();
    assert!(EngineConfig::load_from(&path).is_err());
}

#[cfg(unix)]
#[test]
fn test_enumerate_keeps_on_disk_names() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let temp = TempDir::new().unwrap();
    let raw = OsStr::from_bytes(b"bad\xff.txt");
    fs::write(temp.path().join(raw), "raw").unwrap();

    let local = LocalFileSystem::new();
    let dir = Location::local(temp.path());
    let entries: Vec<_> = local.enumerate(&dir).unwrap().map(Result::unwrap).collect();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].file_name, raw);
    assert_eq!(entries[0].name, "bad\u{fffd}.txt");

    let child = entries[0].child_of(&dir);
    assert_eq!(local.stat(&child, false).unwrap().size, 3);
}
