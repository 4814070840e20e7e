use std::fs;
use std::path::Path;

use ferry_core::{AutoInteraction, LocalFileSystem, Location};
use ferry_scan::{OpKind, SourceInfo, SourceScanner};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Build a tree:
/// root/
///   a.txt (5 bytes)
///   sub/
///     b.txt (10 bytes)
///     deeper/
///       c.txt (1 byte)
///   empty/
fn build_tree(root: &Path) {
    fs::create_dir_all(root.join("sub/deeper")).unwrap();
    fs::create_dir_all(root.join("empty")).unwrap();
    fs::write(root.join("a.txt"), "hello").unwrap();
    fs::write(root.join("sub/b.txt"), "0123456789").unwrap();
    fs::write(root.join("sub/deeper/c.txt"), "x").unwrap();
}

fn scan(sources: &[Location], op: OpKind) -> SourceInfo {
    let fs = LocalFileSystem::new();
    let interaction = AutoInteraction::cancelling();
    let cancel = CancellationToken::new();
    let mut skip_all = false;
    SourceScanner::new(&fs, &interaction, &cancel).scan(sources, op, &mut skip_all)
}

#[test]
fn test_counts_every_reachable_entry() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("root");
    build_tree(&root);

    let info = scan(&[Location::local(&root)], OpKind::Copy);

    // root, a.txt, sub, b.txt, deeper, c.txt, empty
    assert_eq!(info.num_files, 7);
    assert_eq!(info.num_bytes, 16);
    assert_eq!(info.op, OpKind::Copy);
}

#[test]
fn test_multiple_sources_accumulate() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("root");
    build_tree(&root);

    let info = scan(
        &[
            Location::local(root.join("a.txt")),
            Location::local(root.join("sub")),
        ],
        OpKind::Move,
    );
    assert_eq!(info.num_files, 5);
    assert_eq!(info.num_bytes, 16);
}

#[test]
fn test_partial_reports_every_interval() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("many");
    fs::create_dir(&root).unwrap();
    for i in 0..250 {
        fs::write(root.join(format!("f{i}")), "").unwrap();
    }

    let fs = LocalFileSystem::new();
    let interaction = AutoInteraction::cancelling();
    let cancel = CancellationToken::new();
    let mut reports = Vec::new();
    let mut skip_all = false;
    let info = SourceScanner::new(&fs, &interaction, &cancel)
        .report_interval(100)
        .on_progress(|info| reports.push(info.num_files))
        .scan(&[Location::local(&root)], OpKind::Delete, &mut skip_all);

    assert_eq!(info.num_files, 251);
    // initial, at 100, at 200, final
    assert_eq!(reports, vec![0, 100, 200, 251]);
}

#[test]
fn test_cancelled_scan_stops_early() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("root");
    build_tree(&root);

    let fs = LocalFileSystem::new();
    let interaction = AutoInteraction::cancelling();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut skip_all = false;
    let info = SourceScanner::new(&fs, &interaction, &cancel).scan(
        &[Location::local(&root)],
        OpKind::Copy,
        &mut skip_all,
    );
    assert_eq!(info.num_files, 0);
}

#[test]
fn test_error_cancel_answer_cancels_job() {
    let temp = TempDir::new().unwrap();
    let fs = LocalFileSystem::new();
    let interaction = AutoInteraction::cancelling();
    let cancel = CancellationToken::new();
    let mut skip_all = false;

    let sources = [
        Location::local(temp.path().join("missing")),
        Location::local(temp.path()),
    ];
    let info = SourceScanner::new(&fs, &interaction, &cancel).scan(&sources, OpKind::Copy, &mut skip_all);

    assert!(cancel.is_cancelled());
    assert_eq!(info.num_files, 0);
}
