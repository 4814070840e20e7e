//! Permission, owner and group changes.

use indexmap::IndexMap;

use ferry_core::{ChangeEvent, Location};

use crate::context::JobContext;
use crate::job::PermissionChange;
use crate::undo::{UndoActionData, UndoActionKind};

const MODE_BITS: u32 = 0o7777;

pub(crate) fn run_set_permissions(ctx: &mut JobContext<'_>, location: &Location, mode: u32) -> Result<(), String> {
    let fs = ctx.fs();
    let original = fs.stat(location, false).map_err(|e| e.to_string())?.mode & MODE_BITS;
    fs.set_permissions(location, mode & MODE_BITS)
        .map_err(|e| e.to_string())?;

    tracing::info!(target: "ferry::attributes", location = %location, mode = format_args!("{mode:o}"), "permissions set");
    ctx.emit(ChangeEvent::changed(location.clone()));
    ctx.begin_undo(UndoActionData::new(UndoActionKind::SetPermissions, 1));
    if let Some(undo) = ctx.undo_mut() {
        undo.set_permissions(location.clone(), original, mode & MODE_BITS);
    }
    ctx.transfer.num_files += 1;
    Ok(())
}

/// Apply `change` to `location` and everything below it.
///
/// Failures on individual entries are logged and skipped.
pub(crate) fn run_recursive_permissions(
    ctx: &mut JobContext<'_>,
    location: &Location,
    change: PermissionChange,
) -> Result<(), String> {
    ctx.reporter.report_status("Setting permissions");
    let mut undo = UndoActionData::new(UndoActionKind::RecursiveSetPermissions, 1);
    undo.target = Some(location.clone());
    undo.permission_change = change;
    ctx.begin_undo(undo);

    let fs = ctx.fs();
    let mut pending = vec![location.clone()];
    while let Some(current) = pending.pop() {
        if ctx.is_cancelled() {
            break;
        }
        let md = match fs.stat(&current, false) {
            Ok(md) => md,
            Err(e) => {
                tracing::debug!(target: "ferry::attributes", location = %current, error = %e, "cannot stat");
                continue;
            }
        };
        if md.is_symlink() {
            continue;
        }

        let original = md.mode & MODE_BITS;
        let mode = change.apply(original, md.is_dir()) & MODE_BITS;
        if let Some(undo) = ctx.undo_mut() {
            undo.add_original_permission(&current, original);
        }
        match fs.set_permissions(&current, mode) {
            Ok(()) => ctx.transfer.num_files += 1,
            Err(e) => {
                tracing::debug!(target: "ferry::attributes", location = %current, error = %e, "cannot set permissions");
            }
        }

        if md.is_dir() {
            match fs.enumerate(&current) {
                Ok(entries) => {
                    for md in entries.flatten() {
                        pending.push(md.child_of(&current));
                    }
                }
                Err(e) => {
                    tracing::debug!(target: "ferry::attributes", location = %current, error = %e, "cannot list folder");
                }
            }
        }
    }

    ctx.emit(ChangeEvent::changed(location.clone()));
    Ok(())
}

/// Put back recorded modes.
pub(crate) fn run_restore_permissions(ctx: &mut JobContext<'_>, modes: &IndexMap<String, u32>) -> Result<(), String> {
    ctx.reporter.report_status("Setting permissions");
    let fs = ctx.fs();
    for (uri, mode) in modes {
        if ctx.is_cancelled() {
            break;
        }
        let Ok(location) = Location::parse(uri) else {
            continue;
        };
        match fs.set_permissions(&location, *mode) {
            Ok(()) => {
                ctx.transfer.num_files += 1;
                ctx.emit(ChangeEvent::changed(location));
            }
            Err(e) => {
                tracing::debug!(target: "ferry::attributes", location = %location, error = %e, "cannot restore permissions");
            }
        }
    }
    Ok(())
}

/// Which id an ownership change affects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IdKind {
    Owner,
    Group,
}

/// Change the owner or group of `location` to `id` (a name or number).
pub(crate) fn run_change_id(ctx: &mut JobContext<'_>, location: &Location, id: &str, kind: IdKind) -> Result<(), String> {
    let fs = ctx.fs();
    let md = fs.stat(location, false).map_err(|e| e.to_string())?;
    let original = match kind {
        IdKind::Owner => md.uid,
        IdKind::Group => md.gid,
    }
    .map(|id| id.to_string())
    .unwrap_or_default();

    match kind {
        IdKind::Owner => fs.set_owner(location, id),
        IdKind::Group => fs.set_group(location, id),
    }
    .map_err(|e| e.to_string())?;

    tracing::info!(target: "ferry::attributes", location = %location, id, kind = ?kind, "ownership changed");
    ctx.emit(ChangeEvent::changed(location.clone()));
    let undo_kind = match kind {
        IdKind::Owner => UndoActionKind::ChangeOwner,
        IdKind::Group => UndoActionKind::ChangeGroup,
    };
    ctx.begin_undo(UndoActionData::new(undo_kind, 1));
    if let Some(undo) = ctx.undo_mut() {
        undo.set_id_change(location.clone(), original, id.to_string());
    }
    ctx.transfer.num_files += 1;
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Arc;

    use ferry_core::{AutoInteraction, EngineConfig, LocalFileSystem, NullProgress};
    use ferry_scan::OpKind;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::context::JobEnv;
    use crate::job::JobKind;

    fn mode_of(path: &std::path::Path) -> u32 {
        std::fs::metadata(path).unwrap().permissions().mode() & MODE_BITS
    }

    #[test]
    fn test_recursive_permissions_record_originals() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("root");
        std::fs::create_dir_all(root.join("sub")).unwrap();
        std::fs::write(root.join("sub/f"), "x").unwrap();
        std::fs::set_permissions(root.join("sub/f"), std::fs::Permissions::from_mode(0o644)).unwrap();

        let env = JobEnv::new(
            Arc::new(LocalFileSystem::new()),
            Arc::new(AutoInteraction::cancelling()),
            Arc::new(NullProgress),
            EngineConfig::default(),
        );
        let cancel = CancellationToken::new();
        let mut ctx = JobContext::new(&env, &cancel, OpKind::Copy, true);
        let change = PermissionChange {
            file_value: 0o600,
            file_mask: 0o777,
            dir_value: 0o700,
            dir_mask: 0o777,
        };
        let result = run_recursive_permissions(&mut ctx, &Location::local(&root), change);
        let report = ctx.into_report(JobKind::RecursiveSetPermissions, result);

        assert!(report.success());
        assert_eq!(mode_of(&root.join("sub/f")), 0o600);
        assert_eq!(mode_of(&root.join("sub")), 0o700);

        let undo = report.undo.unwrap();
        assert_eq!(undo.original_permissions.len(), 3);
        let file_uri = Location::local(root.join("sub/f")).uri();
        assert_eq!(undo.original_permissions.get(&file_uri), Some(&0o644));

        let mut ctx = JobContext::new(&env, &cancel, OpKind::Copy, false);
        run_restore_permissions(&mut ctx, &undo.original_permissions).unwrap();
        assert_eq!(mode_of(&root.join("sub/f")), 0o644);
    }
}
