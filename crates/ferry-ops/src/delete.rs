//! Permanent deletion, trashing and emptying the trash.

use ferry_core::{ChangeEvent, FsError, Location, WarnOption, Warning};
use ferry_scan::OpKind;

use crate::context::{JobContext, name_of};
use crate::undo::{UndoActionData, UndoActionKind};

/// Ask before deleting `sources` permanently.
fn confirm_delete(ctx: &JobContext<'_>, sources: &[Location]) -> bool {
    let from_trash = sources.iter().all(Location::is_trash);
    let (primary, secondary) = match (sources, from_trash) {
        ([single], true) => (
            format!(
                "Are you sure you want to permanently delete \"{}\" from the trash?",
                name_of(single)
            ),
            "If you delete an item, it will be permanently lost.",
        ),
        (_, true) => (
            format!(
                "Are you sure you want to permanently delete the {} selected items from the trash?",
                sources.len()
            ),
            "If you delete an item, it will be permanently lost.",
        ),
        ([single], false) => (
            format!("Permanently delete \u{201c}{}\u{201d}?", name_of(single)),
            "Deleted items are not sent to Trash and are not recoverable.",
        ),
        (_, false) => (
            format!(
                "Are you sure you want to permanently delete the {} selected items?",
                sources.len()
            ),
            "Deleted items are not sent to Trash and are not recoverable.",
        ),
    };
    let warning = Warning::new(primary, secondary).options(&[WarnOption::Cancel, WarnOption::Delete]);
    match ctx.warn(warning) {
        WarnOption::Delete => true,
        _ => {
            ctx.cancel();
            false
        }
    }
}

/// Delete `sources` permanently, asking first when `confirm` is set.
pub(crate) fn run_delete(ctx: &mut JobContext<'_>, sources: &[Location], confirm: bool) -> Result<(), String> {
    if sources.is_empty() {
        return Ok(());
    }
    tracing::info!(target: "ferry::delete", count = sources.len(), confirm, "starting delete");
    if confirm && !confirm_delete(ctx, sources) {
        return Ok(());
    }
    delete_files(ctx, sources);
    tracing::info!(target: "ferry::delete", files = ctx.transfer.num_files, skipped = ctx.skipped, "delete finished");
    Ok(())
}

/// Move `sources` to the trash. Entries already in the trash are deleted.
pub(crate) fn run_trash(ctx: &mut JobContext<'_>, sources: &[Location], confirm: bool) -> Result<(), String> {
    let (in_trash, to_trash): (Vec<Location>, Vec<Location>) =
        sources.iter().cloned().partition(Location::is_trash);

    tracing::info!(
        target: "ferry::trash",
        trash = to_trash.len(),
        delete = in_trash.len(),
        "starting trash"
    );

    if !in_trash.is_empty() {
        if confirm && !confirm_delete(ctx, &in_trash) {
            return Ok(());
        }
        delete_files(ctx, &in_trash);
    }
    if !to_trash.is_empty() && !ctx.is_cancelled() {
        trash_files(ctx, &to_trash);
    }
    Ok(())
}

fn delete_files(ctx: &mut JobContext<'_>, sources: &[Location]) {
    let done_before = ctx.transfer.num_files;
    ctx.scan(sources, OpKind::Delete);
    ctx.source_info.num_files += done_before;
    if ctx.is_cancelled() {
        return;
    }
    ctx.reporter.start_timer();
    for src in sources {
        if ctx.is_cancelled() {
            break;
        }
        delete_file(ctx, src);
    }
}

/// Delete one entry, recursing into directories. Returns whether it is gone.
fn delete_file(ctx: &mut JobContext<'_>, location: &Location) -> bool {
    match ctx.fs().delete(location) {
        Ok(()) => {
            deleted(ctx, location);
            true
        }
        Err(FsError::Cancelled) => false,
        Err(FsError::NotEmpty { .. }) => delete_dir(ctx, location),
        Err(e) => {
            let warning = Warning::new(
                "Error while deleting.",
                format!("There was an error deleting {}.", name_of(location)),
            )
            .details(e.to_string())
            .show_all(ctx.files_left() > 1)
            .options(&[WarnOption::Cancel, WarnOption::SkipAll, WarnOption::Skip]);
            if matches!(ctx.warn_error(warning), WarnOption::Skip | WarnOption::SkipAll) {
                ctx.skipped += 1;
            }
            false
        }
    }
}

fn deleted(ctx: &mut JobContext<'_>, location: &Location) {
    ctx.emit(ChangeEvent::removed(location.clone()));
    ctx.transfer.num_files += 1;
    ctx.reporter.report_delete(&ctx.source_info, &mut ctx.transfer);
}

fn delete_dir(ctx: &mut JobContext<'_>, dir: &Location) -> bool {
    let fs = ctx.fs();
    let mut skipped_child = false;

    loop {
        let entries = match fs.enumerate(dir) {
            Ok(entries) => entries,
            Err(e) if e.is_cancelled() => return false,
            Err(e) => {
                let secondary = if matches!(e, FsError::PermissionDenied { .. }) {
                    format!(
                        "The folder \"{}\" cannot be deleted because you do not have permissions to read it.",
                        name_of(dir)
                    )
                } else {
                    format!("There was an error reading the folder \"{}\".", name_of(dir))
                };
                let warning = Warning::new("Error while deleting.", secondary)
                    .details(e.to_string())
                    .options(&[WarnOption::Cancel, WarnOption::Skip, WarnOption::Retry]);
                match ctx.warn_error(warning) {
                    WarnOption::Retry => continue,
                    WarnOption::Skip | WarnOption::SkipAll => {
                        ctx.skipped += 1;
                        return false;
                    }
                    _ => return false,
                }
            }
        };

        for entry in entries {
            if ctx.is_cancelled() {
                return false;
            }
            match entry {
                Ok(md) => {
                    if !delete_file(ctx, &md.child_of(dir)) {
                        skipped_child = true;
                    }
                }
                Err(e) => {
                    let secondary = if matches!(e, FsError::PermissionDenied { .. }) {
                        format!(
                            "Files in the folder \"{}\" cannot be deleted because you do not have permissions to see them.",
                            name_of(dir)
                        )
                    } else {
                        format!(
                            "There was an error getting information about the files in the folder \"{}\".",
                            name_of(dir)
                        )
                    };
                    let warning = Warning::new("Error while deleting.", secondary)
                        .details(e.to_string())
                        .options(&[WarnOption::Cancel, WarnOption::SkipFiles]);
                    match ctx.warn_error(warning) {
                        WarnOption::SkipFiles | WarnOption::SkipAll => {
                            ctx.skipped += 1;
                            skipped_child = true;
                            break;
                        }
                        _ => return false,
                    }
                }
            }
        }
        break;
    }

    if ctx.is_cancelled() || skipped_child {
        return false;
    }

    match fs.delete(dir) {
        Ok(()) => {
            deleted(ctx, dir);
            true
        }
        Err(e) => {
            let warning = Warning::new(
                "Error while deleting.",
                format!("Could not remove the folder {}.", name_of(dir)),
            )
            .details(e.to_string())
            .show_all(ctx.files_left() > 1)
            .options(&[WarnOption::Cancel, WarnOption::SkipAll, WarnOption::Skip]);
            if matches!(ctx.warn_error(warning), WarnOption::Skip | WarnOption::SkipAll) {
                ctx.skipped += 1;
            }
            false
        }
    }
}

/// Why a failed trash cannot fall back to deletion, if it cannot.
fn delete_blocker(ctx: &JobContext<'_>, location: &Location) -> Option<(&'static str, &'static str)> {
    let fs = ctx.fs();
    if fs.query_filesystem_readonly(location).unwrap_or(false) {
        return Some((
            "Cannot move file to trash or delete it",
            "It is not permitted to trash or delete files on a read only filesystem.",
        ));
    }
    if let Some(parent) = location.parent() {
        if !fs.is_writable(&parent) {
            return Some((
                "Cannot move file to trash or delete it",
                "It is not permitted to trash or delete files inside folders for which you do not have write privileges.",
            ));
        }
    }
    let is_dir = fs.stat(location, false).is_ok_and(|md| md.is_dir());
    if is_dir && !fs.is_writable(location) {
        return Some((
            "Cannot move file to trash or delete it",
            "It is not permitted to trash or delete folders for which you do not have write privileges.",
        ));
    }
    None
}

fn trash_files(ctx: &mut JobContext<'_>, sources: &[Location]) {
    let fs = ctx.fs();
    let total = sources.len() as u64;
    ctx.begin_undo(UndoActionData::new(UndoActionKind::MoveToTrash, total));
    ctx.source_info.num_files += total;

    let mut trashed = 0;
    let mut to_delete = Vec::new();
    ctx.reporter.report_trash(trashed, total);

    'sources: for src in sources {
        if ctx.is_cancelled() {
            break;
        }
        let mtime = fs.stat(src, false).ok().and_then(|md| md.mtime_secs());

        loop {
            let error = match fs.trash(src) {
                Ok(()) => {
                    ctx.emit(ChangeEvent::removed(src.clone()));
                    if let (Some(undo), Some(mtime)) = (ctx.undo_mut(), mtime) {
                        undo.add_trashed(src, mtime);
                    }
                    trashed += 1;
                    ctx.transfer.num_files += 1;
                    ctx.reporter.report_trash(trashed, total);
                    break;
                }
                Err(error) => error,
            };
            if error.is_cancelled() {
                break 'sources;
            }
            if ctx.flags.skip_all_error {
                ctx.skipped += 1;
                break;
            }
            if ctx.flags.delete_all {
                to_delete.push(src.clone());
                break;
            }

            let blocker = delete_blocker(ctx, src);
            let warning = match blocker {
                Some((primary, secondary)) => Warning::new(primary, secondary)
                    .details(error.to_string())
                    .options(&[WarnOption::Cancel, WarnOption::SkipAll, WarnOption::Skip]),
                None => Warning::new(
                    "Cannot move file to trash. Try to delete it immediately?",
                    "This file could not be moved to trash. See details below for further information.",
                )
                .details(format!("{error}\n Deleting a file removes it permanently"))
                .options(&[
                    WarnOption::Cancel,
                    WarnOption::SkipAll,
                    WarnOption::Skip,
                    WarnOption::DeleteAll,
                    WarnOption::Delete,
                ]),
            };
            let warning = warning.show_all(total - trashed > 1);

            match ctx.warn(warning) {
                WarnOption::SkipAll => {
                    ctx.flags.skip_all_error = true;
                    ctx.skipped += 1;
                }
                WarnOption::Skip | WarnOption::SkipFiles => ctx.skipped += 1,
                WarnOption::DeleteAll => {
                    ctx.flags.delete_all = true;
                    to_delete.push(src.clone());
                }
                WarnOption::Delete => to_delete.push(src.clone()),
                WarnOption::Retry => continue,
                WarnOption::Cancel => break 'sources,
            }
            break;
        }
    }

    if !to_delete.is_empty() && !ctx.is_cancelled() {
        tracing::debug!(target: "ferry::trash", count = to_delete.len(), "deleting items that could not be trashed");
        delete_files(ctx, &to_delete);
    }
    tracing::info!(target: "ferry::trash", trashed, skipped = ctx.skipped, "trash finished");
}

/// Permanently remove everything in the trash.
pub(crate) fn run_empty_trash(ctx: &mut JobContext<'_>, confirm: bool) -> Result<(), String> {
    if confirm {
        let warning = Warning::new(
            "Empty all items from Trash?",
            "All items in the Trash will be permanently deleted.",
        )
        .options(&[WarnOption::Cancel, WarnOption::Delete]);
        if ctx.warn(warning) != WarnOption::Delete {
            ctx.cancel();
            return Ok(());
        }
    }

    ctx.reporter.report_status("Emptying Trash");
    match ctx.fs().empty_trash() {
        Ok(count) => {
            tracing::info!(target: "ferry::trash", count, "trash emptied");
            ctx.transfer.num_files = count as u64;
            ctx.emit(ChangeEvent::changed(Location::trash_root()));
            Ok(())
        }
        Err(e) => Err(format!("Could not empty the trash: {e}")),
    }
}
