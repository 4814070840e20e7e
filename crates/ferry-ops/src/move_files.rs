//! Move job: rename in place where possible, copy and delete otherwise.

use ferry_core::{ChangeEvent, FsError, Location, TransferFlags, WarnOption, Warning};
use ferry_scan::OpKind;

use crate::context::{DestVerb, JobContext, name_of, verify_destination};
use crate::copy::same_filesystem;
use crate::naming::target_file;
use crate::progress::{TransferLabels, TransferVerb};
use crate::transfer::{ConflictStep, EntryOutcome, Transfer, check_recursion, resolve_existing, skip_or_cancel};
use crate::undo::{UndoActionData, UndoActionKind};

/// An entry the rename pass could not move.
struct Fallback {
    source: Location,
    overwrite: bool,
}

enum Prepared {
    Moved(Location),
    Fallback(Fallback),
    Finished(EntryOutcome),
}

pub(crate) fn run_move(ctx: &mut JobContext<'_>, sources: &[Location], destination: &Location) -> Result<(), String> {
    let Some(first) = sources.first() else {
        return Ok(());
    };

    tracing::info!(target: "ferry::move", count = sources.len(), destination = %destination, "starting move");

    if !verify_destination(ctx, destination, DestVerb::Moving)? {
        return Ok(());
    }

    let kind = if first.is_trash() {
        UndoActionKind::RestoreFromTrash
    } else {
        UndoActionKind::Move
    };
    ctx.begin_undo(UndoActionData::new(kind, sources.len() as u64).with_dirs(first.parent(), Some(destination.clone())));

    let dest_name = destination.display_name();
    let total = sources.len() as u64;
    ctx.source_info.num_files = total;
    let mut fallbacks = Vec::new();
    for (i, src) in sources.iter().enumerate() {
        if ctx.is_cancelled() {
            return Ok(());
        }
        ctx.reporter.report_move_prepare(&dest_name, total - i as u64);
        match move_file_prepare(ctx, src, destination) {
            Prepared::Moved(target) => ctx.created.push(target),
            Prepared::Fallback(fallback) => fallbacks.push(fallback),
            Prepared::Finished(EntryOutcome::Cancelled) => return Ok(()),
            Prepared::Finished(_) => {}
        }
    }

    if fallbacks.is_empty() {
        return Ok(());
    }

    tracing::debug!(target: "ferry::move", count = fallbacks.len(), "falling back to copy and delete");
    let fallback_sources: Vec<Location> = fallbacks.iter().map(|f| f.source.clone()).collect();
    let moved_already = ctx.transfer.num_files;
    ctx.scan(&fallback_sources, OpKind::Move);
    ctx.source_info.num_files += moved_already;
    if ctx.is_cancelled() {
        return Ok(());
    }

    let labels = TransferLabels {
        verb: TransferVerb::Moving,
        source_name: first.display_name(),
        dest_name,
        single_source: sources.len() == 1,
    };
    ctx.reporter.start_timer();
    let mut transfer = Transfer::new(ctx, labels, true);
    for fallback in &fallbacks {
        if transfer.ctx.is_cancelled() {
            break;
        }
        let same_fs = same_filesystem(transfer.ctx, &fallback.source, destination);
        let mut count = 0;
        let outcome = transfer.copy_move_file(&fallback.source, destination, same_fs, false, &mut count, fallback.overwrite);
        if let Some(target) = outcome.target() {
            transfer.ctx.created.push(target.clone());
        }
    }

    tracing::info!(target: "ferry::move", files = ctx.transfer.num_files, skipped = ctx.skipped, "move finished");
    Ok(())
}

/// Try to move `src` with a plain rename.
fn move_file_prepare(ctx: &mut JobContext<'_>, src: &Location, dest_dir: &Location) -> Prepared {
    let fs = ctx.fs();
    let mut dest = target_file(src, dest_dir, None);
    let mut overwrite = false;
    let mut handled_invalid_filename = false;

    if let Some(outcome) = check_recursion(ctx, src, &dest, dest_dir, true) {
        return Prepared::Finished(outcome);
    }

    loop {
        if ctx.is_cancelled() {
            return Prepared::Finished(EntryOutcome::Cancelled);
        }
        let flags = TransferFlags::nofollow().no_fallback(true).overwrite(overwrite);
        let error = match fs.move_to(src, &dest, flags, ctx.cancel_token()) {
            Ok(()) => {
                ctx.transfer.num_files += 1;
                ctx.emit(ChangeEvent::moved(src.clone(), dest.clone()));
                ctx.record_pair(src, &dest);
                return Prepared::Moved(dest);
            }
            Err(error) => error,
        };

        match error {
            FsError::Cancelled => return Prepared::Finished(EntryOutcome::Cancelled),
            FsError::InvalidFilename { .. } if !handled_invalid_filename => {
                handled_invalid_filename = true;
                let fs_type = fs.query_filesystem_type(dest_dir).ok();
                let regenerated = target_file(src, dest_dir, fs_type.as_deref());
                if regenerated != dest {
                    dest = regenerated;
                    continue;
                }
                return Prepared::Finished(move_error(ctx, src, dest_dir, &error));
            }
            FsError::Exists { .. } if !overwrite => match resolve_existing(ctx, src, &dest, dest_dir) {
                ConflictStep::Overwrite => overwrite = true,
                ConflictStep::Retarget(target) => dest = target,
                ConflictStep::Skip => {
                    ctx.skipped += 1;
                    return Prepared::Finished(EntryOutcome::Skipped);
                }
                ConflictStep::Cancel => return Prepared::Finished(EntryOutcome::Cancelled),
            },
            FsError::WouldRecurse { .. } | FsError::WouldMerge { .. } | FsError::NotSupported { .. } => {
                return Prepared::Fallback(Fallback {
                    source: src.clone(),
                    overwrite,
                });
            }
            FsError::IsDirectory { .. } if overwrite => {
                return Prepared::Fallback(Fallback {
                    source: src.clone(),
                    overwrite,
                });
            }
            other => return Prepared::Finished(move_error(ctx, src, dest_dir, &other)),
        }
    }
}

fn move_error(ctx: &mut JobContext<'_>, src: &Location, dest_dir: &Location, error: &FsError) -> EntryOutcome {
    let warning = Warning::new(
        format!("Error while moving \"{}\".", name_of(src)),
        format!("There was an error moving the file into {dest_dir}."),
    )
    .details(error.to_string())
    .show_all(ctx.files_left() > 1)
    .options(&[WarnOption::Cancel, WarnOption::SkipAll, WarnOption::Skip]);
    skip_or_cancel(ctx, warning)
}
