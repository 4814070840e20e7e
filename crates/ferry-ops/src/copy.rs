//! Copy and duplicate jobs.

use ferry_core::Location;
use ferry_scan::OpKind;

use crate::context::{DestVerb, JobContext, verify_destination};
use crate::progress::{TransferLabels, TransferVerb};
use crate::transfer::Transfer;
use crate::undo::{UndoActionData, UndoActionKind};

/// Whether two locations live on the same filesystem.
pub(crate) fn same_filesystem(ctx: &JobContext<'_>, a: &Location, b: &Location) -> bool {
    let fs = ctx.fs();
    match (fs.query_filesystem_id(a), fs.query_filesystem_id(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Copy `sources` into `destination`, or next to themselves under unique
/// names when there is no destination.
pub(crate) fn run_copy(ctx: &mut JobContext<'_>, sources: &[Location], destination: Option<&Location>) -> Result<(), String> {
    let duplicate = destination.is_none();
    let Some(first) = sources.first() else {
        return Ok(());
    };
    let first_parent = first.parent();

    tracing::info!(
        target: "ferry::copy",
        count = sources.len(),
        destination = ?destination.map(ToString::to_string),
        duplicate,
        "starting copy"
    );

    ctx.scan(sources, OpKind::Copy);
    if ctx.is_cancelled() {
        return Ok(());
    }

    if let Some(destination) = destination {
        if !verify_destination(ctx, destination, DestVerb::Copying)? {
            return Ok(());
        }
    }

    let (kind, dest_dir) = if duplicate {
        (UndoActionKind::Duplicate, first_parent.clone())
    } else {
        (UndoActionKind::Copy, destination.cloned())
    };
    ctx.begin_undo(UndoActionData::new(kind, sources.len() as u64).with_dirs(first_parent.clone(), dest_dir.clone()));

    let readonly_source_fs = first_parent
        .as_ref()
        .is_some_and(|parent| ctx.fs().query_filesystem_readonly(parent).unwrap_or(false));
    let labels = TransferLabels {
        verb: if duplicate { TransferVerb::Duplicating } else { TransferVerb::Copying },
        source_name: first.display_name(),
        dest_name: dest_dir.as_ref().map(Location::display_name).unwrap_or_default(),
        single_source: sources.len() == 1,
    };

    ctx.reporter.start_timer();
    let mut transfer = Transfer::new(ctx, labels, false).readonly_source_fs(readonly_source_fs);

    for src in sources {
        if transfer.ctx.is_cancelled() {
            break;
        }
        let dest_dir = match destination {
            Some(destination) => destination.clone(),
            None => match src.parent() {
                Some(parent) => parent,
                None => continue,
            },
        };
        let same_fs = same_filesystem(transfer.ctx, src, &dest_dir);
        let mut count = 1;
        let outcome = transfer.copy_move_file(src, &dest_dir, same_fs, duplicate, &mut count, false);
        if let Some(target) = outcome.target() {
            transfer.ctx.created.push(target.clone());
        }
    }

    tracing::info!(
        target: "ferry::copy",
        files = ctx.transfer.num_files,
        bytes = ctx.transfer.num_bytes,
        skipped = ctx.skipped,
        "copy finished"
    );
    Ok(())
}
