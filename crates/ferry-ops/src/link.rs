//! Symbolic link creation.

use ferry_core::{ChangeEvent, FsError, Location, WarnOption, Warning};

use crate::context::{DestVerb, JobContext, name_of, verify_destination};
use crate::naming::link_target_file;
use crate::transfer::skip_or_cancel;
use crate::undo::{UndoActionData, UndoActionKind};

pub(crate) fn run_link(ctx: &mut JobContext<'_>, sources: &[Location], destination: &Location) -> Result<(), String> {
    let Some(first) = sources.first() else {
        return Ok(());
    };

    tracing::info!(target: "ferry::link", count = sources.len(), destination = %destination, "starting link");

    if !verify_destination(ctx, destination, DestVerb::Linking)? {
        return Ok(());
    }

    ctx.begin_undo(
        UndoActionData::new(UndoActionKind::CreateLink, sources.len() as u64)
            .with_dirs(first.parent(), Some(destination.clone())),
    );

    let dest_name = destination.display_name();
    let total = sources.len() as u64;
    ctx.source_info.num_files = total;
    let mut fs_type = None;
    for (i, src) in sources.iter().enumerate() {
        if ctx.is_cancelled() {
            break;
        }
        ctx.reporter.report_link(&dest_name, total, total - i as u64);
        // A link next to its source needs a different name.
        let count = if src.parent().as_ref() == Some(destination) { 1 } else { 0 };
        if let Some(target) = link_file(ctx, src, destination, count, &mut fs_type) {
            ctx.created.push(target);
        }
    }
    ctx.reporter.report_link(&dest_name, total, 0);
    Ok(())
}

fn link_file(
    ctx: &mut JobContext<'_>,
    src: &Location,
    dest_dir: &Location,
    mut count: u32,
    fs_type: &mut Option<String>,
) -> Option<Location> {
    let fs = ctx.fs();
    let mut handled_invalid_filename = false;
    let mut dest = link_target_file(fs, src, dest_dir, fs_type.as_deref(), count);

    loop {
        if ctx.is_cancelled() {
            return None;
        }

        let result = if src.is_native() {
            fs.make_symlink(src.path(), &dest)
        } else {
            Err(FsError::not_supported("Symbolic links only supported for local files"))
        };

        let error = match result {
            Ok(()) => {
                ctx.record_pair(src, &dest);
                ctx.emit(ChangeEvent::added(dest.clone()));
                ctx.transfer.num_files += 1;
                return Some(dest);
            }
            Err(error) => error,
        };

        match error {
            FsError::Cancelled => return None,
            FsError::InvalidFilename { .. } if !handled_invalid_filename => {
                handled_invalid_filename = true;
                *fs_type = fs.query_filesystem_type(dest_dir).ok();
                let regenerated = link_target_file(fs, src, dest_dir, fs_type.as_deref(), count);
                if regenerated != dest {
                    dest = regenerated;
                    continue;
                }
            }
            FsError::Exists { .. } => {
                count += 1;
                dest = link_target_file(fs, src, dest_dir, fs_type.as_deref(), count);
                continue;
            }
            _ => {}
        }

        let secondary = match error {
            FsError::NotSupported { .. } => "The target doesn't support symbolic links.".to_string(),
            _ => format!("There was an error creating the symlink in {dest_dir}."),
        };
        let warning = Warning::new(format!("Error while creating link to {}.", name_of(src)), secondary)
            .details(error.to_string())
            .show_all(ctx.files_left() > 1)
            .options(&[WarnOption::Cancel, WarnOption::SkipAll, WarnOption::Skip]);
        skip_or_cancel(ctx, warning);
        return None;
    }
}
