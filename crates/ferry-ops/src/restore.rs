//! Restoring trashed items to where they came from.

use indexmap::IndexMap;

use ferry_core::{ChangeEvent, Location, WarnOption, Warning};

use crate::context::JobContext;
use crate::undo::{UndoActionData, UndoActionKind};

/// Restore the trashed items recorded as `original uri -> mtime`.
///
/// An item matches a trash entry only when both its original location and
/// its modification time agree, so a newer item trashed from the same path
/// is left alone.
pub(crate) fn run_restore(ctx: &mut JobContext<'_>, items: &IndexMap<String, u64>) -> Result<(), String> {
    ctx.reporter.report_status("Restoring files from trash");
    let fs = ctx.fs();
    let entries = fs.list_trash().map_err(|e| e.to_string())?;

    ctx.begin_undo(
        UndoActionData::new(UndoActionKind::RestoreFromTrash, items.len() as u64)
            .with_dirs(Some(Location::trash_root()), None),
    );
    ctx.source_info.num_files = items.len() as u64;

    let mut restored = 0;
    for (uri, mtime) in items {
        if ctx.is_cancelled() {
            return Ok(());
        }
        let Ok(original) = Location::parse(uri) else {
            tracing::debug!(target: "ferry::restore", uri = %uri, "unparsable location");
            continue;
        };
        let Some(entry) = entries
            .iter()
            .find(|entry| entry.original == original && entry.modified == Some(*mtime))
        else {
            tracing::debug!(target: "ferry::restore", uri = %uri, mtime, "no matching trash entry");
            continue;
        };

        match fs.restore_from_trash(entry) {
            Ok(()) => {
                let trashed = Location::trash_root().child(&entry.name);
                ctx.emit(ChangeEvent::moved(trashed.clone(), original.clone()));
                ctx.record_pair(&trashed, &original);
                if let Some(undo) = ctx.undo_mut() {
                    undo.add_trashed(&original, *mtime);
                }
                ctx.transfer.num_files += 1;
                restored += 1;
            }
            Err(e) => {
                let warning = Warning::new(
                    format!("Could not restore \"{}\".", original.display_name()),
                    "There was an error restoring the item from the trash.",
                )
                .details(e.to_string())
                .show_all(ctx.files_left() > 1)
                .options(&[WarnOption::Cancel, WarnOption::SkipAll, WarnOption::Skip]);
                match ctx.warn_error(warning) {
                    WarnOption::Skip | WarnOption::SkipAll => ctx.skipped += 1,
                    _ => return Ok(()),
                }
            }
        }
    }

    if restored == 0 && ctx.skipped == 0 && !items.is_empty() {
        let primary = "Original location could not be determined";
        ctx.warn(Warning::new(primary, "Open trash folder and restore manually"));
        return Err(primary.to_string());
    }
    tracing::info!(target: "ferry::restore", restored, "restored from trash");
    Ok(())
}
