//! Creating folders and files.

use ferry_core::{ChangeEvent, FsError, Location, WarnOption, Warning};

use crate::context::{DestVerb, JobContext, name_of, verify_destination};
use crate::job::CreateKind;
use crate::naming::{NEW_FILE, UNTITLED_FOLDER, duplicate_name, make_valid_for_fs, numbered_name};
use crate::undo::{UndoActionData, UndoActionKind};

fn default_name(kind: &CreateKind) -> String {
    match kind {
        CreateKind::Folder => UNTITLED_FOLDER.to_string(),
        CreateKind::EmptyFile => NEW_FILE.to_string(),
        CreateKind::FromTemplate(template) => template.display_name(),
    }
}

/// Create a folder or file in `parent`, picking a free name on conflict.
pub(crate) fn run_create(
    ctx: &mut JobContext<'_>,
    parent: &Location,
    name: Option<&str>,
    kind: &CreateKind,
) -> Result<(), String> {
    if !verify_destination(ctx, parent, DestVerb::Creating)? {
        return Ok(());
    }

    let (undo_kind, template) = match kind {
        CreateKind::Folder => (UndoActionKind::CreateFolder, None),
        CreateKind::EmptyFile => (UndoActionKind::CreateEmptyFile, None),
        CreateKind::FromTemplate(template) => (UndoActionKind::CreateFromTemplate, Some(template.clone())),
    };
    ctx.begin_undo(UndoActionData::new(undo_kind, 1).with_dirs(None, Some(parent.clone())));

    let fs = ctx.fs();
    let max_length = fs.max_name_length(parent);
    let mut filename = name.map_or_else(|| default_name(kind), str::to_string);
    let mut dest = parent.child(&filename);
    let mut folder_count = 1;
    let mut file_count = 1;
    let mut handled_invalid_filename = false;

    tracing::info!(target: "ferry::create", dest = %dest, kind = ?kind, "creating");

    loop {
        if ctx.is_cancelled() {
            return Ok(());
        }
        let result = match kind {
            CreateKind::Folder => fs.make_dir(&dest),
            CreateKind::EmptyFile => fs.create_file(&dest, None),
            CreateKind::FromTemplate(template) => fs.create_file(&dest, Some(template)),
        };

        let error = match result {
            Ok(()) => {
                if let Some(undo) = ctx.undo_mut() {
                    undo.set_create(dest.clone(), template);
                }
                ctx.emit(ChangeEvent::added(dest.clone()));
                ctx.transfer.num_files += 1;
                ctx.created.push(dest);
                return Ok(());
            }
            Err(error) => error,
        };

        match error {
            FsError::Cancelled => return Ok(()),
            FsError::InvalidFilename { .. } if !handled_invalid_filename => {
                handled_invalid_filename = true;
                let fs_type = fs.query_filesystem_type(parent).ok();
                let mut sanitized = filename.clone();
                if make_valid_for_fs(&mut sanitized, fs_type.as_deref()) {
                    filename = sanitized;
                    dest = parent.child(&filename);
                    continue;
                }
            }
            FsError::Exists { .. } => {
                let next = if matches!(kind, CreateKind::Folder) {
                    folder_count += 1;
                    numbered_name(&filename, folder_count, max_length)
                } else {
                    let next = duplicate_name(&filename, file_count, max_length);
                    file_count += 1;
                    next
                };
                tracing::debug!(target: "ferry::create", taken = %dest, next = %next, "name taken");
                dest = parent.child(next);
                continue;
            }
            _ => {}
        }

        let what = if matches!(kind, CreateKind::Folder) { "directory" } else { "file" };
        let warning = Warning::new(
            format!("Error while creating {what} {}.", name_of(&dest)),
            format!("There was an error creating the {what} in {parent}."),
        )
        .details(error.to_string())
        .options(&[WarnOption::Cancel, WarnOption::Skip]);
        if ctx.warn(warning) == WarnOption::Skip {
            ctx.skipped += 1;
        }
        return Ok(());
    }
}
