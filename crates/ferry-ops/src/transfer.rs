//! The per-entry copy/move state machine shared by copy, duplicate and move.

use ferry_core::{
    ChangeEvent, ConflictAction, ConflictRequest, FileSystem, FsError, Location, TransferFlags, WarnOption,
    Warning,
};

use crate::context::{JobContext, name_of};
use crate::guard::dir_is_parent;
use crate::naming::{target_file, target_for_display_name, unique_target_file};
use crate::progress::TransferLabels;

/// How one top-level or nested entry ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EntryOutcome {
    Done(Location),
    /// The target exists but some children were skipped.
    Partial(Location),
    Skipped,
    Cancelled,
}

impl EntryOutcome {
    pub fn target(&self) -> Option<&Location> {
        match self {
            Self::Done(target) | Self::Partial(target) => Some(target),
            Self::Skipped | Self::Cancelled => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Done(_))
    }
}

/// Result of asking about an existing destination.
pub(crate) enum ConflictStep {
    Overwrite,
    Retarget(Location),
    Skip,
    Cancel,
}

/// Next step after an attempt failed.
enum Step {
    Retry,
    Finish(EntryOutcome),
}

fn is_dir(fs: &dyn FileSystem, location: &Location) -> bool {
    fs.stat(location, false).is_ok_and(|md| md.is_dir())
}

/// Decide what to do about `dest` already existing, updating the job's
/// sticky decisions.
pub(crate) fn resolve_existing(
    ctx: &mut JobContext<'_>,
    src: &Location,
    dest: &Location,
    dest_dir: &Location,
) -> ConflictStep {
    let fs = ctx.fs();
    let is_merge = is_dir(fs, src) && is_dir(fs, dest);

    if (is_merge && ctx.flags.merge_all) || (!is_merge && ctx.flags.replace_all) {
        return ConflictStep::Overwrite;
    }
    if ctx.flags.skip_all_conflict {
        return ConflictStep::Skip;
    }
    if ctx.flags.keep_newest_all {
        return newest(fs, src, dest);
    }

    let request = ConflictRequest {
        source: src.clone(),
        destination: dest.clone(),
        dest_dir: dest_dir.clone(),
        is_merge,
    };

    loop {
        let response = ctx.resolve_conflict(&request);
        return match response.action {
            ConflictAction::Cancel => {
                ctx.cancel();
                ConflictStep::Cancel
            }
            ConflictAction::Skip => {
                if response.apply_to_all {
                    ctx.flags.skip_all_conflict = true;
                }
                ConflictStep::Skip
            }
            ConflictAction::Replace => {
                if response.apply_to_all {
                    if is_merge {
                        ctx.flags.merge_all = true;
                    } else {
                        ctx.flags.replace_all = true;
                    }
                }
                ConflictStep::Overwrite
            }
            ConflictAction::Newest => {
                if response.apply_to_all {
                    if is_merge {
                        ctx.flags.merge_all = true;
                    } else {
                        ctx.flags.keep_newest_all = true;
                    }
                }
                newest(fs, src, dest)
            }
            ConflictAction::Rename => {
                let name = response.new_name.unwrap_or_default();
                let fs_type = fs.query_filesystem_type(dest_dir).ok();
                match target_for_display_name(dest_dir, &name, fs_type.as_deref()) {
                    Some(target) => ConflictStep::Retarget(target),
                    None => {
                        // Only a plain name inside the destination folder is accepted.
                        tracing::debug!(target: "ferry::transfer", name = %name, "rejected new name, asking again");
                        continue;
                    }
                }
            }
        };
    }
}

/// Overwrite only when the source is strictly newer than the destination.
fn newest(fs: &dyn FileSystem, src: &Location, dest: &Location) -> ConflictStep {
    let src_time = fs.stat(src, false).ok().and_then(|md| md.modified);
    let dest_time = fs.stat(dest, false).ok().and_then(|md| md.modified);
    match (src_time, dest_time) {
        (Some(src_time), Some(dest_time)) if src_time > dest_time => ConflictStep::Overwrite,
        _ => ConflictStep::Skip,
    }
}

/// Reject copying a folder into itself or a file over itself.
///
/// Returns the outcome when the entry must not be attempted.
pub(crate) fn check_recursion(
    ctx: &mut JobContext<'_>,
    src: &Location,
    dest: &Location,
    dest_dir: &Location,
    is_move: bool,
) -> Option<EntryOutcome> {
    let fs = ctx.fs();
    let depth = ctx.config().symlink_depth;
    let verb = if is_move { "move" } else { "copy" };

    let (primary, secondary) = if dir_is_parent(fs, dest_dir, src, depth) {
        (
            format!("You cannot {verb} a folder into itself."),
            "The destination folder is inside the source folder.",
        )
    } else if dir_is_parent(fs, src, dest, depth) {
        (
            format!("You cannot {verb} a file over itself."),
            "The source file would be overwritten by the destination.",
        )
    } else {
        return None;
    };

    tracing::debug!(target: "ferry::transfer", src = %src, dest = %dest, "refusing self-recursive transfer");
    let warning = Warning::new(primary, secondary)
        .show_all(ctx.files_left() > 1)
        .options(&[WarnOption::Cancel, WarnOption::SkipAll, WarnOption::Skip]);
    Some(skip_or_cancel(ctx, warning))
}

/// Ask about a failed entry offering skip options.
pub(crate) fn skip_or_cancel(ctx: &mut JobContext<'_>, warning: Warning) -> EntryOutcome {
    match ctx.warn_error(warning) {
        WarnOption::Skip | WarnOption::SkipAll | WarnOption::SkipFiles => {
            ctx.skipped += 1;
            EntryOutcome::Skipped
        }
        _ => EntryOutcome::Cancelled,
    }
}

/// Copies or moves entries one at a time, recursing into directories.
pub(crate) struct Transfer<'c, 'a> {
    pub ctx: &'c mut JobContext<'a>,
    labels: TransferLabels,
    is_move: bool,
    readonly_source_fs: bool,
    dest_fs_type: Option<String>,
}

impl<'c, 'a> Transfer<'c, 'a> {
    pub fn new(ctx: &'c mut JobContext<'a>, labels: TransferLabels, is_move: bool) -> Self {
        Self {
            ctx,
            labels,
            is_move,
            readonly_source_fs: false,
            dest_fs_type: None,
        }
    }

    /// Give copies default permissions, for sources on read-only media.
    pub fn readonly_source_fs(mut self, readonly: bool) -> Self {
        self.readonly_source_fs = readonly;
        self
    }

    fn verb(&self) -> &'static str {
        if self.is_move { "moving" } else { "copying" }
    }

    fn fs_type(&self, same_fs: bool) -> Option<&str> {
        if same_fs { None } else { self.dest_fs_type.as_deref() }
    }

    fn report(&mut self) {
        let ctx = &mut *self.ctx;
        ctx.reporter
            .report_copy(&ctx.source_info, &mut ctx.transfer, &self.labels);
    }

    /// Transfer `src` into `dest_dir`.
    ///
    /// `count` is the duplicate counter used with `unique_names`;
    /// `overwrite` starts the attempt with overwriting enabled.
    pub fn copy_move_file(
        &mut self,
        src: &Location,
        dest_dir: &Location,
        same_fs: bool,
        unique_names: bool,
        count: &mut u32,
        overwrite: bool,
    ) -> EntryOutcome {
        let fs = self.ctx.fs();
        let mut overwrite = overwrite;
        let mut handled_invalid_filename = false;
        let mut dest = if unique_names {
            unique_target_file(fs, src, dest_dir, self.fs_type(same_fs), count)
        } else {
            target_file(src, dest_dir, self.fs_type(same_fs))
        };

        if let Some(outcome) = check_recursion(self.ctx, src, &dest, dest_dir, self.is_move) {
            return outcome;
        }

        loop {
            if self.ctx.is_cancelled() {
                return EntryOutcome::Cancelled;
            }

            let error = match self.attempt(src, &dest, overwrite) {
                Ok(()) => {
                    self.ctx.transfer.num_files += 1;
                    self.report();
                    self.ctx.emit(if self.is_move {
                        ChangeEvent::moved(src.clone(), dest.clone())
                    } else {
                        ChangeEvent::added(dest.clone())
                    });
                    self.ctx.record_pair(src, &dest);
                    return EntryOutcome::Done(dest);
                }
                Err(error) => error,
            };

            let step = match error {
                FsError::Cancelled => Step::Finish(EntryOutcome::Cancelled),
                FsError::InvalidFilename { .. } if !handled_invalid_filename => {
                    handled_invalid_filename = true;
                    self.dest_fs_type = fs.query_filesystem_type(dest_dir).ok();
                    let regenerated = if unique_names {
                        unique_target_file(fs, src, dest_dir, self.dest_fs_type.as_deref(), count)
                    } else {
                        target_file(src, dest_dir, self.dest_fs_type.as_deref())
                    };
                    if regenerated != dest {
                        tracing::debug!(target: "ferry::transfer", from = %dest, to = %regenerated, "retrying with sanitized name");
                        dest = regenerated;
                        Step::Retry
                    } else {
                        Step::Finish(self.other_error(src, dest_dir, &error))
                    }
                }
                FsError::Exists { .. } if !overwrite => {
                    if unique_names {
                        dest = unique_target_file(fs, src, dest_dir, self.fs_type(same_fs), count);
                        Step::Retry
                    } else {
                        match resolve_existing(self.ctx, src, &dest, dest_dir) {
                            ConflictStep::Overwrite => {
                                overwrite = true;
                                Step::Retry
                            }
                            ConflictStep::Retarget(target) => {
                                dest = target;
                                Step::Retry
                            }
                            ConflictStep::Skip => {
                                self.ctx.skipped += 1;
                                Step::Finish(EntryOutcome::Skipped)
                            }
                            ConflictStep::Cancel => Step::Finish(EntryOutcome::Cancelled),
                        }
                    }
                }
                FsError::IsDirectory { .. } if overwrite => match self.remove_existing_dir(&dest, dest_dir) {
                    None => Step::Retry,
                    Some(outcome) => Step::Finish(outcome),
                },
                FsError::WouldRecurse { .. } | FsError::WouldMerge { .. } => {
                    let would_recurse = matches!(error, FsError::WouldRecurse { .. });
                    if overwrite && would_recurse {
                        if let Some(outcome) = self.remove_existing_file(src, &dest, dest_dir) {
                            return outcome;
                        }
                    }
                    // Renames may cross the original filesystem once merged.
                    let same_fs = same_fs && would_recurse;
                    Step::Finish(self.copy_move_directory(src, &dest, same_fs, would_recurse))
                }
                other => Step::Finish(self.other_error(src, dest_dir, &other)),
            };

            match step {
                Step::Retry => continue,
                Step::Finish(outcome) => return outcome,
            }
        }
    }

    fn attempt(&mut self, src: &Location, dest: &Location, overwrite: bool) -> Result<(), FsError> {
        let fs = self.ctx.fs();
        let flags = TransferFlags::nofollow()
            .overwrite(overwrite)
            .default_perms(self.readonly_source_fs);
        let cancel = self.ctx.cancel_token();

        if self.is_move {
            return fs.move_to(src, dest, flags, cancel);
        }

        let ctx = &mut *self.ctx;
        let base = ctx.transfer.num_bytes;
        let reporter = &ctx.reporter;
        let source_info = &ctx.source_info;
        let transfer = &mut ctx.transfer;
        let labels = &self.labels;
        let mut on_bytes = |done: u64| {
            transfer.num_bytes = base + done;
            reporter.report_copy(source_info, transfer, labels);
        };
        let result = fs.copy(src, dest, flags, cancel, &mut on_bytes);
        if result.is_err() {
            ctx.transfer.num_bytes = base;
        }
        result
    }

    fn other_error(&mut self, src: &Location, dest_dir: &Location, error: &FsError) -> EntryOutcome {
        let (primary, secondary) = if self.is_move {
            (
                format!("Error while moving \"{}\".", name_of(src)),
                format!("There was an error moving the file into {dest_dir}."),
            )
        } else {
            (
                format!("Cannot copy \"{}\" here.", name_of(src)),
                format!("There was an error copying the file into {dest_dir}."),
            )
        };
        let warning = Warning::new(primary, secondary)
            .details(error.to_string())
            .show_all(self.ctx.files_left() > 1)
            .options(&[WarnOption::Cancel, WarnOption::SkipAll, WarnOption::Skip]);
        skip_or_cancel(self.ctx, warning)
    }

    /// Clear an existing directory so a file can replace it.
    fn remove_existing_dir(&mut self, dest: &Location, dest_dir: &Location) -> Option<EntryOutcome> {
        match remove_tree(self.ctx.fs(), dest) {
            Ok(()) => None,
            Err(e) => {
                let warning = Warning::new(
                    format!("Error while {} \"{}\".", self.verb(), name_of(dest)),
                    format!("Could not remove files from the already existing folder {dest_dir}."),
                )
                .details(e.to_string())
                .show_all(self.ctx.files_left() > 1)
                .options(&[WarnOption::Cancel, WarnOption::SkipAll, WarnOption::Skip]);
                Some(skip_or_cancel(self.ctx, warning))
            }
        }
    }

    /// Delete a file that a directory is about to replace.
    fn remove_existing_file(&mut self, src: &Location, dest: &Location, dest_dir: &Location) -> Option<EntryOutcome> {
        match self.ctx.fs().delete(dest) {
            Ok(()) => {
                self.ctx.emit(ChangeEvent::removed(dest.clone()));
                None
            }
            Err(FsError::NotFound { .. }) => None,
            Err(e) => {
                let warning = Warning::new(
                    format!("Error while {} \"{}\".", self.verb(), name_of(src)),
                    format!("Could not remove the already existing file with the same name in {dest_dir}."),
                )
                .details(e.to_string())
                .show_all(true)
                .options(&[WarnOption::Cancel, WarnOption::SkipAll, WarnOption::Skip]);
                Some(skip_or_cancel(self.ctx, warning))
            }
        }
    }

    /// Recursive transfer of a directory.
    ///
    /// With `create_dest` the destination directory is made first;
    /// otherwise the children are merged into the existing one.
    fn copy_move_directory(&mut self, src: &Location, dest: &Location, same_fs: bool, create_dest: bool) -> EntryOutcome {
        let fs = self.ctx.fs();
        let mut dest = dest.clone();
        let mut created = false;

        if create_dest {
            match self.create_dest_dir(src, &mut dest) {
                Ok(()) => created = true,
                Err(outcome) => return outcome,
            }
        }

        let mut skipped_child = false;
        loop {
            let entries = match fs.enumerate(src) {
                Ok(entries) => entries,
                Err(e) if e.is_cancelled() => return EntryOutcome::Cancelled,
                Err(e) => {
                    let secondary = if matches!(e, FsError::PermissionDenied { .. }) {
                        format!(
                            "The folder \"{}\" cannot be {} because you do not have permissions to read it.",
                            name_of(src),
                            self.past_participle()
                        )
                    } else {
                        format!("There was an error reading the folder \"{}\".", name_of(src))
                    };
                    let warning = Warning::new(self.error_title(), secondary)
                        .details(e.to_string())
                        .options(&[WarnOption::Cancel, WarnOption::Skip, WarnOption::Retry]);
                    match self.ctx.warn_error(warning) {
                        WarnOption::Retry => continue,
                        WarnOption::Skip | WarnOption::SkipAll => {
                            self.ctx.skipped += 1;
                            skipped_child = true;
                            break;
                        }
                        _ => return EntryOutcome::Cancelled,
                    }
                }
            };

            for entry in entries {
                if self.ctx.is_cancelled() {
                    return EntryOutcome::Cancelled;
                }
                match entry {
                    Ok(md) => {
                        let child = md.child_of(src);
                        let mut count = 0;
                        match self.copy_move_file(&child, &dest, same_fs, false, &mut count, false) {
                            EntryOutcome::Cancelled => return EntryOutcome::Cancelled,
                            outcome if !outcome.is_complete() => skipped_child = true,
                            _ => {}
                        }
                    }
                    Err(e) => {
                        let secondary = if matches!(e, FsError::PermissionDenied { .. }) {
                            format!(
                                "Files in the folder \"{}\" cannot be {} because you do not have permissions to see them.",
                                name_of(src),
                                self.past_participle()
                            )
                        } else {
                            format!(
                                "There was an error getting information about the files in the folder \"{}\".",
                                name_of(src)
                            )
                        };
                        let warning = Warning::new(self.error_title(), secondary)
                            .details(e.to_string())
                            .options(&[WarnOption::Cancel, WarnOption::SkipFiles]);
                        match self.ctx.warn_error(warning) {
                            WarnOption::SkipFiles | WarnOption::SkipAll => {
                                self.ctx.skipped += 1;
                                skipped_child = true;
                                break;
                            }
                            _ => return EntryOutcome::Cancelled,
                        }
                    }
                }
            }
            break;
        }

        // The directory itself counts as one entry.
        self.ctx.transfer.num_files += 1;
        self.report();

        if created {
            if let Err(e) = fs.copy_attributes(src, &dest) {
                tracing::warn!(target: "ferry::transfer", dest = %dest, error = %e, "could not copy folder attributes");
            }
        }

        if self.is_move && !skipped_child {
            match fs.delete(src) {
                Ok(()) => self.ctx.emit(ChangeEvent::removed(src.clone())),
                Err(e) => {
                    let warning = Warning::new(
                        format!("Error while moving \"{}\".", name_of(src)),
                        "Could not remove the source folder.",
                    )
                    .details(e.to_string())
                    .show_all(self.ctx.files_left() > 1)
                    .options(&[WarnOption::Cancel, WarnOption::SkipAll, WarnOption::Skip]);
                    if skip_or_cancel(self.ctx, warning) == EntryOutcome::Cancelled {
                        return EntryOutcome::Cancelled;
                    }
                    skipped_child = true;
                }
            }
        }

        if skipped_child {
            EntryOutcome::Partial(dest)
        } else {
            EntryOutcome::Done(dest)
        }
    }

    fn create_dest_dir(&mut self, src: &Location, dest: &mut Location) -> Result<(), EntryOutcome> {
        let fs = self.ctx.fs();
        let mut handled_invalid_filename = false;
        loop {
            if self.ctx.is_cancelled() {
                return Err(EntryOutcome::Cancelled);
            }
            let error = match fs.make_dir(dest) {
                Ok(()) => {
                    self.ctx.emit(ChangeEvent::added(dest.clone()));
                    self.ctx.record_pair(src, dest);
                    return Ok(());
                }
                Err(error) => error,
            };

            if error.is_cancelled() {
                return Err(EntryOutcome::Cancelled);
            }

            if matches!(error, FsError::InvalidFilename { .. }) && !handled_invalid_filename {
                handled_invalid_filename = true;
                if let Some(parent) = dest.parent() {
                    self.dest_fs_type = fs.query_filesystem_type(&parent).ok();
                    let regenerated = target_file(src, &parent, self.dest_fs_type.as_deref());
                    if regenerated != *dest {
                        *dest = regenerated;
                        continue;
                    }
                }
            }

            let secondary = if matches!(error, FsError::PermissionDenied { .. }) {
                format!(
                    "The folder \"{}\" cannot be copied because you do not have permissions to create it in the destination.",
                    name_of(src)
                )
            } else {
                format!("There was an error creating the folder \"{}\".", name_of(src))
            };
            let warning = Warning::new(self.error_title(), secondary)
                .details(error.to_string())
                .options(&[WarnOption::Cancel, WarnOption::Skip, WarnOption::Retry]);
            match self.ctx.warn_error(warning) {
                WarnOption::Retry => continue,
                WarnOption::Skip | WarnOption::SkipAll => {
                    self.ctx.skipped += 1;
                    return Err(EntryOutcome::Skipped);
                }
                _ => return Err(EntryOutcome::Cancelled),
            }
        }
    }

    fn error_title(&self) -> &'static str {
        if self.is_move { "Error while moving." } else { "Error while copying." }
    }

    fn past_participle(&self) -> &'static str {
        if self.is_move { "moved" } else { "copied" }
    }
}

/// Remove `location` and everything below it.
pub(crate) fn remove_tree(fs: &dyn FileSystem, location: &Location) -> Result<(), FsError> {
    match fs.delete(location) {
        Err(FsError::NotEmpty { .. }) => {}
        other => return other,
    }
    let children = fs
        .enumerate(location)?
        .map(|entry| entry.map(|md| md.child_of(location)))
        .collect::<Result<Vec<_>, _>>()?;
    for child in &children {
        remove_tree(fs, child)?;
    }
    fs.delete(location)
}
