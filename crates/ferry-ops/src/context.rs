//! State shared by every job body while it runs.

use std::sync::Arc;

use ferry_core::{
    ChangeEvent, ChangeQueue, ConflictRequest, ConflictResponse, EngineConfig, FileSystem, Location,
    ProgressSink, UserInteraction, WarnOption, Warning,
};
use ferry_scan::{OpKind, SourceInfo, SourceScanner};
use tokio_util::sync::CancellationToken;

use crate::job::{JobFlags, JobKind, JobOutcome, JobReport};
use crate::progress::{ProgressReporter, TransferInfo};
use crate::undo::UndoActionData;

/// The collaborators a job talks to.
///
/// Created once by the caller and shared by every job of an engine.
#[derive(Clone)]
pub struct JobEnv {
    pub fs: Arc<dyn FileSystem>,
    pub interaction: Arc<dyn UserInteraction>,
    pub progress: Arc<dyn ProgressSink>,
    pub changes: Arc<ChangeQueue>,
    pub config: Arc<EngineConfig>,
}

impl JobEnv {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        interaction: Arc<dyn UserInteraction>,
        progress: Arc<dyn ProgressSink>,
        config: EngineConfig,
    ) -> Self {
        Self {
            fs,
            interaction,
            progress,
            changes: Arc::new(ChangeQueue::new(config.change_batch_size)),
            config: Arc::new(config),
        }
    }

    /// Use an existing change queue.
    pub fn with_changes(mut self, changes: Arc<ChangeQueue>) -> Self {
        self.changes = changes;
        self
    }
}

impl std::fmt::Debug for JobEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobEnv")
            .field("changes", &self.changes)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// A running job's mutable state.
pub(crate) struct JobContext<'a> {
    env: &'a JobEnv,
    cancel: &'a CancellationToken,
    pub flags: JobFlags,
    pub reporter: ProgressReporter,
    pub source_info: SourceInfo,
    pub transfer: TransferInfo,
    record_undo: bool,
    pub undo: Option<UndoActionData>,
    pub skipped: u64,
    /// Top-level results, reported back to the caller.
    pub created: Vec<Location>,
}

impl<'a> JobContext<'a> {
    pub fn new(env: &'a JobEnv, cancel: &'a CancellationToken, op: OpKind, record_undo: bool) -> Self {
        Self {
            env,
            cancel,
            flags: JobFlags::default(),
            reporter: ProgressReporter::new(Arc::clone(&env.progress), &env.config),
            source_info: SourceInfo::new(op),
            transfer: TransferInfo::new(),
            record_undo,
            undo: None,
            skipped: 0,
            created: Vec::new(),
        }
    }

    pub fn fs(&self) -> &'a dyn FileSystem {
        self.env.fs.as_ref()
    }

    pub fn config(&self) -> &'a EngineConfig {
        &self.env.config
    }

    pub fn cancel_token(&self) -> &'a CancellationToken {
        self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Start collecting undo data, unless this job is a replay.
    pub fn begin_undo(&mut self, data: UndoActionData) {
        if self.record_undo {
            self.undo = Some(data);
        }
    }

    pub fn undo_mut(&mut self) -> Option<&mut UndoActionData> {
        self.undo.as_mut()
    }

    pub fn record_pair(&mut self, origin: &Location, target: &Location) {
        if let Some(undo) = self.undo.as_mut() {
            undo.add_origin_target_pair(origin, target);
        }
    }

    pub fn emit(&self, event: ChangeEvent) {
        self.env.changes.enqueue(event);
    }

    /// Entries counted but not yet processed.
    pub fn files_left(&self) -> u64 {
        self.source_info
            .num_files
            .saturating_sub(self.transfer.num_files)
    }

    /// Show a warning. A cancelled job never asks and answers Cancel;
    /// a Cancel answer cancels the job.
    pub fn warn(&self, warning: Warning) -> WarnOption {
        if self.is_cancelled() {
            return WarnOption::Cancel;
        }
        let answer = self.env.interaction.warn(&warning);
        tracing::debug!(
            target: "ferry::job",
            primary = %warning.primary,
            answer = answer.label(),
            "warning answered"
        );
        if answer == WarnOption::Cancel {
            self.cancel();
        }
        answer
    }

    /// Show a warning about a failed item, honoring a sticky "Skip All".
    pub fn warn_error(&mut self, warning: Warning) -> WarnOption {
        if self.flags.skip_all_error {
            tracing::debug!(target: "ferry::job", primary = %warning.primary, "skipped by skip-all");
            return WarnOption::SkipAll;
        }
        let answer = self.warn(warning);
        if answer == WarnOption::SkipAll {
            self.flags.skip_all_error = true;
        }
        answer
    }

    pub fn resolve_conflict(&self, request: &ConflictRequest) -> ConflictResponse {
        if self.is_cancelled() {
            return ConflictResponse::cancel();
        }
        let response = self.env.interaction.resolve_conflict(request);
        tracing::debug!(
            target: "ferry::job",
            destination = %request.destination,
            action = ?response.action,
            apply_to_all = response.apply_to_all,
            "conflict resolved"
        );
        response
    }

    /// Count `sources`, reporting partial totals, and remember the result.
    pub fn scan(&mut self, sources: &[Location], op: OpKind) -> SourceInfo {
        let env = self.env;
        let reporter = &self.reporter;
        let info = SourceScanner::new(env.fs.as_ref(), env.interaction.as_ref(), self.cancel)
            .report_interval(env.config.scan_report_interval)
            .on_progress(|info| reporter.report_count(info))
            .scan(sources, op, &mut self.flags.skip_all_error);
        self.source_info = info;
        info
    }

    /// Finish the job.
    ///
    /// A job that skipped items and finished none is reported as cancelled.
    pub fn into_report(self, kind: JobKind, result: Result<(), String>) -> JobReport {
        let outcome = match result {
            Err(message) => JobOutcome::Failed(message),
            Ok(()) if self.cancel.is_cancelled() => JobOutcome::Cancelled,
            Ok(()) if self.skipped > 0 && self.transfer.num_files == 0 => JobOutcome::Cancelled,
            Ok(()) => JobOutcome::Completed,
        };

        JobReport {
            kind,
            outcome,
            skipped: self.skipped,
            files_done: self.transfer.num_files,
            bytes_done: self.transfer.num_bytes,
            created: self.created,
            undo: self.undo.filter(|undo| undo.is_valid),
        }
    }
}

/// Display name used in dialog text.
pub(crate) fn name_of(location: &Location) -> String {
    location.display_name()
}

/// Verb used in destination checks.
#[derive(Debug, Clone, Copy)]
pub(crate) enum DestVerb {
    Copying,
    Moving,
    Linking,
    Creating,
}

impl DestVerb {
    fn primary(self, dest: &Location) -> String {
        match self {
            Self::Copying => format!("Error while copying to \"{}\".", name_of(dest)),
            Self::Moving => format!("Error while moving to \"{}\".", name_of(dest)),
            Self::Linking => format!("Error while creating links in \"{}\".", name_of(dest)),
            Self::Creating => format!("Error while creating in \"{}\".", name_of(dest)),
        }
    }
}

/// Check that `dest` is a writable directory.
///
/// Returns `Ok(false)` when the user cancelled and `Err` when the job
/// cannot continue.
pub(crate) fn verify_destination(ctx: &mut JobContext<'_>, dest: &Location, verb: DestVerb) -> Result<bool, String> {
    let fs = ctx.fs();
    let md = loop {
        match fs.stat(dest, true) {
            Ok(md) => break md,
            Err(e) if e.is_cancelled() => return Ok(false),
            Err(e) => {
                let secondary = match e {
                    ferry_core::FsError::PermissionDenied { .. } => {
                        "You do not have permissions to access the destination folder."
                    }
                    _ => "There was an error getting information about the destination.",
                };
                let warning = Warning::new(verb.primary(dest), secondary)
                    .details(e.to_string())
                    .options(&[WarnOption::Cancel, WarnOption::Retry]);
                match ctx.warn(warning) {
                    WarnOption::Retry => continue,
                    _ => return Ok(false),
                }
            }
        }
    };

    if !md.is_dir() {
        let message = "The destination is not a folder.";
        ctx.warn(Warning::new(verb.primary(dest), message));
        return Err(message.to_string());
    }

    if fs.query_filesystem_readonly(dest).unwrap_or(false) {
        let message = "The destination is read-only.";
        ctx.warn(Warning::new(verb.primary(dest), message));
        return Err(message.to_string());
    }

    Ok(true)
}
