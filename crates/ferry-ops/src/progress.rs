//! Rate-limited progress text for running jobs.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ferry_core::{EngineConfig, ProgressSink};
use ferry_scan::SourceInfo;
use humansize::{DECIMAL, format_size};
use serde::{Deserialize, Serialize};

/// Progress of the transfer phase of a job.
#[derive(Debug, Clone, Default)]
pub struct TransferInfo {
    /// Entries finished, directories included.
    pub num_files: u64,
    /// Bytes written so far.
    pub num_bytes: u64,
    last_report: Option<Instant>,
    last_reported_files_left: Option<u64>,
}

impl TransferInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether enough time passed since the last report; records `now` if so.
    fn due(&mut self, now: Instant, interval: Duration) -> bool {
        match self.last_report {
            Some(last) if now.saturating_duration_since(last) < interval => false,
            _ => {
                self.last_report = Some(now);
                true
            }
        }
    }
}

/// How a copy-like job describes itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferVerb {
    Copying,
    Moving,
    Duplicating,
}

/// Names shown in copy/move status lines.
#[derive(Debug, Clone)]
pub struct TransferLabels {
    pub verb: TransferVerb,
    /// Basename of the first source.
    pub source_name: String,
    /// Basename of the destination directory.
    pub dest_name: String,
    /// The job has exactly one top-level source.
    pub single_source: bool,
}

fn plural(n: u64, one: &'static str, many: &'static str) -> &'static str {
    if n == 1 { one } else { many }
}

/// Human readable duration: "5 seconds", "3 minutes", "1 hour, 2 minutes",
/// "approximately 5 hours".
pub fn format_time(seconds: u64) -> String {
    if seconds < 60 {
        return format!("{seconds} {}", plural(seconds, "second", "seconds"));
    }
    if seconds < 60 * 60 {
        let minutes = seconds / 60;
        return format!("{minutes} {}", plural(minutes, "minute", "minutes"));
    }

    let hours = seconds / (60 * 60);
    if seconds < 60 * 60 * 4 {
        let minutes = (seconds - hours * 60 * 60) / 60;
        return format!(
            "{hours} {}, {minutes} {}",
            plural(hours, "hour", "hours"),
            plural(minutes, "minute", "minutes")
        );
    }
    format!("approximately {hours} {}", plural(hours, "hour", "hours"))
}

fn copy_status(labels: &TransferLabels, total_files: u64, files_left: u64) -> String {
    let files = plural(files_left, "file", "files");
    let TransferLabels {
        verb,
        source_name: src,
        dest_name: dst,
        single_source,
    } = labels;

    match (verb, total_files == 1, single_source) {
        (TransferVerb::Duplicating, true, _) => format!("Duplicating \"{src}\""),
        (TransferVerb::Copying, true, _) => format!("Copying \"{src}\" to \"{dst}\""),
        (TransferVerb::Moving, true, _) => format!("Moving \"{src}\" to \"{dst}\""),
        (TransferVerb::Duplicating, false, true) => {
            format!("Duplicating {files_left} {files} (in \"{dst}\")")
        }
        (TransferVerb::Copying, false, true) => {
            format!("Copying {files_left} {files} (in \"{src}\") to \"{dst}\"")
        }
        (TransferVerb::Moving, false, true) => {
            format!("Moving {files_left} {files} (in \"{src}\") to \"{dst}\"")
        }
        (TransferVerb::Duplicating, false, false) => format!("Duplicating {files_left} {files}"),
        (TransferVerb::Copying, false, false) => format!("Copying {files_left} {files} to \"{dst}\""),
        (TransferVerb::Moving, false, false) => format!("Moving {files_left} {files} to \"{dst}\""),
    }
}

/// Details line of a copy: "X of Y", or with ETA and rate once the rate
/// is reliable.
fn copy_details(bytes_done: u64, total: u64, elapsed: Duration, reliable_after: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    let rate = if secs > 0.0 { bytes_done as f64 / secs } else { 0.0 };
    let done = format_size(bytes_done, DECIMAL);
    let total_s = format_size(total, DECIMAL);

    if elapsed < reliable_after || rate <= 0.0 {
        return format!("{done} of {total_s}");
    }
    let remaining = (total.saturating_sub(bytes_done) as f64 / rate) as u64;
    format!(
        "{done} of {total_s} \u{2014} {} left ({}/sec)",
        format_time(remaining),
        format_size(rate as u64, DECIMAL)
    )
}

fn delete_details(files_left: u64, files_done: u64, elapsed: Duration, reliable_after: Duration) -> String {
    let left = format!(
        "{files_left} {} left to delete",
        plural(files_left, "file", "files")
    );
    let secs = elapsed.as_secs_f64();
    if elapsed < reliable_after || files_done == 0 || secs <= 0.0 {
        return left;
    }
    let rate = files_done as f64 / secs;
    let remaining = (files_left as f64 / rate) as u64;
    format!("{left}\u{2014}{} left", format_time(remaining))
}

/// Emits progress text to a [`ProgressSink`], at most once per interval.
#[derive(Clone)]
pub struct ProgressReporter {
    sink: Arc<dyn ProgressSink>,
    interval: Duration,
    reliable_after: Duration,
    started: Instant,
}

impl ProgressReporter {
    pub fn new(sink: Arc<dyn ProgressSink>, config: &EngineConfig) -> Self {
        Self {
            sink,
            interval: Duration::from_millis(config.progress_interval_ms),
            reliable_after: Duration::from_secs(config.reliable_rate_secs),
            started: Instant::now(),
        }
    }

    /// Restart the clock used for rates; called when the transfer phase begins.
    pub fn start_timer(&mut self) {
        self.started = Instant::now();
    }

    pub fn sink(&self) -> &dyn ProgressSink {
        self.sink.as_ref()
    }

    /// Partial totals while counting sources.
    pub fn report_count(&self, info: &SourceInfo) {
        self.sink.set_status(&info.count_message());
        self.sink.pulse();
    }

    /// Copy/move/duplicate progress.
    pub fn report_copy(&self, source: &SourceInfo, transfer: &mut TransferInfo, labels: &TransferLabels) {
        let now = Instant::now();
        if !transfer.due(now, self.interval) {
            return;
        }
        let Some(files_left) = source.num_files.checked_sub(transfer.num_files) else {
            return;
        };

        if transfer.last_reported_files_left != Some(files_left) || files_left == 0 {
            transfer.last_reported_files_left = Some(files_left);
            self.sink
                .set_status(&copy_status(labels, source.num_files, files_left));
        }

        let total = source.num_bytes.max(transfer.num_bytes);
        let elapsed = now.saturating_duration_since(self.started);
        self.sink.set_details(&copy_details(
            transfer.num_bytes,
            total,
            elapsed,
            self.reliable_after,
        ));
        self.sink.update(transfer.num_bytes, total);
    }

    /// Permanent deletion progress.
    pub fn report_delete(&self, source: &SourceInfo, transfer: &mut TransferInfo) {
        let now = Instant::now();
        if !transfer.due(now, self.interval) {
            return;
        }
        // Counting and deleting can race; never show a negative count.
        let files_left = source.num_files.checked_sub(transfer.num_files).unwrap_or(1);

        self.sink.set_status("Deleting files");
        let elapsed = now.saturating_duration_since(self.started);
        self.sink.set_details(&delete_details(
            files_left,
            transfer.num_files,
            elapsed,
            self.reliable_after,
        ));
        if source.num_files != 0 {
            self.sink.update(transfer.num_files, source.num_files);
        }
    }

    /// Trash progress; cheap enough to report on every item.
    pub fn report_trash(&self, trashed: u64, total: u64) {
        let left = total.saturating_sub(trashed);
        self.sink.set_status("Moving files to trash");
        self.sink
            .set_details(&format!("{left} {} left to trash", plural(left, "file", "files")));
        if total != 0 {
            self.sink.update(trashed, total);
        }
    }

    /// Progress of the rename-only pass of a move.
    pub fn report_move_prepare(&self, dest_name: &str, left: u64) {
        self.sink
            .set_status(&format!("Preparing to move to \"{dest_name}\""));
        self.sink.set_details(&format!(
            "Preparing to move {left} {}",
            plural(left, "file", "files")
        ));
        self.sink.pulse();
    }

    pub fn report_link(&self, dest_name: &str, total: u64, left: u64) {
        self.sink
            .set_status(&format!("Creating links in \"{dest_name}\""));
        self.sink.set_details(&format!(
            "Making {} to {left} {}",
            plural(left, "link", "links"),
            plural(left, "file", "files")
        ));
        self.sink.update(left, total);
    }

    /// One-line status for jobs without a transfer phase.
    pub fn report_status(&self, status: &str) {
        self.sink.set_status(status);
        self.sink.pulse();
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("interval", &self.interval)
            .field("reliable_after", &self.reliable_after)
            .finish_non_exhaustive()
    }
}
