//! Depth-first source counter.

use std::collections::VecDeque;

use ferry_core::{FileSystem, FsError, Location, Metadata, UserInteraction, WarnOption, Warning};
use tokio_util::sync::CancellationToken;

use crate::info::{OpKind, SourceInfo};

/// Counts the entries and bytes reachable from a set of sources.
///
/// Directories are expanded through an explicit stack: each directory's
/// subdirectories are pushed to the front, so a subtree is finished before
/// its siblings are visited.
pub struct SourceScanner<'a> {
    fs: &'a dyn FileSystem,
    interaction: &'a dyn UserInteraction,
    cancel: &'a CancellationToken,
    report_interval: u64,
    on_progress: Option<Box<dyn FnMut(&SourceInfo) + 'a>>,
    since_progress: u64,
}

/// What to do after an error was shown.
enum Decision {
    Retry,
    Continue,
}

impl<'a> SourceScanner<'a> {
    pub fn new(
        fs: &'a dyn FileSystem,
        interaction: &'a dyn UserInteraction,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            fs,
            interaction,
            cancel,
            report_interval: 100,
            on_progress: None,
            since_progress: 0,
        }
    }

    /// Report partial counts every `interval` entries.
    pub fn report_interval(mut self, interval: u64) -> Self {
        self.report_interval = interval.max(1);
        self
    }

    /// Callback receiving partial counts.
    pub fn on_progress(mut self, callback: impl FnMut(&SourceInfo) + 'a) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }

    /// Count `sources`.
    ///
    /// `skip_all_error` is the job's sticky "Skip All" flag; it is read and
    /// may be set here. On cancellation the returned counts are partial.
    pub fn scan(&mut self, sources: &[Location], op: OpKind, skip_all_error: &mut bool) -> SourceInfo {
        let mut info = SourceInfo::new(op);
        self.report(&info);

        for source in sources {
            if self.cancel.is_cancelled() {
                break;
            }
            self.scan_file(source, &mut info, skip_all_error);
        }

        self.report(&info);
        tracing::debug!(
            target: "ferry::scan",
            files = info.num_files,
            bytes = info.num_bytes,
            cancelled = self.cancel.is_cancelled(),
            "scan finished"
        );
        info
    }

    fn report(&mut self, info: &SourceInfo) {
        if let Some(callback) = self.on_progress.as_mut() {
            callback(info);
        }
    }

    fn count_file(&mut self, metadata: &Metadata, info: &mut SourceInfo) {
        info.num_files += 1;
        info.num_bytes += metadata.size;
        self.since_progress += 1;
        if self.since_progress >= self.report_interval {
            self.since_progress = 0;
            self.report(info);
        }
    }

    fn scan_file(&mut self, file: &Location, info: &mut SourceInfo, skip_all_error: &mut bool) {
        let mut dirs = VecDeque::new();

        loop {
            match self.fs.stat(file, false) {
                Ok(metadata) => {
                    self.count_file(&metadata, info);
                    if metadata.is_dir() {
                        dirs.push_front(file.clone());
                    }
                    break;
                }
                Err(FsError::Cancelled) => break,
                Err(_) if *skip_all_error => break,
                Err(error) => {
                    let secondary = match error {
                        FsError::PermissionDenied { .. } => format!(
                            "The file \"{}\" cannot be handled because you do not have permissions to read it.",
                            file.display_name()
                        ),
                        _ => format!(
                            "There was an error getting information about \"{}\".",
                            file.display_name()
                        ),
                    };
                    let warning = Warning::new(info.op.error_title(), secondary)
                        .details(error.to_string())
                        .show_all(true)
                        .options(&[
                            WarnOption::Cancel,
                            WarnOption::SkipAll,
                            WarnOption::Skip,
                            WarnOption::Retry,
                        ]);
                    match self.decide(&warning, skip_all_error) {
                        Decision::Retry => continue,
                        Decision::Continue => break,
                    }
                }
            }
        }

        while let Some(dir) = dirs.pop_front() {
            if self.cancel.is_cancelled() {
                break;
            }
            self.scan_dir(&dir, info, &mut dirs, skip_all_error);
        }
    }

    fn scan_dir(
        &mut self,
        dir: &Location,
        info: &mut SourceInfo,
        dirs: &mut VecDeque<Location>,
        skip_all_error: &mut bool,
    ) {
        loop {
            let saved = *info;
            let mut pushed = 0usize;

            let fs = self.fs;
            let error = match fs.enumerate(dir) {
                Ok(entries) => {
                    let mut failure = None;
                    for entry in entries {
                        if self.cancel.is_cancelled() {
                            break;
                        }
                        match entry {
                            Ok(metadata) => {
                                self.count_file(&metadata, info);
                                if metadata.is_dir() {
                                    dirs.push_front(metadata.child_of(&dir));
                                    pushed += 1;
                                }
                            }
                            Err(error) => {
                                failure = Some((error, true));
                                break;
                            }
                        }
                    }
                    failure
                }
                Err(error) => Some((error, false)),
            };

            let Some((error, midway)) = error else {
                return;
            };
            if error.is_cancelled() || *skip_all_error {
                return;
            }

            let warning = (if midway {
                Warning::new(
                    info.op.error_title(),
                    format!(
                        "There was an error getting information about the files in the folder \"{}\".",
                        dir.display_name()
                    ),
                )
                .options(&[WarnOption::Cancel, WarnOption::Retry, WarnOption::Skip])
            } else {
                let secondary = match error {
                    FsError::PermissionDenied { .. } => format!(
                        "The folder \"{}\" cannot be handled because you do not have permissions to read it.",
                        dir.display_name()
                    ),
                    _ => format!("There was an error reading the folder \"{}\".", dir.display_name()),
                };
                Warning::new(info.op.error_title(), secondary).options(&[
                    WarnOption::Cancel,
                    WarnOption::SkipAll,
                    WarnOption::Skip,
                    WarnOption::Retry,
                ])
            })
            .details(error.to_string())
            .show_all(true);

            match self.decide(&warning, skip_all_error) {
                Decision::Retry => {
                    *info = saved;
                    for _ in 0..pushed {
                        dirs.pop_front();
                    }
                }
                Decision::Continue => return,
            }
        }
    }

    fn decide(&self, warning: &Warning, skip_all_error: &mut bool) -> Decision {
        if self.cancel.is_cancelled() {
            return Decision::Continue;
        }
        match self.interaction.warn(warning) {
            WarnOption::Retry => Decision::Retry,
            WarnOption::SkipAll => {
                *skip_all_error = true;
                Decision::Continue
            }
            WarnOption::Cancel => {
                self.cancel.cancel();
                Decision::Continue
            }
            _ => Decision::Continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::{AutoInteraction, LocalFileSystem};
    use tempfile::TempDir;

    #[test]
    fn test_scan_single_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.txt"), "abc").unwrap();
        let fs = LocalFileSystem::new();
        let interaction = AutoInteraction::cancelling();
        let cancel = CancellationToken::new();

        let mut skip_all = false;
        let info = SourceScanner::new(&fs, &interaction, &cancel).scan(
            &[Location::local(temp.path().join("a.txt"))],
            OpKind::Copy,
            &mut skip_all,
        );
        assert_eq!(info.num_files, 1);
        assert_eq!(info.num_bytes, 3);
    }

    #[test]
    fn test_missing_source_asks_and_skip_all_sticks() {
        let temp = TempDir::new().unwrap();
        let fs = LocalFileSystem::new();
        let interaction = ferry_core::ScriptedInteraction::new().answer_warning(WarnOption::SkipAll);
        let cancel = CancellationToken::new();

        let mut skip_all = false;
        let missing = [
            Location::local(temp.path().join("nope1")),
            Location::local(temp.path().join("nope2")),
        ];
        let info = SourceScanner::new(&fs, &interaction, &cancel).scan(&missing, OpKind::Delete, &mut skip_all);

        assert!(skip_all);
        assert_eq!(info.num_files, 0);
        assert_eq!(interaction.warnings().len(), 1);
        assert_eq!(interaction.warnings()[0].primary, "Error while deleting.");
    }
}
