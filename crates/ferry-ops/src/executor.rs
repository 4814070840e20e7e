//! Runs jobs as independent cancellable tasks.

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use ferry_scan::OpKind;

use crate::OPERATION_CHANNEL_SIZE;
use crate::attributes::{IdKind, run_change_id, run_recursive_permissions, run_restore_permissions, run_set_permissions};
use crate::context::{JobContext, JobEnv};
use crate::copy::run_copy;
use crate::create::run_create;
use crate::delete::{run_delete, run_empty_trash, run_trash};
use crate::job::{Job, JobKind, JobReport, JobRequest};
use crate::link::run_link;
use crate::move_files::run_move;
use crate::rename::run_rename;
use crate::restore::run_restore;

fn op_kind(kind: JobKind) -> OpKind {
    match kind {
        JobKind::Move | JobKind::Rename | JobKind::RestoreFromTrash => OpKind::Move,
        JobKind::Delete | JobKind::EmptyTrash => OpKind::Delete,
        JobKind::Trash => OpKind::Trash,
        _ => OpKind::Copy,
    }
}

/// Run `job` to completion on the current thread.
///
/// Blocks on filesystem calls and on the user's answers.
pub fn run_job(env: &JobEnv, job: &Job) -> JobReport {
    let kind = job.kind();
    tracing::info!(target: "ferry::job", kind = %kind, replay = !job.record_undo, "job started");

    let mut ctx = JobContext::new(env, &job.cancel, op_kind(kind), job.record_undo);
    let result = match &job.request {
        JobRequest::Copy { sources, destination } => run_copy(&mut ctx, sources, Some(destination)),
        JobRequest::Duplicate { sources } => run_copy(&mut ctx, sources, None),
        JobRequest::Move { sources, destination } => run_move(&mut ctx, sources, destination),
        JobRequest::Link { sources, destination } => run_link(&mut ctx, sources, destination),
        JobRequest::Delete { sources, confirm } => run_delete(&mut ctx, sources, *confirm),
        JobRequest::Trash { sources, confirm } => run_trash(&mut ctx, sources, *confirm),
        JobRequest::Create { parent, name, kind } => run_create(&mut ctx, parent, name.as_deref(), kind),
        JobRequest::Rename { location, new_name } => run_rename(&mut ctx, location, new_name),
        JobRequest::RestoreFromTrash { items } => run_restore(&mut ctx, items),
        JobRequest::EmptyTrash { confirm } => run_empty_trash(&mut ctx, *confirm),
        JobRequest::SetPermissions { location, mode } => run_set_permissions(&mut ctx, location, *mode),
        JobRequest::RecursiveSetPermissions { location, change } => {
            run_recursive_permissions(&mut ctx, location, *change)
        }
        JobRequest::RestorePermissions { modes } => run_restore_permissions(&mut ctx, modes),
        JobRequest::ChangeOwner { location, owner } => run_change_id(&mut ctx, location, owner, IdKind::Owner),
        JobRequest::ChangeGroup { location, group } => run_change_id(&mut ctx, location, group, IdKind::Group),
    };

    let report = ctx.into_report(kind, result);
    tracing::info!(
        target: "ferry::job",
        kind = %kind,
        outcome = ?report.outcome,
        files = report.files_done,
        bytes = report.bytes_done,
        skipped = report.skipped,
        "job finished"
    );
    report
}

/// A submitted job.
#[derive(Debug)]
pub struct JobHandle {
    kind: JobKind,
    cancel: CancellationToken,
    report: oneshot::Receiver<JobReport>,
}

impl JobHandle {
    /// A handle for work that finished without running a job.
    pub fn ready(report: JobReport) -> Self {
        let (tx, rx) = oneshot::channel();
        let kind = report.kind;
        let _ = tx.send(report);
        Self {
            kind,
            cancel: CancellationToken::new(),
            report: rx,
        }
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Request cancellation; the job stops at its next check.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the job's report.
    pub async fn wait(self) -> JobReport {
        let kind = self.kind;
        self.report
            .await
            .unwrap_or_else(|_| JobReport::failed(kind, "job ended without a report"))
    }
}

/// Runs each job on a blocking worker and reports completion exactly once.
#[derive(Debug, Clone)]
pub struct JobScheduler {
    env: JobEnv,
    reports: Option<mpsc::Sender<JobReport>>,
}

impl JobScheduler {
    pub fn new(env: JobEnv) -> Self {
        Self { env, reports: None }
    }

    pub fn env(&self) -> &JobEnv {
        &self.env
    }

    /// Receive a copy of every report from jobs submitted after this call.
    pub fn subscribe(&mut self) -> mpsc::Receiver<JobReport> {
        let (tx, rx) = mpsc::channel(OPERATION_CHANNEL_SIZE);
        self.reports = Some(tx);
        rx
    }

    /// Start `job`. `on_complete` runs once with the report, before
    /// [`JobHandle::wait`] returns.
    ///
    /// Must be called within a tokio runtime.
    pub fn submit<F>(&self, job: Job, on_complete: F) -> JobHandle
    where
        F: FnOnce(&JobReport) + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let kind = job.kind();
        let cancel = job.cancel.clone();
        let env = self.env.clone();
        let reports = self.reports.clone();

        tokio::spawn(async move {
            let report = match tokio::task::spawn_blocking(move || run_job(&env, &job)).await {
                Ok(report) => report,
                Err(e) => {
                    tracing::warn!(target: "ferry::job", kind = %kind, error = %e, "job worker failed");
                    JobReport::failed(kind, format!("job worker failed: {e}"))
                }
            };
            on_complete(&report);
            if let Some(reports) = reports {
                let _ = reports.send(report.clone()).await;
            }
            let _ = tx.send(report);
        });

        JobHandle {
            kind,
            cancel,
            report: rx,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use ferry_core::{AutoInteraction, EngineConfig, LocalFileSystem, Location, NullProgress};
    use tempfile::TempDir;

    use super::*;
    use crate::job::{CreateKind, JobOutcome};

    fn scheduler() -> JobScheduler {
        JobScheduler::new(JobEnv::new(
            Arc::new(LocalFileSystem::new()),
            Arc::new(AutoInteraction::skipping()),
            Arc::new(NullProgress),
            EngineConfig::default(),
        ))
    }

    #[tokio::test]
    async fn test_callback_runs_once() {
        let temp = TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let request = JobRequest::Create {
            parent: Location::local(temp.path()),
            name: Some("made".to_string()),
            kind: CreateKind::Folder,
        };
        let handle = scheduler().submit(Job::new(request), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let report = handle.wait().await;

        assert!(report.success());
        assert!(temp.path().join("made").is_dir());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_precancelled_job_reports_cancelled() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a"), "x").unwrap();
        std::fs::create_dir(temp.path().join("dst")).unwrap();

        let job = Job::new(JobRequest::Copy {
            sources: vec![Location::local(temp.path().join("a"))],
            destination: Location::local(temp.path().join("dst")),
        });
        job.cancel.cancel();
        let report = scheduler().submit(job, |_| {}).wait().await;

        assert_eq!(report.outcome, JobOutcome::Cancelled);
        assert!(!temp.path().join("dst/a").exists());
    }

    #[tokio::test]
    async fn test_subscribers_see_reports() {
        let temp = TempDir::new().unwrap();
        let mut scheduler = scheduler();
        let mut reports = scheduler.subscribe();

        let request = JobRequest::Create {
            parent: Location::local(temp.path()),
            name: None,
            kind: CreateKind::EmptyFile,
        };
        scheduler.submit(Job::new(request), |_| {}).wait().await;

        let report = reports.recv().await.unwrap();
        assert_eq!(report.kind, JobKind::Create);
        assert_eq!(report.created, vec![Location::local(temp.path().join("new file"))]);
    }

    #[tokio::test]
    async fn test_ready_handle() {
        let report = JobHandle::ready(JobReport::new(JobKind::Delete, JobOutcome::Completed))
            .wait()
            .await;
        assert!(report.success());
    }
}
