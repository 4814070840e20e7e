//! The engine context: submits jobs, records their undo data and replays it.

use std::sync::Arc;

use indexmap::IndexMap;
use thiserror::Error;

use ferry_core::{ChangeQueue, EngineConfig, Location};

use crate::context::JobEnv;
use crate::executor::{JobHandle, JobScheduler};
use crate::job::{CreateKind, Job, JobKind, JobOutcome, JobReport, JobRequest, PermissionChange};
use crate::naming::top_level;
use crate::stack::{Replay, ReplayDirection, UndoRedoStack};
use crate::undo::{MenuState, UndoActionData, UndoActionKind};

/// Errors raised before a job is started.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("Cannot copy into trash. It is not permitted to copy files into the trash")]
    CopyIntoTrash,

    #[error("No files to operate on")]
    NoSources,

    #[error("{action} needs a destination")]
    NoDestination { action: TransferAction },

    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("Nothing to redo")]
    NothingToRedo,
}

/// What a drag, drop or paste should do with its sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum TransferAction {
    Copy,
    Move,
    Link,
}

/// Owns the shared job environment and the undo/redo history.
#[derive(Debug, Clone)]
pub struct Engine {
    scheduler: JobScheduler,
    stack: Arc<UndoRedoStack>,
}

impl Engine {
    pub fn new(env: JobEnv) -> Self {
        let stack = Arc::new(UndoRedoStack::new(env.config.undo_levels));
        Self {
            scheduler: JobScheduler::new(env),
            stack,
        }
    }

    pub fn env(&self) -> &JobEnv {
        self.scheduler.env()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.scheduler.env().config
    }

    pub fn changes(&self) -> &Arc<ChangeQueue> {
        &self.scheduler.env().changes
    }

    pub fn stack(&self) -> &Arc<UndoRedoStack> {
        &self.stack
    }

    pub fn scheduler_mut(&mut self) -> &mut JobScheduler {
        &mut self.scheduler
    }

    /// Start a job whose undo data goes on the history when it completes.
    pub fn submit(&self, request: JobRequest) -> JobHandle {
        self.submit_job(Job::new(request))
    }

    /// Start a prepared job.
    pub fn submit_job(&self, job: Job) -> JobHandle {
        let stack = Arc::clone(&self.stack);
        self.scheduler.submit(job, move |report| record(&stack, report))
    }

    pub fn copy(&self, sources: Vec<Location>, destination: Location) -> JobHandle {
        self.submit(JobRequest::Copy { sources, destination })
    }

    pub fn move_to(&self, sources: Vec<Location>, destination: Location) -> JobHandle {
        self.submit(JobRequest::Move { sources, destination })
    }

    pub fn link(&self, sources: Vec<Location>, destination: Location) -> JobHandle {
        self.submit(JobRequest::Link { sources, destination })
    }

    pub fn duplicate(&self, sources: Vec<Location>) -> JobHandle {
        self.submit(JobRequest::Duplicate { sources })
    }

    pub fn trash(&self, sources: Vec<Location>) -> JobHandle {
        let confirm = self.config().confirm_delete;
        self.submit(JobRequest::Trash { sources, confirm })
    }

    pub fn delete(&self, sources: Vec<Location>) -> JobHandle {
        let confirm = self.config().confirm_delete;
        self.submit(JobRequest::Delete { sources, confirm })
    }

    pub fn create_folder(&self, parent: Location, name: Option<String>) -> JobHandle {
        self.submit(JobRequest::Create {
            parent,
            name,
            kind: CreateKind::Folder,
        })
    }

    /// Create an empty file, or a copy of `template` when given.
    pub fn create_file(&self, parent: Location, name: Option<String>, template: Option<Location>) -> JobHandle {
        let kind = match template {
            Some(template) => CreateKind::FromTemplate(template),
            None => CreateKind::EmptyFile,
        };
        self.submit(JobRequest::Create { parent, name, kind })
    }

    pub fn rename(&self, location: Location, new_name: impl Into<String>) -> JobHandle {
        self.submit(JobRequest::Rename {
            location,
            new_name: new_name.into(),
        })
    }

    pub fn set_permissions(&self, location: Location, mode: u32) -> JobHandle {
        self.submit(JobRequest::SetPermissions { location, mode })
    }

    pub fn set_permissions_recursive(&self, location: Location, change: PermissionChange) -> JobHandle {
        self.submit(JobRequest::RecursiveSetPermissions { location, change })
    }

    pub fn change_owner(&self, location: Location, owner: impl Into<String>) -> JobHandle {
        self.submit(JobRequest::ChangeOwner {
            location,
            owner: owner.into(),
        })
    }

    pub fn change_group(&self, location: Location, group: impl Into<String>) -> JobHandle {
        self.submit(JobRequest::ChangeGroup {
            location,
            group: group.into(),
        })
    }

    pub fn empty_trash(&self) -> JobHandle {
        let confirm = self.config().confirm_delete;
        self.submit(JobRequest::EmptyTrash { confirm })
    }

    /// Restore trashed items given as `original uri -> mtime`.
    pub fn restore_from_trash(&self, items: IndexMap<String, u64>) -> JobHandle {
        self.submit(JobRequest::RestoreFromTrash { items })
    }

    /// Pick the job for a transfer of `sources` to `target`.
    ///
    /// Copying without a target, or into the sources' own folder, duplicates.
    /// Moving into the trash trashes. Copying into the trash is refused.
    pub fn copy_move_link(
        &self,
        sources: Vec<Location>,
        target: Option<Location>,
        action: TransferAction,
    ) -> Result<JobHandle, EngineError> {
        let first = sources.first().ok_or(EngineError::NoSources)?;
        let source_dir = first.parent();

        let Some(target) = target else {
            return match action {
                TransferAction::Copy => Ok(self.duplicate(sources)),
                _ => Err(EngineError::NoDestination { action }),
            };
        };

        let action = if action == TransferAction::Move && target.is_burn() && !first.is_burn() {
            TransferAction::Copy
        } else {
            action
        };

        tracing::debug!(target: "ferry::engine", action = %action, dest = %target, count = sources.len(), "transfer requested");
        match action {
            TransferAction::Copy if source_dir.as_ref() == Some(&target) => Ok(self.duplicate(sources)),
            TransferAction::Copy if target.is_trash() => Err(EngineError::CopyIntoTrash),
            TransferAction::Copy => Ok(self.copy(sources, target)),
            TransferAction::Move if target.is_trash() => Ok(self.trash(sources)),
            TransferAction::Move => Ok(self.move_to(sources, target)),
            TransferAction::Link => Ok(self.link(sources, target)),
        }
    }

    pub fn menu_state(&self) -> MenuState {
        self.stack.menu_state()
    }

    /// Reverse the most recent action.
    pub fn undo(&self) -> Result<JobHandle, EngineError> {
        let replay = self.stack.begin_undo().ok_or(EngineError::NothingToUndo)?;
        Ok(self.replay(replay))
    }

    /// Repeat the most recently undone action.
    pub fn redo(&self) -> Result<JobHandle, EngineError> {
        let replay = self.stack.begin_redo().ok_or(EngineError::NothingToRedo)?;
        Ok(self.replay(replay))
    }

    fn replay(&self, replay: Replay) -> JobHandle {
        let Replay { id, direction, action } = replay;
        let request = match direction {
            ReplayDirection::Undo => undo_request(&action, self.config()),
            ReplayDirection::Redo => redo_request(&action),
        };
        tracing::info!(target: "ferry::engine", direction = %direction, kind = %action.kind, id, "replaying action");

        let Some(request) = request else {
            self.stack.finish_replay(id);
            let outcome = if action.kind == UndoActionKind::Delete {
                JobOutcome::Completed
            } else {
                tracing::warn!(target: "ferry::engine", direction = %direction, kind = %action.kind, id, "recorded action is incomplete");
                JobOutcome::Failed(format!(
                    "{direction} of {} is not possible: the recorded action is incomplete",
                    action.kind
                ))
            };
            return JobHandle::ready(JobReport::new(replay_kind(action.kind), outcome));
        };

        let stack = Arc::clone(&self.stack);
        self.scheduler
            .submit(Job::replay(request), move |_| stack.finish_replay(id))
    }
}

fn record(stack: &UndoRedoStack, report: &JobReport) {
    if let Some(undo) = &report.undo {
        stack.push(undo.clone());
    }
    if report.kind == JobKind::EmptyTrash && report.success() {
        stack.trash_emptied();
    }
}

fn replay_kind(kind: UndoActionKind) -> JobKind {
    match kind {
        UndoActionKind::Copy => JobKind::Copy,
        UndoActionKind::Duplicate => JobKind::Duplicate,
        UndoActionKind::Move => JobKind::Move,
        UndoActionKind::Rename => JobKind::Rename,
        UndoActionKind::CreateEmptyFile | UndoActionKind::CreateFromTemplate | UndoActionKind::CreateFolder => {
            JobKind::Create
        }
        UndoActionKind::MoveToTrash => JobKind::Trash,
        UndoActionKind::CreateLink => JobKind::Link,
        UndoActionKind::Delete => JobKind::Delete,
        UndoActionKind::RestoreFromTrash => JobKind::RestoreFromTrash,
        UndoActionKind::SetPermissions => JobKind::SetPermissions,
        UndoActionKind::RecursiveSetPermissions => JobKind::RecursiveSetPermissions,
        UndoActionKind::ChangeOwner => JobKind::ChangeOwner,
        UndoActionKind::ChangeGroup => JobKind::ChangeGroup,
    }
}

/// The job that reverses `action`, or `None` when there is nothing to run.
pub fn undo_request(action: &UndoActionData, config: &EngineConfig) -> Option<JobRequest> {
    let confirm = config.confirm_delete;
    let request = match action.kind {
        UndoActionKind::Copy | UndoActionKind::Duplicate | UndoActionKind::CreateLink => {
            let mut sources = top_level(&action.destination_locations());
            sources.reverse();
            JobRequest::Delete { sources, confirm }
        }
        UndoActionKind::CreateEmptyFile | UndoActionKind::CreateFromTemplate | UndoActionKind::CreateFolder => {
            JobRequest::Delete {
                sources: vec![action.target.clone()?],
                confirm,
            }
        }
        UndoActionKind::Move => JobRequest::Move {
            sources: top_level(&action.destination_locations()),
            destination: action.src_dir.clone()?,
        },
        UndoActionKind::RestoreFromTrash => JobRequest::Trash {
            sources: top_level(&action.destination_locations()),
            confirm: false,
        },
        UndoActionKind::MoveToTrash => JobRequest::RestoreFromTrash {
            items: action.trashed.clone(),
        },
        UndoActionKind::Rename => JobRequest::Rename {
            location: action.new_location.clone()?,
            new_name: action.old_location.as_ref()?.file_name()?.to_string(),
        },
        UndoActionKind::Delete => return None,
        UndoActionKind::SetPermissions | UndoActionKind::RecursiveSetPermissions => JobRequest::RestorePermissions {
            modes: action.original_permissions.clone(),
        },
        UndoActionKind::ChangeOwner => JobRequest::ChangeOwner {
            location: action.target.clone()?,
            owner: action.original_id.clone()?,
        },
        UndoActionKind::ChangeGroup => JobRequest::ChangeGroup {
            location: action.target.clone()?,
            group: action.original_id.clone()?,
        },
    };
    Some(request)
}

/// The job that repeats `action`, or `None` when there is nothing to run.
pub fn redo_request(action: &UndoActionData) -> Option<JobRequest> {
    let request = match action.kind {
        UndoActionKind::Copy => JobRequest::Copy {
            sources: top_level(&action.source_locations()),
            destination: action.dest_dir.clone()?,
        },
        UndoActionKind::Duplicate => JobRequest::Duplicate {
            sources: top_level(&action.source_locations()),
        },
        UndoActionKind::Move => JobRequest::Move {
            sources: top_level(&action.source_locations()),
            destination: action.dest_dir.clone()?,
        },
        UndoActionKind::CreateLink => JobRequest::Link {
            sources: top_level(&action.source_locations()),
            destination: action.dest_dir.clone()?,
        },
        UndoActionKind::RestoreFromTrash => match &action.dest_dir {
            Some(dest_dir) => JobRequest::Move {
                sources: top_level(&action.source_locations()),
                destination: dest_dir.clone(),
            },
            None => JobRequest::RestoreFromTrash {
                items: action.trashed.clone(),
            },
        },
        UndoActionKind::Rename => JobRequest::Rename {
            location: action.old_location.clone()?,
            new_name: action.new_location.as_ref()?.file_name()?.to_string(),
        },
        UndoActionKind::CreateEmptyFile | UndoActionKind::CreateFromTemplate | UndoActionKind::CreateFolder => {
            let target = action.target.as_ref()?;
            let kind = match action.kind {
                UndoActionKind::CreateFolder => CreateKind::Folder,
                UndoActionKind::CreateFromTemplate => CreateKind::FromTemplate(action.template.clone()?),
                _ => CreateKind::EmptyFile,
            };
            JobRequest::Create {
                parent: target.parent()?,
                name: Some(target.file_name()?.to_string()),
                kind,
            }
        }
        UndoActionKind::MoveToTrash => JobRequest::Trash {
            sources: action
                .trashed
                .keys()
                .filter_map(|uri| Location::parse(uri).ok())
                .collect(),
            confirm: false,
        },
        UndoActionKind::Delete => return None,
        UndoActionKind::SetPermissions => JobRequest::SetPermissions {
            location: action.target.clone()?,
            mode: action.new_permissions,
        },
        UndoActionKind::RecursiveSetPermissions => JobRequest::RecursiveSetPermissions {
            location: action.target.clone()?,
            change: action.permission_change,
        },
        UndoActionKind::ChangeOwner => JobRequest::ChangeOwner {
            location: action.target.clone()?,
            owner: action.new_id.clone()?,
        },
        UndoActionKind::ChangeGroup => JobRequest::ChangeGroup {
            location: action.target.clone()?,
            group: action.new_id.clone()?,
        },
    };
    Some(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn copy_action() -> UndoActionData {
        let mut action = UndoActionData::new(UndoActionKind::Copy, 2)
            .with_dirs(Some(Location::local("/src")), Some(Location::local("/dst")));
        action.add_origin_target_pair(&Location::local("/src/d"), &Location::local("/dst/d"));
        action.add_origin_target_pair(&Location::local("/src/d/inner"), &Location::local("/dst/d/inner"));
        action.add_origin_target_pair(&Location::local("/src/f"), &Location::local("/dst/f"));
        action
    }

    #[test]
    fn test_undo_copy_deletes_top_level_in_reverse() {
        let config = EngineConfig {
            confirm_delete: false,
            ..EngineConfig::default()
        };
        let request = undo_request(&copy_action(), &config).unwrap();
        assert_eq!(
            request,
            JobRequest::Delete {
                sources: vec![Location::local("/dst/f"), Location::local("/dst/d")],
                confirm: false,
            }
        );
    }

    #[test]
    fn test_redo_copy_copies_top_level() {
        let request = redo_request(&copy_action()).unwrap();
        assert_eq!(
            request,
            JobRequest::Copy {
                sources: vec![Location::local("/src/d"), Location::local("/src/f")],
                destination: Location::local("/dst"),
            }
        );
    }

    #[test]
    fn test_rename_replays() {
        let mut action = UndoActionData::new(UndoActionKind::Rename, 1);
        action.set_rename(Location::local("/d/old"), Location::local("/d/new"));

        let undo = undo_request(&action, &EngineConfig::default()).unwrap();
        assert_eq!(
            undo,
            JobRequest::Rename {
                location: Location::local("/d/new"),
                new_name: "old".to_string(),
            }
        );
        let redo = redo_request(&action).unwrap();
        assert_eq!(
            redo,
            JobRequest::Rename {
                location: Location::local("/d/old"),
                new_name: "new".to_string(),
            }
        );
    }

    #[test]
    fn test_trash_replays() {
        let mut action = UndoActionData::new(UndoActionKind::MoveToTrash, 1);
        action.add_trashed(&Location::local("/home/x"), 9);

        match undo_request(&action, &EngineConfig::default()).unwrap() {
            JobRequest::RestoreFromTrash { items } => assert_eq!(items.get("file:///home/x"), Some(&9)),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            redo_request(&action).unwrap(),
            JobRequest::Trash {
                sources: vec![Location::local("/home/x")],
                confirm: false,
            }
        );
    }

    #[test]
    fn test_delete_has_no_replay() {
        let action = UndoActionData::new(UndoActionKind::Delete, 1);
        assert!(undo_request(&action, &EngineConfig::default()).is_none());
        assert!(redo_request(&action).is_none());
    }

    #[test]
    fn test_create_redo_keeps_name() {
        let mut action = UndoActionData::new(UndoActionKind::CreateFolder, 1);
        action.set_create(Location::local("/p/untitled folder"), None);
        assert_eq!(
            redo_request(&action).unwrap(),
            JobRequest::Create {
                parent: Location::local("/p"),
                name: Some("untitled folder".to_string()),
                kind: CreateKind::Folder,
            }
        );
    }
}
