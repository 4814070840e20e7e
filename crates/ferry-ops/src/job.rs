//! Job descriptions and results.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::Display;
use tokio_util::sync::CancellationToken;

use ferry_core::Location;

use crate::undo::UndoActionData;

/// The kind of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum JobKind {
    Copy,
    Duplicate,
    Move,
    Link,
    Delete,
    Trash,
    Create,
    Rename,
    #[strum(to_string = "Restore from trash")]
    RestoreFromTrash,
    #[strum(to_string = "Empty trash")]
    EmptyTrash,
    #[strum(to_string = "Set permissions")]
    SetPermissions,
    #[strum(to_string = "Set permissions recursively")]
    RecursiveSetPermissions,
    #[strum(to_string = "Change owner")]
    ChangeOwner,
    #[strum(to_string = "Change group")]
    ChangeGroup,
}

/// What a create job makes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreateKind {
    Folder,
    EmptyFile,
    /// A file with the contents of the template.
    FromTemplate(Location),
}

/// A recursive permission change: `mode = (current & !mask) | value`,
/// separately for files and directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PermissionChange {
    pub file_value: u32,
    pub file_mask: u32,
    pub dir_value: u32,
    pub dir_mask: u32,
}

impl PermissionChange {
    /// New mode for an entry currently at `current`.
    pub fn apply(&self, current: u32, is_dir: bool) -> u32 {
        let (value, mask) = if is_dir {
            (self.dir_value, self.dir_mask)
        } else {
            (self.file_value, self.file_mask)
        };
        (current & !mask) | value
    }
}

/// Everything a job needs to know about its work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobRequest {
    Copy {
        sources: Vec<Location>,
        destination: Location,
    },
    /// Copy each source next to itself under a unique name.
    Duplicate { sources: Vec<Location> },
    Move {
        sources: Vec<Location>,
        destination: Location,
    },
    Link {
        sources: Vec<Location>,
        destination: Location,
    },
    /// Permanent deletion, confirmed first when `confirm` is set.
    Delete { sources: Vec<Location>, confirm: bool },
    /// Move to trash; items already in the trash are deleted instead.
    Trash { sources: Vec<Location>, confirm: bool },
    Create {
        parent: Location,
        name: Option<String>,
        kind: CreateKind,
    },
    Rename { location: Location, new_name: String },
    /// Put trashed items back where they came from. Items are keyed by
    /// original URI and matched by modification time.
    RestoreFromTrash { items: IndexMap<String, u64> },
    EmptyTrash { confirm: bool },
    SetPermissions { location: Location, mode: u32 },
    RecursiveSetPermissions {
        location: Location,
        change: PermissionChange,
    },
    /// Apply recorded modes; the undo of a recursive permission change.
    RestorePermissions { modes: IndexMap<String, u32> },
    ChangeOwner { location: Location, owner: String },
    ChangeGroup { location: Location, group: String },
}

impl JobRequest {
    pub fn kind(&self) -> JobKind {
        match self {
            Self::Copy { .. } => JobKind::Copy,
            Self::Duplicate { .. } => JobKind::Duplicate,
            Self::Move { .. } => JobKind::Move,
            Self::Link { .. } => JobKind::Link,
            Self::Delete { .. } => JobKind::Delete,
            Self::Trash { .. } => JobKind::Trash,
            Self::Create { .. } => JobKind::Create,
            Self::Rename { .. } => JobKind::Rename,
            Self::RestoreFromTrash { .. } => JobKind::RestoreFromTrash,
            Self::EmptyTrash { .. } => JobKind::EmptyTrash,
            Self::SetPermissions { .. } => JobKind::SetPermissions,
            Self::RecursiveSetPermissions { .. } | Self::RestorePermissions { .. } => {
                JobKind::RecursiveSetPermissions
            }
            Self::ChangeOwner { .. } => JobKind::ChangeOwner,
            Self::ChangeGroup { .. } => JobKind::ChangeGroup,
        }
    }
}

/// Sticky per-job decisions. They start cleared and are never shared
/// between jobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFlags {
    pub skip_all_error: bool,
    pub skip_all_conflict: bool,
    pub replace_all: bool,
    pub merge_all: bool,
    pub keep_newest_all: bool,
    /// Delete items that could not be trashed without asking again.
    pub delete_all: bool,
}

/// A submitted unit of work.
#[derive(Debug, Clone)]
pub struct Job {
    pub request: JobRequest,
    pub cancel: CancellationToken,
    /// Build undo data while running. Off for undo/redo replays.
    pub record_undo: bool,
}

impl Job {
    pub fn new(request: JobRequest) -> Self {
        Self {
            request,
            cancel: CancellationToken::new(),
            record_undo: true,
        }
    }

    /// Run without recording undo data.
    pub fn replay(request: JobRequest) -> Self {
        Self {
            record_undo: false,
            ..Self::new(request)
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn kind(&self) -> JobKind {
        self.request.kind()
    }
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobOutcome {
    Completed,
    /// Cancelled by the user, including when every item was skipped.
    Cancelled,
    Failed(String),
}

/// The single completion value of a job.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub kind: JobKind,
    pub outcome: JobOutcome,
    /// Items skipped after an error or conflict.
    pub skipped: u64,
    pub files_done: u64,
    pub bytes_done: u64,
    /// Top-level entries the job created or moved into place.
    pub created: Vec<Location>,
    /// Undo data, when the job recorded any and it is valid.
    pub undo: Option<UndoActionData>,
}

impl JobReport {
    pub fn new(kind: JobKind, outcome: JobOutcome) -> Self {
        Self {
            kind,
            outcome,
            skipped: 0,
            files_done: 0,
            bytes_done: 0,
            created: Vec::new(),
            undo: None,
        }
    }

    pub fn failed(kind: JobKind, message: impl Into<String>) -> Self {
        Self::new(kind, JobOutcome::Failed(message.into()))
    }

    /// Whether the job completed.
    pub fn success(&self) -> bool {
        self.outcome == JobOutcome::Completed
    }

    /// The failure message, if any.
    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            JobOutcome::Failed(message) => Some(message),
            _ => None,
        }
    }
}
