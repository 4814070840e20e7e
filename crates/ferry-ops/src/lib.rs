//! File operations engine for ferry.
//!
//! Jobs copy, move, link, trash, delete, create, rename and change the
//! attributes of files. Each runs as an independent cancellable task that
//! reports progress, asks the user about errors and conflicts, queues change
//! notifications, and hands back the data needed to undo it. [`Engine`] ties
//! the jobs to a bounded [`UndoRedoStack`].

mod attributes;
mod context;
mod copy;
mod create;
mod delete;
mod engine;
mod executor;
mod guard;
mod job;
mod link;
mod move_files;
mod naming;
mod progress;
mod rename;
mod restore;
mod stack;
mod transfer;
mod undo;

pub use context::JobEnv;
pub use engine::{Engine, EngineError, TransferAction, redo_request, undo_request};
pub use executor::{JobHandle, JobScheduler, run_job};
pub use guard::dir_is_parent;
pub use job::{CreateKind, Job, JobFlags, JobKind, JobOutcome, JobReport, JobRequest, PermissionChange};
pub use naming::{
    NEW_FILE, UNTITLED_FOLDER, duplicate_name, link_name, make_valid_for_fs, numbered_name, shorten_utf8,
    target_file, top_level, unique_target_file, validate_filename,
};
pub use progress::{ProgressReporter, TransferInfo, TransferLabels, TransferVerb, format_time};
pub use stack::{HistoryEntry, Replay, ReplayDirection, UndoRedoStack};
pub use undo::{MenuState, UndoActionData, UndoActionKind};

/// Default channel buffer size for job report subscribers.
pub const OPERATION_CHANNEL_SIZE: usize = 100;
