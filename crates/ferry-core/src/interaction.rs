//! Seams through which running jobs talk to the user.
//!
//! Jobs run on worker threads and block on [`UserInteraction`] until the
//! user answers; a job never proceeds past a conflict or error unresolved.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::location::Location;

/// A button offered by a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WarnOption {
    Cancel,
    Skip,
    SkipAll,
    Retry,
    Delete,
    DeleteAll,
    /// Skip the unreadable remainder of a directory.
    SkipFiles,
}

impl WarnOption {
    /// Button label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Cancel => "Cancel",
            Self::Skip => "Skip",
            Self::SkipAll => "Skip All",
            Self::Retry => "Retry",
            Self::Delete => "Delete",
            Self::DeleteAll => "Delete All",
            Self::SkipFiles => "Skip files",
        }
    }
}

/// A warning shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub primary: String,
    pub secondary: String,
    pub details: Option<String>,
    /// More items remain, so "apply to all" style options are meaningful.
    pub show_all: bool,
    pub options: Vec<WarnOption>,
}

impl Warning {
    pub fn new(primary: impl Into<String>, secondary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: secondary.into(),
            details: None,
            show_all: false,
            options: vec![WarnOption::Cancel],
        }
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn show_all(mut self, show_all: bool) -> Self {
        self.show_all = show_all;
        self
    }

    pub fn options(mut self, options: &[WarnOption]) -> Self {
        self.options = options.to_vec();
        self
    }
}

/// How the user resolved a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConflictAction {
    Cancel,
    Skip,
    /// Replace the destination (merge, for two directories).
    Replace,
    /// Use `new_name` instead.
    Rename,
    /// Replace only if the source is newer.
    Newest,
}

/// A conflict awaiting resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictRequest {
    pub source: Location,
    pub destination: Location,
    pub dest_dir: Location,
    /// Both sides are directories.
    pub is_merge: bool,
}

/// The answer to a conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictResponse {
    pub action: ConflictAction,
    pub new_name: Option<String>,
    pub apply_to_all: bool,
}

impl ConflictResponse {
    fn new(action: ConflictAction) -> Self {
        Self {
            action,
            new_name: None,
            apply_to_all: false,
        }
    }

    pub fn cancel() -> Self {
        Self::new(ConflictAction::Cancel)
    }

    pub fn skip() -> Self {
        Self::new(ConflictAction::Skip)
    }

    pub fn replace() -> Self {
        Self::new(ConflictAction::Replace)
    }

    pub fn newest() -> Self {
        Self::new(ConflictAction::Newest)
    }

    pub fn rename(new_name: impl Into<String>) -> Self {
        Self {
            new_name: Some(new_name.into()),
            ..Self::new(ConflictAction::Rename)
        }
    }

    /// Apply this answer to every later conflict of the job.
    pub fn apply_to_all(mut self) -> Self {
        self.apply_to_all = true;
        self
    }
}

/// Synchronous questions from a running job.
pub trait UserInteraction: Send + Sync {
    /// Show a warning and return the chosen option (one of `warning.options`).
    fn warn(&self, warning: &Warning) -> WarnOption;

    /// Ask how to resolve a name conflict.
    fn resolve_conflict(&self, conflict: &ConflictRequest) -> ConflictResponse;
}

/// Receives progress from a running job.
pub trait ProgressSink: Send + Sync {
    fn set_status(&self, text: &str);
    fn set_details(&self, text: &str);
    fn update(&self, current: u64, total: u64);
    fn pulse(&self);
}

/// A progress sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn set_status(&self, _text: &str) {}
    fn set_details(&self, _text: &str) {}
    fn update(&self, _current: u64, _total: u64) {}
    fn pulse(&self) {}
}

/// Answers every question from a fixed policy without blocking.
#[derive(Debug, Clone)]
pub struct AutoInteraction {
    warn_preference: Vec<WarnOption>,
    conflict: ConflictResponse,
}

impl AutoInteraction {
    /// Skip failing items and conflicting names.
    pub fn skipping() -> Self {
        Self {
            warn_preference: vec![WarnOption::Skip, WarnOption::SkipFiles],
            conflict: ConflictResponse::skip(),
        }
    }

    /// Skip failing items, replace conflicting names.
    pub fn replacing() -> Self {
        Self {
            warn_preference: vec![WarnOption::Skip, WarnOption::SkipFiles],
            conflict: ConflictResponse::replace(),
        }
    }

    /// Answer yes to deletions, skip errors, replace conflicts.
    pub fn assume_yes() -> Self {
        Self {
            warn_preference: vec![WarnOption::Delete, WarnOption::Skip, WarnOption::SkipFiles],
            conflict: ConflictResponse::replace(),
        }
    }

    /// Cancel at the first question.
    pub fn cancelling() -> Self {
        Self {
            warn_preference: Vec::new(),
            conflict: ConflictResponse::cancel(),
        }
    }
}

impl UserInteraction for AutoInteraction {
    fn warn(&self, warning: &Warning) -> WarnOption {
        self.warn_preference
            .iter()
            .copied()
            .find(|option| warning.options.contains(option))
            .unwrap_or(WarnOption::Cancel)
    }

    fn resolve_conflict(&self, _conflict: &ConflictRequest) -> ConflictResponse {
        self.conflict.clone()
    }
}

/// A question forwarded to another task.
#[derive(Debug)]
pub enum InteractionRequest {
    Warn {
        warning: Warning,
        reply: oneshot::Sender<WarnOption>,
    },
    Conflict {
        request: ConflictRequest,
        reply: oneshot::Sender<ConflictResponse>,
    },
}

/// Forwards questions over a channel and blocks until they are answered.
///
/// Must be called from a blocking worker thread, never from inside an async
/// task. A dropped receiver or reply counts as Cancel.
#[derive(Debug, Clone)]
pub struct ChannelInteraction {
    tx: mpsc::Sender<InteractionRequest>,
}

impl ChannelInteraction {
    /// Create the interaction and the receiving end for the UI task.
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<InteractionRequest>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }
}

impl UserInteraction for ChannelInteraction {
    fn warn(&self, warning: &Warning) -> WarnOption {
        let (reply, response) = oneshot::channel();
        let request = InteractionRequest::Warn {
            warning: warning.clone(),
            reply,
        };
        if self.tx.blocking_send(request).is_err() {
            return WarnOption::Cancel;
        }
        response.blocking_recv().unwrap_or(WarnOption::Cancel)
    }

    fn resolve_conflict(&self, conflict: &ConflictRequest) -> ConflictResponse {
        let (reply, response) = oneshot::channel();
        let request = InteractionRequest::Conflict {
            request: conflict.clone(),
            reply,
        };
        if self.tx.blocking_send(request).is_err() {
            return ConflictResponse::cancel();
        }
        response
            .blocking_recv()
            .unwrap_or_else(|_| ConflictResponse::cancel())
    }
}

/// Answers from a prepared script and records every question asked.
///
/// When the script runs out, warnings are answered with Cancel and
/// conflicts with Skip.
#[derive(Debug, Default)]
pub struct ScriptedInteraction {
    warn_answers: Mutex<VecDeque<WarnOption>>,
    conflict_answers: Mutex<VecDeque<ConflictResponse>>,
    warnings: Mutex<Vec<Warning>>,
    conflicts: Mutex<Vec<ConflictRequest>>,
}

impl ScriptedInteraction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an answer for the next warning.
    pub fn answer_warning(self, option: WarnOption) -> Self {
        self.warn_answers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(option);
        self
    }

    /// Queue an answer for the next conflict.
    pub fn answer_conflict(self, response: ConflictResponse) -> Self {
        self.conflict_answers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(response);
        self
    }

    /// Warnings asked so far.
    pub fn warnings(&self) -> Vec<Warning> {
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Conflicts asked so far.
    pub fn conflicts(&self) -> Vec<ConflictRequest> {
        self.conflicts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl UserInteraction for ScriptedInteraction {
    fn warn(&self, warning: &Warning) -> WarnOption {
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(warning.clone());
        self.warn_answers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(WarnOption::Cancel)
    }

    fn resolve_conflict(&self, conflict: &ConflictRequest) -> ConflictResponse {
        self.conflicts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(conflict.clone());
        self.conflict_answers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(ConflictResponse::skip)
    }
}
