//! Core types and capability traits for ferry.
//!
//! This crate provides the vocabulary shared by the scanner and the
//! operations engine: URI-style locations, the filesystem error taxonomy,
//! the `FileSystem` capability with a local implementation, the change
//! queue, engine configuration, and the user-interaction seams.

mod changes;
mod config;
mod error;
mod fs;
mod interaction;
mod local;
mod location;
mod metadata;
mod trash;

pub use changes::{ChangeEvent, ChangeKind, ChangeNotifier, ChangeQueue};
pub use config::{ConfigError, EngineConfig, EngineConfigBuilder};
pub use error::{ErrorCategory, FsError, FsResult};
pub use fs::{DirEntries, FileSystem, TransferFlags, TrashEntry};
pub use interaction::{
    AutoInteraction, ChannelInteraction, ConflictAction, ConflictRequest, ConflictResponse,
    InteractionRequest, NullProgress, ProgressSink, ScriptedInteraction, UserInteraction,
    WarnOption, Warning,
};
pub use local::LocalFileSystem;
pub use location::{Location, Scheme};
pub use metadata::{FileKind, Metadata};
pub use trash::TrashBackend;
