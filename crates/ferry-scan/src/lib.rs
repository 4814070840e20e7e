//! Source counting for ferry file operations.
//!
//! Before a job transfers anything it walks its sources once to learn how
//! many entries and bytes are involved, so progress can be reported against
//! a total. The walk is depth-first, cancellable, and asks the user what to
//! do about unreadable entries.

mod info;
mod scanner;

pub use info::{OpKind, SourceInfo};
pub use scanner::SourceScanner;
