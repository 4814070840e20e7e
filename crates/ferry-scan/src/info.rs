//! Totals gathered by the scanner.

use serde::{Deserialize, Serialize};

/// The kind of operation the sources are counted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    Copy,
    Move,
    Delete,
    Trash,
}

impl OpKind {
    /// Primary text of scan error dialogs.
    pub fn error_title(&self) -> &'static str {
        match self {
            Self::Copy => "Error while copying.",
            Self::Move => "Error while moving.",
            Self::Delete => "Error while deleting.",
            Self::Trash => "Error while moving files to trash.",
        }
    }

    fn verb(&self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::Move => "move",
            Self::Delete => "delete",
            Self::Trash => "trash",
        }
    }
}

/// Number of entries and bytes reachable from a job's sources.
///
/// Directories count as one entry and contribute no bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub num_files: u64,
    pub num_bytes: u64,
    pub op: OpKind,
}

impl SourceInfo {
    pub fn new(op: OpKind) -> Self {
        Self {
            num_files: 0,
            num_bytes: 0,
            op,
        }
    }

    /// Status line shown while counting, e.g. "Preparing to copy 3 files (12 B)".
    pub fn count_message(&self) -> String {
        let files = if self.num_files == 1 { "file" } else { "files" };
        match self.op {
            OpKind::Trash => format!("Preparing to trash {} {files}", self.num_files),
            op => format!(
                "Preparing to {} {} {files} ({})",
                op.verb(),
                self.num_files,
                humansize::format_size(self.num_bytes, humansize::DECIMAL)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_message() {
        let mut info = SourceInfo::new(OpKind::Copy);
        info.num_files = 1;
        info.num_bytes = 3;
        assert_eq!(info.count_message(), "Preparing to copy 1 file (3 B)");

        info.op = OpKind::Trash;
        info.num_files = 4;
        assert_eq!(info.count_message(), "Preparing to trash 4 files");
    }
}
