//! Rename job.

use ferry_core::{ChangeEvent, Location};

use crate::context::JobContext;
use crate::naming::validate_filename;
use crate::undo::{UndoActionData, UndoActionKind};

/// Rename `location` in place.
pub(crate) fn run_rename(ctx: &mut JobContext<'_>, location: &Location, new_name: &str) -> Result<(), String> {
    validate_filename(new_name)?;

    let renamed = ctx
        .fs()
        .rename(location, new_name)
        .map_err(|e| match e {
            ferry_core::FsError::Exists { .. } => format!("'{new_name}' already exists"),
            other => other.to_string(),
        })?;

    if renamed == *location {
        return Ok(());
    }

    tracing::info!(target: "ferry::rename", from = %location, to = %renamed, "renamed");
    ctx.emit(ChangeEvent::moved(location.clone(), renamed.clone()));
    ctx.begin_undo(UndoActionData::new(UndoActionKind::Rename, 1));
    if let Some(undo) = ctx.undo_mut() {
        undo.set_rename(location.clone(), renamed.clone());
    }
    ctx.transfer.num_files += 1;
    ctx.created.push(renamed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ferry_core::{AutoInteraction, EngineConfig, LocalFileSystem, NullProgress};
    use ferry_scan::OpKind;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::context::JobEnv;
    use crate::job::{JobKind, JobOutcome};

    fn env() -> JobEnv {
        JobEnv::new(
            Arc::new(LocalFileSystem::new()),
            Arc::new(AutoInteraction::cancelling()),
            Arc::new(NullProgress),
            EngineConfig::default(),
        )
    }

    #[test]
    fn test_rename_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("old.txt"), "x").unwrap();

        let env = env();
        let cancel = CancellationToken::new();
        let mut ctx = JobContext::new(&env, &cancel, OpKind::Move, true);
        let location = Location::local(temp.path().join("old.txt"));
        let result = run_rename(&mut ctx, &location, "new.txt");
        let report = ctx.into_report(JobKind::Rename, result);

        assert_eq!(report.outcome, JobOutcome::Completed);
        assert!(temp.path().join("new.txt").exists());
        assert!(!temp.path().join("old.txt").exists());
        let undo = report.undo.unwrap();
        assert_eq!(undo.old_location, Some(location));
        assert_eq!(env.changes.len(), 1);
    }

    #[test]
    fn test_rename_rejects_bad_names() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a"), "x").unwrap();

        let env = env();
        let cancel = CancellationToken::new();
        let location = Location::local(temp.path().join("a"));

        for bad in ["", "a/b", ".."] {
            let mut ctx = JobContext::new(&env, &cancel, OpKind::Move, true);
            let result = run_rename(&mut ctx, &location, bad);
            assert!(result.is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_rename_onto_existing_fails() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a"), "x").unwrap();
        std::fs::write(temp.path().join("b"), "y").unwrap();

        let env = env();
        let cancel = CancellationToken::new();
        let mut ctx = JobContext::new(&env, &cancel, OpKind::Move, true);
        let result = run_rename(&mut ctx, &Location::local(temp.path().join("a")), "b");
        assert_eq!(result, Err("'b' already exists".to_string()));
        assert_eq!(std::fs::read_to_string(temp.path().join("b")).unwrap(), "y");
    }
}
