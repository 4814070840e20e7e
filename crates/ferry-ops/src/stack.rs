//! Bounded undo/redo history.
//!
//! Entries are kept newest first. Everything before `index` has been undone
//! and can be redone; the entry at `index` is the next to undo.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use serde::Serialize;

use ferry_core::Location;

use crate::undo::{MenuState, UndoActionData, UndoActionKind};

/// Which way an action is being replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
pub enum ReplayDirection {
    Undo,
    Redo,
}

/// An action checked out of the stack for replay.
///
/// The entry stays locked until [`UndoRedoStack::finish_replay`] is called
/// with `id`.
#[derive(Debug, Clone)]
pub struct Replay {
    pub id: u64,
    pub direction: ReplayDirection,
    pub action: UndoActionData,
}

/// One line of the history listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub label: String,
    pub description: String,
    pub undone: bool,
}

#[derive(Debug)]
struct StackEntry {
    id: u64,
    action: UndoActionData,
    locked: bool,
}

#[derive(Debug, Default)]
struct StackState {
    entries: VecDeque<StackEntry>,
    index: usize,
    replay_in_flight: bool,
    next_id: u64,
    /// Ids of locked entries dropped from the history, freed when their
    /// replay finishes.
    freed_pending: Vec<u64>,
}

impl StackState {
    fn discard(&mut self, entry: StackEntry) {
        if entry.locked {
            tracing::debug!(target: "ferry::undo", id = entry.id, kind = %entry.action.kind, "dropping action still in replay");
            self.freed_pending.push(entry.id);
        } else {
            tracing::debug!(target: "ferry::undo", id = entry.id, kind = %entry.action.kind, "dropping action");
        }
    }

    fn clear_redo(&mut self) {
        while self.index > 0 {
            if let Some(entry) = self.entries.pop_front() {
                self.discard(entry);
            }
            self.index -= 1;
        }
    }

    fn fix_size(&mut self, levels: usize) {
        while self.entries.len() > levels {
            let position = self
                .entries
                .iter()
                .rposition(|entry| !entry.locked)
                .unwrap_or(self.entries.len() - 1);
            if position < self.index {
                self.index -= 1;
            }
            if let Some(entry) = self.entries.remove(position) {
                self.discard(entry);
            }
        }
    }

    fn undo_entry(&self) -> Option<&StackEntry> {
        if self.replay_in_flight {
            return None;
        }
        self.entries.get(self.index).filter(|entry| !entry.locked)
    }

    fn redo_entry(&self) -> Option<&StackEntry> {
        if self.replay_in_flight || self.index == 0 {
            return None;
        }
        self.entries.get(self.index - 1).filter(|entry| !entry.locked)
    }
}

/// The history of completed reversible actions.
///
/// Safe to share between the jobs that push to it and the caller that
/// replays from it.
#[derive(Debug)]
pub struct UndoRedoStack {
    state: Mutex<StackState>,
    levels: usize,
}

impl UndoRedoStack {
    /// A stack holding at most `levels` actions.
    pub fn new(levels: usize) -> Self {
        Self {
            state: Mutex::new(StackState::default()),
            levels,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn levels(&self) -> usize {
        self.levels
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Record a completed action. Invalid actions are ignored; anything that
    /// could be redone is forgotten.
    pub fn push(&self, action: UndoActionData) {
        if !action.is_valid {
            tracing::debug!(target: "ferry::undo", kind = %action.kind, "ignoring empty action");
            return;
        }
        let mut state = self.lock();
        state.clear_redo();

        let id = state.next_id;
        state.next_id += 1;
        tracing::debug!(target: "ferry::undo", id, kind = %action.kind, count = action.count, "action recorded");
        state.entries.push_front(StackEntry {
            id,
            action,
            locked: false,
        });
        state.index = 0;
        state.fix_size(self.levels);
    }

    /// Record a rename done outside a job, such as inline editing.
    pub fn add_rename_action(&self, new_location: &Location, original_name: &str) {
        let Some(parent) = new_location.parent() else {
            return;
        };
        let mut action = UndoActionData::new(UndoActionKind::Rename, 1);
        action.set_rename(parent.child(original_name), new_location.clone());
        self.push(action);
    }

    pub fn can_undo(&self) -> bool {
        self.lock().undo_entry().is_some()
    }

    pub fn can_redo(&self) -> bool {
        self.lock().redo_entry().is_some()
    }

    /// Check out the next action to undo.
    ///
    /// Returns `None` when there is nothing to undo or another replay is
    /// still running.
    pub fn begin_undo(&self) -> Option<Replay> {
        let mut state = self.lock();
        let index = state.index;
        state.undo_entry()?;
        let entry = state.entries.get_mut(index)?;
        entry.locked = true;
        let replay = Replay {
            id: entry.id,
            direction: ReplayDirection::Undo,
            action: entry.action.clone(),
        };
        state.index += 1;
        state.replay_in_flight = true;
        tracing::debug!(target: "ferry::undo", id = replay.id, kind = %replay.action.kind, "undo started");
        Some(replay)
    }

    /// Check out the most recently undone action.
    pub fn begin_redo(&self) -> Option<Replay> {
        let mut state = self.lock();
        state.redo_entry()?;
        let index = state.index - 1;
        let entry = state.entries.get_mut(index)?;
        entry.locked = true;
        let replay = Replay {
            id: entry.id,
            direction: ReplayDirection::Redo,
            action: entry.action.clone(),
        };
        state.index = index;
        state.replay_in_flight = true;
        tracing::debug!(target: "ferry::undo", id = replay.id, kind = %replay.action.kind, "redo started");
        Some(replay)
    }

    /// Release an entry checked out by [`begin_undo`](Self::begin_undo) or
    /// [`begin_redo`](Self::begin_redo).
    pub fn finish_replay(&self, id: u64) {
        let mut state = self.lock();
        state.replay_in_flight = false;
        if let Some(position) = state.freed_pending.iter().position(|pending| *pending == id) {
            state.freed_pending.swap_remove(position);
            tracing::debug!(target: "ferry::undo", id, "released dropped action");
            return;
        }
        if let Some(entry) = state.entries.iter_mut().find(|entry| entry.id == id) {
            entry.locked = false;
        }
        tracing::debug!(target: "ferry::undo", id, "replay finished");
    }

    /// Forget actions that depend on trash contents.
    ///
    /// Redo history is cleared, every move-to-trash action is dropped, and so
    /// is any action whose destinations were among the trashed items.
    pub fn trash_emptied(&self) {
        let mut state = self.lock();
        state.clear_redo();

        let trashed: IndexMap<String, u64> = state
            .entries
            .iter()
            .filter(|entry| entry.action.kind == UndoActionKind::MoveToTrash)
            .flat_map(|entry| entry.action.trashed.clone())
            .collect();

        let entries = std::mem::take(&mut state.entries);
        for entry in entries {
            let stale = entry.action.kind == UndoActionKind::MoveToTrash
                || (!trashed.is_empty() && entry.action.destinations_overlap(&trashed));
            if stale {
                state.discard(entry);
            } else {
                state.entries.push_back(entry);
            }
        }
        tracing::info!(target: "ferry::undo", remaining = state.entries.len(), "trash emptied, history pruned");
    }

    /// What undo and redo menu entries should currently show.
    pub fn menu_state(&self) -> MenuState {
        let state = self.lock();
        let mut menu = MenuState::default();
        if let Some(entry) = state.undo_entry() {
            menu.can_undo = true;
            menu.undo_label = Some(entry.action.undo_label());
            menu.undo_description = Some(entry.action.undo_description());
        }
        if let Some(entry) = state.redo_entry() {
            menu.can_redo = true;
            menu.redo_label = Some(entry.action.redo_label());
            menu.redo_description = Some(entry.action.redo_description());
        }
        menu
    }

    /// The whole history, newest first.
    pub fn history(&self) -> Vec<HistoryEntry> {
        let state = self.lock();
        state
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let undone = i < state.index;
                let (label, description) = if undone {
                    (entry.action.redo_label(), entry.action.redo_description())
                } else {
                    (entry.action.undo_label(), entry.action.undo_description())
                };
                HistoryEntry {
                    label,
                    description,
                    undone,
                }
            })
            .collect()
    }
}

impl Default for UndoRedoStack {
    fn default() -> Self {
        Self::new(ferry_core::EngineConfig::default().undo_levels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn copy_of(name: &str) -> UndoActionData {
        let mut action = UndoActionData::new(UndoActionKind::Copy, 1)
            .with_dirs(Some(Location::local("/src")), Some(Location::local("/dst")));
        action.add_origin_target_pair(&Location::local("/src").child(name), &Location::local("/dst").child(name));
        action
    }

    fn trash_of(name: &str) -> UndoActionData {
        let mut action = UndoActionData::new(UndoActionKind::MoveToTrash, 1);
        action.add_trashed(&Location::local("/home").child(name), 7);
        action
    }

    fn label(stack: &UndoRedoStack) -> Option<String> {
        stack.menu_state().undo_description
    }

    #[test]
    fn test_invalid_actions_are_ignored() {
        let stack = UndoRedoStack::new(5);
        stack.push(UndoActionData::new(UndoActionKind::Copy, 1));
        assert!(stack.is_empty());
        assert!(!stack.can_undo());
    }

    #[test]
    fn test_undo_then_redo() {
        let stack = UndoRedoStack::new(5);
        stack.push(copy_of("a"));
        stack.push(copy_of("b"));

        let replay = stack.begin_undo().unwrap();
        assert_eq!(replay.direction, ReplayDirection::Undo);
        assert_eq!(replay.action.destination_locations(), vec![Location::local("/dst/b")]);
        assert!(!stack.can_undo(), "only one replay at a time");
        stack.finish_replay(replay.id);

        assert_eq!(label(&stack), Some("Delete 'a'".to_string()));
        assert!(stack.can_redo());

        let redo = stack.begin_redo().unwrap();
        assert_eq!(redo.id, replay.id);
        stack.finish_replay(redo.id);
        assert!(!stack.can_redo());
        assert_eq!(label(&stack), Some("Delete 'b'".to_string()));
    }

    #[test]
    fn test_push_clears_redo() {
        let stack = UndoRedoStack::new(5);
        stack.push(copy_of("a"));
        stack.push(copy_of("b"));
        let replay = stack.begin_undo().unwrap();
        stack.finish_replay(replay.id);

        stack.push(copy_of("c"));
        assert!(!stack.can_redo());
        assert_eq!(stack.len(), 2);
        assert_eq!(label(&stack), Some("Delete 'c'".to_string()));
    }

    #[test]
    fn test_bounded_by_levels() {
        let stack = UndoRedoStack::new(3);
        for name in ["a", "b", "c", "d", "e"] {
            stack.push(copy_of(name));
            assert!(stack.len() <= 3);
        }
        let labels: Vec<_> = stack.history().into_iter().map(|entry| entry.description).collect();
        assert_eq!(labels, vec!["Delete 'e'", "Delete 'd'", "Delete 'c'"]);
    }

    #[test]
    fn test_locked_entry_evicted_last_and_freed_later() {
        let stack = UndoRedoStack::new(2);
        stack.push(copy_of("a"));
        stack.push(copy_of("b"));

        // Undo "b" then redo it; it sits locked at the top while replaying.
        let undo = stack.begin_undo().unwrap();
        stack.finish_replay(undo.id);
        let redo = stack.begin_redo().unwrap();

        // The in-flight redo keeps its entry; pushing evicts unlocked ones.
        stack.push(copy_of("c"));
        assert_eq!(stack.len(), 2);
        let labels: Vec<_> = stack.history().into_iter().map(|entry| entry.description).collect();
        assert_eq!(labels, vec!["Delete 'c'", "Delete 'b'"]);

        stack.finish_replay(redo.id);
        assert!(stack.can_undo());
    }

    #[test]
    fn test_entry_dropped_during_undo_is_freed() {
        let stack = UndoRedoStack::new(5);
        stack.push(copy_of("a"));
        let undo = stack.begin_undo().unwrap();

        // A job finishing meanwhile clears the redo side, taking the entry.
        stack.push(copy_of("b"));
        assert_eq!(stack.len(), 1);
        stack.finish_replay(undo.id);
        assert_eq!(stack.len(), 1);
        assert!(stack.can_undo());
    }

    #[test]
    fn test_trash_emptied_prunes() {
        let stack = UndoRedoStack::new(10);
        stack.push(copy_of("a"));
        stack.push(trash_of("x"));

        let mut restore = UndoActionData::new(UndoActionKind::RestoreFromTrash, 1)
            .with_dirs(Some(Location::trash_root()), None);
        restore.add_origin_target_pair(&Location::trash_root().child("x"), &Location::local("/home/x"));
        stack.push(restore);

        let mut moved = UndoActionData::new(UndoActionKind::Move, 1)
            .with_dirs(Some(Location::local("/a")), Some(Location::local("/b")));
        moved.add_origin_target_pair(&Location::local("/a/m"), &Location::local("/b/m"));
        stack.push(moved);

        stack.trash_emptied();

        let kinds: Vec<_> = stack.history().into_iter().map(|entry| entry.label).collect();
        assert_eq!(kinds, vec!["Undo move of 1 item", "Undo copy of 1 item"]);
    }

    #[test]
    fn test_add_rename_action() {
        let stack = UndoRedoStack::new(5);
        stack.add_rename_action(&Location::local("/d/new"), "old");
        assert_eq!(label(&stack), Some("Rename 'new' as 'old'".to_string()));
    }
}
