//! Reversible action records kept by the undo stack.

use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::Display;

use ferry_core::Location;

use crate::job::PermissionChange;

/// The kind of a reversible action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum UndoActionKind {
    Copy,
    Duplicate,
    Move,
    Rename,
    CreateEmptyFile,
    CreateFromTemplate,
    CreateFolder,
    MoveToTrash,
    CreateLink,
    Delete,
    RestoreFromTrash,
    SetPermissions,
    RecursiveSetPermissions,
    ChangeOwner,
    ChangeGroup,
}

/// Everything needed to reverse (and then repeat) one completed job.
///
/// Sources and destinations are stored relative to `src_dir` and `dest_dir`;
/// entries outside those directories keep their absolute path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoActionData {
    pub kind: UndoActionKind,
    pub src_dir: Option<Location>,
    pub dest_dir: Option<Location>,
    sources: Vec<PathBuf>,
    destinations: Vec<PathBuf>,
    /// Trashed items: original URI to modification time.
    pub trashed: IndexMap<String, u64>,
    pub old_location: Option<Location>,
    pub new_location: Option<Location>,
    /// Entry made by a create action.
    pub target: Option<Location>,
    pub template: Option<Location>,
    /// Modes before a permission change, keyed by URI.
    pub original_permissions: IndexMap<String, u32>,
    pub new_permissions: u32,
    pub permission_change: PermissionChange,
    /// Owner or group before and after a change.
    pub original_id: Option<String>,
    pub new_id: Option<String>,
    /// Number of top-level items the job was started with.
    pub count: u64,
    pub is_valid: bool,
}

impl UndoActionData {
    pub fn new(kind: UndoActionKind, count: u64) -> Self {
        Self {
            kind,
            src_dir: None,
            dest_dir: None,
            sources: Vec::new(),
            destinations: Vec::new(),
            trashed: IndexMap::new(),
            old_location: None,
            new_location: None,
            target: None,
            template: None,
            original_permissions: IndexMap::new(),
            new_permissions: 0,
            permission_change: PermissionChange::default(),
            original_id: None,
            new_id: None,
            count,
            is_valid: false,
        }
    }

    pub fn with_dirs(mut self, src_dir: Option<Location>, dest_dir: Option<Location>) -> Self {
        self.src_dir = src_dir;
        self.dest_dir = dest_dir;
        self
    }

    /// Record one successfully transferred entry.
    pub fn add_origin_target_pair(&mut self, origin: &Location, target: &Location) {
        self.sources.push(relative(origin, self.src_dir.as_ref()));
        self.destinations.push(relative(target, self.dest_dir.as_ref()));
        self.is_valid = true;
    }

    /// Record an item moved to the trash with its modification time.
    pub fn add_trashed(&mut self, original: &Location, mtime: u64) {
        self.trashed.insert(original.uri(), mtime);
        self.is_valid = true;
    }

    pub fn set_rename(&mut self, old: Location, new: Location) {
        self.old_location = Some(old);
        self.new_location = Some(new);
        self.is_valid = true;
    }

    pub fn set_create(&mut self, target: Location, template: Option<Location>) {
        self.target = Some(target);
        self.template = template;
        self.is_valid = true;
    }

    /// Record the mode an item had before a recursive change.
    pub fn add_original_permission(&mut self, location: &Location, mode: u32) {
        self.original_permissions.insert(location.uri(), mode);
        self.is_valid = true;
    }

    pub fn set_permissions(&mut self, location: Location, original: u32, new: u32) {
        self.target = Some(location.clone());
        self.original_permissions.insert(location.uri(), original);
        self.new_permissions = new;
        self.is_valid = true;
    }

    /// Record an owner or group change.
    pub fn set_id_change(&mut self, location: Location, original: String, new: String) {
        self.target = Some(location);
        self.original_id = Some(original);
        self.new_id = Some(new);
        self.is_valid = true;
    }

    /// Sources as absolute locations, in insertion order.
    pub fn source_locations(&self) -> Vec<Location> {
        resolve_all(&self.sources, self.src_dir.as_ref())
    }

    /// Destinations as absolute locations, in insertion order.
    pub fn destination_locations(&self) -> Vec<Location> {
        resolve_all(&self.destinations, self.dest_dir.as_ref())
    }

    pub fn destinations_len(&self) -> usize {
        self.destinations.len()
    }

    /// Whether any destination is one of the given trashed URIs.
    pub fn destinations_overlap(&self, uris: &IndexMap<String, u64>) -> bool {
        self.destination_locations()
            .iter()
            .any(|location| uris.contains_key(&location.uri()))
    }

    fn first_name(&self) -> String {
        match self.destination_locations().first() {
            Some(location) => location.display_name(),
            None => self.target.as_ref().map(Location::display_name).unwrap_or_default(),
        }
    }

    fn first_trashed_name(&self) -> String {
        self.trashed
            .keys()
            .next()
            .and_then(|uri| Location::parse(uri).ok())
            .map(|location| location.display_name())
            .unwrap_or_default()
    }

    fn items(&self) -> String {
        format!("{} {}", self.count, if self.count == 1 { "item" } else { "items" })
    }

    /// Menu label for undoing this action.
    pub fn undo_label(&self) -> String {
        let items = self.items();
        match self.kind {
            UndoActionKind::Copy => format!("Undo copy of {items}"),
            UndoActionKind::Duplicate => format!("Undo duplicate of {items}"),
            UndoActionKind::Move => format!("Undo move of {items}"),
            UndoActionKind::Rename => format!("Undo rename of {items}"),
            UndoActionKind::CreateEmptyFile => "Undo creation of an empty file".to_string(),
            UndoActionKind::CreateFromTemplate => "Undo creation of a file from template".to_string(),
            UndoActionKind::CreateFolder => {
                let folders = if self.count == 1 { "folder" } else { "folders" };
                format!("Undo creation of {} {folders}", self.count)
            }
            UndoActionKind::MoveToTrash => format!("Undo move to trash of {items}"),
            UndoActionKind::RestoreFromTrash => format!("Undo restore from trash of {items}"),
            UndoActionKind::CreateLink => format!("Undo create link to {items}"),
            UndoActionKind::Delete => format!("Undo delete of {items}"),
            UndoActionKind::RecursiveSetPermissions => {
                format!("Undo recursive change permissions of {items}")
            }
            UndoActionKind::SetPermissions => format!("Undo change permissions of {items}"),
            UndoActionKind::ChangeGroup => format!("Undo change group of {items}"),
            UndoActionKind::ChangeOwner => format!("Undo change owner of {items}"),
        }
    }

    /// Menu label for redoing this action.
    pub fn redo_label(&self) -> String {
        let items = self.items();
        match self.kind {
            UndoActionKind::Copy => format!("Redo copy of {items}"),
            UndoActionKind::Duplicate => format!("Redo duplicate of {items}"),
            UndoActionKind::Move => format!("Redo move of {items}"),
            UndoActionKind::Rename => format!("Redo rename of {items}"),
            UndoActionKind::CreateEmptyFile => "Redo creation of an empty file".to_string(),
            UndoActionKind::CreateFromTemplate => "Redo creation of a file from template".to_string(),
            UndoActionKind::CreateFolder => {
                let folders = if self.count == 1 { "folder" } else { "folders" };
                format!("Redo creation of {} {folders}", self.count)
            }
            UndoActionKind::MoveToTrash => format!("Redo move to trash of {items}"),
            UndoActionKind::RestoreFromTrash => format!("Redo restore from trash of {items}"),
            UndoActionKind::CreateLink => format!("Redo create link to {items}"),
            UndoActionKind::Delete => format!("Redo delete of {items}"),
            UndoActionKind::RecursiveSetPermissions => {
                format!("Redo recursive change permissions of {items}")
            }
            UndoActionKind::SetPermissions => format!("Redo change permissions of {items}"),
            UndoActionKind::ChangeGroup => format!("Redo change group of {items}"),
            UndoActionKind::ChangeOwner => format!("Redo change owner of {items}"),
        }
    }

    /// Tooltip describing what undo will do.
    pub fn undo_description(&self) -> String {
        let many = self.count > 1;
        let name = self.first_name();
        let src = display_dir(self.src_dir.as_ref());
        match self.kind {
            UndoActionKind::Copy if many => format!("Delete {} copied items", self.count),
            UndoActionKind::Duplicate if many => format!("Delete {} duplicated items", self.count),
            UndoActionKind::Copy | UndoActionKind::Duplicate => format!("Delete '{name}'"),
            UndoActionKind::Move if many => format!("Move {} items back to '{src}'", self.count),
            UndoActionKind::Move => format!("Move '{name}' back to '{src}'"),
            UndoActionKind::Rename => format!(
                "Rename '{}' as '{}'",
                display_name(self.new_location.as_ref()),
                display_name(self.old_location.as_ref())
            ),
            UndoActionKind::CreateEmptyFile
            | UndoActionKind::CreateFromTemplate
            | UndoActionKind::CreateFolder => {
                format!("Delete '{}'", display_name(self.target.as_ref()))
            }
            UndoActionKind::MoveToTrash if self.trashed.len() > 1 => {
                format!("Restore {} items from trash", self.trashed.len())
            }
            UndoActionKind::MoveToTrash => {
                let parent = self
                    .trashed
                    .keys()
                    .next()
                    .and_then(|uri| Location::parse(uri).ok())
                    .and_then(|location| location.parent());
                format!(
                    "Restore '{}' to '{}'",
                    self.first_trashed_name(),
                    display_dir(parent.as_ref())
                )
            }
            UndoActionKind::RestoreFromTrash if many => {
                format!("Move {} items back to trash", self.count)
            }
            UndoActionKind::RestoreFromTrash => format!("Move '{name}' back to trash"),
            UndoActionKind::CreateLink if many => format!("Delete links to {} items", self.count),
            UndoActionKind::CreateLink => format!("Delete link to '{name}'"),
            UndoActionKind::Delete => "Deleted items cannot be restored".to_string(),
            UndoActionKind::RecursiveSetPermissions => format!(
                "Restore original permissions of items enclosed in '{}'",
                display_name(self.target.as_ref())
            ),
            UndoActionKind::SetPermissions => format!(
                "Restore original permissions of '{}'",
                display_name(self.target.as_ref())
            ),
            UndoActionKind::ChangeGroup => format!(
                "Restore group of '{}' to '{}'",
                display_name(self.target.as_ref()),
                self.original_id.as_deref().unwrap_or_default()
            ),
            UndoActionKind::ChangeOwner => format!(
                "Restore owner of '{}' to '{}'",
                display_name(self.target.as_ref()),
                self.original_id.as_deref().unwrap_or_default()
            ),
        }
    }

    /// Tooltip describing what redo will do.
    pub fn redo_description(&self) -> String {
        let many = self.count > 1;
        let name = self.first_name();
        let dst = display_dir(self.dest_dir.as_ref());
        match self.kind {
            UndoActionKind::Copy if many => format!("Copy {} items to '{dst}'", self.count),
            UndoActionKind::Copy => format!("Copy '{name}' to '{dst}'"),
            UndoActionKind::Duplicate if many => {
                format!("Duplicate of {} items in '{dst}'", self.count)
            }
            UndoActionKind::Duplicate => format!("Duplicate '{name}' in '{dst}'"),
            UndoActionKind::Move if many => format!("Move {} items to '{dst}'", self.count),
            UndoActionKind::Move => format!("Move '{name}' to '{dst}'"),
            UndoActionKind::Rename => format!(
                "Rename '{}' as '{}'",
                display_name(self.old_location.as_ref()),
                display_name(self.new_location.as_ref())
            ),
            UndoActionKind::CreateFromTemplate => format!(
                "Create new file '{}' from template",
                display_name(self.target.as_ref())
            ),
            UndoActionKind::CreateEmptyFile => {
                format!("Create an empty file '{}'", display_name(self.target.as_ref()))
            }
            UndoActionKind::CreateFolder => {
                format!("Create a new folder '{}'", display_name(self.target.as_ref()))
            }
            UndoActionKind::MoveToTrash if self.trashed.len() > 1 => {
                format!("Move {} items to trash", self.trashed.len())
            }
            UndoActionKind::MoveToTrash => format!("Move '{}' to trash", self.first_trashed_name()),
            UndoActionKind::RestoreFromTrash if many => {
                format!("Restore {} items from trash", self.count)
            }
            UndoActionKind::RestoreFromTrash => format!("Restore '{name}' from trash"),
            UndoActionKind::CreateLink if many => format!("Create links to {} items", self.count),
            UndoActionKind::CreateLink => format!("Create link to '{name}'"),
            UndoActionKind::Delete => "Delete items permanently".to_string(),
            UndoActionKind::RecursiveSetPermissions => format!(
                "Set permissions of items enclosed in '{}'",
                display_name(self.target.as_ref())
            ),
            UndoActionKind::SetPermissions => {
                format!("Set permissions of '{}'", display_name(self.target.as_ref()))
            }
            UndoActionKind::ChangeGroup => format!(
                "Set group of '{}' to '{}'",
                display_name(self.target.as_ref()),
                self.new_id.as_deref().unwrap_or_default()
            ),
            UndoActionKind::ChangeOwner => format!(
                "Set owner of '{}' to '{}'",
                display_name(self.target.as_ref()),
                self.new_id.as_deref().unwrap_or_default()
            ),
        }
    }
}

fn relative(location: &Location, base: Option<&Location>) -> PathBuf {
    base.and_then(|base| location.relative_to(base))
        .unwrap_or_else(|| location.path().to_path_buf())
}

fn resolve_all(paths: &[PathBuf], base: Option<&Location>) -> Vec<Location> {
    paths
        .iter()
        .map(|path| match base {
            Some(base) => base.resolve(path),
            None => Location::local(path),
        })
        .collect()
}

fn display_name(location: Option<&Location>) -> String {
    location.map(Location::display_name).unwrap_or_default()
}

fn display_dir(location: Option<&Location>) -> String {
    location.map(ToString::to_string).unwrap_or_default()
}

/// What undo/redo menu entries should show.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuState {
    pub can_undo: bool,
    pub can_redo: bool,
    pub undo_label: Option<String>,
    pub undo_description: Option<String>,
    pub redo_label: Option<String>,
    pub redo_description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn copy_action(names: &[&str]) -> UndoActionData {
        let mut action = UndoActionData::new(UndoActionKind::Copy, names.len() as u64)
            .with_dirs(Some(Location::local("/src")), Some(Location::local("/dst")));
        for name in names {
            action.add_origin_target_pair(
                &Location::local("/src").child(name),
                &Location::local("/dst").child(name),
            );
        }
        action
    }

    #[test]
    fn test_pairs_are_relative() {
        let action = copy_action(&["a.txt", "b.txt"]);
        assert!(action.is_valid);
        assert_eq!(action.sources, vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")]);
        assert_eq!(
            action.destination_locations(),
            vec![Location::local("/dst/a.txt"), Location::local("/dst/b.txt")]
        );
    }

    #[test]
    fn test_outside_dir_keeps_absolute_path() {
        let mut action = UndoActionData::new(UndoActionKind::Move, 1)
            .with_dirs(Some(Location::local("/src")), Some(Location::local("/dst")));
        action.add_origin_target_pair(&Location::local("/elsewhere/x"), &Location::local("/dst/x"));
        assert_eq!(action.source_locations(), vec![Location::local("/elsewhere/x")]);
    }

    #[test]
    fn test_labels() {
        let action = copy_action(&["a.txt", "b.txt"]);
        assert_eq!(action.undo_label(), "Undo copy of 2 items");
        assert_eq!(action.undo_description(), "Delete 2 copied items");
        assert_eq!(action.redo_description(), "Copy 2 items to '/dst'");

        let single = copy_action(&["a.txt"]);
        assert_eq!(single.undo_label(), "Undo copy of 1 item");
        assert_eq!(single.undo_description(), "Delete 'a.txt'");
        assert_eq!(single.redo_description(), "Copy 'a.txt' to '/dst'");
    }

    #[test]
    fn test_trash_descriptions() {
        let mut action = UndoActionData::new(UndoActionKind::MoveToTrash, 1);
        assert!(!action.is_valid);
        action.add_trashed(&Location::local("/dir/x"), 42);
        assert!(action.is_valid);
        assert_eq!(action.undo_description(), "Restore 'x' to '/dir'");
        assert_eq!(action.redo_description(), "Move 'x' to trash");
    }

    #[test]
    fn test_rename_descriptions() {
        let mut action = UndoActionData::new(UndoActionKind::Rename, 1);
        action.set_rename(Location::local("/d/old"), Location::local("/d/new"));
        assert_eq!(action.undo_description(), "Rename 'new' as 'old'");
        assert_eq!(action.redo_description(), "Rename 'old' as 'new'");
    }
}
