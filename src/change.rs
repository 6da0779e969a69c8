//! Invertible history changes
//!
//! Every mutation of the versioned tree is recorded as a [`Change`]. A
//! change knows how to apply itself to a tree and, once applied, how to
//! revert itself exactly. To make the revert exact, `apply_to` captures a
//! pre-image (the old content, the old name, the deleted subtree) along
//! with the stable id path of every affected entry.
//!
//! The pre-image and id paths are part of the serialized change: a change
//! reloaded from disk must still revert and still answer [`Change::affects_id`]
//! queries, so the applied state travels with it.

use crate::content::Content;
use crate::error::{EngineError, Result};
use crate::path::TreePath;
use crate::tree::{EntryRecord, IdPath, Tree};
use serde::{Deserialize, Serialize};

/// One recorded, invertible mutation of the tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Change {
    /// A file was created
    CreateFile(CreateFileChange),
    /// A directory was created
    CreateDirectory(CreateDirectoryChange),
    /// A file's content was replaced
    Content(ContentChange),
    /// An entry was renamed in place
    Rename(RenameChange),
    /// An entry was reparented
    Move(MoveChange),
    /// A subtree was deleted
    Delete(DeleteChange),
    /// A label was attached to this point in history
    PutLabel(PutLabelChange),
}

/// Creation of a file entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateFileChange {
    /// Id assigned to the new entry
    pub id: u64,
    /// Where the file is created
    pub path: TreePath,
    /// Initial content handle
    pub content: Content,
    /// Entry timestamp
    pub timestamp: i64,
    affected: Vec<IdPath>,
}

/// Creation of a directory entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateDirectoryChange {
    /// Id assigned to the new entry
    pub id: u64,
    /// Where the directory is created
    pub path: TreePath,
    /// Entry timestamp
    pub timestamp: i64,
    affected: Vec<IdPath>,
}

/// Replacement of a file's content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentChange {
    /// The file whose content changes
    pub path: TreePath,
    /// The new content handle
    pub content: Content,
    /// Entry timestamp after the change
    pub timestamp: i64,
    old_content: Option<Content>,
    old_timestamp: Option<i64>,
    affected: Vec<IdPath>,
}

/// In-place rename of an entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenameChange {
    /// The entry being renamed, addressed by its old path
    pub path: TreePath,
    /// The new name segment
    pub new_name: String,
    /// Entry timestamp after the change
    pub timestamp: i64,
    old_name: Option<String>,
    old_timestamp: Option<i64>,
    affected: Vec<IdPath>,
}

/// Reparenting of an entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveChange {
    /// The entry being moved, addressed by its old path
    pub path: TreePath,
    /// Path of the directory it moves under
    pub new_parent: TreePath,
    /// Entry timestamp after the change
    pub timestamp: i64,
    old_parent: Option<TreePath>,
    old_timestamp: Option<i64>,
    affected: Vec<IdPath>,
}

/// Deletion of an entire subtree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteChange {
    /// Root of the deleted subtree
    pub path: TreePath,
    saved: Option<EntryRecord>,
    affected: Vec<IdPath>,
}

/// A named marker in history
///
/// Applying a label leaves the tree untouched. A label may target a single
/// entry, in which case it only counts as affecting that exact entry, not
/// its ancestors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PutLabelChange {
    /// Label text
    pub name: String,
    /// Entry the label is scoped to, if any
    pub path: Option<TreePath>,
    affected: Vec<IdPath>,
}

impl Change {
    /// A file creation change
    pub fn create_file(id: u64, path: TreePath, content: Content, timestamp: i64) -> Self {
        Change::CreateFile(CreateFileChange {
            id,
            path,
            content,
            timestamp,
            affected: Vec::new(),
        })
    }

    /// A directory creation change
    pub fn create_directory(id: u64, path: TreePath, timestamp: i64) -> Self {
        Change::CreateDirectory(CreateDirectoryChange {
            id,
            path,
            timestamp,
            affected: Vec::new(),
        })
    }

    /// A content replacement change
    pub fn change_content(path: TreePath, content: Content, timestamp: i64) -> Self {
        Change::Content(ContentChange {
            path,
            content,
            timestamp,
            old_content: None,
            old_timestamp: None,
            affected: Vec::new(),
        })
    }

    /// A rename change
    pub fn rename(path: TreePath, new_name: impl Into<String>, timestamp: i64) -> Self {
        Change::Rename(RenameChange {
            path,
            new_name: new_name.into(),
            timestamp,
            old_name: None,
            old_timestamp: None,
            affected: Vec::new(),
        })
    }

    /// A move change
    pub fn move_entry(path: TreePath, new_parent: TreePath, timestamp: i64) -> Self {
        Change::Move(MoveChange {
            path,
            new_parent,
            timestamp,
            old_parent: None,
            old_timestamp: None,
            affected: Vec::new(),
        })
    }

    /// A delete change
    pub fn delete(path: TreePath) -> Self {
        Change::Delete(DeleteChange {
            path,
            saved: None,
            affected: Vec::new(),
        })
    }

    /// A label change, optionally scoped to one entry
    pub fn put_label(name: impl Into<String>, path: Option<TreePath>) -> Self {
        Change::PutLabel(PutLabelChange {
            name: name.into(),
            path,
            affected: Vec::new(),
        })
    }

    /// Apply this change to a tree, capturing the pre-image needed to
    /// revert it later
    pub fn apply_to(&mut self, tree: &mut Tree) -> Result<()> {
        match self {
            Change::CreateFile(c) => {
                tree.create_file(c.id, &c.path, c.content.clone(), c.timestamp)?;
                c.affected = vec![tree.entry(&c.path)?.id_path()];
            }
            Change::CreateDirectory(c) => {
                tree.create_directory(c.id, &c.path, c.timestamp)?;
                c.affected = vec![tree.entry(&c.path)?.id_path()];
            }
            Change::Content(c) => {
                let (old_content, old_timestamp) =
                    tree.change_file_content(&c.path, c.content.clone(), c.timestamp)?;
                c.old_content = Some(old_content);
                c.old_timestamp = Some(old_timestamp);
                c.affected = vec![tree.entry(&c.path)?.id_path()];
            }
            Change::Rename(c) => {
                let (old_name, old_timestamp) = tree.rename(&c.path, &c.new_name, c.timestamp)?;
                c.old_name = Some(old_name);
                c.old_timestamp = Some(old_timestamp);
                c.affected = vec![tree.entry(&c.path.renamed_with(&c.new_name))?.id_path()];
            }
            Change::Move(c) => {
                let before = tree.entry(&c.path)?.id_path();
                let (old_parent, old_timestamp) =
                    tree.move_entry(&c.path, &c.new_parent, c.timestamp)?;
                let after = tree
                    .entry(&c.new_parent.appended_with(c.path.name()))?
                    .id_path();
                c.old_parent = Some(old_parent);
                c.old_timestamp = Some(old_timestamp);
                c.affected = vec![before, after];
            }
            Change::Delete(c) => {
                let id_path = tree.entry(&c.path)?.id_path();
                c.saved = Some(tree.delete(&c.path)?);
                c.affected = vec![id_path];
            }
            Change::PutLabel(c) => {
                if let Some(path) = &c.path {
                    c.affected = vec![tree.entry(path)?.id_path()];
                }
            }
        }
        Ok(())
    }

    /// Undo this change on a tree that currently reflects it
    ///
    /// Fails with [`EngineError::NotApplied`] if the change never went
    /// through [`Change::apply_to`] (and was not reloaded from a state
    /// where it had).
    pub fn revert_on(&self, tree: &mut Tree) -> Result<()> {
        match self {
            Change::CreateFile(c) => {
                if c.affected.is_empty() {
                    return Err(EngineError::NotApplied);
                }
                tree.delete(&c.path)?;
            }
            Change::CreateDirectory(c) => {
                if c.affected.is_empty() {
                    return Err(EngineError::NotApplied);
                }
                tree.delete(&c.path)?;
            }
            Change::Content(c) => {
                let old_content = c.old_content.clone().ok_or(EngineError::NotApplied)?;
                let old_timestamp = c.old_timestamp.ok_or(EngineError::NotApplied)?;
                tree.change_file_content(&c.path, old_content, old_timestamp)?;
            }
            Change::Rename(c) => {
                let old_name = c.old_name.as_deref().ok_or(EngineError::NotApplied)?;
                let old_timestamp = c.old_timestamp.ok_or(EngineError::NotApplied)?;
                tree.rename(&c.path.renamed_with(&c.new_name), old_name, old_timestamp)?;
            }
            Change::Move(c) => {
                let old_parent = c.old_parent.as_ref().ok_or(EngineError::NotApplied)?;
                let old_timestamp = c.old_timestamp.ok_or(EngineError::NotApplied)?;
                let current = c.new_parent.appended_with(c.path.name());
                tree.move_entry(&current, old_parent, old_timestamp)?;
            }
            Change::Delete(c) => {
                let saved = c.saved.as_ref().ok_or(EngineError::NotApplied)?;
                let parent = c.path.parent().unwrap_or_else(|| TreePath::new(""));
                tree.attach(&parent, saved)?;
            }
            Change::PutLabel(_) => {}
        }
        Ok(())
    }

    /// Stable id paths of the entries this change touched
    pub fn affected_id_paths(&self) -> &[IdPath] {
        match self {
            Change::CreateFile(c) => &c.affected,
            Change::CreateDirectory(c) => &c.affected,
            Change::Content(c) => &c.affected,
            Change::Rename(c) => &c.affected,
            Change::Move(c) => &c.affected,
            Change::Delete(c) => &c.affected,
            Change::PutLabel(c) => &c.affected,
        }
    }

    /// Whether this change touched the entry with the given id, directly
    /// or through one of its descendants
    ///
    /// Labels are the exception: a label scoped to an entry affects that
    /// entry only, never its ancestors.
    pub fn affects_id(&self, id: u64) -> bool {
        match self {
            Change::PutLabel(_) => self
                .affected_id_paths()
                .iter()
                .any(|p| p.last() == Some(id)),
            _ => self.affected_id_paths().iter().any(|p| p.contains(id)),
        }
    }

    /// Contents that become unreachable once this change leaves history
    ///
    /// Purging a content change discards the overwritten content; purging
    /// a delete discards every file content of the saved subtree. All
    /// other changes keep their contents alive through the tree itself.
    pub fn contents_to_purge(&self) -> Vec<Content> {
        match self {
            Change::Content(c) => c.old_content.clone().into_iter().collect(),
            Change::Delete(c) => c
                .saved
                .as_ref()
                .map(|r| r.file_contents())
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// Contents this change put into the tree, stranded if the change is
    /// undone and removed from history
    pub fn contents_introduced(&self) -> Vec<Content> {
        match self {
            Change::CreateFile(c) => vec![c.content.clone()],
            Change::Content(c) => vec![c.content.clone()],
            _ => Vec::new(),
        }
    }

    /// Label text, if this is a label change
    pub fn label_name(&self) -> Option<&str> {
        match self {
            Change::PutLabel(c) => Some(&c.name),
            _ => None,
        }
    }
}
