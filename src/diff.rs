//! Recursive tree difference computation
//!
//! This module compares two snapshots of the versioned tree and produces a
//! pruned difference tree: every node classifies one entry as created,
//! deleted, modified, or untouched, and untouched leaves are dropped so the
//! result only spans paths where something happened.
//!
//! Entries are matched across the two snapshots by their stable id, so a
//! renamed or moved entry pairs with itself rather than appearing as a
//! delete plus a create. Name comparison here is always case-sensitive,
//! even when the tree resolves paths case-insensitively: a change of letter
//! case is a real modification worth reporting.

use crate::content::Content;
use crate::store::ContentStore;
use crate::tree::{EntryRef, Tree};

/// Classification of one entry across two snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffKind {
    /// The entry exists in both snapshots and is identical
    NotModified,
    /// The entry only exists in the newer snapshot
    Created,
    /// The entry exists in both snapshots with a different name or content
    Modified,
    /// The entry only exists in the older snapshot
    Deleted,
}

/// One node of the pruned difference tree
#[derive(Debug, Clone)]
pub struct Difference {
    /// How the entry changed between the snapshots
    pub kind: DiffKind,
    /// Stable id of the entry (`None` for the synthetic root)
    pub id: Option<u64>,
    /// Entry name in the newer snapshot (older one for deletions)
    pub name: String,
    /// True if the entry is a file
    pub is_file: bool,
    /// The file's content in the older snapshot
    pub old_content: Option<Content>,
    /// The file's content in the newer snapshot
    pub new_content: Option<Content>,
    /// Differences below this entry, pruned of untouched subtrees
    pub children: Vec<Difference>,
}

impl Difference {
    /// True if nothing changed at or below this node
    pub fn is_empty(&self) -> bool {
        self.kind == DiffKind::NotModified && self.children.is_empty()
    }

    /// Total number of created, modified, and deleted entries below and
    /// including this node
    pub fn change_count(&self) -> usize {
        let own = usize::from(self.kind != DiffKind::NotModified);
        own + self.children.iter().map(|c| c.change_count()).sum::<usize>()
    }
}

/// Compare two tree snapshots
///
/// `older` and `newer` are whole-tree snapshots; the returned root node is
/// `NotModified` with no children when the trees are identical.
pub fn diff_trees(older: &Tree, newer: &Tree, store: &dyn ContentStore) -> Difference {
    diff_entries(older.root(), newer.root(), store)
}

/// Compare one entry (by stable id) across two snapshots
pub fn diff_entries(older: EntryRef<'_>, newer: EntryRef<'_>, store: &dyn ContentStore) -> Difference {
    let modified = older.name() != newer.name()
        || match (older.content(), newer.content()) {
            (Some(a), Some(b)) => !a.equals(b, store),
            (None, None) => false,
            _ => true,
        };

    let mut children = Vec::new();
    for old_child in older.children() {
        match find_by_id(newer, old_child) {
            Some(new_child) => {
                let child_diff = diff_entries(old_child, new_child, store);
                if !child_diff.is_empty() {
                    children.push(child_diff);
                }
            }
            None => children.push(deleted(old_child)),
        }
    }
    for new_child in newer.children() {
        if find_by_id(older, new_child).is_none() {
            children.push(created(new_child));
        }
    }

    Difference {
        kind: if modified {
            DiffKind::Modified
        } else {
            DiffKind::NotModified
        },
        id: newer.id(),
        name: newer.name().to_string(),
        is_file: newer.content().is_some(),
        old_content: older.content().cloned(),
        new_content: newer.content().cloned(),
        children,
    }
}

fn find_by_id<'a>(parent: EntryRef<'a>, wanted: EntryRef<'_>) -> Option<EntryRef<'a>> {
    let id = wanted.id()?;
    parent.children().find(|c| c.id() == Some(id))
}

fn created(entry: EntryRef<'_>) -> Difference {
    Difference {
        kind: DiffKind::Created,
        id: entry.id(),
        name: entry.name().to_string(),
        is_file: entry.content().is_some(),
        old_content: None,
        new_content: entry.content().cloned(),
        children: entry.children().map(created).collect(),
    }
}

fn deleted(entry: EntryRef<'_>) -> Difference {
    Difference {
        kind: DiffKind::Deleted,
        id: entry.id(),
        name: entry.name().to_string(),
        is_file: entry.content().is_some(),
        old_content: entry.content().cloned(),
        new_content: None,
        children: entry.children().map(deleted).collect(),
    }
}
