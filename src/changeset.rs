//! Atomic change sets and the linear history they form
//!
//! A [`ChangeSet`] groups the changes of one logical user action; it applies
//! in recorded order and reverts in reverse order. A [`ChangeList`] is the
//! append-only sequence of committed sets, oldest first.
//!
//! Atomicity comes from copy-on-write: [`ChangeList::apply_changeset`]
//! applies the set to a clone of the base tree and only appends the set
//! (and hands back the new tree) when every change succeeded. A failed set
//! leaves both the history and the caller's tree untouched.

use crate::change::Change;
use crate::content::Content;
use crate::error::Result;
use crate::tree::Tree;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// One atomic group of changes committed together
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Commit time in milliseconds
    pub timestamp: i64,
    /// Optional label naming this point in history
    pub label: Option<String>,
    changes: Vec<Change>,
}

impl ChangeSet {
    /// Create a change set committed at `timestamp`
    pub fn new(timestamp: i64, changes: Vec<Change>) -> Self {
        ChangeSet {
            timestamp,
            label: None,
            changes,
        }
    }

    /// The changes in application order
    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    /// True if the set records no changes
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Apply every change in recorded order
    ///
    /// On failure the tree is left partially modified; callers that need
    /// atomicity must apply to a scratch copy (see
    /// [`ChangeList::apply_changeset`]).
    pub fn apply_to(&mut self, tree: &mut Tree) -> Result<()> {
        for change in &mut self.changes {
            change.apply_to(tree)?;
        }
        Ok(())
    }

    /// Revert every change in reverse order
    pub fn revert_on(&self, tree: &mut Tree) -> Result<()> {
        for change in self.changes.iter().rev() {
            change.revert_on(tree)?;
        }
        Ok(())
    }

    /// Whether any change in the set touched the entry with this id
    pub fn affects_id(&self, id: u64) -> bool {
        self.changes.iter().any(|c| c.affects_id(id))
    }

    /// Contents that become unreachable when this set leaves history
    pub fn contents_to_purge(&self) -> Vec<Content> {
        self.changes
            .iter()
            .flat_map(|c| c.contents_to_purge())
            .collect()
    }

    /// Contents this set put into the tree, stranded if the set is undone
    pub fn contents_introduced(&self) -> Vec<Content> {
        self.changes
            .iter()
            .flat_map(|c| c.contents_introduced())
            .collect()
    }

    /// The first label carried by this set, from its label field or from a
    /// recorded label change
    pub fn label_name(&self) -> Option<&str> {
        self.label
            .as_deref()
            .or_else(|| self.changes.iter().find_map(|c| c.label_name()))
    }
}

/// The committed history: change sets ordered oldest to newest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeList {
    sets: Vec<ChangeSet>,
}

impl ChangeList {
    /// An empty history
    pub fn new() -> Self {
        ChangeList::default()
    }

    /// The committed sets, oldest first
    pub fn change_sets(&self) -> &[ChangeSet] {
        &self.sets
    }

    /// Number of committed sets
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// True if nothing has been committed
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Mutable access to the newest set (for labeling)
    pub fn last_mut(&mut self) -> Option<&mut ChangeSet> {
        self.sets.last_mut()
    }

    /// Atomically apply a set on top of `base` and append it
    ///
    /// The set is applied to a clone of `base`. Only if every change
    /// succeeds is the set appended and the new tree returned; on failure
    /// the history is unchanged and the error carries the first failing
    /// change's cause.
    pub fn apply_changeset(&mut self, base: &Tree, mut set: ChangeSet) -> Result<Tree> {
        let mut tree = base.clone();
        set.apply_to(&mut tree)?;
        trace!(
            changes = set.changes.len(),
            timestamp = set.timestamp,
            "change set applied"
        );
        self.sets.push(set);
        Ok(tree)
    }

    /// Atomically undo the newest set, returning the resulting tree and
    /// the removed set
    ///
    /// The set is only removed from history if the revert fully succeeds.
    pub fn revert_last(&mut self, base: &Tree) -> Result<Option<(Tree, ChangeSet)>> {
        let Some(set) = self.sets.last() else {
            return Ok(None);
        };
        let mut tree = base.clone();
        set.revert_on(&mut tree)?;
        let set = self.sets.pop().expect("checked above");
        Ok(Some((tree, set)))
    }

    /// Drop every set older than `cutoff`, returning the contents their
    /// removal strands
    ///
    /// Sets are walked oldest to newest; the first set with
    /// `timestamp >= cutoff` and everything after it survive.
    pub fn purge_up_to(&mut self, cutoff: i64) -> Vec<Content> {
        let keep_from = self
            .sets
            .iter()
            .position(|s| s.timestamp >= cutoff)
            .unwrap_or(self.sets.len());
        let purged: Vec<ChangeSet> = self.sets.drain(..keep_from).collect();
        if !purged.is_empty() {
            debug!(sets = purged.len(), cutoff, "purged change sets");
        }
        purged.iter().flat_map(|s| s.contents_to_purge()).collect()
    }
}
