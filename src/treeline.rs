//! The engine facade
//!
//! [`Treeline`] ties the pieces together: the current [`Tree`], the
//! committed [`ChangeList`], a content store, a clock, and a buffer of
//! pending changes. Embedders talk to this type only.
//!
//! ## Examples
//!
//! ```rust
//! use treeline::{Treeline, TreelineBuilder};
//!
//! # fn main() -> treeline::Result<()> {
//! let mut engine = TreelineBuilder::new().build_in_memory();
//!
//! engine.create_directory("src")?;
//! engine.create_file("src/main.rs", b"fn main() {}")?;
//! engine.put_label("initial")?;
//!
//! engine.change_content("src/main.rs", b"fn main() { run() }")?;
//!
//! // Every committed state of the file, newest first
//! let states = engine.entries_for(&"src/main.rs".into())?;
//! assert_eq!(states.len(), 2);
//!
//! engine.revert()?;
//! assert_eq!(engine.content_bytes(&"src/main.rs".into())?, b"fn main() {}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Commit protocol
//!
//! Mutators buffer a [`Change`] and, outside a
//! [`begin_change_set`](Treeline::begin_change_set) /
//! [`end_change_set`](Treeline::end_change_set) block, commit it
//! immediately as a one-change set. Inside a block all buffered changes
//! commit together when the outermost `end_change_set` runs. A commit is
//! atomic: it applies the set to a scratch copy of the tree and swaps it
//! in only when every change succeeded; a failed commit surfaces as
//! [`EngineError::CommitConflict`] and leaves both tree and history
//! untouched.

use crate::change::Change;
use crate::changeset::{ChangeList, ChangeSet};
use crate::clock::{Clock, SystemClock};
use crate::content::Content;
use crate::diff::{diff_trees, Difference};
use crate::error::{EngineError, Result};
use crate::events::PathEvent;
use crate::memento::Memento;
use crate::path::{PathComparisonMode, TreePath};
use crate::store::{CachingStore, ContentStore, FsStore, InMemoryStore};
use crate::tree::{EntryRecord, EntryRef, Tree};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default size gate above which file contents are not stored (1 MiB)
pub const DEFAULT_CONTENT_SIZE_LIMIT: u64 = 1024 * 1024;

/// Default interval between automatic purges (5 days, in milliseconds)
pub const DEFAULT_PURGE_INTERVAL_MS: i64 = 5 * 24 * 60 * 60 * 1000;

const STATE_FILE: &str = "state.bin";

/// A named point in history that a tree can be reconstructed for
///
/// The newest label of every listing is synthetic: it stands for the
/// current state, carries no name, and is stamped with the current time.
///
/// A label is only valid against the history it was listed from: once a
/// [`revert`](Treeline::revert) or [`purge_up_to`](Treeline::purge_up_to)
/// rewrites history, older labels are rejected with
/// [`EngineError::StaleLabel`] instead of answering from the wrong
/// snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    name: Option<String>,
    timestamp: i64,
    version: usize,
    epoch: u64,
}

impl Label {
    /// The label text, if this point was explicitly labeled
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// When this point in history was committed
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

/// Configuration and construction of a [`Treeline`] engine
///
/// ## Examples
///
/// ```rust
/// use treeline::{PathComparisonMode, TreelineBuilder};
///
/// let engine = TreelineBuilder::new()
///     .comparison_mode(PathComparisonMode::CaseInsensitive)
///     .content_size_limit(256 * 1024)
///     .build_in_memory();
/// # let _ = engine;
/// ```
pub struct TreelineBuilder {
    mode: PathComparisonMode,
    content_limit: u64,
    purge_interval: i64,
    clock: Option<Box<dyn Clock>>,
}

impl Default for TreelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TreelineBuilder {
    /// Builder with default settings
    pub fn new() -> Self {
        TreelineBuilder {
            mode: PathComparisonMode::default(),
            content_limit: DEFAULT_CONTENT_SIZE_LIMIT,
            purge_interval: DEFAULT_PURGE_INTERVAL_MS,
            clock: None,
        }
    }

    /// How entry names are compared during path resolution
    pub fn comparison_mode(mut self, mode: PathComparisonMode) -> Self {
        self.mode = mode;
        self
    }

    /// Size in bytes above which file contents are gated to
    /// [`Content::TooLong`] instead of being stored
    pub fn content_size_limit(mut self, bytes: u64) -> Self {
        self.content_limit = bytes;
        self
    }

    /// Milliseconds of history kept by the automatic purge on
    /// [`Treeline::save`]; `0` disables it
    pub fn purge_interval(mut self, millis: i64) -> Self {
        self.purge_interval = millis;
        self
    }

    /// Replace the wall clock, mainly for deterministic tests
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Box::new(clock));
        self
    }

    /// Build an engine backed by an in-memory store, with no persistence
    pub fn build_in_memory(self) -> Treeline {
        self.assemble(Box::new(InMemoryStore::new()), None, Memento::default())
            .expect("an empty state always loads")
    }

    /// Open (or create) a persistent engine rooted at `dir`
    ///
    /// Blobs live in a content store under `dir`; the engine state is read
    /// from `dir/state.bin` when present.
    pub fn open(self, dir: impl AsRef<Path>) -> Result<Treeline> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let store = CachingStore::new(FsStore::open(dir)?);
        let state_path = dir.join(STATE_FILE);
        let memento = if state_path.exists() {
            Memento::read_from(&state_path)?
        } else {
            Memento::default()
        };
        let engine = self.assemble(Box::new(store), Some(state_path), memento)?;
        info!(
            dir = %dir.display(),
            sets = engine.history.len(),
            "treeline engine opened"
        );
        Ok(engine)
    }

    fn assemble(
        self,
        store: Box<dyn ContentStore>,
        state_path: Option<PathBuf>,
        memento: Memento,
    ) -> Result<Treeline> {
        let tree = Tree::from_record(&memento.tree, self.mode)?;
        let clock = self.clock.unwrap_or_else(|| Box::new(SystemClock));
        Ok(Treeline {
            tree,
            history: memento.history,
            pending: Vec::new(),
            counter: memento.counter,
            store,
            clock,
            content_limit: self.content_limit,
            purge_interval: self.purge_interval,
            last_purge: 0,
            batch_depth: 0,
            epoch: 0,
            state_path,
        })
    }
}

/// A local, embeddable versioned file tree
pub struct Treeline {
    tree: Tree,
    history: ChangeList,
    pending: Vec<Change>,
    counter: u64,
    store: Box<dyn ContentStore>,
    clock: Box<dyn Clock>,
    content_limit: u64,
    purge_interval: i64,
    last_purge: i64,
    batch_depth: u32,
    // Bumped whenever history is truncated; stale labels carry old values
    epoch: u64,
    state_path: Option<PathBuf>,
}

impl Treeline {
    fn next_id(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }

    fn content_for(&mut self, bytes: &[u8]) -> Result<Content> {
        if bytes.len() as u64 > self.content_limit {
            debug!(
                len = bytes.len(),
                limit = self.content_limit,
                "content gated for size"
            );
            Ok(Content::TooLong)
        } else {
            let id = self.store.store(bytes)?;
            Ok(Content::Stored { id })
        }
    }

    fn record(&mut self, change: Change) -> Result<()> {
        self.pending.push(change);
        if self.batch_depth == 0 {
            self.commit()
        } else {
            Ok(())
        }
    }

    /// Record a file creation
    pub fn create_file(&mut self, path: impl Into<TreePath>, bytes: &[u8]) -> Result<()> {
        let content = self.content_for(bytes)?;
        let id = self.next_id();
        let timestamp = self.clock.now();
        self.record(Change::create_file(id, path.into(), content, timestamp))
    }

    /// Record a directory creation
    pub fn create_directory(&mut self, path: impl Into<TreePath>) -> Result<()> {
        let id = self.next_id();
        let timestamp = self.clock.now();
        self.record(Change::create_directory(id, path.into(), timestamp))
    }

    /// Record a content replacement
    pub fn change_content(&mut self, path: impl Into<TreePath>, bytes: &[u8]) -> Result<()> {
        let content = self.content_for(bytes)?;
        let timestamp = self.clock.now();
        self.record(Change::change_content(path.into(), content, timestamp))
    }

    /// Record a rename
    pub fn rename(&mut self, path: impl Into<TreePath>, new_name: &str) -> Result<()> {
        let timestamp = self.clock.now();
        self.record(Change::rename(path.into(), new_name, timestamp))
    }

    /// Record a move under a new parent directory
    pub fn move_entry(
        &mut self,
        path: impl Into<TreePath>,
        new_parent: impl Into<TreePath>,
    ) -> Result<()> {
        let timestamp = self.clock.now();
        self.record(Change::move_entry(path.into(), new_parent.into(), timestamp))
    }

    /// Record a subtree deletion
    pub fn delete(&mut self, path: impl Into<TreePath>) -> Result<()> {
        self.record(Change::delete(path.into()))
    }

    /// Open a batching block; changes buffer until the matching
    /// [`end_change_set`](Treeline::end_change_set)
    ///
    /// Blocks nest; only the outermost `end_change_set` commits.
    pub fn begin_change_set(&mut self) {
        self.batch_depth += 1;
    }

    /// Close a batching block, committing when it is the outermost one
    pub fn end_change_set(&mut self) -> Result<()> {
        if self.batch_depth == 0 {
            return Err(EngineError::internal(
                "end_change_set without a matching begin_change_set",
            ));
        }
        self.batch_depth -= 1;
        if self.batch_depth == 0 {
            self.commit()
        } else {
            Ok(())
        }
    }

    /// Commit all buffered changes as one atomic change set
    ///
    /// An empty buffer commits to nothing. On failure the buffer is
    /// discarded, the tree and history are untouched, and the error is a
    /// [`EngineError::CommitConflict`] wrapping the first failing change's
    /// cause.
    pub fn commit(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let changes = std::mem::take(&mut self.pending);
        let set = ChangeSet::new(self.clock.now(), changes);
        // Contents were stored when the changes were recorded; a rejected
        // set never joins history, so they must be released here or no
        // purge will ever reach them
        let introduced = set.contents_introduced();
        match self.history.apply_changeset(&self.tree, set) {
            Ok(tree) => {
                self.tree = tree;
                Ok(())
            }
            Err(cause) => {
                warn!(error = %cause, "change set rejected");
                self.release_contents(&introduced)?;
                Err(EngineError::commit_conflict(cause))
            }
        }
    }

    /// Undo the newest committed change set
    ///
    /// Contents the undone set had stored are released from the content
    /// store; nothing else references them once the set leaves history.
    pub fn revert(&mut self) -> Result<()> {
        match self.history.revert_last(&self.tree)? {
            Some((tree, set)) => {
                self.tree = tree;
                self.epoch += 1;
                self.release_contents(&set.contents_introduced())
            }
            None => Err(EngineError::EmptyHistory),
        }
    }

    /// Drop store references to contents that no longer back any tree or
    /// history state; ids already gone are tolerated
    fn release_contents(&mut self, contents: &[Content]) -> Result<()> {
        for content in contents {
            if let Content::Stored { id } = content {
                match self.store.remove(*id) {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(())
    }

    /// The current tree snapshot
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// The committed history
    pub fn history(&self) -> &ChangeList {
        &self.history
    }

    /// The content store backing this engine
    pub fn content_store(&self) -> &dyn ContentStore {
        &*self.store
    }

    /// Look up an entry in the current tree
    pub fn entry(&self, path: &TreePath) -> Result<EntryRef<'_>> {
        self.tree.entry(path)
    }

    /// Whether the current tree has an entry at `path`
    pub fn has_entry(&self, path: &TreePath) -> bool {
        self.tree.has_entry(path)
    }

    /// Current bytes of the file at `path`
    pub fn content_bytes(&self, path: &TreePath) -> Result<Vec<u8>> {
        let entry = self.tree.entry(path)?;
        let content = entry
            .content()
            .ok_or_else(|| EngineError::structural(format!("'{}' is not a file", path)))?;
        content.bytes(&*self.store)
    }

    /// Attach a label to the newest committed change set
    pub fn put_label(&mut self, name: impl Into<String>) -> Result<()> {
        let set = self.history.last_mut().ok_or(EngineError::EmptyHistory)?;
        set.label = Some(name.into());
        Ok(())
    }

    /// Commit a label scoped to a single entry
    ///
    /// Scoped labels only show up in [`labels_for`](Treeline::labels_for)
    /// listings of that exact entry, not of its ancestors.
    pub fn put_entry_label(
        &mut self,
        name: impl Into<String>,
        path: impl Into<TreePath>,
    ) -> Result<()> {
        if self.history.is_empty() {
            return Err(EngineError::EmptyHistory);
        }
        self.record(Change::put_label(name, Some(path.into())))
    }

    /// Resolve the stable id of the entry at `path`, searching older
    /// snapshots when the entry is gone from the current tree
    fn resolve_id(&self, path: &TreePath) -> Result<u64> {
        if let Some(entry) = self.tree.find_entry(path) {
            return entry
                .id()
                .ok_or_else(|| EngineError::structural("the root itself has no history"));
        }
        let mut cur = self.tree.clone();
        for set in self.history.change_sets().iter().rev() {
            set.revert_on(&mut cur)?;
            if let Some(entry) = cur.find_entry(path) {
                if let Some(id) = entry.id() {
                    return Ok(id);
                }
            }
        }
        Err(EngineError::EntryNotFound(path.to_string()))
    }

    /// Every committed state of the entry at `path`, newest first
    ///
    /// The current state comes first; older states appear once per change
    /// set that actually touched the entry. The path may name an entry
    /// that no longer exists, as long as it existed at some point.
    pub fn entries_for(&self, path: &TreePath) -> Result<Vec<EntryRecord>> {
        let id = self.resolve_id(path)?;
        let mut states = Vec::new();
        let mut cur = self.tree.clone();
        if let Ok(entry) = cur.entry_by_id(id) {
            states.push(entry.to_record());
        }
        for set in self.history.change_sets().iter().rev() {
            let touched = set.affects_id(id);
            set.revert_on(&mut cur)?;
            if !touched {
                continue;
            }
            if let Ok(entry) = cur.entry_by_id(id) {
                let record = entry.to_record();
                if states.last() != Some(&record) {
                    states.push(record);
                }
            }
        }
        Ok(states)
    }

    /// Labels relevant to the entry at `path`, newest first
    ///
    /// The first label is always the synthetic current one. The rest mark
    /// change sets that touched the entry.
    pub fn labels_for(&self, path: &TreePath) -> Result<Vec<Label>> {
        let id = self.resolve_id(path)?;
        let mut labels = vec![self.current_label()];
        for (i, set) in self.history.change_sets().iter().enumerate().rev() {
            if set.affects_id(id) {
                labels.push(Label {
                    name: set.label_name().map(String::from),
                    timestamp: set.timestamp,
                    version: i + 1,
                    epoch: self.epoch,
                });
            }
        }
        Ok(labels)
    }

    /// Every point in history, newest first, starting with the synthetic
    /// current label
    pub fn labels(&self) -> Vec<Label> {
        let mut labels = vec![self.current_label()];
        for (i, set) in self.history.change_sets().iter().enumerate().rev() {
            labels.push(Label {
                name: set.label_name().map(String::from),
                timestamp: set.timestamp,
                version: i + 1,
                epoch: self.epoch,
            });
        }
        labels
    }

    fn current_label(&self) -> Label {
        Label {
            name: None,
            timestamp: self.clock.now(),
            version: self.history.len(),
            epoch: self.epoch,
        }
    }

    /// Reconstruct the whole tree as it was at `label`
    ///
    /// Works by reverting committed sets, newest first, onto a copy of the
    /// current tree until the labeled point is reached. Labels listed
    /// before a revert or purge are rejected as
    /// [`EngineError::StaleLabel`].
    pub fn tree_at(&self, label: &Label) -> Result<Tree> {
        if label.epoch != self.epoch {
            return Err(EngineError::StaleLabel);
        }
        let sets = self.history.change_sets();
        if label.version > sets.len() {
            return Err(EngineError::internal(
                "label does not belong to this history",
            ));
        }
        let mut cur = self.tree.clone();
        for set in sets[label.version..].iter().rev() {
            set.revert_on(&mut cur)?;
        }
        Ok(cur)
    }

    /// The state of the entry at `path` as it was at `label`
    pub fn entry_at(&self, label: &Label, path: &TreePath) -> Result<EntryRecord> {
        let tree = self.tree_at(label)?;
        Ok(tree.entry(path)?.to_record())
    }

    /// Difference between the trees at two labels, oldest side first
    pub fn diff(&self, older: &Label, newer: &Label) -> Result<Difference> {
        let older_tree = self.tree_at(older)?;
        let newer_tree = self.tree_at(newer)?;
        Ok(diff_trees(&older_tree, &newer_tree, &*self.store))
    }

    /// Translate a filesystem-style event into recorded changes
    ///
    /// Events are tolerant of drift between the watcher and the tree: a
    /// creation of an existing file becomes a content change, a deletion
    /// of an unknown path is ignored, and missing ancestor directories are
    /// created on the fly.
    pub fn ingest(&mut self, event: PathEvent) -> Result<()> {
        match event {
            PathEvent::Created {
                path,
                bytes: Some(bytes),
            } => {
                if let Some(parent) = path.parent() {
                    self.ensure_directory(&parent)?;
                }
                if self.tree.has_entry(&path) {
                    self.change_content(path, &bytes)
                } else {
                    self.create_file(path, &bytes)
                }
            }
            PathEvent::Created { path, bytes: None } | PathEvent::DirectoryDirty { path } => {
                self.ensure_directory(&path)
            }
            PathEvent::ContentChanged { path, bytes } => {
                if self.tree.has_entry(&path) {
                    self.change_content(path, &bytes)
                } else {
                    if let Some(parent) = path.parent() {
                        self.ensure_directory(&parent)?;
                    }
                    self.create_file(path, &bytes)
                }
            }
            PathEvent::Deleted { path } => {
                if self.tree.has_entry(&path) {
                    self.delete(path)
                } else {
                    Ok(())
                }
            }
        }
    }

    fn ensure_directory(&mut self, path: &TreePath) -> Result<()> {
        if path.is_empty() || self.tree.has_entry(path) {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            self.ensure_directory(&parent)?;
        }
        self.create_directory(path.clone())
    }

    /// Drop every change set older than `cutoff` and release the contents
    /// their removal strands; returns the number of removed blobs
    pub fn purge_up_to(&mut self, cutoff: i64) -> Result<usize> {
        let before = self.history.len();
        let stranded = self.history.purge_up_to(cutoff);
        if self.history.len() != before {
            self.epoch += 1;
        }
        let mut removed = 0;
        for content in &stranded {
            if let Content::Stored { id } = content {
                match self.store.remove(*id) {
                    Ok(()) => removed += 1,
                    // Already gone; nothing to release
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(e),
                }
            }
        }
        if removed > 0 {
            info!(removed, cutoff, "released stranded contents");
        }
        Ok(removed)
    }

    /// Snapshot the engine state for persistence
    pub fn memento(&self) -> Memento {
        Memento {
            counter: self.counter,
            tree: self.tree.to_record(),
            history: self.history.clone(),
        }
    }

    /// Persist the engine: purge old history when the purge interval has
    /// elapsed, write the state file, and flush the content store
    pub fn save(&mut self) -> Result<()> {
        let now = self.clock.now();
        if self.purge_interval > 0 && now - self.last_purge >= self.purge_interval {
            self.purge_up_to(now - self.purge_interval)?;
            self.last_purge = now;
        }
        if let Some(path) = self.state_path.clone() {
            self.memento().write_to(&path)?;
        }
        self.store.save()
    }

    /// Save and release the engine's resources
    pub fn close(&mut self) -> Result<()> {
        self.save()?;
        self.store.close()
    }
}
