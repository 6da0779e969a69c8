//! The versioned entry tree
//!
//! A [`Tree`] is one snapshot of the logical file hierarchy: a synthetic
//! root holding any number of independent top-level subtrees (drive-letter
//! style roots), directories below them, and files carrying
//! [`Content`] handles.
//!
//! Nodes live in a slot arena. Each node stores its parent slot and owns
//! its child slots, which gives cheap upward walks (paths, cycle checks)
//! without reference cycles. Entry ids are assigned by the engine's
//! persisted counter and are stable across renames, moves, and
//! delete/undelete — they are how two snapshots of history agree on "the
//! same entry".
//!
//! Mutating history never edits a shared snapshot in place: the facade
//! clones the current tree (a plain `Clone` of the arena), applies a change
//! set to the copy, and swaps it in, so previously handed-out snapshots
//! stay valid.

use crate::content::Content;
use crate::error::{EngineError, Result};
use crate::path::{PathComparisonMode, TreePath};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub(crate) type NodeIndex = usize;

/// Classification of a tree node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// The synthetic tree root
    Root,
    /// A directory (or a top-level root directory)
    Directory,
    /// A file carrying content
    File,
}

#[derive(Debug, Clone)]
enum NodePayload {
    Root,
    Directory,
    File { content: Content },
}

#[derive(Debug, Clone)]
struct Node {
    id: Option<u64>,
    name: String,
    timestamp: i64,
    payload: NodePayload,
    parent: Option<NodeIndex>,
    children: Vec<NodeIndex>,
}

impl Node {
    fn kind(&self) -> EntryKind {
        match self.payload {
            NodePayload::Root => EntryKind::Root,
            NodePayload::Directory => EntryKind::Directory,
            NodePayload::File { .. } => EntryKind::File,
        }
    }

    fn is_container(&self) -> bool {
        !matches!(self.payload, NodePayload::File { .. })
    }
}

/// Sequence of stable entry ids from a top-level root down to a node
///
/// Unlike a [`TreePath`], an id path survives renames and moves, so it can
/// identify "the same entry" across two snapshots or across apply/revert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdPath(Vec<u64>);

impl IdPath {
    /// Build an id path from root-most to leaf-most id
    pub fn new(ids: Vec<u64>) -> Self {
        IdPath(ids)
    }

    /// The ids, root-most first
    pub fn ids(&self) -> &[u64] {
        &self.0
    }

    /// Whether the id appears anywhere on this path
    pub fn contains(&self, id: u64) -> bool {
        self.0.contains(&id)
    }

    /// The leaf-most id (the entry itself)
    pub fn last(&self) -> Option<u64> {
        self.0.last().copied()
    }
}

/// Detached, parent-less deep copy of an entry subtree
///
/// Doubles as the serialized form of tree structure: records carry no
/// parent links, so a deserialized record is always a detached subtree.
/// The same shape is the saved pre-image of a delete change, from which
/// [`Tree::attach`] restores every descendant with its original id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntryRecord {
    /// The synthetic root and its top-level subtrees
    Root {
        /// Top-level root directories
        children: Vec<EntryRecord>,
    },
    /// A directory and everything below it
    Directory {
        /// Stable entry id
        id: u64,
        /// Entry name
        name: String,
        /// Entry timestamp in milliseconds
        timestamp: i64,
        /// Child entries
        children: Vec<EntryRecord>,
    },
    /// A single file
    File {
        /// Stable entry id
        id: u64,
        /// Entry name
        name: String,
        /// Entry timestamp in milliseconds
        timestamp: i64,
        /// Content handle
        content: Content,
    },
}

impl EntryRecord {
    /// The entry id (`None` only for the synthetic root)
    pub fn id(&self) -> Option<u64> {
        match self {
            EntryRecord::Root { .. } => None,
            EntryRecord::Directory { id, .. } | EntryRecord::File { id, .. } => Some(*id),
        }
    }

    /// The entry name (`""` for the synthetic root)
    pub fn name(&self) -> &str {
        match self {
            EntryRecord::Root { .. } => "",
            EntryRecord::Directory { name, .. } | EntryRecord::File { name, .. } => name,
        }
    }

    /// The entry timestamp (0 for the synthetic root)
    pub fn timestamp(&self) -> i64 {
        match self {
            EntryRecord::Root { .. } => 0,
            EntryRecord::Directory { timestamp, .. } | EntryRecord::File { timestamp, .. } => {
                *timestamp
            }
        }
    }

    /// Child records (empty for files)
    pub fn children(&self) -> &[EntryRecord] {
        match self {
            EntryRecord::Root { children } | EntryRecord::Directory { children, .. } => children,
            EntryRecord::File { .. } => &[],
        }
    }

    /// Content handle, for file records
    pub fn content(&self) -> Option<&Content> {
        match self {
            EntryRecord::File { content, .. } => Some(content),
            _ => None,
        }
    }

    /// True for directory and root records
    pub fn is_container(&self) -> bool {
        !matches!(self, EntryRecord::File { .. })
    }

    /// Collect every file content in this subtree, depth-first
    pub fn file_contents(&self) -> Vec<Content> {
        let mut out = Vec::new();
        self.collect_contents(&mut out);
        out
    }

    fn collect_contents(&self, out: &mut Vec<Content>) {
        match self {
            EntryRecord::File { content, .. } => out.push(content.clone()),
            EntryRecord::Root { children } | EntryRecord::Directory { children, .. } => {
                for child in children {
                    child.collect_contents(out);
                }
            }
        }
    }
}

/// Borrowed view of one entry inside a [`Tree`]
#[derive(Clone, Copy)]
pub struct EntryRef<'a> {
    tree: &'a Tree,
    idx: NodeIndex,
}

impl<'a> EntryRef<'a> {
    fn node(&self) -> &'a Node {
        self.tree.node(self.idx)
    }

    /// Stable entry id (`None` only for the synthetic root)
    pub fn id(&self) -> Option<u64> {
        self.node().id
    }

    /// Entry name
    pub fn name(&self) -> &'a str {
        &self.node().name
    }

    /// Entry timestamp in milliseconds
    pub fn timestamp(&self) -> i64 {
        self.node().timestamp
    }

    /// Entry classification
    pub fn kind(&self) -> EntryKind {
        self.node().kind()
    }

    /// True for directories and the root
    pub fn is_container(&self) -> bool {
        self.node().is_container()
    }

    /// Content handle, for files
    pub fn content(&self) -> Option<&'a Content> {
        match &self.node().payload {
            NodePayload::File { content } => Some(content),
            _ => None,
        }
    }

    /// Parent entry, if any
    pub fn parent(&self) -> Option<EntryRef<'a>> {
        self.node().parent.map(|idx| EntryRef {
            tree: self.tree,
            idx,
        })
    }

    /// Child entries in insertion order
    pub fn children(&self) -> impl Iterator<Item = EntryRef<'a>> + '_ {
        let tree = self.tree;
        self.node()
            .children
            .iter()
            .map(move |&idx| EntryRef { tree, idx })
    }

    /// Logical path of this entry from the root
    pub fn path(&self) -> TreePath {
        let mut names = Vec::new();
        let mut cur = self.node();
        while cur.parent.is_some() {
            names.push(cur.name.clone());
            cur = self.tree.node(cur.parent.expect("checked above"));
        }
        names.reverse();
        let mut path = TreePath::new("");
        for name in names {
            path = path.appended_with(&name);
        }
        path
    }

    /// Stable id path of this entry from the root
    pub fn id_path(&self) -> IdPath {
        let mut ids = Vec::new();
        let mut cur = Some(self.idx);
        while let Some(idx) = cur {
            let node = self.tree.node(idx);
            if let Some(id) = node.id {
                ids.push(id);
            }
            cur = node.parent;
        }
        ids.reverse();
        IdPath(ids)
    }

    /// Detached deep copy of this entry's subtree (no parent link)
    pub fn to_record(&self) -> EntryRecord {
        self.tree.record_of(self.idx)
    }
}

impl std::fmt::Debug for EntryRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryRef")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("kind", &self.kind())
            .finish()
    }
}

/// One snapshot of the versioned file hierarchy
#[derive(Debug, Clone)]
pub struct Tree {
    slots: Vec<Option<Node>>,
    free: Vec<NodeIndex>,
    root: NodeIndex,
    by_id: HashMap<u64, NodeIndex>,
    mode: PathComparisonMode,
}

impl Tree {
    /// Create an empty tree using the given name comparison mode
    pub fn new(mode: PathComparisonMode) -> Self {
        let root = Node {
            id: None,
            name: String::new(),
            timestamp: 0,
            payload: NodePayload::Root,
            parent: None,
            children: Vec::new(),
        };
        Tree {
            slots: vec![Some(root)],
            free: Vec::new(),
            root: 0,
            by_id: HashMap::new(),
            mode,
        }
    }

    /// The name comparison mode this tree resolves paths under
    pub fn mode(&self) -> PathComparisonMode {
        self.mode
    }

    fn node(&self, idx: NodeIndex) -> &Node {
        self.slots[idx].as_ref().expect("live arena slot")
    }

    fn node_mut(&mut self, idx: NodeIndex) -> &mut Node {
        self.slots[idx].as_mut().expect("live arena slot")
    }

    fn alloc(&mut self, node: Node) -> NodeIndex {
        if let Some(idx) = self.free.pop() {
            self.slots[idx] = Some(node);
            idx
        } else {
            self.slots.push(Some(node));
            self.slots.len() - 1
        }
    }

    fn child_by_name(&self, parent: NodeIndex, name: &str) -> Option<NodeIndex> {
        self.node(parent)
            .children
            .iter()
            .copied()
            .find(|&idx| self.mode.names_equal(&self.node(idx).name, name))
    }

    fn resolve(&self, path: &TreePath) -> Option<NodeIndex> {
        let mut cur = self.root;
        for part in path.parts() {
            cur = self.child_by_name(cur, part)?;
        }
        Some(cur)
    }

    /// The synthetic root entry
    pub fn root(&self) -> EntryRef<'_> {
        EntryRef {
            tree: self,
            idx: self.root,
        }
    }

    /// Look up an entry by path, if present
    pub fn find_entry(&self, path: &TreePath) -> Option<EntryRef<'_>> {
        self.resolve(path).map(|idx| EntryRef { tree: self, idx })
    }

    /// Look up an entry by path
    pub fn entry(&self, path: &TreePath) -> Result<EntryRef<'_>> {
        self.find_entry(path)
            .ok_or_else(|| EngineError::EntryNotFound(path.to_string()))
    }

    /// Look up an entry by stable id
    pub fn entry_by_id(&self, id: u64) -> Result<EntryRef<'_>> {
        self.by_id
            .get(&id)
            .map(|&idx| EntryRef { tree: self, idx })
            .ok_or(EngineError::EntryIdNotFound(id))
    }

    /// Whether an entry exists at the path
    pub fn has_entry(&self, path: &TreePath) -> bool {
        self.resolve(path).is_some()
    }

    /// Resolve and validate the container a new entry at `path` goes into
    fn creation_parent(&self, path: &TreePath) -> Result<NodeIndex> {
        if path.is_empty() {
            return Err(EngineError::structural("cannot create an entry at the root path"));
        }
        let parent_idx = match path.parent() {
            Some(parent) => self.resolve(&parent).ok_or_else(|| {
                EngineError::structural(format!(
                    "cannot create '{}': parent '{}' does not exist",
                    path, parent
                ))
            })?,
            None => self.root,
        };
        if !self.node(parent_idx).is_container() {
            return Err(EngineError::structural(format!(
                "cannot create '{}': parent is a file",
                path
            )));
        }
        if self.child_by_name(parent_idx, path.name()).is_some() {
            return Err(EngineError::structural(format!(
                "entry '{}' already exists",
                path
            )));
        }
        Ok(parent_idx)
    }

    fn insert(&mut self, parent_idx: NodeIndex, mut node: Node) -> Result<NodeIndex> {
        if let Some(id) = node.id {
            if self.by_id.contains_key(&id) {
                return Err(EngineError::internal(format!(
                    "entry id {} is already present in this tree",
                    id
                )));
            }
        }
        node.parent = Some(parent_idx);
        let id = node.id;
        let idx = self.alloc(node);
        self.node_mut(parent_idx).children.push(idx);
        if let Some(id) = id {
            self.by_id.insert(id, idx);
        }
        Ok(idx)
    }

    /// Create a file at `path`
    pub fn create_file(
        &mut self,
        id: u64,
        path: &TreePath,
        content: Content,
        timestamp: i64,
    ) -> Result<()> {
        let parent_idx = self.creation_parent(path)?;
        self.insert(
            parent_idx,
            Node {
                id: Some(id),
                name: path.name().to_string(),
                timestamp,
                payload: NodePayload::File { content },
                parent: None,
                children: Vec::new(),
            },
        )?;
        Ok(())
    }

    /// Create a directory at `path`
    ///
    /// A single-segment path creates a new top-level root.
    pub fn create_directory(&mut self, id: u64, path: &TreePath, timestamp: i64) -> Result<()> {
        let parent_idx = self.creation_parent(path)?;
        self.insert(
            parent_idx,
            Node {
                id: Some(id),
                name: path.name().to_string(),
                timestamp,
                payload: NodePayload::Directory,
                parent: None,
                children: Vec::new(),
            },
        )?;
        Ok(())
    }

    fn mutation_target(&self, path: &TreePath) -> Result<NodeIndex> {
        let idx = self
            .resolve(path)
            .ok_or_else(|| EngineError::structural(format!("entry '{}' does not exist", path)))?;
        if self.node(idx).id.is_none() {
            return Err(EngineError::structural(
                "the synthetic root cannot be mutated",
            ));
        }
        Ok(idx)
    }

    /// Replace a file's content, returning the old content and timestamp
    pub fn change_file_content(
        &mut self,
        path: &TreePath,
        content: Content,
        timestamp: i64,
    ) -> Result<(Content, i64)> {
        let idx = self.mutation_target(path)?;
        let node = self.node_mut(idx);
        match &mut node.payload {
            NodePayload::File { content: current } => {
                let old_content = std::mem::replace(current, content);
                let old_timestamp = node.timestamp;
                node.timestamp = timestamp;
                Ok((old_content, old_timestamp))
            }
            _ => Err(EngineError::structural(format!(
                "'{}' is not a file",
                path
            ))),
        }
    }

    /// Rename an entry, returning its old name and timestamp
    ///
    /// Renaming to the entry's current name is a no-op success.
    pub fn rename(
        &mut self,
        path: &TreePath,
        new_name: &str,
        timestamp: i64,
    ) -> Result<(String, i64)> {
        let idx = self.mutation_target(path)?;
        let old_name = self.node(idx).name.clone();
        let old_timestamp = self.node(idx).timestamp;
        if old_name == new_name {
            return Ok((old_name, old_timestamp));
        }
        if let Some(parent_idx) = self.node(idx).parent {
            let clash = self
                .node(parent_idx)
                .children
                .iter()
                .any(|&c| c != idx && self.mode.names_equal(&self.node(c).name, new_name));
            if clash {
                return Err(EngineError::structural(format!(
                    "cannot rename '{}' to '{}': a sibling with that name exists",
                    path, new_name
                )));
            }
        }
        let node = self.node_mut(idx);
        node.name = new_name.to_string();
        node.timestamp = timestamp;
        Ok((old_name, old_timestamp))
    }

    /// Move an entry under a new parent, returning the old parent path and
    /// the entry's old timestamp
    ///
    /// Moving to the current parent is a no-op success. Moving a directory
    /// into its own descendant is a structural conflict.
    pub fn move_entry(
        &mut self,
        path: &TreePath,
        new_parent: &TreePath,
        timestamp: i64,
    ) -> Result<(TreePath, i64)> {
        let idx = self.mutation_target(path)?;
        let old_parent_path = path.parent().unwrap_or_else(|| TreePath::new(""));
        let old_timestamp = self.node(idx).timestamp;

        let target_idx = self.resolve(new_parent).ok_or_else(|| {
            EngineError::structural(format!(
                "cannot move '{}': target '{}' does not exist",
                path, new_parent
            ))
        })?;
        if !self.node(target_idx).is_container() {
            return Err(EngineError::structural(format!(
                "cannot move '{}' into file '{}'",
                path, new_parent
            )));
        }

        let current_parent = self.node(idx).parent.expect("non-root entry has a parent");
        if target_idx == current_parent {
            return Ok((old_parent_path, old_timestamp));
        }

        // Walking up from the target must not pass through the moved node
        let mut cur = Some(target_idx);
        while let Some(walk) = cur {
            if walk == idx {
                return Err(EngineError::structural(format!(
                    "cannot move '{}' into its own subtree '{}'",
                    path, new_parent
                )));
            }
            cur = self.node(walk).parent;
        }

        let name = self.node(idx).name.clone();
        if self.child_by_name(target_idx, &name).is_some() {
            return Err(EngineError::structural(format!(
                "cannot move '{}': '{}' already has an entry named '{}'",
                path, new_parent, name
            )));
        }

        self.node_mut(current_parent).children.retain(|&c| c != idx);
        self.node_mut(target_idx).children.push(idx);
        let node = self.node_mut(idx);
        node.parent = Some(target_idx);
        node.timestamp = timestamp;
        Ok((old_parent_path, old_timestamp))
    }

    /// Detach and return an entire subtree
    pub fn delete(&mut self, path: &TreePath) -> Result<EntryRecord> {
        let idx = self.mutation_target(path)?;
        let record = self.record_of(idx);
        let parent = self.node(idx).parent.expect("non-root entry has a parent");
        self.node_mut(parent).children.retain(|&c| c != idx);
        self.release(idx);
        Ok(record)
    }

    fn release(&mut self, idx: NodeIndex) {
        let node = self.slots[idx].take().expect("live arena slot");
        if let Some(id) = node.id {
            self.by_id.remove(&id);
        }
        for child in node.children {
            self.release(child);
        }
        self.free.push(idx);
    }

    /// Re-attach a detached subtree under `parent_path`, preserving every
    /// original id, name, content, and timestamp
    pub fn attach(&mut self, parent_path: &TreePath, record: &EntryRecord) -> Result<()> {
        let parent_idx = self.resolve(parent_path).ok_or_else(|| {
            EngineError::structural(format!(
                "cannot restore '{}': parent '{}' does not exist",
                record.name(),
                parent_path
            ))
        })?;
        if !self.node(parent_idx).is_container() {
            return Err(EngineError::structural(format!(
                "cannot restore '{}' under a file",
                record.name()
            )));
        }
        if self.child_by_name(parent_idx, record.name()).is_some() {
            return Err(EngineError::structural(format!(
                "cannot restore '{}': the name is taken",
                parent_path.appended_with(record.name())
            )));
        }
        self.attach_record(parent_idx, record)
    }

    fn attach_record(&mut self, parent_idx: NodeIndex, record: &EntryRecord) -> Result<()> {
        let payload = match record {
            EntryRecord::Root { .. } => {
                return Err(EngineError::internal("cannot attach a root record"))
            }
            EntryRecord::Directory { .. } => NodePayload::Directory,
            EntryRecord::File { content, .. } => NodePayload::File {
                content: content.clone(),
            },
        };
        let idx = self.insert(
            parent_idx,
            Node {
                id: record.id(),
                name: record.name().to_string(),
                timestamp: record.timestamp(),
                payload,
                parent: None,
                children: Vec::new(),
            },
        )?;
        for child in record.children() {
            self.attach_record(idx, child)?;
        }
        Ok(())
    }

    fn record_of(&self, idx: NodeIndex) -> EntryRecord {
        let node = self.node(idx);
        match &node.payload {
            NodePayload::Root => EntryRecord::Root {
                children: node.children.iter().map(|&c| self.record_of(c)).collect(),
            },
            NodePayload::Directory => EntryRecord::Directory {
                id: node.id.expect("directory has an id"),
                name: node.name.clone(),
                timestamp: node.timestamp,
                children: node.children.iter().map(|&c| self.record_of(c)).collect(),
            },
            NodePayload::File { content } => EntryRecord::File {
                id: node.id.expect("file has an id"),
                name: node.name.clone(),
                timestamp: node.timestamp,
                content: content.clone(),
            },
        }
    }

    /// Detached record of the whole tree (used by state persistence)
    pub fn to_record(&self) -> EntryRecord {
        self.record_of(self.root)
    }

    /// Rebuild a tree from a root record
    pub fn from_record(record: &EntryRecord, mode: PathComparisonMode) -> Result<Self> {
        let mut tree = Tree::new(mode);
        match record {
            EntryRecord::Root { children } => {
                for child in children {
                    tree.attach_record(tree.root, child)?;
                }
                Ok(tree)
            }
            _ => Err(EngineError::internal(
                "tree state must start with a root record",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> Tree {
        Tree::new(PathComparisonMode::CaseSensitive)
    }

    fn path(s: &str) -> TreePath {
        TreePath::new(s)
    }

    #[test]
    fn test_create_and_lookup() {
        let mut t = tree();
        t.create_directory(1, &path("root"), 10).unwrap();
        t.create_directory(2, &path("root/dir"), 11).unwrap();
        t.create_file(3, &path("root/dir/file"), Content::Bytes(b"x".to_vec()), 12)
            .unwrap();

        let file = t.entry(&path("root/dir/file")).unwrap();
        assert_eq!(file.id(), Some(3));
        assert_eq!(file.name(), "file");
        assert_eq!(file.timestamp(), 12);
        assert_eq!(file.path(), path("root/dir/file"));
        assert_eq!(file.id_path(), IdPath::new(vec![1, 2, 3]));
        assert_eq!(t.entry_by_id(2).unwrap().path(), path("root/dir"));
    }

    #[test]
    fn test_sibling_prefix_names_are_distinct() {
        let mut t = tree();
        t.create_directory(1, &path("dir1"), 0).unwrap();
        t.create_directory(2, &path("dir1x"), 0).unwrap();
        t.create_file(3, &path("dir1x/file"), Content::Bytes(vec![]), 0)
            .unwrap();

        assert!(t.has_entry(&path("dir1x/file")));
        assert!(!t.has_entry(&path("dir1/file")));
        assert_eq!(t.entry(&path("dir1")).unwrap().id(), Some(1));
    }

    #[test]
    fn test_multiple_roots() {
        let mut t = tree();
        t.create_directory(1, &path("c:"), 0).unwrap();
        t.create_directory(2, &path("d:"), 0).unwrap();
        t.create_file(3, &path("c:/file"), Content::Bytes(vec![]), 0)
            .unwrap();

        assert!(t.has_entry(&path("c:/file")));
        assert!(!t.has_entry(&path("d:/file")));
        assert_eq!(t.root().children().count(), 2);
    }

    #[test]
    fn test_create_preconditions() {
        let mut t = tree();
        t.create_directory(1, &path("root"), 0).unwrap();
        t.create_file(2, &path("root/file"), Content::Bytes(vec![]), 0)
            .unwrap();

        // Duplicate name
        let err = t
            .create_file(3, &path("root/file"), Content::Bytes(vec![]), 0)
            .unwrap_err();
        assert!(err.is_structural_conflict());

        // Missing parent / missing root
        let err = t
            .create_file(4, &path("nowhere/file"), Content::Bytes(vec![]), 0)
            .unwrap_err();
        assert!(err.is_structural_conflict());

        // Children under a file
        let err = t
            .create_file(5, &path("root/file/child"), Content::Bytes(vec![]), 0)
            .unwrap_err();
        assert!(err.is_structural_conflict());
    }

    #[test]
    fn test_change_content_requires_a_file() {
        let mut t = tree();
        t.create_directory(1, &path("dir"), 0).unwrap();
        let err = t
            .change_file_content(&path("dir"), Content::Bytes(vec![]), 1)
            .unwrap_err();
        assert!(err.is_structural_conflict());

        let err = t
            .change_file_content(&path("missing"), Content::Bytes(vec![]), 1)
            .unwrap_err();
        assert!(err.is_structural_conflict());
    }

    #[test]
    fn test_rename() {
        let mut t = tree();
        t.create_directory(1, &path("root"), 0).unwrap();
        t.create_file(2, &path("root/a"), Content::Bytes(vec![]), 5).unwrap();
        t.create_file(3, &path("root/b"), Content::Bytes(vec![]), 5).unwrap();

        let (old_name, old_ts) = t.rename(&path("root/a"), "c", 9).unwrap();
        assert_eq!(old_name, "a");
        assert_eq!(old_ts, 5);
        assert!(t.has_entry(&path("root/c")));
        assert!(!t.has_entry(&path("root/a")));
        assert_eq!(t.entry(&path("root/c")).unwrap().id(), Some(2));
        assert_eq!(t.entry(&path("root/c")).unwrap().timestamp(), 9);

        // Collision with sibling
        assert!(t.rename(&path("root/c"), "b", 10).unwrap_err().is_structural_conflict());

        // Renaming to the same name is a no-op success
        let (_, ts) = t.rename(&path("root/b"), "b", 11).unwrap();
        assert_eq!(ts, 5);
        assert_eq!(t.entry(&path("root/b")).unwrap().timestamp(), 5);
    }

    #[test]
    fn test_move() {
        let mut t = tree();
        t.create_directory(1, &path("root"), 0).unwrap();
        t.create_directory(2, &path("root/a"), 0).unwrap();
        t.create_directory(3, &path("root/b"), 0).unwrap();
        t.create_file(4, &path("root/a/file"), Content::Bytes(vec![]), 3).unwrap();

        let (old_parent, old_ts) = t.move_entry(&path("root/a/file"), &path("root/b"), 8).unwrap();
        assert_eq!(old_parent, path("root/a"));
        assert_eq!(old_ts, 3);
        assert!(t.has_entry(&path("root/b/file")));
        assert!(!t.has_entry(&path("root/a/file")));
        assert_eq!(t.entry(&path("root/b/file")).unwrap().id(), Some(4));

        // Moving to the current parent is a no-op success
        let (parent, _) = t.move_entry(&path("root/b/file"), &path("root/b"), 9).unwrap();
        assert_eq!(parent, path("root/b"));
    }

    #[test]
    fn test_move_into_own_descendant_fails() {
        let mut t = tree();
        t.create_directory(1, &path("root"), 0).unwrap();
        t.create_directory(2, &path("root/outer"), 0).unwrap();
        t.create_directory(3, &path("root/outer/inner"), 0).unwrap();

        let err = t
            .move_entry(&path("root/outer"), &path("root/outer/inner"), 1)
            .unwrap_err();
        assert!(err.is_structural_conflict());

        let err = t.move_entry(&path("root/outer"), &path("root/outer"), 1).unwrap_err();
        assert!(err.is_structural_conflict());
    }

    #[test]
    fn test_delete_and_attach_roundtrip_preserves_ids() {
        let mut t = tree();
        t.create_directory(1, &path("root"), 0).unwrap();
        t.create_directory(2, &path("root/dir"), 1).unwrap();
        t.create_file(3, &path("root/dir/a"), Content::Bytes(b"a".to_vec()), 2).unwrap();
        t.create_file(4, &path("root/dir/b"), Content::Bytes(b"b".to_vec()), 3).unwrap();

        let record = t.delete(&path("root/dir")).unwrap();
        assert!(!t.has_entry(&path("root/dir")));
        assert!(t.entry_by_id(3).is_err());

        t.attach(&path("root"), &record).unwrap();
        let dir = t.entry(&path("root/dir")).unwrap();
        assert_eq!(dir.id(), Some(2));
        assert_eq!(dir.timestamp(), 1);
        let a = t.entry(&path("root/dir/a")).unwrap();
        assert_eq!(a.id(), Some(3));
        assert_eq!(a.content(), Some(&Content::Bytes(b"a".to_vec())));
        assert_eq!(a.timestamp(), 2);
        assert_eq!(t.entry(&path("root/dir/b")).unwrap().id(), Some(4));
    }

    #[test]
    fn test_delete_missing_is_structural() {
        let mut t = tree();
        assert!(t.delete(&path("ghost")).unwrap_err().is_structural_conflict());
    }

    #[test]
    fn test_record_collects_file_contents() {
        let mut t = tree();
        t.create_directory(1, &path("root"), 0).unwrap();
        t.create_file(2, &path("root/a"), Content::Bytes(b"a".to_vec()), 0).unwrap();
        t.create_directory(3, &path("root/sub"), 0).unwrap();
        t.create_file(4, &path("root/sub/b"), Content::Bytes(b"b".to_vec()), 0).unwrap();

        let record = t.entry(&path("root")).unwrap().to_record();
        let contents = record.file_contents();
        assert_eq!(contents.len(), 2);
        assert!(contents.contains(&Content::Bytes(b"a".to_vec())));
        assert!(contents.contains(&Content::Bytes(b"b".to_vec())));
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let mut t = Tree::new(PathComparisonMode::CaseInsensitive);
        t.create_directory(1, &path("Root"), 0).unwrap();
        t.create_file(2, &path("Root/File.TXT"), Content::Bytes(vec![]), 0).unwrap();

        assert!(t.has_entry(&path("root/file.txt")));
        assert!(t
            .create_file(3, &path("ROOT/file.txt"), Content::Bytes(vec![]), 0)
            .unwrap_err()
            .is_structural_conflict());

        // Case-sensitive trees keep both
        let mut t = tree();
        t.create_directory(1, &path("Root"), 0).unwrap();
        t.create_file(2, &path("Root/File.TXT"), Content::Bytes(vec![]), 0).unwrap();
        assert!(!t.has_entry(&path("root/file.txt")));
    }

    #[test]
    fn test_tree_record_roundtrip() {
        let mut t = tree();
        t.create_directory(1, &path("root"), 0).unwrap();
        t.create_file(2, &path("root/file"), Content::Bytes(b"data".to_vec()), 7).unwrap();

        let record = t.to_record();
        let rebuilt = Tree::from_record(&record, t.mode()).unwrap();
        assert_eq!(rebuilt.to_record(), record);
        assert_eq!(rebuilt.entry(&path("root/file")).unwrap().id(), Some(2));
        // Rebuilt nodes have working parent links even though records
        // carry none
        assert_eq!(
            rebuilt.entry(&path("root/file")).unwrap().parent().unwrap().id(),
            Some(1)
        );
    }

    #[test]
    fn test_snapshot_clone_is_independent() {
        let mut t = tree();
        t.create_directory(1, &path("root"), 0).unwrap();
        let snapshot = t.clone();
        t.create_file(2, &path("root/late"), Content::Bytes(vec![]), 0).unwrap();

        assert!(t.has_entry(&path("root/late")));
        assert!(!snapshot.has_entry(&path("root/late")));
    }
}
