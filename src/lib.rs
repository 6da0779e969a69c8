//! # Treeline - Local versioned file trees
//!
//! An embeddable engine that records the history of a logical file tree:
//! every creation, content change, rename, move, and deletion becomes part
//! of an append-only change list that can be browsed, labeled, diffed, and
//! selectively undone.
//!
//! ## Overview
//!
//! Treeline keeps a mutable snapshot of the tree plus the invertible
//! changes that produced it, allowing you to:
//! - Record mutations as atomic change sets (all-or-nothing commits)
//! - Revert the newest change set exactly, including timestamps
//! - Reconstruct the whole tree as it was at any labeled point in history
//! - List every past state of a single file or directory, newest first
//! - Diff two points in history into a pruned difference tree
//! - Purge history older than a cutoff and reclaim the content it strands
//!
//! ## Architecture
//!
//! - **Stable entry ids**: Every entry carries an id that survives renames,
//!   moves, and delete/undelete, so history queries follow the entry, not
//!   its path
//! - **Invertible changes**: Applying a change captures the pre-image
//!   needed to revert it; reverts replay those pre-images in reverse order
//! - **Content-addressed storage**: File bytes are deduplicated by hash
//!   and reference counted, with lz4 compression on disk
//! - **Copy-on-write commits**: A change set applies to a scratch copy of
//!   the tree and only replaces the real one when every change succeeds
//!
//! ## Quick Start
//!
//! ```rust
//! use treeline::TreelineBuilder;
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
//! // Travel back to the labeled state
//! let labels = engine.labels_for(&"src/main.rs".into())?;
//! let initial = labels.iter().find(|l| l.name() == Some("initial")).unwrap();
//! let old_tree = engine.tree_at(initial)?;
//! assert!(old_tree.has_entry(&"src/main.rs".into()));
//! # Ok(())
//! # }
//! ```
//!
//! Persistent engines work the same way through
//! [`TreelineBuilder::open`], which keeps blobs and engine state under a
//! directory of your choosing.

pub mod change;
pub mod changeset;
pub mod clock;
pub mod content;
pub mod diff;
pub mod error;
pub mod events;
pub mod memento;
pub mod path;
pub mod store;
pub mod tree;
pub mod treeline;

pub use change::Change;
pub use changeset::{ChangeList, ChangeSet};
pub use clock::{Clock, ManualClock, SystemClock};
pub use content::{Content, TOO_LONG_PLACEHOLDER};
pub use diff::{diff_trees, DiffKind, Difference};
pub use error::{EngineError, Result};
pub use events::PathEvent;
pub use memento::Memento;
pub use path::{PathComparisonMode, TreePath};
pub use store::{CachingStore, ContentStore, FsStore, InMemoryStore};
pub use tree::{EntryKind, EntryRecord, EntryRef, IdPath, Tree};
pub use treeline::{
    Label, Treeline, TreelineBuilder, DEFAULT_CONTENT_SIZE_LIMIT, DEFAULT_PURGE_INTERVAL_MS,
};
