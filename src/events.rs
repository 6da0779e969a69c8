//! Filesystem-style notifications fed into the engine
//!
//! Embedders that watch a real filesystem translate its notifications into
//! [`PathEvent`]s and hand them to
//! [`Treeline::ingest`](crate::treeline::Treeline::ingest), which turns
//! them into recorded changes. Events carry raw bytes where content is
//! involved; the engine decides whether those bytes are stored or gated
//! for size.

use crate::path::TreePath;

/// One observed filesystem-style event
#[derive(Debug, Clone, PartialEq)]
pub enum PathEvent {
    /// Something appeared at `path`
    ///
    /// With `bytes` it is a file creation; without, a directory creation.
    Created {
        /// Logical path of the new entry
        path: TreePath,
        /// File bytes, or `None` for a directory
        bytes: Option<Vec<u8>>,
    },
    /// A file's bytes changed
    ContentChanged {
        /// Logical path of the file
        path: TreePath,
        /// The new bytes
        bytes: Vec<u8>,
    },
    /// The entry at `path` disappeared
    Deleted {
        /// Logical path of the removed entry
        path: TreePath,
    },
    /// A directory reported activity without a specific child event
    ///
    /// The engine makes sure the directory exists; watchers emit this for
    /// coarse notifications where only the parent is known.
    DirectoryDirty {
        /// Logical path of the directory
        path: TreePath,
    },
}

impl PathEvent {
    /// The path this event is about
    pub fn path(&self) -> &TreePath {
        match self {
            PathEvent::Created { path, .. }
            | PathEvent::ContentChanged { path, .. }
            | PathEvent::Deleted { path }
            | PathEvent::DirectoryDirty { path } => path,
        }
    }
}
