//! Error types for the Treeline engine
//!
//! All fallible operations in the engine return [`Result<T>`]. Structural
//! validation failures and commit conflicts are ordinary, expected outcomes
//! for callers (a failed commit is part of the protocol, not a bug), so they
//! are modeled as typed error values rather than panics.

use thiserror::Error;

/// Type alias for Results in the Treeline engine
pub type Result<T> = std::result::Result<T, EngineError>;

/// Main error type for all Treeline operations
#[derive(Debug, Error)]
pub enum EngineError {
    /// I/O errors during store or state persistence operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors during bincode serialization/deserialization
    #[error("Bincode error: {0}")]
    Bincode(String),

    /// No entry exists at the given path
    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    /// No entry with the given id exists in the tree
    #[error("Entry not found: id {0}")]
    EntryIdNotFound(u64),

    /// No content blob with the given id exists in the store
    #[error("Content not found: id {0}")]
    ContentNotFound(u64),

    /// Content blob exists but could not be read back intact
    #[error("Corrupt content {id}: {reason}")]
    CorruptContent {
        /// Id of the unreadable blob
        id: u64,
        /// What went wrong while reading it
        reason: String,
    },

    /// A structural precondition of a tree mutation was violated
    /// (duplicate name, missing parent, children under a file,
    /// delete of a missing entry, move into own descendant)
    #[error("Structural conflict: {0}")]
    StructuralConflict(String),

    /// A pending batch failed to apply as one atomic change set
    #[error("Commit conflict: {0}")]
    CommitConflict(#[source] Box<EngineError>),

    /// Labeling was requested with no committed history
    #[error("History is empty")]
    EmptyHistory,

    /// A label obtained before a revert or purge was used to address the
    /// rewritten history
    #[error("Label no longer matches this history")]
    StaleLabel,

    /// A change was asked to revert before it was ever applied
    #[error("Change has not been applied and cannot be reverted")]
    NotApplied,

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

// Implement conversions for bincode 2.0 error types
impl From<bincode::error::DecodeError> for EngineError {
    fn from(err: bincode::error::DecodeError) -> Self {
        EngineError::Bincode(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for EngineError {
    fn from(err: bincode::error::EncodeError) -> Self {
        EngineError::Bincode(err.to_string())
    }
}

impl EngineError {
    /// Create a structural conflict error with a custom message
    pub fn structural(msg: impl Into<String>) -> Self {
        EngineError::StructuralConflict(msg.into())
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        EngineError::Internal(msg.into())
    }

    /// Wrap an error as the cause of a failed commit
    pub fn commit_conflict(cause: EngineError) -> Self {
        EngineError::CommitConflict(Box::new(cause))
    }

    /// Check if this error is a structural validation failure
    pub fn is_structural_conflict(&self) -> bool {
        matches!(self, EngineError::StructuralConflict(_))
    }

    /// Check if this error means the requested entry or content is absent
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EngineError::EntryNotFound(_)
                | EngineError::EntryIdNotFound(_)
                | EngineError::ContentNotFound(_)
        )
    }

    /// Check if this error indicates unreadable stored content
    pub fn is_corruption(&self) -> bool {
        matches!(self, EngineError::CorruptContent { .. })
    }
}
