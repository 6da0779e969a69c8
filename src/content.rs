//! Content handles
//!
//! File entries do not own their bytes. They hold a [`Content`] handle that
//! is resolved against a [`ContentStore`](crate::store::ContentStore) on
//! demand, so tree structure stays cheap to copy and history browsing never
//! has to page blobs in.
//!
//! A failed blob read surfaces as `is_available() == false` rather than an
//! error: a corrupted blob must not prevent navigating the tree or browsing
//! history around it.

use crate::error::Result;
use crate::store::ContentStore;
use serde::{Deserialize, Serialize};

/// Placeholder payload reported by contents that were gated for size
pub const TOO_LONG_PLACEHOLDER: &[u8] = b"content was too large to be stored";

/// Handle to a file's byte content
///
/// Note on equality: the derived `PartialEq` is structural (same variant,
/// same id/bytes) and exists for record round-trips. Logical, byte-level
/// equality is [`Content::equals`], which resolves stored ids against a
/// store and under which `TooLong` equals nothing — not even itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Content {
    /// Bytes live in a content store under this id
    Stored {
        /// Id assigned by the store
        id: u64,
    },
    /// Bytes exceeded the configured size limit and were discarded
    TooLong,
    /// Transient in-memory bytes that were never handed to a store
    Bytes(Vec<u8>),
}

impl Content {
    /// Resolve this handle to its bytes
    ///
    /// `TooLong` yields the fixed placeholder payload. `Stored` contents
    /// propagate store failures; callers that only care about presence
    /// should use [`Content::is_available`] instead.
    pub fn bytes(&self, store: &dyn ContentStore) -> Result<Vec<u8>> {
        match self {
            Content::Stored { id } => store.load(*id),
            Content::TooLong => Ok(TOO_LONG_PLACEHOLDER.to_vec()),
            Content::Bytes(bytes) => Ok(bytes.clone()),
        }
    }

    /// Length of the content in bytes; `TooLong` reports 0
    pub fn length(&self, store: &dyn ContentStore) -> u64 {
        match self {
            Content::Stored { id } => store.load(*id).map(|b| b.len() as u64).unwrap_or(0),
            Content::TooLong => 0,
            Content::Bytes(bytes) => bytes.len() as u64,
        }
    }

    /// Whether the bytes behind this handle can currently be read
    ///
    /// Store failures (missing or corrupt blob) are absorbed here and
    /// reported as `false`.
    pub fn is_available(&self, store: &dyn ContentStore) -> bool {
        match self {
            Content::Stored { id } => store.load(*id).is_ok(),
            Content::TooLong => true,
            Content::Bytes(_) => true,
        }
    }

    /// True if this content was size-gated away
    pub fn is_too_long(&self) -> bool {
        matches!(self, Content::TooLong)
    }

    /// Byte-level equality against another content handle
    ///
    /// `TooLong` never equals anything, including another `TooLong`.
    /// Unreadable stored contents compare unequal.
    pub fn equals(&self, other: &Content, store: &dyn ContentStore) -> bool {
        if self.is_too_long() || other.is_too_long() {
            return false;
        }
        // Deduplicating stores hand out one id per distinct byte string
        if let (Content::Stored { id: a }, Content::Stored { id: b }) = (self, other) {
            if a == b {
                return true;
            }
        }
        match (self.bytes(store), other.bytes(store)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}
