//! Engine state persistence
//!
//! A [`Memento`] is everything the engine needs to come back after a
//! restart: the id counter, the current tree (as a detached record, since
//! parent links are rebuilt on load), and the committed change list with
//! its saved pre-images. Content bytes are not part of the memento; they
//! live in the content store and the memento only references their ids.
//!
//! The on-disk form is bincode wrapped in an lz4 frame, matching how blobs
//! are stored.

use crate::changeset::ChangeList;
use crate::error::{EngineError, Result};
use crate::tree::EntryRecord;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Serialized engine state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memento {
    /// Next value of the entry id counter
    pub counter: u64,
    /// The current tree, rooted at a root record
    pub tree: EntryRecord,
    /// Committed history with pre-images
    pub history: ChangeList,
}

impl Default for Memento {
    fn default() -> Self {
        Memento {
            counter: 0,
            tree: EntryRecord::Root {
                children: Vec::new(),
            },
            history: ChangeList::new(),
        }
    }
}

impl Memento {
    /// Serialize to the compressed on-disk form
    pub fn encode(&self) -> Result<Vec<u8>> {
        let encoded = bincode::serde::encode_to_vec(self, bincode::config::standard())?;
        Ok(lz4_flex::compress_prepend_size(&encoded))
    }

    /// Deserialize from the compressed on-disk form
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let decompressed = lz4_flex::decompress_size_prepended(bytes)
            .map_err(|e| EngineError::internal(format!("state decompression failed: {}", e)))?;
        let (memento, _) =
            bincode::serde::decode_from_slice(&decompressed, bincode::config::standard())?;
        Ok(memento)
    }

    /// Write the state to a file, creating parent directories as needed
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = self.encode()?;
        fs::write(path, &bytes)?;
        debug!(path = %path.display(), bytes = bytes.len(), "engine state written");
        Ok(())
    }

    /// Read state back from a file
    pub fn read_from(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        Self::decode(&bytes)
    }
}
