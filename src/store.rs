//! Content-addressed blob stores
//!
//! Tree structure and file content live apart: entries hold small integer
//! content ids, and the bytes behind those ids live in a [`ContentStore`].
//! Stores deduplicate by byte identity — storing the same bytes twice hands
//! back the same id and bumps a reference count, and `remove` only frees a
//! blob once the last reference is gone. That makes it safe for history
//! purging to forward every orphaned content id without checking whether a
//! live entry happens to share the same bytes.
//!
//! Three implementations are provided:
//!
//! - [`InMemoryStore`] — HashMap-backed, for tests and disk-less embedders
//! - [`FsStore`] — sharded blob directory with LZ4-compressed objects and a
//!   bincode index persisted on `save()`
//! - [`CachingStore`] — a decorator that remembers what it stored or loaded
//!   so repeated reads within a session never touch the backing store twice
//!
//! The cache is a correctness cache bounded by content lifetime (explicit
//! `remove` is the only eviction), not a memory-pressure LRU.

use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// Byte-blob storage keyed by small integer ids
pub trait ContentStore {
    /// Store bytes, returning their content id
    ///
    /// Equal bytes yield the same id; each call counts as one reference.
    fn store(&mut self, bytes: &[u8]) -> Result<u64>;

    /// Load the bytes behind an id
    fn load(&self, id: u64) -> Result<Vec<u8>>;

    /// Drop one reference to an id, freeing the blob at zero references
    fn remove(&mut self, id: u64) -> Result<()>;

    /// Persist any pending state
    fn save(&mut self) -> Result<()>;

    /// Flush and release the store
    fn close(&mut self) -> Result<()>;
}

fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// In-memory content store
///
/// Keeps everything in HashMaps; `save` and `close` are no-ops.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    blobs: HashMap<u64, Vec<u8>>,
    by_hash: HashMap<String, u64>,
    refs: HashMap<u64, usize>,
    next_id: u64,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct blobs currently held
    pub fn blob_count(&self) -> usize {
        self.blobs.len()
    }

    /// Current reference count for an id (0 if absent)
    pub fn ref_count(&self, id: u64) -> usize {
        self.refs.get(&id).copied().unwrap_or(0)
    }
}

impl ContentStore for InMemoryStore {
    fn store(&mut self, bytes: &[u8]) -> Result<u64> {
        let hash = content_hash(bytes);
        if let Some(&id) = self.by_hash.get(&hash) {
            *self.refs.entry(id).or_insert(0) += 1;
            trace!(id, "content already stored, incremented ref count");
            return Ok(id);
        }
        let id = self.next_id;
        self.next_id += 1;
        self.blobs.insert(id, bytes.to_vec());
        self.by_hash.insert(hash, id);
        self.refs.insert(id, 1);
        trace!(id, len = bytes.len(), "stored content");
        Ok(id)
    }

    fn load(&self, id: u64) -> Result<Vec<u8>> {
        self.blobs
            .get(&id)
            .cloned()
            .ok_or(EngineError::ContentNotFound(id))
    }

    fn remove(&mut self, id: u64) -> Result<()> {
        let Some(count) = self.refs.get_mut(&id) else {
            return Ok(());
        };
        *count -= 1;
        if *count == 0 {
            self.refs.remove(&id);
            if let Some(bytes) = self.blobs.remove(&id) {
                self.by_hash.remove(&content_hash(&bytes));
            }
            trace!(id, "freed content");
        }
        Ok(())
    }

    fn save(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Metadata written next to a filesystem store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMetadata {
    /// Version of the on-disk layout
    pub format_version: u32,
    /// Crate version that created the store
    pub engine_version: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last accessed timestamp
    pub last_accessed: DateTime<Utc>,
}

/// Index persisted alongside the blobs of an [`FsStore`]
#[derive(Debug, Default, Serialize, Deserialize)]
struct FsIndex {
    next_id: u64,
    by_hash: HashMap<String, u64>,
    refs: HashMap<u64, usize>,
}

/// Filesystem-backed content store
///
/// Layout under the store root:
///
/// ```text
/// store_root/
/// ├── metadata.json     # layout version and timestamps
/// ├── index.bin         # dedup index and reference counts (bincode)
/// └── objects/          # LZ4-compressed blobs, sharded by id
///     └── <shard>/
///         └── <id>
/// ```
///
/// Blobs are compressed with the size-prepended LZ4 framing; a blob that
/// fails to decompress surfaces as [`EngineError::CorruptContent`].
pub struct FsStore {
    root: PathBuf,
    index: FsIndex,
    metadata: RwLock<StoreMetadata>,
}

impl std::fmt::Debug for FsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsStore")
            .field("root", &self.root)
            .field("blob_count", &self.index.by_hash.len())
            .finish()
    }
}

impl FsStore {
    /// Open a store at `root`, creating the layout if it does not exist
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("objects"))?;

        let metadata_path = root.join("metadata.json");
        let metadata = if metadata_path.exists() {
            let mut meta: StoreMetadata = serde_json::from_str(&fs::read_to_string(&metadata_path)?)?;
            meta.last_accessed = Utc::now();
            meta
        } else {
            let meta = StoreMetadata {
                format_version: 1,
                engine_version: env!("CARGO_PKG_VERSION").to_string(),
                created_at: Utc::now(),
                last_accessed: Utc::now(),
            };
            fs::write(&metadata_path, serde_json::to_string_pretty(&meta)?)?;
            meta
        };

        let index_path = root.join("index.bin");
        let index = if index_path.exists() {
            let bytes = fs::read(&index_path)?;
            match bincode::serde::decode_from_slice::<FsIndex, _>(&bytes, bincode::config::standard())
            {
                Ok((index, _)) => index,
                Err(e) => {
                    warn!("failed to load store index, starting fresh: {}", e);
                    FsIndex::default()
                }
            }
        } else {
            FsIndex::default()
        };

        debug!(?root, blobs = index.by_hash.len(), "opened content store");
        Ok(Self {
            root,
            index,
            metadata: RwLock::new(metadata),
        })
    }

    fn object_path(&self, id: u64) -> PathBuf {
        let shard = format!("{:02x}", id & 0xff);
        self.root.join("objects").join(shard).join(id.to_string())
    }

    /// Snapshot of the store metadata
    pub fn metadata(&self) -> StoreMetadata {
        self.metadata.read().clone()
    }
}

impl ContentStore for FsStore {
    fn store(&mut self, bytes: &[u8]) -> Result<u64> {
        let hash = content_hash(bytes);
        if let Some(&id) = self.index.by_hash.get(&hash) {
            *self.index.refs.entry(id).or_insert(0) += 1;
            trace!(id, "blob already stored, incremented ref count");
            return Ok(id);
        }
        let id = self.index.next_id;
        self.index.next_id += 1;

        let compressed = compress_prepend_size(bytes);
        let path = self.object_path(id);
        fs::create_dir_all(path.parent().expect("object path has a shard parent"))?;
        fs::write(&path, &compressed)?;

        self.index.by_hash.insert(hash, id);
        self.index.refs.insert(id, 1);
        trace!(id, raw = bytes.len(), stored = compressed.len(), "stored blob");
        Ok(id)
    }

    fn load(&self, id: u64) -> Result<Vec<u8>> {
        let path = self.object_path(id);
        if !path.exists() {
            return Err(EngineError::ContentNotFound(id));
        }
        let compressed = fs::read(&path)?;
        let bytes = decompress_size_prepended(&compressed).map_err(|e| {
            EngineError::CorruptContent {
                id,
                reason: format!("LZ4 decompression failed: {}", e),
            }
        })?;
        self.metadata.write().last_accessed = Utc::now();
        trace!(id, len = bytes.len(), "loaded blob");
        Ok(bytes)
    }

    fn remove(&mut self, id: u64) -> Result<()> {
        let Some(count) = self.index.refs.get_mut(&id) else {
            return Ok(());
        };
        *count -= 1;
        if *count > 0 {
            return Ok(());
        }
        self.index.refs.remove(&id);
        self.index.by_hash.retain(|_, v| *v != id);
        let path = self.object_path(id);
        if path.exists() {
            fs::remove_file(path)?;
        }
        debug!(id, "freed blob");
        Ok(())
    }

    fn save(&mut self) -> Result<()> {
        let bytes = bincode::serde::encode_to_vec(&self.index, bincode::config::standard())?;
        fs::write(self.root.join("index.bin"), &bytes)?;
        let meta = self.metadata.read().clone();
        fs::write(
            self.root.join("metadata.json"),
            serde_json::to_string_pretty(&meta)?,
        )?;
        debug!(blobs = self.index.by_hash.len(), "saved store index");
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.save()
    }
}

/// Caching decorator around any [`ContentStore`]
///
/// `store` remembers the bytes it just wrote; `load` fills the cache on
/// first read and serves later reads from memory; `remove` evicts before
/// forwarding so a freed id can never be served stale. The id-keyed map
/// linearizes `remove` against concurrent `load` for the same id.
pub struct CachingStore<S> {
    inner: S,
    cache: DashMap<u64, Vec<u8>>,
}

impl<S: std::fmt::Debug> std::fmt::Debug for CachingStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingStore")
            .field("inner", &self.inner)
            .field("cached", &self.cache.len())
            .finish()
    }
}

impl<S: ContentStore> CachingStore<S> {
    /// Wrap a store with an id→bytes cache
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            cache: DashMap::new(),
        }
    }

    /// Number of ids currently cached
    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    /// Access the wrapped store
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: ContentStore> ContentStore for CachingStore<S> {
    fn store(&mut self, bytes: &[u8]) -> Result<u64> {
        let id = self.inner.store(bytes)?;
        self.cache.insert(id, bytes.to_vec());
        Ok(id)
    }

    fn load(&self, id: u64) -> Result<Vec<u8>> {
        if let Some(bytes) = self.cache.get(&id) {
            trace!(id, "cache hit");
            return Ok(bytes.clone());
        }
        let bytes = self.inner.load(id)?;
        self.cache.insert(id, bytes.clone());
        Ok(bytes)
    }

    fn remove(&mut self, id: u64) -> Result<()> {
        self.cache.remove(&id);
        self.inner.remove(id)
    }

    fn save(&mut self) -> Result<()> {
        self.inner.save()
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}
