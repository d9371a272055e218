//! LRU cache of fixed-size file blocks fetched over HTTP.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

/// Key for cached blocks: source URL and block index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockKey {
    pub url: Arc<str>,
    pub index: u64,
}

/// LRU cache storing raw (still compressed) file blocks.
pub struct BlockCache {
    inner: LruCache<BlockKey, Arc<[u8]>>,
}

impl BlockCache {
    /// Create a new cache holding at most `capacity` blocks (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: LruCache::new(cap),
        }
    }

    pub fn get(&mut self, key: &BlockKey) -> Option<Arc<[u8]>> {
        self.inner.get(key).cloned()
    }

    pub fn insert(&mut self, key: BlockKey, data: Arc<[u8]>) {
        self.inner.put(key, data);
    }

    pub fn contains(&self, key: &BlockKey) -> bool {
        self.inner.contains(key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// A cache shared between concurrent reads.
pub type SharedBlockCache = Arc<Mutex<BlockCache>>;

pub fn shared(capacity: usize) -> SharedBlockCache {
    Arc::new(Mutex::new(BlockCache::new(capacity)))
}
