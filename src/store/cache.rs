//! LRU read cache in front of another block store

use super::BlockStore;
use crate::model::Hash;
use crate::Result;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use tracing::trace;

/// Caches recently read and written blocks by hash
///
/// Blocks are immutable, so cached entries never go stale.
pub struct CachingStore<S> {
    inner: S,
    cache: Mutex<LruCache<Hash, Vec<u8>>>,
}

impl<S: BlockStore> CachingStore<S> {
    pub fn new(inner: S, capacity: NonZeroUsize) -> Self {
        CachingStore {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of blocks currently cached
    pub fn cached(&self) -> usize {
        self.cache.lock().len()
    }
}

impl<S: BlockStore> BlockStore for CachingStore<S> {
    fn put(&self, data: &[u8]) -> Result<Hash> {
        let hash = self.inner.put(data)?;
        self.cache.lock().put(hash, data.to_vec());
        Ok(hash)
    }

    fn get(&self, hash: &Hash) -> Result<Option<Vec<u8>>> {
        if let Some(data) = self.cache.lock().get(hash) {
            trace!(hash = %hash.short(), "cache hit");
            return Ok(Some(data.clone()));
        }

        let data = self.inner.get(hash)?;
        if let Some(ref data) = data {
            self.cache.lock().put(*hash, data.clone());
        }
        Ok(data)
    }
}
