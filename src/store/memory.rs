//! In-memory block store

use super::BlockStore;
use crate::model::Hash;
use crate::Result;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// A block store held entirely in memory
///
/// Counts every `put` call so callers can check that a no-op mutation
/// wrote nothing.
#[derive(Default)]
pub struct MemoryStore {
    blocks: RwLock<HashMap<Hash, Vec<u8>>>,
    puts: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `put` calls served so far
    pub fn put_count(&self) -> u64 {
        self.puts.load(Ordering::Relaxed)
    }

    /// Number of distinct blocks stored
    pub fn block_count(&self) -> usize {
        self.blocks.read().len()
    }

    /// Drop a block, simulating a store that lost data
    pub fn forget(&self, hash: &Hash) -> bool {
        self.blocks.write().remove(hash).is_some()
    }
}

impl BlockStore for MemoryStore {
    fn put(&self, data: &[u8]) -> Result<Hash> {
        self.puts.fetch_add(1, Ordering::Relaxed);
        let hash = Hash::digest(data);
        self.blocks
            .write()
            .entry(hash)
            .or_insert_with(|| data.to_vec());
        Ok(hash)
    }

    fn get(&self, hash: &Hash) -> Result<Option<Vec<u8>>> {
        Ok(self.blocks.read().get(hash).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get() {
        let store = MemoryStore::new();
        let hash = store.put(b"block").unwrap();
        assert_eq!(hash, Hash::digest(b"block"));
        assert_eq!(store.get(&hash).unwrap().as_deref(), Some(&b"block"[..]));
        assert!(store.get(&Hash::digest(b"missing")).unwrap().is_none());
    }

    #[test]
    fn test_deduplication() {
        let store = MemoryStore::new();
        let h1 = store.put(b"same").unwrap();
        let h2 = store.put(b"same").unwrap();
        assert_eq!(h1, h2);
        assert_eq!(store.block_count(), 1);
        assert_eq!(store.put_count(), 2);
    }

    #[test]
    fn test_forget() {
        let store = MemoryStore::new();
        let hash = store.put(b"gone").unwrap();
        assert!(store.forget(&hash));
        assert!(store.get(&hash).unwrap().is_none());
    }
}
