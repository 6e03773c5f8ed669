//! Content-addressed block storage
//!
//! Blocks are immutable byte strings addressed by the BLAKE3 hash of their
//! contents. The trie only ever writes new blocks, so every `put` is
//! idempotent and there is no update or delete.

mod cache;
mod file_store;
mod memory;

pub use cache::CachingStore;
pub use file_store::FileStore;
pub use memory::MemoryStore;

use crate::model::Hash;
use crate::Result;

/// A content-addressed block store
pub trait BlockStore: Send + Sync {
    /// Store a block and return its content hash
    fn put(&self, data: &[u8]) -> Result<Hash>;

    /// Fetch a block, `None` if the store has never seen it
    fn get(&self, hash: &Hash) -> Result<Option<Vec<u8>>>;
}

impl<S: BlockStore + ?Sized> BlockStore for &S {
    fn put(&self, data: &[u8]) -> Result<Hash> {
        (**self).put(data)
    }

    fn get(&self, hash: &Hash) -> Result<Option<Vec<u8>>> {
        (**self).get(hash)
    }
}
