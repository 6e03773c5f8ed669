//! Root handle over a CHAMP stored in a block store

use super::engine::Engine;
use super::node::ChampNode;
use crate::config::ChampConfig;
use crate::model::Hash;
use crate::ops::{diff_roots, Diff};
use crate::store::BlockStore;
use crate::Result;
use tracing::{debug, warn};

/// A handle on one version of a CHAMP
///
/// Holds the root node and its hash. Mutations write new nodes to the store
/// and replace the held root; the caller decides when and where to publish
/// [`Champ::root_hash`].
pub struct Champ<'a, S: BlockStore + ?Sized> {
    engine: Engine<'a, S>,
    config: ChampConfig,
    root: ChampNode,
    root_hash: Hash,
}

impl<'a, S: BlockStore + ?Sized> Champ<'a, S> {
    /// Create an empty trie, persisting its empty root
    pub fn create(store: &'a S, config: &ChampConfig) -> Result<Self> {
        config.validate()?;
        let engine = Engine::new(store, config);
        let root = ChampNode::empty();
        let root_hash = engine.persist(&root)?;
        Ok(Champ {
            engine,
            config: config.clone(),
            root,
            root_hash,
        })
    }

    /// Load the trie rooted at `root_hash`
    pub fn load(store: &'a S, config: &ChampConfig, root_hash: Hash) -> Result<Self> {
        config.validate()?;
        let engine = Engine::new(store, config);
        let root = engine.load(&root_hash)?;
        Ok(Champ {
            engine,
            config: config.clone(),
            root,
            root_hash,
        })
    }

    pub fn root_hash(&self) -> Hash {
        self.root_hash
    }

    pub fn root(&self) -> &ChampNode {
        &self.root
    }

    pub fn config(&self) -> &ChampConfig {
        &self.config
    }

    pub fn store(&self) -> &'a S {
        self.engine.store()
    }

    /// Look up the value hash stored for `key`
    pub fn get(&self, key: &[u8]) -> Result<Option<Hash>> {
        self.engine.get(&self.root, key)
    }

    /// Map `key` to `value` if it currently maps to `expected`
    ///
    /// `expected == None` asserts the key is absent. Returns the new root
    /// hash, which equals the old one if `value` was already stored.
    pub fn put(&mut self, key: &[u8], expected: Option<Hash>, value: Hash) -> Result<Hash> {
        let digest = self.engine.digest(key);
        let (root, root_hash) = self
            .engine
            .put(&self.root, self.root_hash, key, &digest, 0, expected, value)
            .inspect_err(|e| {
                if e.is_retryable() {
                    warn!(error = %e, "put rejected");
                }
            })?;

        debug!(
            key_len = key.len(),
            old_root = %self.root_hash.short(),
            new_root = %root_hash.short(),
            "put"
        );
        self.root = root;
        self.root_hash = root_hash;
        Ok(root_hash)
    }

    /// Remove `key` if it currently maps to `expected`
    ///
    /// Removing a key that is not present leaves the root unchanged.
    pub fn remove(&mut self, key: &[u8], expected: Option<Hash>) -> Result<Hash> {
        let digest = self.engine.digest(key);
        let (root, root_hash) = self
            .engine
            .remove(&self.root, self.root_hash, key, &digest, 0, expected)
            .inspect_err(|e| {
                if e.is_retryable() {
                    warn!(error = %e, "remove rejected");
                }
            })?;

        debug!(
            key_len = key.len(),
            old_root = %self.root_hash.short(),
            new_root = %root_hash.short(),
            "remove"
        );
        self.root = root;
        self.root_hash = root_hash;
        Ok(root_hash)
    }

    /// Number of keys in the trie
    pub fn size(&self) -> Result<u64> {
        self.engine.size(&self.root)
    }

    /// Every `(key, value hash)` pair in the trie, sorted by key
    pub fn entries(&self) -> Result<Vec<(Vec<u8>, Hash)>> {
        let mut out = Vec::new();
        self.engine.collect_entries(&self.root, &mut out)?;
        out.sort();
        Ok(out)
    }

    /// Changes needed to turn this version into the one rooted at `other`
    pub fn diff(&self, other: Hash) -> Result<Diff> {
        diff_roots(self.engine.store(), &self.config, self.root_hash, other)
    }
}
