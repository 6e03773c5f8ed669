//! High-level Database API
//!
//! A database is a single block file plus its JSON config. It holds any
//! number of named indexes, each a root pointer to a CHAMP. Updates load the
//! named root, apply the change, and publish the new root with
//! compare-and-set, so two writers racing on one index cannot both win.

use crate::config::ChampConfig;
use crate::model::Hash;
use crate::ops::{diff_roots, merge_roots, Diff};
use crate::store::{BlockStore, CachingStore, FileStore};
use crate::trie::Champ;
use crate::{Error, Result};
use std::num::NonZeroUsize;
use std::path::Path;
use tracing::info;

type Store = CachingStore<FileStore>;

/// The main database interface
pub struct Database {
    store: Store,
    config: ChampConfig,
}

/// Summary of a database for `status` output
#[derive(Clone, Debug, serde::Serialize)]
pub struct Status {
    pub blocks: usize,
    pub indexes: usize,
    pub bit_width: u8,
    pub key_hashing: crate::model::KeyHashing,
    pub cache_capacity: usize,
}

impl Database {
    /// Create a new database at the given path with the default config
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::create_with_config(path, ChampConfig::default())
    }

    /// Create a new database with an explicit trie layout
    pub fn create_with_config(path: impl AsRef<Path>, config: ChampConfig) -> Result<Self> {
        let path = path.as_ref();
        config.validate()?;
        let file = FileStore::create(path)?;
        config.save(path)?;
        Self::assemble(file, config)
    }

    /// Open an existing database
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = FileStore::open(path)?;
        let config = ChampConfig::load(path)?;
        Self::assemble(file, config)
    }

    /// Open or create a database
    pub fn open_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    fn assemble(file: FileStore, config: ChampConfig) -> Result<Self> {
        let capacity = NonZeroUsize::new(config.cache_capacity)
            .ok_or_else(|| Error::Config("cache_capacity must be positive".into()))?;
        Ok(Database {
            store: CachingStore::new(file, capacity),
            config,
        })
    }

    pub fn config(&self) -> &ChampConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        self.store.inner().path()
    }

    // === Named roots ===

    /// All named indexes and their roots, sorted by name
    pub fn roots(&self) -> Vec<(String, Hash)> {
        self.store.inner().list_roots()
    }

    /// Current root of a named index
    pub fn root(&self, name: &str) -> Option<Hash> {
        self.store.inner().get_root(name)
    }

    fn resolve(&self, name: &str) -> Result<Hash> {
        self.root(name)
            .ok_or_else(|| Error::RootNotFound(name.to_string()))
    }

    /// Handle on a named index; an unknown name starts out empty
    pub fn index(&self, name: &str) -> Result<Champ<'_, Store>> {
        match self.root(name) {
            Some(root) => Champ::load(&self.store, &self.config, root),
            None => Champ::create(&self.store, &self.config),
        }
    }

    /// Handle on the trie at an arbitrary root
    pub fn at(&self, root: Hash) -> Result<Champ<'_, Store>> {
        Champ::load(&self.store, &self.config, root)
    }

    /// Point `name` at `new` if it currently points at `expected`
    pub fn publish(&self, name: &str, expected: Option<Hash>, new: Hash) -> Result<()> {
        self.store.inner().compare_and_set_root(name, expected, new)?;
        info!(
            index = name,
            from = %expected.map(|h| h.short()).unwrap_or_else(|| "-".into()),
            to = %new.short(),
            "published root"
        );
        Ok(())
    }

    /// Load, mutate and publish a named index
    fn update<F>(&self, name: &str, mutate: F) -> Result<Hash>
    where
        F: FnOnce(&mut Champ<'_, Store>) -> Result<Hash>,
    {
        let current = self.root(name);
        let mut champ = self.index(name)?;
        let new = mutate(&mut champ)?;
        if current != Some(new) {
            self.publish(name, current, new)?;
        }
        Ok(new)
    }

    // === Index operations ===

    /// Map `key` to `value` in `name` if it currently maps to `expected`
    pub fn put(&self, name: &str, key: &[u8], expected: Option<Hash>, value: Hash) -> Result<Hash> {
        self.update(name, |champ| champ.put(key, expected, value))
    }

    /// Remove `key` from `name` if it currently maps to `expected`
    pub fn remove(&self, name: &str, key: &[u8], expected: Option<Hash>) -> Result<Hash> {
        if self.root(name).is_none() {
            return Err(Error::RootNotFound(name.to_string()));
        }
        self.update(name, |champ| champ.remove(key, expected))
    }

    /// Look up `key` in `name`
    pub fn get(&self, name: &str, key: &[u8]) -> Result<Option<Hash>> {
        match self.root(name) {
            Some(root) => self.at(root)?.get(key),
            None => Ok(None),
        }
    }

    pub fn size(&self, name: &str) -> Result<u64> {
        self.at(self.resolve(name)?)?.size()
    }

    pub fn entries(&self, name: &str) -> Result<Vec<(Vec<u8>, Hash)>> {
        self.at(self.resolve(name)?)?.entries()
    }

    // === Value blocks ===

    /// Store a value block, returning the hash to put in an index
    pub fn put_value(&self, bytes: &[u8]) -> Result<Hash> {
        self.store.put(bytes)
    }

    pub fn get_value(&self, hash: &Hash) -> Result<Option<Vec<u8>>> {
        self.store.get(hash)
    }

    // === Versions ===

    /// Start index `to` at the current root of `from`
    pub fn fork(&self, from: &str, to: &str) -> Result<Hash> {
        let root = self.resolve(from)?;
        self.publish(to, None, root)?;
        Ok(root)
    }

    /// Changes between two roots
    pub fn diff(&self, from: Hash, to: Hash) -> Result<Diff> {
        diff_roots(&self.store, &self.config, from, to)
    }

    /// Merge `remote` into index `name`, both derived from `ancestor`
    pub fn merge(&self, name: &str, ancestor: Hash, remote: Hash) -> Result<Hash> {
        let local = self.resolve(name)?;
        let merged = merge_roots(&self.store, &self.config, ancestor, local, remote)?;
        if merged != local {
            self.publish(name, Some(local), merged)?;
        }
        Ok(merged)
    }

    pub fn status(&self) -> Status {
        Status {
            blocks: self.store.inner().block_count(),
            indexes: self.roots().len(),
            bit_width: self.config.bit_width,
            key_hashing: self.config.key_hashing,
            cache_capacity: self.config.cache_capacity,
        }
    }

    /// Flush the block index and root table to disk
    pub fn sync(&self) -> Result<()> {
        self.store.inner().sync()
    }
}
