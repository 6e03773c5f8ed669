//! # champ_db
//!
//! A content-addressed index built on a compressed hash-array-mapped prefix
//! trie (CHAMP).
//!
//! Every trie node is an immutable block stored under the hash of its
//! encoding. Updates rewrite the path from the changed slot up to the root
//! and return a new root hash, so old versions stay readable and unchanged
//! subtrees are shared between them.
//!
//! ## Core Concepts
//!
//! - **Blocks**: immutable bytes addressed by their BLAKE3 hash
//! - **Champ**: a handle on one trie version, identified by its root hash
//! - **Compare-and-swap**: every `put`/`remove` states the value it expects
//! - **Diff / merge**: versions are compared structurally and merged three-way
//! - **Database**: named roots in a single file, published with CAS
//!
//! ## Example
//!
//! ```ignore
//! use champ_db::{Champ, ChampConfig, MemoryStore};
//!
//! let store = MemoryStore::new();
//! let mut champ = Champ::create(&store, &ChampConfig::default())?;
//! let value = store.put(b"hello")?;
//! champ.put(b"greeting", None, value)?;
//! assert_eq!(champ.get(b"greeting")?, Some(value));
//! ```

pub mod model;
pub mod ops;
pub mod store;
pub mod trie;

mod config;
mod database;
mod error;

pub use config::{ChampConfig, DEFAULT_BIT_WIDTH, MAX_BIT_WIDTH};
pub use database::{Database, Status};
pub use error::{Error, Result};
pub use model::{Hash, KeyHashing};
pub use ops::{diff_roots, merge_roots, Diff, DiffEntry};
pub use store::{BlockStore, CachingStore, FileStore, MemoryStore};
pub use trie::Champ;

/// File format version
pub const VERSION: u32 = 1;

/// Magic bytes for file identification
pub const MAGIC: &[u8; 8] = b"CHAMP_DB";
