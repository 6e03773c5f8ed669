//! Single-file block store
//!
//! File format:
//! ```text
//! [HEADER: 64 bytes]
//!   - magic: 8 bytes ("CHAMP_DB")
//!   - version: 4 bytes (u32 LE)
//!   - flags: 4 bytes
//!   - block_count: 8 bytes (u64 LE)
//!   - index_offset: 8 bytes (u64 LE)
//!   - roots_offset: 8 bytes (u64 LE)
//!   - roots_count: 8 bytes (u64 LE)
//!   - reserved: 16 bytes
//!
//! [BLOCKS: variable]
//!   - zstd-compressed block data, concatenated
//!
//! [INDEX: variable]
//!   - sorted array of (hash, offset, size) entries
//!
//! [ROOTS: variable]
//!   - root name → root hash
//! ```
//!
//! The file is append-only past the header. Each `sync` appends a fresh
//! index and root table and only then repoints the header at them, so a
//! crash at any moment leaves the last synced state readable. Superseded
//! tables stay behind as dead bytes between blocks.

use super::BlockStore;
use crate::model::Hash;
use crate::{Error, Result, MAGIC, VERSION};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

const HEADER_SIZE: u64 = 64;

/// 32 hash + 8 offset + 4 size
const INDEX_ENTRY_SIZE: usize = 44;

const COMPRESSION_LEVEL: i32 = 3;

#[derive(Clone, Copy, Debug)]
struct IndexEntry {
    offset: u64,
    size: u32,
}

/// A content-addressed block store backed by a single file
///
/// Besides blocks it keeps a table of named root pointers, each updated
/// with compare-and-set so concurrent writers cannot lose each other's
/// commits.
pub struct FileStore {
    path: PathBuf,
    file: RwLock<File>,
    index: RwLock<HashMap<Hash, IndexEntry>>,
    roots: RwLock<HashMap<String, Hash>>,
    /// Current append position
    write_offset: RwLock<u64>,
    /// Blocks or roots changed since the last sync
    dirty: AtomicBool,
}

fn read_u64(buf: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(bytes)
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(bytes)
}

impl FileStore {
    /// Create a new store file, truncating any existing one
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        let mut header = [0u8; HEADER_SIZE as usize];
        header[0..8].copy_from_slice(MAGIC);
        header[8..12].copy_from_slice(&VERSION.to_le_bytes());
        file.write_all(&header)?;
        file.sync_all()?;

        debug!(path = %path.display(), "created block store");
        Ok(FileStore {
            path,
            file: RwLock::new(file),
            index: RwLock::new(HashMap::new()),
            roots: RwLock::new(HashMap::new()),
            write_offset: RwLock::new(HEADER_SIZE),
            dirty: AtomicBool::new(false),
        })
    }

    /// Open an existing store file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;

        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)
            .map_err(|_| Error::InvalidFile("Truncated header".into()))?;

        if &header[0..8] != MAGIC {
            return Err(Error::InvalidFile("Invalid magic bytes".into()));
        }

        let version = read_u32(&header, 8);
        if version != VERSION {
            return Err(Error::VersionMismatch {
                expected: VERSION,
                found: version,
            });
        }

        let block_count = read_u64(&header, 16);
        let index_offset = read_u64(&header, 24);
        let roots_offset = read_u64(&header, 32);
        let roots_count = read_u64(&header, 40);

        let mut index = HashMap::new();
        if index_offset > 0 && block_count > 0 {
            file.seek(SeekFrom::Start(index_offset))?;
            for _ in 0..block_count {
                let mut entry_buf = [0u8; INDEX_ENTRY_SIZE];
                file.read_exact(&mut entry_buf)?;

                let mut hash_bytes = [0u8; 32];
                hash_bytes.copy_from_slice(&entry_buf[0..32]);
                let offset = read_u64(&entry_buf, 32);
                let size = read_u32(&entry_buf, 40);

                index.insert(Hash::from_bytes(hash_bytes), IndexEntry { offset, size });
            }
        }

        let mut roots = HashMap::new();
        if roots_offset > 0 && roots_count > 0 {
            file.seek(SeekFrom::Start(roots_offset))?;
            for _ in 0..roots_count {
                let mut len_buf = [0u8; 2];
                file.read_exact(&mut len_buf)?;
                let name_len = u16::from_le_bytes(len_buf) as usize;

                let mut name_buf = vec![0u8; name_len];
                file.read_exact(&mut name_buf)?;
                let name = String::from_utf8(name_buf)
                    .map_err(|_| Error::InvalidFile("Root name is not UTF-8".into()))?;

                let mut hash_buf = [0u8; 32];
                file.read_exact(&mut hash_buf)?;

                roots.insert(name, Hash::from_bytes(hash_buf));
            }
        }

        // Never write over the tables the header points at
        let write_offset = file.seek(SeekFrom::End(0))?;

        debug!(
            path = %path.display(),
            blocks = index.len(),
            roots = roots.len(),
            "opened block store"
        );
        Ok(FileStore {
            path,
            file: RwLock::new(file),
            index: RwLock::new(index),
            roots: RwLock::new(roots),
            write_offset: RwLock::new(write_offset),
            dirty: AtomicBool::new(false),
        })
    }

    /// Open or create a store file
    pub fn open_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    // === Root pointers ===

    /// Get the hash a named root points to
    pub fn get_root(&self, name: &str) -> Option<Hash> {
        self.roots.read().get(name).copied()
    }

    /// Move a named root from `expected` to `new`
    ///
    /// `expected == None` means the root must not exist yet. Fails with
    /// [`Error::RootConflict`] if another writer moved it first.
    pub fn compare_and_set_root(
        &self,
        name: &str,
        expected: Option<Hash>,
        new: Hash,
    ) -> Result<()> {
        if name.is_empty() || name.len() > u16::MAX as usize {
            return Err(Error::Config(format!("Invalid root name length: {}", name.len())));
        }

        let mut roots = self.roots.write();
        let current = roots.get(name).copied();
        if current != expected {
            warn!(root = name, ?expected, ?current, "root moved concurrently");
            return Err(Error::RootConflict {
                name: name.to_string(),
            });
        }
        roots.insert(name.to_string(), new);
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    /// List all named roots, sorted by name
    pub fn list_roots(&self) -> Vec<(String, Hash)> {
        let mut roots: Vec<_> = self
            .roots
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        roots.sort();
        roots
    }

    /// Get the number of blocks in the store
    pub fn block_count(&self) -> usize {
        self.index.read().len()
    }

    /// Flush the index and root table to disk
    ///
    /// The tables are appended and made durable before the header is
    /// rewritten to point at them.
    pub fn sync(&self) -> Result<()> {
        let index = self.index.read();
        let roots = self.roots.read();
        let mut write_offset = self.write_offset.write();
        let mut file = self.file.write();
        if !self.dirty.load(Ordering::Acquire) {
            return Ok(());
        }

        let index_offset = *write_offset;
        let roots_offset = index_offset + (index.len() * INDEX_ENTRY_SIZE) as u64;

        file.seek(SeekFrom::Start(index_offset))?;

        // Sort by hash for determinism
        let mut entries: Vec<_> = index.iter().collect();
        entries.sort_by_key(|(h, _)| **h);

        for (hash, entry) in entries {
            file.write_all(hash.as_bytes())?;
            file.write_all(&entry.offset.to_le_bytes())?;
            file.write_all(&entry.size.to_le_bytes())?;
        }

        let mut root_list: Vec<_> = roots.iter().collect();
        root_list.sort_by_key(|(name, _)| *name);

        for (name, hash) in root_list {
            let name_bytes = name.as_bytes();
            file.write_all(&(name_bytes.len() as u16).to_le_bytes())?;
            file.write_all(name_bytes)?;
            file.write_all(hash.as_bytes())?;
        }

        let end = file.stream_position()?;
        file.sync_all()?;

        file.seek(SeekFrom::Start(16))?;
        file.write_all(&(index.len() as u64).to_le_bytes())?;
        file.write_all(&index_offset.to_le_bytes())?;
        file.write_all(&roots_offset.to_le_bytes())?;
        file.write_all(&(roots.len() as u64).to_le_bytes())?;
        file.sync_all()?;

        *write_offset = end;
        self.dirty.store(false, Ordering::Release);
        debug!(
            blocks = index.len(),
            roots = roots.len(),
            index_offset,
            "synced block store"
        );
        Ok(())
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BlockStore for FileStore {
    fn put(&self, data: &[u8]) -> Result<Hash> {
        let hash = Hash::digest(data);

        if self.index.read().contains_key(&hash) {
            return Ok(hash);
        }

        let compressed = zstd::encode_all(data, COMPRESSION_LEVEL)?;
        let size = u32::try_from(compressed.len())
            .map_err(|_| Error::StorageUnavailable(format!("Block too large: {} bytes", data.len())))?;

        let offset = {
            let mut write_offset = self.write_offset.write();
            let offset = *write_offset;

            let mut file = self.file.write();
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(&compressed)?;

            *write_offset = offset + size as u64;
            offset
        };

        let mut index = self.index.write();
        index.insert(hash, IndexEntry { offset, size });
        self.dirty.store(true, Ordering::Release);
        Ok(hash)
    }

    fn get(&self, hash: &Hash) -> Result<Option<Vec<u8>>> {
        let entry = match self.index.read().get(hash).copied() {
            Some(entry) => entry,
            None => return Ok(None),
        };

        let mut compressed = vec![0u8; entry.size as usize];
        {
            let mut file = self.file.write();
            file.seek(SeekFrom::Start(entry.offset))?;
            file.read_exact(&mut compressed)?;
        }

        let data = zstd::decode_all(compressed.as_slice())?;
        if Hash::digest(&data) != *hash {
            return Err(Error::Corruption(format!(
                "Block {} does not match its hash",
                hash.short()
            )));
        }
        Ok(Some(data))
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        // Best-effort sync on drop
        let _ = self.sync();
    }
}
