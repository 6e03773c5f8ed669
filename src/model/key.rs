//! Key digests and per-level slot selection

use serde::{Deserialize, Serialize};

/// Length of a key digest in bytes
pub const DIGEST_LEN: usize = 32;

/// How keys are mapped to the digest that drives trie placement
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyHashing {
    /// BLAKE3 of the key bytes
    #[default]
    Blake3,
    /// The first 32 key bytes, zero padded
    ///
    /// Only suitable for keys that are already uniformly distributed.
    Identity,
}

impl KeyHashing {
    /// Compute the digest of a key
    pub fn digest(&self, key: &[u8]) -> KeyDigest {
        match self {
            KeyHashing::Blake3 => KeyDigest(*blake3::hash(key).as_bytes()),
            KeyHashing::Identity => {
                let mut bytes = [0u8; DIGEST_LEN];
                let n = key.len().min(DIGEST_LEN);
                bytes[..n].copy_from_slice(&key[..n]);
                KeyDigest(bytes)
            }
        }
    }
}

/// Fixed-length digest of a key
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyDigest([u8; DIGEST_LEN]);

impl KeyDigest {
    /// Slot position selected at `depth`.
    ///
    /// Consumes `bit_width` bits starting at bit `depth * bit_width`, least
    /// significant bit of each byte first. Bits past the end read as zero.
    pub fn mask(&self, depth: usize, bit_width: u8) -> usize {
        let start = depth * bit_width as usize;
        let mut pos = 0usize;
        for i in 0..bit_width as usize {
            let bit = start + i;
            let byte = match self.0.get(bit / 8) {
                Some(b) => *b,
                None => break,
            };
            pos |= (((byte >> (bit % 8)) & 1) as usize) << i;
        }
        pos
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }
}

/// Printable form of a key: UTF-8 text when valid, hex otherwise
pub fn key_label(key: &[u8]) -> String {
    match std::str::from_utf8(key) {
        Ok(s) => s.to_string(),
        Err(_) => hex::encode(key),
    }
}

/// Number of levels before a digest is exhausted
pub fn max_depth(bit_width: u8) -> usize {
    (DIGEST_LEN * 8).div_ceil(bit_width as usize)
}
