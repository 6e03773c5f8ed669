//! Fixed-size bitmaps and rank arithmetic for node slot lookup

use crate::{Error, Result};
use std::fmt;

const WORDS: usize = 4;

/// A 256-bit bitmap, enough for bit widths up to 8
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Bitmap([u64; WORDS]);

impl Bitmap {
    /// Number of addressable positions
    pub const CAPACITY: usize = WORDS * 64;

    pub const EMPTY: Bitmap = Bitmap([0; WORDS]);

    /// A bitmap with only `pos` set
    pub fn single(pos: usize) -> Self {
        Bitmap::EMPTY.with(pos)
    }

    pub fn get(&self, pos: usize) -> bool {
        debug_assert!(pos < Self::CAPACITY);
        self.0[pos / 64] & (1 << (pos % 64)) != 0
    }

    /// Copy with `pos` set
    pub fn with(mut self, pos: usize) -> Self {
        self.0[pos / 64] |= 1 << (pos % 64);
        self
    }

    /// Copy with `pos` cleared
    pub fn without(mut self, pos: usize) -> Self {
        self.0[pos / 64] &= !(1 << (pos % 64));
        self
    }

    pub fn count_ones(&self) -> usize {
        self.0.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|w| *w == 0)
    }

    /// Number of set bits strictly below `pos`.
    ///
    /// Popcounts whole words, then the partial word, so the cost depends on
    /// the word count rather than the bit width.
    pub fn rank(&self, pos: usize) -> usize {
        let word = pos / 64;
        let below: usize = self.0[..word.min(WORDS)]
            .iter()
            .map(|w| w.count_ones() as usize)
            .sum();
        if word >= WORDS {
            return below;
        }
        let partial = self.0[word] & ((1u64 << (pos % 64)) - 1);
        below + partial.count_ones() as usize
    }

    /// One past the highest set bit, 0 if empty
    pub fn len(&self) -> usize {
        for (i, w) in self.0.iter().enumerate().rev() {
            if *w != 0 {
                return i * 64 + (64 - w.leading_zeros() as usize);
            }
        }
        0
    }

    pub fn is_disjoint(&self, other: &Bitmap) -> bool {
        self.0.iter().zip(other.0.iter()).all(|(a, b)| a & b == 0)
    }

    /// Set positions in ascending order
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len()).filter(move |pos| self.get(*pos))
    }

    /// Minimal little-endian byte form (trailing zero bytes dropped)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes: Vec<u8> = self.0.iter().flat_map(|w| w.to_le_bytes()).collect();
        while bytes.last() == Some(&0) {
            bytes.pop();
        }
        bytes
    }

    /// Parse the byte form produced by [`Bitmap::to_bytes`]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > WORDS * 8 {
            return Err(Error::Corruption(format!(
                "Bitmap of {} bytes exceeds {} bits",
                bytes.len(),
                Self::CAPACITY
            )));
        }
        if bytes.last() == Some(&0) {
            return Err(Error::Corruption("Bitmap has trailing zero bytes".into()));
        }
        let mut words = [0u64; WORDS];
        for (i, byte) in bytes.iter().enumerate() {
            words[i / 8] |= (*byte as u64) << ((i % 8) * 8);
        }
        Ok(Bitmap(words))
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.ones()).finish()
    }
}
