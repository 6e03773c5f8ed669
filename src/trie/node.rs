//! CHAMP node and its copy-on-write transforms
//!
//! A node splits its slot array in two regions: inline entries at the front
//! in ascending bit order, child links at the back in descending bit order.
//! Every transform returns a new node; nothing is modified in place.

use super::bitmap::Bitmap;
use crate::model::Hash;
use crate::{Error, Result};

/// One slot of a node
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Slot {
    /// An inline key and the hash of its value block
    Entry { key: Vec<u8>, value: Hash },
    /// A link to a child node (a shard)
    Link(Hash),
}

/// What a node holds at a bit position
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Payload<'a> {
    Entry { key: &'a [u8], value: Hash },
    Link(Hash),
    Empty,
}

/// An immutable CHAMP node
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChampNode {
    data_map: Bitmap,
    node_map: Bitmap,
    contents: Vec<Slot>,
}

impl ChampNode {
    /// The empty node, only valid as a root
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a node from its parts, checking the layout invariants
    pub fn from_parts(data_map: Bitmap, node_map: Bitmap, contents: Vec<Slot>) -> Result<Self> {
        let node = ChampNode {
            data_map,
            node_map,
            contents,
        };
        node.validate()?;
        Ok(node)
    }

    /// A node holding a single inline entry at `bitpos`
    pub fn single_entry(bitpos: usize, key: Vec<u8>, value: Hash) -> Self {
        ChampNode {
            data_map: Bitmap::single(bitpos),
            node_map: Bitmap::EMPTY,
            contents: vec![Slot::Entry { key, value }],
        }
    }

    /// A node holding two inline entries at distinct positions
    pub fn two_entries(first: (usize, Vec<u8>, Hash), second: (usize, Vec<u8>, Hash)) -> Self {
        let (a, b) = if first.0 < second.0 {
            (first, second)
        } else {
            (second, first)
        };
        ChampNode {
            data_map: Bitmap::single(a.0).with(b.0),
            node_map: Bitmap::EMPTY,
            contents: vec![
                Slot::Entry { key: a.1, value: a.2 },
                Slot::Entry { key: b.1, value: b.2 },
            ],
        }
    }

    /// A node holding a single child link at `bitpos`
    pub fn single_link(bitpos: usize, child: Hash) -> Self {
        ChampNode {
            data_map: Bitmap::EMPTY,
            node_map: Bitmap::single(bitpos),
            contents: vec![Slot::Link(child)],
        }
    }

    pub fn data_map(&self) -> Bitmap {
        self.data_map
    }

    pub fn node_map(&self) -> Bitmap {
        self.node_map
    }

    pub fn contents(&self) -> &[Slot] {
        &self.contents
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    /// Number of inline entries
    pub fn data_len(&self) -> usize {
        self.data_map.count_ones()
    }

    /// Number of child links
    pub fn node_len(&self) -> usize {
        self.node_map.count_ones()
    }

    /// One past the highest occupied position
    pub fn max_bit(&self) -> usize {
        self.data_map.len().max(self.node_map.len())
    }

    fn data_index(&self, bitpos: usize) -> usize {
        self.data_map.rank(bitpos)
    }

    fn node_index(&self, bitpos: usize) -> usize {
        self.contents.len() - 1 - self.node_map.rank(bitpos)
    }

    /// What the node holds at `bitpos`
    pub fn payload(&self, bitpos: usize) -> Payload<'_> {
        if self.data_map.get(bitpos) {
            if let Slot::Entry { key, value } = &self.contents[self.data_index(bitpos)] {
                return Payload::Entry { key, value: *value };
            }
        } else if self.node_map.get(bitpos) {
            if let Slot::Link(hash) = &self.contents[self.node_index(bitpos)] {
                return Payload::Link(*hash);
            }
        }
        Payload::Empty
    }

    /// Inline entries in ascending bit order
    pub fn entries(&self) -> impl Iterator<Item = (&[u8], Hash)> {
        self.contents.iter().filter_map(|slot| match slot {
            Slot::Entry { key, value } => Some((key.as_slice(), *value)),
            Slot::Link(_) => None,
        })
    }

    /// The only entry, if the node holds exactly one entry and no links
    pub fn sole_entry(&self) -> Option<(&[u8], Hash)> {
        match self.contents.as_slice() {
            [Slot::Entry { key, value }] => Some((key.as_slice(), *value)),
            _ => None,
        }
    }

    /// Child links in slot order (descending bit order)
    pub fn links(&self) -> impl Iterator<Item = Hash> + '_ {
        self.contents.iter().filter_map(|slot| match slot {
            Slot::Link(hash) => Some(*hash),
            Slot::Entry { .. } => None,
        })
    }

    /// Replace the value of the entry at `bitpos`
    pub fn copy_and_set_value(&self, bitpos: usize, value: Hash) -> Self {
        let index = self.data_index(bitpos);
        let mut contents = self.contents.clone();
        if let Slot::Entry { value: v, .. } = &mut contents[index] {
            *v = value;
        }
        ChampNode {
            data_map: self.data_map,
            node_map: self.node_map,
            contents,
        }
    }

    /// Insert a new entry at the empty position `bitpos`
    pub fn copy_and_insert_value(&self, bitpos: usize, key: Vec<u8>, value: Hash) -> Self {
        let index = self.data_index(bitpos);
        let mut contents = Vec::with_capacity(self.contents.len() + 1);
        contents.extend_from_slice(&self.contents[..index]);
        contents.push(Slot::Entry { key, value });
        contents.extend_from_slice(&self.contents[index..]);
        ChampNode {
            data_map: self.data_map.with(bitpos),
            node_map: self.node_map,
            contents,
        }
    }

    /// Drop the entry at `bitpos`
    pub fn copy_and_remove_value(&self, bitpos: usize) -> Self {
        let index = self.data_index(bitpos);
        let mut contents = self.contents.clone();
        contents.remove(index);
        ChampNode {
            data_map: self.data_map.without(bitpos),
            node_map: self.node_map,
            contents,
        }
    }

    /// Point the link at `bitpos` to a new child
    pub fn copy_and_set_node(&self, bitpos: usize, child: Hash) -> Self {
        let index = self.node_index(bitpos);
        let mut contents = self.contents.clone();
        contents[index] = Slot::Link(child);
        ChampNode {
            data_map: self.data_map,
            node_map: self.node_map,
            contents,
        }
    }

    /// Replace the entry at `bitpos` with a link to `child`
    pub fn copy_and_migrate_from_inline_to_node(&self, bitpos: usize, child: Hash) -> Self {
        let old_index = self.data_index(bitpos);
        // Position in the back region once the entry has left the front
        let new_index = self.contents.len() - 1 - self.node_map.rank(bitpos);

        let mut contents = self.contents.clone();
        contents.remove(old_index);
        contents.insert(new_index, Slot::Link(child));
        ChampNode {
            data_map: self.data_map.without(bitpos),
            node_map: self.node_map.with(bitpos),
            contents,
        }
    }

    /// Replace the link at `bitpos` with an inline entry
    pub fn copy_and_migrate_from_node_to_inline(
        &self,
        bitpos: usize,
        key: Vec<u8>,
        value: Hash,
    ) -> Self {
        let old_index = self.node_index(bitpos);
        let new_index = self.data_index(bitpos);

        let mut contents = self.contents.clone();
        contents.remove(old_index);
        contents.insert(new_index, Slot::Entry { key, value });
        ChampNode {
            data_map: self.data_map.with(bitpos),
            node_map: self.node_map.without(bitpos),
            contents,
        }
    }

    /// Check the layout invariants
    pub fn validate(&self) -> Result<()> {
        if !self.data_map.is_disjoint(&self.node_map) {
            return Err(Error::Corruption(
                "data_map and node_map share a position".into(),
            ));
        }
        let data_len = self.data_len();
        if self.contents.len() != data_len + self.node_len() {
            return Err(Error::Corruption(format!(
                "Node has {} slots for {} positions",
                self.contents.len(),
                data_len + self.node_len()
            )));
        }
        for (i, slot) in self.contents.iter().enumerate() {
            let inline = matches!(slot, Slot::Entry { .. });
            if inline != (i < data_len) {
                return Err(Error::Corruption(format!(
                    "Slot {} is in the wrong region",
                    i
                )));
            }
        }
        Ok(())
    }
}
