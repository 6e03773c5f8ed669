//! Lookup and copy-on-write mutation over nodes held in a block store
//!
//! Mutations walk from the root down to the slot selected by the key's
//! digest, then write one new node per level on the way back up. A level
//! whose child hash did not change is returned as-is, so no-op updates write
//! nothing.

use super::codec;
use super::node::{ChampNode, Payload};
use crate::config::ChampConfig;
use crate::model::{key_label, max_depth, Hash, KeyDigest, KeyHashing};
use crate::store::BlockStore;
use crate::{Error, Result};
use tracing::trace;

/// Reads, writes and rewrites nodes for one trie layout
pub struct Engine<'a, S: BlockStore + ?Sized> {
    store: &'a S,
    bit_width: u8,
    key_hashing: KeyHashing,
}

impl<'a, S: BlockStore + ?Sized> Engine<'a, S> {
    pub fn new(store: &'a S, config: &ChampConfig) -> Self {
        Engine {
            store,
            bit_width: config.bit_width,
            key_hashing: config.key_hashing,
        }
    }

    pub fn store(&self) -> &'a S {
        self.store
    }

    pub fn digest(&self, key: &[u8]) -> KeyDigest {
        self.key_hashing.digest(key)
    }

    pub fn mask(&self, digest: &KeyDigest, depth: usize) -> usize {
        digest.mask(depth, self.bit_width)
    }

    /// Fetch a node; a missing block is a corrupt reference, never empty
    pub fn load(&self, hash: &Hash) -> Result<ChampNode> {
        trace!(node = %hash.short(), "load node");
        let bytes = self
            .store
            .get(hash)?
            .ok_or(Error::CorruptReference(*hash))?;
        codec::decode(&bytes)
    }

    /// Fetch a node, treating an absent link as the empty node
    pub fn load_opt(&self, hash: Option<&Hash>) -> Result<ChampNode> {
        match hash {
            Some(hash) => self.load(hash),
            None => Ok(ChampNode::empty()),
        }
    }

    /// Encode and write a node, returning its content hash
    pub fn persist(&self, node: &ChampNode) -> Result<Hash> {
        let hash = self.store.put(&codec::encode(node)?)?;
        trace!(node = %hash.short(), slots = node.contents().len(), "persist node");
        Ok(hash)
    }

    // === Lookup ===

    pub fn get(&self, root: &ChampNode, key: &[u8]) -> Result<Option<Hash>> {
        let digest = self.digest(key);
        self.get_at(root, key, &digest, 0)
    }

    fn get_at(
        &self,
        node: &ChampNode,
        key: &[u8],
        digest: &KeyDigest,
        depth: usize,
    ) -> Result<Option<Hash>> {
        match node.payload(self.mask(digest, depth)) {
            // Only one entry can live at a position, no need to look further
            Payload::Entry { key: k, value } => Ok((k == key).then_some(value)),
            Payload::Link(child) => self.get_at(&self.load(&child)?, key, digest, depth + 1),
            Payload::Empty => Ok(None),
        }
    }

    // === Insert / update ===

    /// Set `key` to `value` if its current value is `expected`
    #[allow(clippy::too_many_arguments)]
    pub fn put(
        &self,
        node: &ChampNode,
        node_hash: Hash,
        key: &[u8],
        digest: &KeyDigest,
        depth: usize,
        expected: Option<Hash>,
        value: Hash,
    ) -> Result<(ChampNode, Hash)> {
        let bitpos = self.mask(digest, depth);

        let updated = match node.payload(bitpos) {
            Payload::Entry {
                key: current_key,
                value: current,
            } if current_key == key => {
                if expected != Some(current) {
                    return Err(conflict(key, expected, Some(current)));
                }
                if current == value {
                    return Ok((node.clone(), node_hash));
                }
                node.copy_and_set_value(bitpos, value)
            }
            Payload::Entry {
                key: other_key,
                value: other_value,
            } => {
                if expected.is_some() {
                    return Err(conflict(key, expected, None));
                }
                let other_digest = self.digest(other_key);
                let child = self.merge_two_key_value_pairs(
                    (other_key, &other_digest, other_value),
                    (key, digest, value),
                    depth + 1,
                )?;
                node.copy_and_migrate_from_inline_to_node(bitpos, child)
            }
            Payload::Link(child_hash) => {
                let child = self.load(&child_hash)?;
                let (_, new_child_hash) =
                    self.put(&child, child_hash, key, digest, depth + 1, expected, value)?;
                if new_child_hash == child_hash {
                    return Ok((node.clone(), node_hash));
                }
                node.copy_and_set_node(bitpos, new_child_hash)
            }
            Payload::Empty => {
                if expected.is_some() {
                    return Err(conflict(key, expected, None));
                }
                node.copy_and_insert_value(bitpos, key.to_vec(), value)
            }
        };

        let hash = self.persist(&updated)?;
        Ok((updated, hash))
    }

    /// Build the subtree holding two keys that collide above `depth`
    fn merge_two_key_value_pairs(
        &self,
        first: (&[u8], &KeyDigest, Hash),
        second: (&[u8], &KeyDigest, Hash),
        depth: usize,
    ) -> Result<Hash> {
        if depth >= max_depth(self.bit_width) {
            return Err(Error::HashCollisionOverflow { depth });
        }

        let first_pos = self.mask(first.1, depth);
        let second_pos = self.mask(second.1, depth);

        let node = if first_pos != second_pos {
            ChampNode::two_entries(
                (first_pos, first.0.to_vec(), first.2),
                (second_pos, second.0.to_vec(), second.2),
            )
        } else {
            let child = self.merge_two_key_value_pairs(first, second, depth + 1)?;
            ChampNode::single_link(first_pos, child)
        };
        self.persist(&node)
    }

    // === Remove ===

    /// Remove `key` if its current value is `expected`
    ///
    /// A key that is not present leaves the node untouched.
    pub fn remove(
        &self,
        node: &ChampNode,
        node_hash: Hash,
        key: &[u8],
        digest: &KeyDigest,
        depth: usize,
        expected: Option<Hash>,
    ) -> Result<(ChampNode, Hash)> {
        let bitpos = self.mask(digest, depth);

        let updated = match node.payload(bitpos) {
            Payload::Entry {
                key: current_key,
                value: current,
            } if current_key == key => {
                if expected != Some(current) {
                    return Err(conflict(key, expected, Some(current)));
                }
                if node.data_len() == 2 && node.node_len() == 0 {
                    self.collapse_pair(node, bitpos, depth)
                } else {
                    node.copy_and_remove_value(bitpos)
                }
            }
            Payload::Entry { .. } | Payload::Empty => return Ok((node.clone(), node_hash)),
            Payload::Link(child_hash) => {
                let child = self.load(&child_hash)?;
                let (new_child, new_child_hash) =
                    self.remove(&child, child_hash, key, digest, depth + 1, expected)?;
                if new_child_hash == child_hash {
                    return Ok((node.clone(), node_hash));
                }

                if new_child.is_empty() {
                    return Err(Error::Corruption(format!(
                        "Sub-node {} emptied by a single removal",
                        child_hash.short()
                    )));
                }

                let inline = new_child.sole_entry().map(|(k, v)| (k.to_vec(), v));
                match inline {
                    // Nothing else here, hand the singleton further up
                    Some(_) if node.data_len() == 0 && node.node_len() == 1 => {
                        return Ok((new_child, new_child_hash));
                    }
                    Some((k, v)) => node.copy_and_migrate_from_node_to_inline(bitpos, k, v),
                    None => node.copy_and_set_node(bitpos, new_child_hash),
                }
            }
        };

        let hash = self.persist(&updated)?;
        Ok((updated, hash))
    }

    /// Shrink a two-entry leaf node to the entry that is not at `bitpos`.
    ///
    /// Below the root the survivor is placed at its depth-0 position: the
    /// parent either inlines it, or escalates it to become the root.
    fn collapse_pair(&self, node: &ChampNode, bitpos: usize, depth: usize) -> ChampNode {
        let survivor = node.copy_and_remove_value(bitpos);
        if depth == 0 {
            return survivor;
        }
        let relocated = survivor.sole_entry().map(|(k, v)| {
            let root_pos = self.mask(&self.digest(k), 0);
            ChampNode::single_entry(root_pos, k.to_vec(), v)
        });
        relocated.unwrap_or(survivor)
    }

    // === Enumeration ===

    /// Count every entry reachable from `node`
    pub fn size(&self, node: &ChampNode) -> Result<u64> {
        let mut total = node.data_len() as u64;
        for child in node.links() {
            total += self.size(&self.load(&child)?)?;
        }
        Ok(total)
    }

    /// Collect every entry reachable from `node`
    pub fn collect_entries(&self, node: &ChampNode, out: &mut Vec<(Vec<u8>, Hash)>) -> Result<()> {
        out.extend(node.entries().map(|(k, v)| (k.to_vec(), v)));
        for child in node.links() {
            self.collect_entries(&self.load(&child)?, out)?;
        }
        Ok(())
    }
}

fn conflict(key: &[u8], expected: Option<Hash>, actual: Option<Hash>) -> Error {
    Error::Conflict {
        key: key_label(key),
        expected,
        actual,
    }
}
