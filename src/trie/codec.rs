//! Node wire format
//!
//! A node is encoded with bincode as the record
//! `[data_map_bytes, node_map_bytes, [[key?, value?], ...]]`, slots in
//! front-then-back order. Inline entries carry both key and value hash;
//! links carry only the child hash.

use super::bitmap::Bitmap;
use super::node::{ChampNode, Slot};
use crate::model::Hash;
use crate::{Error, Result};
use bincode::Options;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
struct WireNode {
    data_map: Vec<u8>,
    node_map: Vec<u8>,
    contents: Vec<(Option<Vec<u8>>, Option<Hash>)>,
}

/// Fixed-width integers, and nothing may follow the record, so every node
/// has exactly one accepted encoding
fn wire_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

/// Serialize a node to its block bytes
pub fn encode(node: &ChampNode) -> Result<Vec<u8>> {
    let wire = WireNode {
        data_map: node.data_map().to_bytes(),
        node_map: node.node_map().to_bytes(),
        contents: node
            .contents()
            .iter()
            .map(|slot| match slot {
                Slot::Entry { key, value } => (Some(key.clone()), Some(*value)),
                Slot::Link(child) => (None, Some(*child)),
            })
            .collect(),
    };
    Ok(wire_options().serialize(&wire)?)
}

/// Parse block bytes into a node, rejecting malformed layouts
pub fn decode(bytes: &[u8]) -> Result<ChampNode> {
    let wire: WireNode = wire_options().deserialize(bytes)?;

    let contents = wire
        .contents
        .into_iter()
        .map(|pair| match pair {
            (Some(key), Some(value)) => Ok(Slot::Entry { key, value }),
            (None, Some(child)) => Ok(Slot::Link(child)),
            (_, None) => Err(Error::Corruption("Slot without a value reference".into())),
        })
        .collect::<Result<Vec<_>>>()?;

    ChampNode::from_parts(
        Bitmap::from_bytes(&wire.data_map)?,
        Bitmap::from_bytes(&wire.node_map)?,
        contents,
    )
}

/// Content hash a node would be stored under
pub fn content_hash(node: &ChampNode) -> Result<Hash> {
    Ok(Hash::digest(&encode(node)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(s: &str) -> Hash {
        Hash::digest(s.as_bytes())
    }

    fn mixed_node() -> ChampNode {
        ChampNode::single_link(200, h("child-a"))
            .copy_and_insert_value(3, b"three".to_vec(), h("3"))
            .copy_and_insert_value(17, b"seventeen".to_vec(), h("17"))
            .copy_and_insert_value(9, b"nine".to_vec(), h("9"))
            .copy_and_migrate_from_inline_to_node(9, h("child-b"))
    }

    #[test]
    fn test_roundtrip() {
        for node in [ChampNode::empty(), mixed_node()] {
            let bytes = encode(&node).unwrap();
            assert_eq!(decode(&bytes).unwrap(), node);
        }
    }

    #[test]
    fn test_encoding_is_deterministic() {
        assert_eq!(encode(&mixed_node()).unwrap(), encode(&mixed_node()).unwrap());
        assert_ne!(
            content_hash(&mixed_node()).unwrap(),
            content_hash(&ChampNode::empty()).unwrap()
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode(b"not a node").is_err());
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let mut bytes = encode(&mixed_node()).unwrap();
        bytes.push(0);
        assert!(matches!(decode(&bytes), Err(Error::Serialization(_))));
    }

    #[test]
    fn test_encoding_matches_plain_bincode_layout() {
        let wire = WireNode {
            data_map: vec![],
            node_map: vec![],
            contents: vec![],
        };
        assert_eq!(encode(&ChampNode::empty()).unwrap(), bincode::serialize(&wire).unwrap());
    }

    #[test]
    fn test_decode_rejects_slot_without_value() {
        let wire = WireNode {
            data_map: vec![1],
            node_map: vec![],
            contents: vec![(Some(b"k".to_vec()), None)],
        };
        let bytes = bincode::serialize(&wire).unwrap();
        assert!(matches!(decode(&bytes), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_decode_rejects_count_mismatch() {
        let wire = WireNode {
            data_map: vec![0b11],
            node_map: vec![],
            contents: vec![(Some(b"k".to_vec()), Some(h("v")))],
        };
        let bytes = bincode::serialize(&wire).unwrap();
        assert!(matches!(decode(&bytes), Err(Error::Corruption(_))));
    }
}
