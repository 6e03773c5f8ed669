//! Diff between two trie versions

use crate::config::ChampConfig;
use crate::model::Hash;
use crate::store::BlockStore;
use crate::trie::{ChampNode, Engine, Payload};
use crate::Result;
use std::collections::BTreeMap;
use tracing::debug;

/// Type of change in a diff
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiffEntry {
    /// Key was added
    Added { key: Vec<u8>, new_hash: Hash },
    /// Key was removed
    Removed { key: Vec<u8>, old_hash: Hash },
    /// Key was modified
    Modified {
        key: Vec<u8>,
        old_hash: Hash,
        new_hash: Hash,
    },
}

impl DiffEntry {
    pub fn key(&self) -> &[u8] {
        match self {
            DiffEntry::Added { key, .. } => key,
            DiffEntry::Removed { key, .. } => key,
            DiffEntry::Modified { key, .. } => key,
        }
    }

    /// Value on the left (older) side
    pub fn left(&self) -> Option<Hash> {
        match self {
            DiffEntry::Added { .. } => None,
            DiffEntry::Removed { old_hash, .. } | DiffEntry::Modified { old_hash, .. } => {
                Some(*old_hash)
            }
        }
    }

    /// Value on the right (newer) side
    pub fn right(&self) -> Option<Hash> {
        match self {
            DiffEntry::Removed { .. } => None,
            DiffEntry::Added { new_hash, .. } | DiffEntry::Modified { new_hash, .. } => {
                Some(*new_hash)
            }
        }
    }
}

/// A diff between two trie versions, sorted by key
#[derive(Clone, Debug, Default)]
pub struct Diff {
    pub entries: Vec<DiffEntry>,
}

impl Diff {
    pub fn new(entries: Vec<DiffEntry>) -> Self {
        Diff { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn added_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, DiffEntry::Added { .. }))
            .count()
    }

    pub fn removed_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, DiffEntry::Removed { .. }))
            .count()
    }

    pub fn modified_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, DiffEntry::Modified { .. }))
            .count()
    }

    pub fn keys(&self) -> impl Iterator<Item = &[u8]> {
        self.entries.iter().map(|e| e.key())
    }
}

type Pair = (Vec<u8>, Hash);

/// Compute the changes that turn the trie at `left` into the trie at `right`
///
/// Subtrees with equal hashes are skipped without being loaded.
pub fn diff_roots<S: BlockStore + ?Sized>(
    store: &S,
    config: &ChampConfig,
    left: Hash,
    right: Hash,
) -> Result<Diff> {
    if left == right {
        return Ok(Diff::default());
    }
    config.validate()?;

    let engine = Engine::new(store, config);
    let mut entries = Vec::new();
    diff_nodes(
        &engine,
        Some(left),
        Some(right),
        Vec::new(),
        Vec::new(),
        0,
        &mut entries,
    )?;
    entries.sort_by(|a, b| a.key().cmp(b.key()));

    debug!(
        left = %left.short(),
        right = %right.short(),
        changes = entries.len(),
        "diff"
    );
    Ok(Diff::new(entries))
}

/// Diff two subtrees at `depth`
///
/// `left_extra` and `right_extra` hold inline entries from the level above
/// whose counterpart on the other side was a link; they are re-masked here.
fn diff_nodes<S: BlockStore + ?Sized>(
    engine: &Engine<'_, S>,
    left: Option<Hash>,
    right: Option<Hash>,
    left_extra: Vec<Pair>,
    right_extra: Vec<Pair>,
    depth: usize,
    out: &mut Vec<DiffEntry>,
) -> Result<()> {
    // Same subtree on both sides, only the pushed-down entries can differ
    if left == right {
        diff_pairs(left_extra, right_extra, out);
        return Ok(());
    }

    let left_node = engine.load_opt(left.as_ref())?;
    let right_node = engine.load_opt(right.as_ref())?;
    let mut left_extra = group_by_position(engine, left_extra, depth);
    let mut right_extra = group_by_position(engine, right_extra, depth);

    let end = [
        left_node.max_bit(),
        right_node.max_bit(),
        left_extra.keys().next_back().map_or(0, |p| p + 1),
        right_extra.keys().next_back().map_or(0, |p| p + 1),
    ]
    .into_iter()
    .max()
    .unwrap_or(0);

    for pos in 0..end {
        let (left_link, mut left_pairs) = split_position(&left_node, pos);
        let (right_link, mut right_pairs) = split_position(&right_node, pos);
        left_pairs.extend(left_extra.remove(&pos).unwrap_or_default());
        right_pairs.extend(right_extra.remove(&pos).unwrap_or_default());

        if left_link.is_some() || right_link.is_some() {
            diff_nodes(
                engine,
                left_link,
                right_link,
                left_pairs,
                right_pairs,
                depth + 1,
                out,
            )?;
        } else {
            diff_pairs(left_pairs, right_pairs, out);
        }
    }
    Ok(())
}

/// The link and inline entries a node holds at `pos`
fn split_position(node: &ChampNode, pos: usize) -> (Option<Hash>, Vec<Pair>) {
    match node.payload(pos) {
        Payload::Entry { key, value } => (None, vec![(key.to_vec(), value)]),
        Payload::Link(child) => (Some(child), Vec::new()),
        Payload::Empty => (None, Vec::new()),
    }
}

fn group_by_position<S: BlockStore + ?Sized>(
    engine: &Engine<'_, S>,
    pairs: Vec<Pair>,
    depth: usize,
) -> BTreeMap<usize, Vec<Pair>> {
    let mut grouped: BTreeMap<usize, Vec<Pair>> = BTreeMap::new();
    for (key, value) in pairs {
        let pos = engine.mask(&engine.digest(&key), depth);
        grouped.entry(pos).or_default().push((key, value));
    }
    grouped
}

fn diff_pairs(left: Vec<Pair>, right: Vec<Pair>, out: &mut Vec<DiffEntry>) {
    let mut right: BTreeMap<Vec<u8>, Hash> = right.into_iter().collect();
    for (key, old_hash) in left {
        match right.remove(&key) {
            None => out.push(DiffEntry::Removed { key, old_hash }),
            Some(new_hash) if new_hash != old_hash => out.push(DiffEntry::Modified {
                key,
                old_hash,
                new_hash,
            }),
            Some(_) => {}
        }
    }
    for (key, new_hash) in right {
        out.push(DiffEntry::Added { key, new_hash });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::KeyHashing;
    use crate::store::MemoryStore;
    use crate::trie::Champ;

    fn h(s: &str) -> Hash {
        Hash::digest(s.as_bytes())
    }

    #[test]
    fn test_diff_same_trees() {
        let store = MemoryStore::new();
        let config = ChampConfig::default();
        let mut champ = Champ::create(&store, &config).unwrap();
        champ.put(b"k", None, h("v")).unwrap();

        let diff = diff_roots(&store, &config, champ.root_hash(), champ.root_hash()).unwrap();
        assert!(diff.is_empty());
    }

    #[test]
    fn test_diff_empty_to_non_empty() {
        let store = MemoryStore::new();
        let config = ChampConfig::default();
        let mut champ = Champ::create(&store, &config).unwrap();
        let empty = champ.root_hash();
        for i in 0..200u32 {
            champ.put(format!("key-{i}").as_bytes(), None, h(&i.to_string())).unwrap();
        }

        let added = diff_roots(&store, &config, empty, champ.root_hash()).unwrap();
        assert_eq!(added.added_count(), 200);
        assert_eq!(added.removed_count(), 0);
        let keys: Vec<_> = added.keys().collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]));

        let removed = diff_roots(&store, &config, champ.root_hash(), empty).unwrap();
        assert_eq!(removed.removed_count(), 200);
        assert_eq!(removed.added_count(), 0);
    }

    #[test]
    fn test_diff_modification() {
        let store = MemoryStore::new();
        let config = ChampConfig::default();
        let mut champ = Champ::create(&store, &config).unwrap();
        champ.put(b"a", None, h("1")).unwrap();
        champ.put(b"b", None, h("2")).unwrap();
        let before = champ.root_hash();

        champ.put(b"a", Some(h("1")), h("1b")).unwrap();
        champ.remove(b"b", Some(h("2"))).unwrap();
        champ.put(b"c", None, h("3")).unwrap();

        let diff = diff_roots(&store, &config, before, champ.root_hash()).unwrap();
        assert_eq!(
            diff.entries,
            vec![
                DiffEntry::Modified {
                    key: b"a".to_vec(),
                    old_hash: h("1"),
                    new_hash: h("1b"),
                },
                DiffEntry::Removed {
                    key: b"b".to_vec(),
                    old_hash: h("2"),
                },
                DiffEntry::Added {
                    key: b"c".to_vec(),
                    new_hash: h("3"),
                },
            ]
        );
        assert_eq!(diff.entries[0].left(), Some(h("1")));
        assert_eq!(diff.entries[2].left(), None);
        assert_eq!(diff.entries[1].right(), None);
    }

    #[test]
    fn test_diff_inline_entry_against_link() {
        let store = MemoryStore::new();
        let config = ChampConfig::default()
            .with_bit_width(4)
            .with_key_hashing(KeyHashing::Identity);
        let mut champ = Champ::create(&store, &config).unwrap();

        champ.put(&[0x13], None, h("a")).unwrap();
        let inline = champ.root_hash();

        // Pushes [0x13] one level down, next to [0xf3] at position 15
        champ.put(&[0xf3], None, h("b")).unwrap();
        let linked = champ.root_hash();

        let diff = diff_roots(&store, &config, inline, linked).unwrap();
        assert_eq!(
            diff.entries,
            vec![DiffEntry::Added {
                key: vec![0xf3],
                new_hash: h("b"),
            }]
        );

        let back = diff_roots(&store, &config, linked, inline).unwrap();
        assert_eq!(back.removed_count(), 1);
        assert_eq!(back.len(), 1);
    }

    #[test]
    fn test_diff_skips_shared_subtrees() {
        let store = MemoryStore::new();
        let config = ChampConfig::default();
        let mut champ = Champ::create(&store, &config).unwrap();
        for i in 0..500u32 {
            champ.put(&i.to_be_bytes(), None, h(&i.to_string())).unwrap();
        }
        let before = champ.root_hash();
        champ.put(b"extra", None, h("x")).unwrap();

        // Everything off the changed path must be pruned, not loaded
        let engine = Engine::new(&store, &config);
        let old_links: Vec<Hash> = engine.load(&before).unwrap().links().collect();
        for link in old_links.iter().filter(|l| champ.root().links().any(|n| n == **l)) {
            store.forget(link);
        }

        let diff = diff_roots(&store, &config, before, champ.root_hash()).unwrap();
        assert_eq!(diff.len(), 1);
        assert_eq!(diff.entries[0].key(), b"extra");
    }
}
