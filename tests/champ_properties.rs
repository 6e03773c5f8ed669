//! Behavioural properties of the trie checked against randomized workloads
//!
//! Every workload is driven by a seeded `StdRng` and cross-checked against a
//! `BTreeMap` model, so failures are reproducible.

use champ_db::{
    diff_roots, merge_roots, BlockStore, Champ, ChampConfig, DiffEntry, Error, FileStore, Hash,
    KeyHashing, MemoryStore,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use tempfile::tempdir;

fn h(s: &str) -> Hash {
    Hash::digest(s.as_bytes())
}

/// Random key of at most 24 bytes with a non-zero last byte, so distinct
/// keys never share an identity digest
fn random_key(rng: &mut StdRng) -> Vec<u8> {
    let len = rng.gen_range(0..24);
    let mut key: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
    key.push(rng.gen_range(1..=255));
    key
}

fn configs() -> Vec<ChampConfig> {
    vec![
        ChampConfig::default(),
        ChampConfig::default().with_bit_width(1),
        ChampConfig::default().with_bit_width(3),
        ChampConfig::default().with_bit_width(8),
        ChampConfig::default()
            .with_bit_width(4)
            .with_key_hashing(KeyHashing::Identity),
    ]
}

fn build(store: &MemoryStore, config: &ChampConfig, pairs: &[(Vec<u8>, Hash)]) -> Hash {
    let mut champ = Champ::create(store, config).unwrap();
    for (key, value) in pairs {
        champ.put(key, None, *value).unwrap();
    }
    champ.root_hash()
}

#[test]
fn test_random_workload_matches_model() {
    for config in configs() {
        let mut rng = StdRng::seed_from_u64(7);
        let store = MemoryStore::new();
        let mut champ = Champ::create(&store, &config).unwrap();
        let mut model: BTreeMap<Vec<u8>, Hash> = BTreeMap::new();
        let mut keys: Vec<Vec<u8>> = Vec::new();

        for step in 0..2000u32 {
            let reuse = !keys.is_empty() && rng.gen_bool(0.5);
            let key = if reuse {
                keys.choose(&mut rng).unwrap().clone()
            } else {
                let key = random_key(&mut rng);
                keys.push(key.clone());
                key
            };
            let current = model.get(&key).copied();

            if rng.gen_bool(0.3) {
                champ.remove(&key, current).unwrap();
                model.remove(&key);
            } else {
                let value = h(&step.to_string());
                champ.put(&key, current, value).unwrap();
                model.insert(key.clone(), value);
            }
            assert_eq!(champ.get(&key).unwrap(), model.get(&key).copied());
        }

        assert_eq!(champ.size().unwrap(), model.len() as u64);
        let expected: Vec<_> = model.into_iter().collect();
        assert_eq!(champ.entries().unwrap(), expected);
    }
}

#[test]
fn test_insertion_order_does_not_matter() {
    for config in configs() {
        let mut rng = StdRng::seed_from_u64(11);
        let store = MemoryStore::new();
        let mut pairs: Vec<_> = (0..300)
            .map(|i| (random_key(&mut rng), h(&format!("v{i}"))))
            .collect();
        pairs.sort();
        pairs.dedup_by(|a, b| a.0 == b.0);

        let first = build(&store, &config, &pairs);
        pairs.shuffle(&mut rng);
        let second = build(&store, &config, &pairs);
        pairs.reverse();
        let third = build(&store, &config, &pairs);

        assert_eq!(first, second);
        assert_eq!(first, third);
    }
}

#[test]
fn test_insert_then_remove_restores_root() {
    for config in configs() {
        let mut rng = StdRng::seed_from_u64(23);
        let store = MemoryStore::new();
        let mut champ = Champ::create(&store, &config).unwrap();
        let mut roots = vec![champ.root_hash()];
        let mut keys = Vec::new();

        for i in 0..200 {
            let key = random_key(&mut rng);
            if champ.get(&key).unwrap().is_some() {
                continue;
            }
            champ.put(&key, None, h(&format!("v{i}"))).unwrap();
            keys.push((key, h(&format!("v{i}"))));
            roots.push(champ.root_hash());
        }

        // Undo in reverse order, every intermediate root must reappear
        while let Some((key, value)) = keys.pop() {
            roots.pop();
            champ.remove(&key, Some(value)).unwrap();
            assert_eq!(Some(&champ.root_hash()), roots.last());
        }
        assert_eq!(champ.size().unwrap(), 0);
    }
}

#[test]
fn test_abc_scenario() {
    let store = MemoryStore::new();
    let config = ChampConfig::default();
    let mut champ = Champ::create(&store, &config).unwrap();

    champ.put(b"a", None, h("A")).unwrap();
    champ.put(b"b", None, h("B")).unwrap();
    champ.put(b"c", None, h("C")).unwrap();

    assert_eq!(champ.get(b"a").unwrap(), Some(h("A")));
    assert_eq!(champ.get(b"b").unwrap(), Some(h("B")));
    assert_eq!(champ.get(b"c").unwrap(), Some(h("C")));
    assert_eq!(champ.size().unwrap(), 3);

    champ.remove(b"b", Some(h("B"))).unwrap();
    assert_eq!(champ.get(b"b").unwrap(), None);
    assert_eq!(champ.size().unwrap(), 2);

    // Rebuilding the same content elsewhere gives a bit-identical root
    let fresh = MemoryStore::new();
    let ac = build(
        &fresh,
        &config,
        &[(b"a".to_vec(), h("A")), (b"c".to_vec(), h("C"))],
    );
    assert_eq!(champ.root_hash(), ac);
}

#[test]
fn test_idempotent_puts_write_nothing() {
    let mut rng = StdRng::seed_from_u64(3);
    let store = MemoryStore::new();
    let config = ChampConfig::default().with_bit_width(2);
    let mut champ = Champ::create(&store, &config).unwrap();
    let mut pairs = Vec::new();
    for i in 0..400 {
        let key = random_key(&mut rng);
        if champ.get(&key).unwrap().is_none() {
            champ.put(&key, None, h(&i.to_string())).unwrap();
            pairs.push((key, h(&i.to_string())));
        }
    }

    let root = champ.root_hash();
    let writes = store.put_count();
    for (key, value) in &pairs {
        champ.put(key, Some(*value), *value).unwrap();
    }
    assert_eq!(champ.root_hash(), root);
    assert_eq!(store.put_count(), writes);
}

#[test]
fn test_failed_cas_has_no_effect() {
    let store = MemoryStore::new();
    let mut champ = Champ::create(&store, &ChampConfig::default()).unwrap();
    for i in 0..100u32 {
        champ.put(&i.to_le_bytes(), None, h(&i.to_string())).unwrap();
    }

    let root = champ.root_hash();
    let writes = store.put_count();
    for i in 0..100u32 {
        let key = i.to_le_bytes();
        assert!(matches!(
            champ.put(&key, Some(h("stale")), h("new")),
            Err(Error::Conflict { .. })
        ));
        assert!(matches!(
            champ.remove(&key, None),
            Err(Error::Conflict { .. })
        ));
    }
    assert_eq!(champ.root_hash(), root);
    assert_eq!(store.put_count(), writes);
}

#[test]
fn test_random_diff_matches_model() {
    for config in configs() {
        let mut rng = StdRng::seed_from_u64(41);
        let store = MemoryStore::new();
        let mut champ = Champ::create(&store, &config).unwrap();
        let mut model: BTreeMap<Vec<u8>, Hash> = BTreeMap::new();
        for i in 0..300 {
            let key = random_key(&mut rng);
            let value = h(&format!("base{i}"));
            let current = model.insert(key.clone(), value);
            champ.put(&key, current, value).unwrap();
        }
        let left = champ.root_hash();
        let left_model = model.clone();

        let keys: Vec<_> = model.keys().cloned().collect();
        for (i, key) in keys.iter().enumerate() {
            match rng.gen_range(0..4) {
                0 => {
                    let old = model.remove(key);
                    champ.remove(key, old).unwrap();
                }
                1 => {
                    let value = h(&format!("changed{i}"));
                    let old = model.insert(key.clone(), value);
                    champ.put(key, old, value).unwrap();
                }
                _ => {}
            }
        }
        for i in 0..50 {
            let key = random_key(&mut rng);
            if model.contains_key(&key) {
                continue;
            }
            let value = h(&format!("added{i}"));
            model.insert(key.clone(), value);
            champ.put(&key, None, value).unwrap();
        }
        let right = champ.root_hash();

        let mut expected = Vec::new();
        let mut all: Vec<&Vec<u8>> = left_model.keys().chain(model.keys()).collect();
        all.sort();
        all.dedup();
        for key in all {
            match (left_model.get(key), model.get(key)) {
                (Some(&old_hash), None) => expected.push(DiffEntry::Removed {
                    key: key.clone(),
                    old_hash,
                }),
                (None, Some(&new_hash)) => expected.push(DiffEntry::Added {
                    key: key.clone(),
                    new_hash,
                }),
                (Some(&old_hash), Some(&new_hash)) if old_hash != new_hash => {
                    expected.push(DiffEntry::Modified {
                        key: key.clone(),
                        old_hash,
                        new_hash,
                    })
                }
                _ => {}
            }
        }

        let diff = diff_roots(&store, &config, left, right).unwrap();
        assert_eq!(diff.entries, expected);
        assert!(diff_roots(&store, &config, right, right).unwrap().is_empty());
    }
}

#[test]
fn test_random_disjoint_merge() {
    let mut rng = StdRng::seed_from_u64(97);
    let store = MemoryStore::new();
    let config = ChampConfig::default().with_bit_width(3);

    let base: Vec<_> = (0..200)
        .map(|i| (format!("base-{i}").into_bytes(), h(&format!("b{i}"))))
        .collect();
    let ancestor = build(&store, &config, &base);

    let mut local = Champ::load(&store, &config, ancestor).unwrap();
    let mut remote = Champ::load(&store, &config, ancestor).unwrap();
    let mut expected = Champ::load(&store, &config, ancestor).unwrap();

    for (i, (key, value)) in base.iter().enumerate() {
        let side = if i % 2 == 0 { &mut local } else { &mut remote };
        match rng.gen_range(0..3) {
            0 => {
                side.remove(key, Some(*value)).unwrap();
                expected.remove(key, Some(*value)).unwrap();
            }
            1 => {
                side.put(key, Some(*value), h("edited")).unwrap();
                expected.put(key, Some(*value), h("edited")).unwrap();
            }
            _ => {}
        }
    }
    for i in 0..40 {
        let key = format!("new-{i}").into_bytes();
        let side = if i % 2 == 0 { &mut local } else { &mut remote };
        side.put(&key, None, h("new")).unwrap();
        expected.put(&key, None, h("new")).unwrap();
    }

    let merged = merge_roots(
        &store,
        &config,
        ancestor,
        local.root_hash(),
        remote.root_hash(),
    )
    .unwrap();
    assert_eq!(merged, expected.root_hash());
}

#[test]
fn test_file_store_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("blocks.champ");
    let config = ChampConfig::default();
    let mut rng = StdRng::seed_from_u64(5);

    let (root, model) = {
        let store = FileStore::create(&path).unwrap();
        let mut champ = Champ::create(&store, &config).unwrap();
        let mut model = BTreeMap::new();
        for i in 0..500 {
            let key = random_key(&mut rng);
            let value = store.put(format!("value {i}").as_bytes()).unwrap();
            let current = model.insert(key.clone(), value);
            champ.put(&key, current, value).unwrap();
        }
        store
            .compare_and_set_root("main", None, champ.root_hash())
            .unwrap();
        store.sync().unwrap();
        (champ.root_hash(), model)
    };

    let store = FileStore::open(&path).unwrap();
    assert_eq!(store.get_root("main"), Some(root));
    let champ = Champ::load(&store, &config, root).unwrap();
    let expected: Vec<_> = model.into_iter().collect();
    assert_eq!(champ.entries().unwrap(), expected);
}
