//! Three-way merge of divergent trie versions

use super::diff::{diff_roots, DiffEntry};
use crate::config::ChampConfig;
use crate::model::{key_label, Hash};
use crate::store::BlockStore;
use crate::trie::Champ;
use crate::{Error, Result};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Merge `remote` into `local`, both derived from `ancestor`
///
/// Fails with [`Error::ConcurrentModification`] if any key was changed on
/// both branches. Otherwise the remote changes are replayed onto `local` and
/// the merged root is returned. Both sides must decode as trie nodes, even
/// when the merge is a fast-forward.
pub fn merge_roots<S: BlockStore + ?Sized>(
    store: &S,
    config: &ChampConfig,
    ancestor: Hash,
    local: Hash,
    remote: Hash,
) -> Result<Hash> {
    let mut merged = Champ::load(store, config, local)?;
    Champ::load(store, config, remote)?;

    if local == ancestor {
        return Ok(remote);
    }
    if remote == ancestor || remote == local {
        return Ok(local);
    }

    let local_changes = diff_roots(store, config, ancestor, local)?;
    let remote_changes = diff_roots(store, config, ancestor, remote)?;

    let touched: BTreeSet<&[u8]> = local_changes.keys().collect();
    let conflicts: Vec<String> = remote_changes
        .keys()
        .filter(|key| touched.contains(key))
        .map(key_label)
        .collect();
    if !conflicts.is_empty() {
        warn!(keys = conflicts.len(), "merge conflict");
        return Err(Error::ConcurrentModification(conflicts));
    }

    for change in &remote_changes.entries {
        match change {
            DiffEntry::Added { key, new_hash } => merged.put(key, None, *new_hash)?,
            DiffEntry::Removed { key, old_hash } => merged.remove(key, Some(*old_hash))?,
            DiffEntry::Modified {
                key,
                old_hash,
                new_hash,
            } => merged.put(key, Some(*old_hash), *new_hash)?,
        };
    }

    debug!(
        ancestor = %ancestor.short(),
        local = %local.short(),
        remote = %remote.short(),
        merged = %merged.root_hash().short(),
        applied = remote_changes.len(),
        "merge"
    );
    Ok(merged.root_hash())
}
