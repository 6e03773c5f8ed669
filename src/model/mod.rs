//! Core data model types for champ_db

mod hash;
mod key;

pub use hash::Hash;
pub use key::{key_label, max_depth, KeyDigest, KeyHashing, DIGEST_LEN};
