//! Content-addressed CHAMP over a block store
//!
//! Every node is an immutable block addressed by the hash of its encoding:
//! - A node's hash covers the hashes of its children
//! - Unchanged subtrees are shared between versions
//! - The root hash identifies the whole mapping

mod bitmap;
mod champ;
mod codec;
mod engine;
mod node;

pub use bitmap::Bitmap;
pub use champ::Champ;
pub use codec::{content_hash, decode, encode};
pub use engine::Engine;
pub use node::{ChampNode, Payload, Slot};
