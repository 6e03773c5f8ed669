//! Version operations: diff and three-way merge

mod diff;
mod merge;

pub use diff::{diff_roots, Diff, DiffEntry};
pub use merge::merge_roots;
