//! Data model shared by every librarian crate.
//!
//! Entries are immutable snapshots handed over by an entry provider. Folders
//! form the hierarchy an entry may live in.

mod entry;
mod folder;
mod sort;
pub mod tags;

pub use crate::entry::Entry;
pub use crate::folder::{Folder, build_tree, subtree_ids, tree_from_paths};
pub use crate::sort::natural_cmp;
