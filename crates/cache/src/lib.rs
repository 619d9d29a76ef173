//! Versioned snapshot cache for catalog entries.
//!
//! The cache is not the source of truth; providers are. Snapshots are loaded
//! lazily per `(source, category)`, replaced wholesale on rescans and
//! dropped on invalidation. Every change bumps [`SnapshotCache::current_version`]
//! so that anything derived from a snapshot (facet memos, filtered results)
//! can tell it is stale.
//!
//! # Architecture
//! - **Snapshots**: entries plus folder hierarchy, shared behind `Arc`.
//! - **Providers**: the [`EntryProvider`] capability. [`DirectoryProvider`]
//!   is the built-in one, listing image files from a storage backend.
//! - **Diffs**: [`diff()`] classifies a rescan as added, removed and changed
//!   entries so callers can decide whether dependent caches need pruning.

mod diff;
pub mod error;
mod provider;
mod snapshot;

pub use crate::diff::{Diff, diff};
pub use crate::provider::{DirectoryProvider, EntryProvider, IMAGE_CATEGORY, IMAGE_EXTENSIONS};
pub use crate::snapshot::{Snapshot, SnapshotCache, TagUpdate, fetch};
