//! Thumbnail caching and hydration.
//!
//! Rendering a thumbnail is expensive, so results are kept in two tiers:
//! a bounded in-memory LRU and a durable manifest of files persisted to a
//! storage backend. The [`Scheduler`] walks the entries a view shows,
//! answers hits straight from the cache and renders misses in small,
//! cancellable batches.
//!
//! # Architecture
//! - **[`CacheKey`]**: source reference plus [`Transform`]; also decides the
//!   sharded on-disk location of the thumbnail.
//! - **[`MemoryCache`]**: LRU tier, I/O free.
//! - **[`Manifest`]**: durable tier, lazily loaded from a
//!   [`SettingsStore`](librarian_config::SettingsStore) and flushed on a
//!   debounce.
//! - **[`ThumbnailCache`]**: both tiers behind one API.
//! - **[`Renderer`]**: capability that produces thumbnails. With the `image`
//!   feature, [`ImageRenderer`] renders raster images.

mod cache;
pub mod error;
mod key;
mod manifest;
mod memory;
mod render;
mod scheduler;

pub use crate::cache::{Rendered, Thumbnail, ThumbnailCache, Tier};
pub use crate::key::{CacheKey, Transform};
pub use crate::manifest::{MANIFEST_KEY, Manifest};
pub use crate::memory::MemoryCache;
#[cfg(feature = "image")]
pub use crate::render::ImageRenderer;
pub use crate::render::Renderer;
pub use crate::scheduler::{
    HydrationEvent, HydrationItem, JobHandle, JobToken, JobTokens, Metrics, Origin, Outcome, Scheduler,
    SchedulerOptions,
};
