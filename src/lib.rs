//! Faceted catalog browsing.
//!
//! [`Librarian`] ties the workspace together: entries come from an
//! [`EntryProvider`](librarian_cache::EntryProvider) through the versioned
//! snapshot cache, are narrowed by search text, folder and tri-state facet
//! selections, and have their thumbnails hydrated by the two-tier thumbnail
//! cache.
//!
//! ```no_run
//! # async fn example(librarian: librarian::Librarian) -> librarian::Result<()> {
//! librarian.open("world", "Item");
//! let result = librarian.get_filtered_result().await?;
//! librarian.cycle_filter("type", "weapon")?;
//! let weapons = librarian.get_filtered_result().await?;
//! let job = librarian.request_hydration(weapons.hydration_items(24))?;
//! job.wait().await;
//! # let _ = result;
//! # Ok(())
//! # }
//! ```

pub mod error;
mod librarian;
mod memo;

pub use crate::error::{Error, ErrorKind, Result};
pub use crate::librarian::{FilteredResult, Librarian, ScanReport};
