//! Durable storage for thumbnails, manifests and scanned libraries.
//!
//! Everything the catalog engine persists goes through a [`StorageBackend`].
//! Paths handed to a backend are always relative to its root and validated
//! with [`validate_path`] before use.

pub mod backend;
pub mod error;
mod models;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::models::FileInfo;
pub use crate::path::{normalize_location, validate as validate_path};
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
