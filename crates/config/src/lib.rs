//! Configuration and settings for librarian.
//!
//! [`Config`] is read once at startup from layered sources. [`SettingsStore`]
//! is the runtime key/value store that caches persist their state through.

pub mod error;
mod model;
mod settings;

pub use crate::model::{Config, ENV_PREFIX, ScanConfig, THUMBNAIL_FORMATS, ThumbnailConfig};
pub use crate::settings::{BackendSettings, MemorySettings, SettingsStore};
