//! Thumbnail Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};

/// A thumbnail error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for thumbnail operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The renderer could not produce a thumbnail for a source.
    #[display("failed to render thumbnail for {_0}")]
    Render(#[error(not(source))] String),
    /// The durable store failed; the operation may succeed later.
    #[display("thumbnail storage error: {_0}")]
    Storage(#[error(not(source))] String),
    /// The durable store refused the operation. Retrying will not help.
    #[display("permission denied: {_0}")]
    PermissionDenied(#[error(not(source))] String),
    /// The manifest could not be loaded or persisted.
    #[display("thumbnail manifest error")]
    Manifest,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Manifest)
    }

    /// Returns `true` if the store refused the operation outright.
    pub fn is_refusal(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }
}
