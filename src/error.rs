//! Librarian Error Types
//!
//! The facade wraps every lower crate's error with one of these kinds, so
//! callers only match on what they can act on.

use derive_more::{Display, Error};

/// A librarian error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for librarian operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Entries for a `source:category` view could not be loaded. Nothing was
    /// cached; the same request can be retried.
    #[display("cannot load entries for {_0}")]
    Load(#[error(not(source))] String),
    /// A filter selection referred to a group or option that the current view
    /// does not have.
    #[display("invalid filter selection")]
    Filter,
    /// The thumbnail cache could not complete an operation.
    #[display("thumbnail cache operation failed")]
    Thumbnail,
    /// Configuration could not be loaded or is invalid.
    #[display("invalid configuration")]
    Config,
    /// The durable store refused the operation. Retrying will not help.
    #[display("permission denied: {_0}")]
    PermissionDenied(#[error(not(source))] String),
    /// No view has been opened yet.
    #[display("no view is open")]
    NoActiveView,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Load(_) | Self::Thumbnail)
    }
}
