//! Facet Error Types

use derive_more::{Display, Error};

/// A facet error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for facet operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A field extractor could not make sense of an entry. The field is
    /// treated as absent for that entry; this never fails a filter pass.
    #[display("cannot extract field '{field}': {reason}")]
    Extract {
        field: String,
        reason: String,
    },
    /// No facet group with this key exists in the current view.
    #[display("unknown facet group: {_0}")]
    UnknownGroup(#[error(not(source))] String),
    /// The group exists but has no option with this token.
    #[display("facet group '{group}' has no option '{token}'")]
    UnknownOption {
        group: String,
        token: String,
    },
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // Facet computation is pure: the same input fails the same way.
        false
    }

    pub fn extract(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Extract { field: field.into(), reason: reason.into() }
    }
}
