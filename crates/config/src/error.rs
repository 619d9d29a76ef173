//! Configuration Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration and settings operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Explicitly requested configuration file does not exist
    #[display("configuration file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Configuration file extension is not one of toml, yaml, yml or json
    #[display("unsupported configuration format: {}", _0.display())]
    UnsupportedFormat(#[error(not(source))] PathBuf),
    /// Configuration could not be parsed or failed validation
    #[display("invalid configuration: {_0}")]
    Invalid(#[error(not(source))] String),
    /// A setting could not be encoded or decoded
    #[display("malformed setting: {_0}")]
    Malformed(#[error(not(source))] String),
    /// The settings store refused to persist a setting
    #[display("permission denied writing setting: {_0}")]
    PermissionDenied(#[error(not(source))] String),
    /// The settings store failed to read or write a setting
    #[display("settings storage error: {_0}")]
    Storage(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns `true` if the store refused the operation outright.
    pub fn is_refusal(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }
}
