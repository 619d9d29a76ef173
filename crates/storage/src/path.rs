//! Path validation and location normalization.
//!
//! Storage paths must never escape the backend root. Locations reported back
//! by a presentation layer (for example a broken image URL) come in all
//! shapes and are reduced to a comparable form with [`normalize_location`].

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates a storage path and returns its normalized form.
///
/// `..` components are resolved against the path itself and rejected once
/// they would leave the storage root. Null bytes and Windows prefixes are
/// rejected. Empty results are rejected.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use librarian_storage::validate_path;
/// // Valid paths
/// assert!(validate_path("thumbs/ab/0123.webp").is_ok());
/// assert!(validate_path("a/../token.png").is_ok()); // (never leaves storage root)
/// // Invalid paths
/// assert!(validate_path("../etc/passwd").is_err());
/// assert!(validate_path("a/../../b").is_err());
/// assert!(validate_path("a\0b").is_err());
/// // Paths get resolved
/// assert_eq!(
///     validate_path("maps/../tokens/.//goblin.webp/").unwrap(),
///     Path::new("tokens/goblin.webp")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let original = path.as_ref();
    let invalid = || ErrorKind::InvalidPath(original.to_path_buf());
    let mut components = Vec::new();
    for component in original.components() {
        match component {
            Component::Normal(s) => {
                // Path::components() lets null bytes through on Unix.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(invalid());
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(invalid()),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(invalid());
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(invalid()),
        false => Ok(components.into_iter().collect()),
    }
}

/// Reduce a location to a comparable form.
///
/// Strips a URL scheme and host, any query string or fragment, and leading
/// slashes. Two locations pointing at the same stored file normalize to the
/// same string regardless of how they were rendered.
///
/// ```
/// use librarian_storage::normalize_location;
/// assert_eq!(normalize_location("https://cdn.example/thumbs/ab/cd.webp?v=3"), "thumbs/ab/cd.webp");
/// assert_eq!(normalize_location("/thumbs/ab/cd.webp"), "thumbs/ab/cd.webp");
/// ```
pub fn normalize_location(location: &str) -> String {
    let trimmed = location.trim();
    let without_origin = match trimmed.find("://") {
        Some(scheme_end) => {
            let after_scheme = &trimmed[scheme_end + 3..];
            after_scheme.find('/').map(|host_end| &after_scheme[host_end..]).unwrap_or("")
        },
        None => trimmed,
    };
    let without_query = without_origin.split(['?', '#']).next().unwrap_or("");
    without_query.trim_start_matches('/').to_string()
}
