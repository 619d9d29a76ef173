//! Storage models.

use std::path::{Path, PathBuf};
use time::OffsetDateTime;

/// File metadata returned by storage backends.
///
/// This represents information about a file in storage, used for listing
/// operations and library scans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Relative path from storage root
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modified timestamp
    pub modified: OffsetDateTime,
}
impl FileInfo {
    pub fn new(path: impl Into<PathBuf>, size: u64, modified: OffsetDateTime) -> Self {
        Self { path: path.into(), size, modified }
    }

    /// Lowercase file extension, if the path has one.
    pub fn extension(&self) -> Option<String> {
        self.path.extension().and_then(|ext| ext.to_str()).map(str::to_lowercase)
    }

    /// Parent directory, or `None` for files at the storage root.
    pub fn parent(&self) -> Option<&Path> {
        self.path.parent().filter(|parent| !parent.as_os_str().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_is_lowercased() {
        let info = FileInfo::new("maps/Dungeon.WEBP", 10, OffsetDateTime::UNIX_EPOCH);
        assert_eq!(info.extension().as_deref(), Some("webp"));
        let bare = FileInfo::new("README", 10, OffsetDateTime::UNIX_EPOCH);
        assert_eq!(bare.extension(), None);
    }

    #[test]
    fn test_parent_of_root_file_is_none() {
        let nested = FileInfo::new("maps/dungeon.webp", 1, OffsetDateTime::UNIX_EPOCH);
        assert_eq!(nested.parent(), Some(Path::new("maps")));
        let root = FileInfo::new("dungeon.webp", 1, OffsetDateTime::UNIX_EPOCH);
        assert_eq!(root.parent(), None);
    }
}
