//! Entry providers.
//!
//! A provider is whatever knows how to list the entries of a category from a
//! source: a document database, a module pack, or a directory of images.
//! The snapshot cache only ever talks to this trait.

use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use futures::TryStreamExt;
use librarian_model::{Entry, Folder, tree_from_paths};
use librarian_storage::{BackendHandle, FileInfo};
use serde_json::json;
use std::path::{Path, PathBuf};

/// Extensions recognised as images when scanning a directory.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "svg", "avif", "bmp"];

/// Category produced by [`DirectoryProvider`].
pub const IMAGE_CATEGORY: &str = "Image";

#[async_trait]
pub trait EntryProvider: Send + Sync {
    /// Every entry of `category` available from `source`.
    async fn list_entries(&self, category: &str, source: &str) -> Result<Vec<Entry>>;

    /// Folder hierarchy for `category` in `source`. Providers without
    /// folders return an empty list.
    async fn list_hierarchy(&self, category: &str, source: &str) -> Result<Vec<Folder>>;
}

/// Lists image files below one or more roots of a storage backend.
///
/// The `source` argument names a root relative to the backend; an empty
/// source scans the configured roots (or the whole backend if there are
/// none). Only the [`IMAGE_CATEGORY`] category has entries.
pub struct DirectoryProvider {
    backend: BackendHandle,
    roots: Vec<PathBuf>,
    extensions: Vec<String>,
}

impl DirectoryProvider {
    pub fn new(backend: BackendHandle) -> Self {
        Self {
            backend,
            roots: Vec::new(),
            extensions: IMAGE_EXTENSIONS.iter().map(|ext| ext.to_string()).collect(),
        }
    }

    pub fn with_roots(mut self, roots: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        self.roots = roots.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the recognised extensions. Matching is case-insensitive.
    pub fn with_extensions(mut self, extensions: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        self.extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        self
    }

    fn prefixes<'a>(&'a self, source: &'a str) -> Vec<Option<&'a Path>> {
        let source = source.trim_matches('/');
        if !source.is_empty() {
            return vec![Some(Path::new(source))];
        }
        if self.roots.is_empty() {
            return vec![None];
        }
        self.roots.iter().map(|root| Some(root.as_path())).collect()
    }

    fn is_image(&self, info: &FileInfo) -> bool {
        info.extension().is_some_and(|ext| self.extensions.contains(&ext))
    }

    async fn scan(&self, source: &str) -> Result<Vec<FileInfo>> {
        let mut files = Vec::new();
        for prefix in self.prefixes(source) {
            let found: Vec<FileInfo> = self
                .backend
                .list_stream(prefix)
                .try_filter(|info| futures::future::ready(self.is_image(info)))
                .try_collect()
                .await
                .or_raise(|| ErrorKind::Storage(self.backend.name().to_string()))?;
            files.extend(found);
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));
        files.dedup_by(|a, b| a.path == b.path);
        tracing::debug!(backend = self.backend.name(), source, files = files.len(), "Scanned directory for images");
        Ok(files)
    }
}

fn slash_path(path: &Path) -> String {
    path.components()
        .map(|part| part.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn to_entry(info: &FileInfo) -> Entry {
    let path = slash_path(&info.path);
    let name = info
        .path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.clone());
    let mut entry = Entry::new(path.clone(), name, IMAGE_CATEGORY)
        .with_image(path)
        .with_fields(json!({"extension": info.extension()}));
    if let Some(parent) = info.parent() {
        entry = entry.with_folder(slash_path(parent));
    }
    entry
}

#[async_trait]
impl EntryProvider for DirectoryProvider {
    async fn list_entries(&self, category: &str, source: &str) -> Result<Vec<Entry>> {
        if category != IMAGE_CATEGORY {
            return Ok(Vec::new());
        }
        Ok(self.scan(source).await?.iter().map(to_entry).collect())
    }

    async fn list_hierarchy(&self, category: &str, source: &str) -> Result<Vec<Folder>> {
        if category != IMAGE_CATEGORY {
            return Ok(Vec::new());
        }
        let files = self.scan(source).await?;
        let folders: Vec<String> = files.iter().filter_map(|info| info.parent()).map(slash_path).collect();
        Ok(tree_from_paths(folders.iter().map(String::as_str)))
    }
}
