//! Read-only storage backend.
//!
//! Wraps another backend for sessions that may look at durable data but not
//! change it (a non-privileged user browsing a shared world).

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::{ErrorKind, Result};
use crate::{BackendHandle, FileInfo, StorageBackend, backend::FileInfoStream};

/// Read-only storage backend.
///
/// Reads pass through to the wrapped backend. Writes and deletes are refused
/// with [`PermissionDenied`](ErrorKind::PermissionDenied) and logged, so
/// callers can tell a refusal apart from a transient failure.
#[derive(Clone)]
pub struct ReadOnlyBackend {
    inner: BackendHandle,
}
impl ReadOnlyBackend {
    pub fn new(inner: BackendHandle) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl StorageBackend for ReadOnlyBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        self.inner.list_stream(prefix)
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        self.inner.exists(path).await
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.inner.read(path).await
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<PathBuf> {
        tracing::info!(backend = self.name(), path = %path.display(), bytes = data.len(), "Refusing write to read-only backend");
        exn::bail!(ErrorKind::PermissionDenied(path.to_path_buf()))
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        tracing::info!(backend = self.name(), path = %path.display(), "Refusing delete on read-only backend");
        exn::bail!(ErrorKind::PermissionDenied(path.to_path_buf()))
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        self.inner.stat(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LocalBackend;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_reads_pass_through_writes_refused() {
        let temp_dir = tempfile::tempdir().unwrap();
        let inner = Arc::new(LocalBackend::new("world", temp_dir.path()).unwrap());
        inner.write(Path::new("maps/cave.webp"), b"RIFF").await.unwrap();
        let backend = ReadOnlyBackend::new(inner.clone());
        assert_eq!(backend.read(Path::new("maps/cave.webp")).await.unwrap(), b"RIFF");
        assert_eq!(backend.list(None).await.unwrap().len(), 1);
        let err = backend.write(Path::new("maps/new.webp"), b"x").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::PermissionDenied(_)));
        let err = backend.delete(Path::new("maps/cave.webp")).await.unwrap_err();
        assert!(err.is_refusal());
        assert!(inner.exists(Path::new("maps/cave.webp")).await.unwrap());
    }
}
