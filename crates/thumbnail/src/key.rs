use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};

/// How a source image is turned into a thumbnail.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transform {
    pub width: u32,
    pub height: u32,
    /// Encoder quality, 0 to 100.
    pub quality: u8,
    pub format: String,
}
impl Default for Transform {
    fn default() -> Self {
        Self {
            width: 192,
            height: 192,
            quality: 60,
            format: "webp".to_string(),
        }
    }
}
impl Transform {
    pub fn new(width: u32, height: u32, quality: u8, format: impl Into<String>) -> Self {
        Self { width, height, quality, format: format.into().to_lowercase() }
    }
}

/// Deterministic identity of one rendered thumbnail: the source reference
/// plus every transform parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

const FORMAT_MARKER: &str = "|f=";
const WIDTH_MARKER: &str = "|w=";

impl CacheKey {
    pub fn new(source: &str, transform: &Transform) -> Self {
        Self(format!(
            "{source}{WIDTH_MARKER}{}|h={}|q={}{FORMAT_MARKER}{}",
            transform.width, transform.height, transform.quality, transform.format
        ))
    }

    /// Rebuild a key from its string form, as stored in the manifest.
    pub(crate) fn from_raw(raw: String) -> Self {
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Source reference the key was built from.
    pub fn source(&self) -> &str {
        self.0.rfind(WIDTH_MARKER).map_or(self.0.as_str(), |index| &self.0[..index])
    }

    /// Output format, used as the file extension.
    pub fn format(&self) -> &str {
        self.0.rsplit_once(FORMAT_MARKER).map_or("bin", |(_, format)| format)
    }

    /// BLAKE3 hex digest of the key.
    pub fn digest(&self) -> String {
        blake3::hash(self.0.as_bytes()).to_hex().to_string()
    }

    /// Durable location: `<directory>/<first two hex chars>/<digest>.<format>`.
    ///
    /// Sharding keeps any one directory small.
    pub fn disk_path(&self, directory: &Path) -> PathBuf {
        let digest = self.digest();
        let mut path = directory.join(&digest[..2]);
        path.push(digest);
        path.set_extension(self.format());
        path
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_covers_every_transform_parameter() {
        let base = Transform::default();
        let key = CacheKey::new("maps/cave.webp", &base);
        assert_eq!(key.as_str(), "maps/cave.webp|w=192|h=192|q=60|f=webp");
        for other in [
            Transform { width: 100, ..base.clone() },
            Transform { height: 100, ..base.clone() },
            Transform { quality: 90, ..base.clone() },
            Transform { format: "png".into(), ..base.clone() },
        ] {
            assert_ne!(CacheKey::new("maps/cave.webp", &other), key);
        }
    }

    #[test]
    fn test_source_and_format() {
        let key = CacheKey::new("odd|w=name.png", &Transform::new(64, 64, 80, "PNG"));
        assert_eq!(key.source(), "odd|w=name.png");
        assert_eq!(key.format(), "png");
    }

    #[test]
    fn test_disk_path_is_sharded() {
        let key = CacheKey::new("maps/cave.webp", &Transform::default());
        let digest = key.digest();
        let path = key.disk_path(Path::new("thumbs"));
        assert_eq!(path, PathBuf::from(format!("thumbs/{}/{digest}.webp", &digest[..2])));
        assert_eq!(key.disk_path(Path::new("thumbs")), path);
    }
}
