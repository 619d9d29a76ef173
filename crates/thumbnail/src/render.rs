use crate::cache::Rendered;
use crate::error::Result;
use crate::key::Transform;
use async_trait::async_trait;

/// Produces a thumbnail for a source reference.
///
/// Rendering is the expensive step the whole cache exists to avoid; the
/// scheduler only calls it for items missing from both tiers.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, source: &str, transform: &Transform) -> Result<Rendered>;
}

#[cfg(feature = "image")]
pub use self::raster::ImageRenderer;

#[cfg(feature = "image")]
mod raster {
    use super::Renderer;
    use crate::cache::Rendered;
    use crate::error::{ErrorKind, Result};
    use crate::key::Transform;
    use async_trait::async_trait;
    use exn::ResultExt;
    use image::codecs::jpeg::JpegEncoder;
    use image::codecs::png::PngEncoder;
    use image::codecs::webp::WebPEncoder;
    use image::{DynamicImage, ImageEncoder};
    use librarian_storage::BackendHandle;
    use std::path::Path;

    /// Renders raster images read from a storage backend with the `image`
    /// crate.
    ///
    /// Images are scaled to fit inside the transform's box, keeping their
    /// aspect ratio. WebP output is lossless; quality applies to JPEG only.
    pub struct ImageRenderer {
        backend: BackendHandle,
    }

    impl ImageRenderer {
        pub fn new(backend: BackendHandle) -> Self {
            Self { backend }
        }
    }

    fn encode(picture: &DynamicImage, transform: &Transform) -> std::result::Result<Vec<u8>, image::ImageError> {
        let rgba = picture.to_rgba8();
        let (width, height) = rgba.dimensions();
        let mut out = Vec::new();
        match transform.format.as_str() {
            "png" => PngEncoder::new(&mut out).write_image(&rgba, width, height, image::ExtendedColorType::Rgba8)?,
            "jpeg" | "jpg" => {
                let rgb = picture.to_rgb8();
                JpegEncoder::new_with_quality(&mut out, transform.quality.clamp(1, 100)).write_image(
                    &rgb,
                    width,
                    height,
                    image::ExtendedColorType::Rgb8,
                )?
            },
            _ => WebPEncoder::new_lossless(&mut out).write_image(&rgba, width, height, image::ExtendedColorType::Rgba8)?,
        }
        Ok(out)
    }

    #[async_trait]
    impl Renderer for ImageRenderer {
        #[tracing::instrument(level = "debug", skip(self, transform), fields(backend = self.backend.name()))]
        async fn render(&self, source: &str, transform: &Transform) -> Result<Rendered> {
            let data = self.backend.read(Path::new(source)).await.or_raise(|| ErrorKind::Render(source.to_string()))?;
            let transform = transform.clone();
            let encoded = tokio::task::spawn_blocking(move || {
                let decoded = image::load_from_memory(&data)?;
                let scaled = decoded.thumbnail(transform.width, transform.height);
                encode(&scaled, &transform)
            })
            .await
            .or_raise(|| ErrorKind::Render(source.to_string()))?
            .or_raise(|| ErrorKind::Render(source.to_string()))?;
            Ok(Rendered::Bytes(encoded))
        }
    }

}
