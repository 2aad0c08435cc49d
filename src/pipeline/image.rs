//! Image inputs: one page, passed through when the model reads the format.

use super::encode::{encode_png, PNG_MIME};
use super::rasterize::{RasterInput, RasterStrategy};
use crate::error::RasterError;
use crate::output::{PageImage, PageOrigin};
use async_trait::async_trait;
use tracing::debug;

/// Mime type for formats vision models accept as-is.
fn native_mime(ext: &str) -> Option<&'static str> {
    match ext {
        ".png" => Some("image/png"),
        ".jpg" | ".jpeg" => Some("image/jpeg"),
        ".gif" => Some("image/gif"),
        ".webp" => Some("image/webp"),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImageStrategy;

#[async_trait]
impl RasterStrategy for ImageStrategy {
    fn name(&self) -> &'static str {
        "image"
    }

    async fn rasterize(&self, input: RasterInput<'_>) -> Result<Vec<PageImage>, RasterError> {
        let bytes = tokio::fs::read(input.path).await?;
        if bytes.is_empty() {
            return Ok(Vec::new());
        }

        if let Some(mime) = native_mime(input.extension) {
            return Ok(vec![PageImage::new(1, bytes, mime, PageOrigin::Passthrough)]);
        }

        // BMP, TIFF: decode and re-encode off the async workers.
        let png = tokio::task::spawn_blocking(move || {
            let img = image::load_from_memory(&bytes)?;
            encode_png(&img)
        })
        .await
        .map_err(|e| RasterError::Join(e.to_string()))??;
        debug!("Re-encoded {} as PNG", input.extension);

        Ok(vec![PageImage::new(1, png, PNG_MIME, PageOrigin::Passthrough)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, RgbImage};
    use std::io::Cursor;
    use std::path::Path;

    fn write_image(dir: &Path, name: &str, format: ImageFormat) -> std::path::PathBuf {
        let img = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, &buf).unwrap();
        path
    }

    #[tokio::test]
    async fn png_passes_through_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_image(dir.path(), "a.png", ImageFormat::Png);
        let original = std::fs::read(&path).unwrap();

        let pages = ImageStrategy
            .rasterize(RasterInput { path: &path, extension: ".png", dpi: 200 })
            .await
            .unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].bytes, original);
        assert_eq!(pages[0].mime_type, "image/png");
    }

    #[tokio::test]
    async fn bmp_is_reencoded_as_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_image(dir.path(), "a.bmp", ImageFormat::Bmp);

        let pages = ImageStrategy
            .rasterize(RasterInput { path: &path, extension: ".bmp", dpi: 200 })
            .await
            .unwrap();
        assert_eq!(pages[0].mime_type, "image/png");
        assert_eq!(&pages[0].bytes[..4], b"\x89PNG");
    }

    #[tokio::test]
    async fn corrupt_bmp_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.bmp");
        std::fs::write(&path, b"not a bitmap").unwrap();
        let result = ImageStrategy
            .rasterize(RasterInput { path: &path, extension: ".bmp", dpi: 200 })
            .await;
        assert!(matches!(result, Err(RasterError::Image(_))));
    }
}
