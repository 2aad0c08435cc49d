//! Placeholder page for documents that cannot be rendered.

use super::encode::{encode_png, PNG_MIME};
use crate::error::RasterError;
use crate::output::{PageImage, PageOrigin};
use ab_glyph::{FontArc, PxScale};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_text_mut;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const WIDTH: u32 = 800;
const HEIGHT: u32 = 600;
const SUBTITLE: &str = "Converted to image placeholder";

/// Last resort when neither the configured nor any system font loads.
static EMBEDDED_FONT: &[u8] = include_bytes!("../../font/DejaVuSans.ttf");

const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/Library/Fonts/Arial.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Draws the 800×600 stand-in page.
#[derive(Clone)]
pub struct PlaceholderRenderer {
    font: Option<FontArc>,
}

impl std::fmt::Debug for PlaceholderRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaceholderRenderer")
            .field("font", &self.font.is_some())
            .finish()
    }
}

impl PlaceholderRenderer {
    /// Try `font`, then the system fonts, then the embedded one.
    pub fn new(font: Option<&Path>) -> Self {
        let candidates: Vec<PathBuf> = font
            .map(Path::to_path_buf)
            .into_iter()
            .chain(SYSTEM_FONTS.iter().map(PathBuf::from))
            .collect();
        let font = candidates
            .iter()
            .find_map(|p| load_font(p))
            .or_else(embedded_font);
        if font.is_none() {
            warn!("No font found for placeholder pages; they will carry no drawn text");
        }
        Self { font }
    }

    /// A renderer that never draws text.
    pub fn without_font() -> Self {
        Self { font: None }
    }

    /// Render the page for `filename` (directories are stripped).
    pub fn render(&self, filename: &str) -> Result<PageImage, RasterError> {
        let label = Path::new(filename)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| filename.to_string());

        let mut img = RgbImage::from_pixel(WIDTH, HEIGHT, Rgb([255, 255, 255]));
        if let Some(font) = &self.font {
            let scale = PxScale::from(20.0);
            let black = Rgb([0, 0, 0]);
            draw_text_mut(&mut img, black, 50, 50, scale, font, &format!("Document: {label}"));
            draw_text_mut(&mut img, black, 50, 80, scale, font, SUBTITLE);
        }

        let png = encode_png(&DynamicImage::ImageRgb8(img))?;
        debug!("Placeholder rendered for {label}");
        Ok(PageImage::new(1, png, PNG_MIME, PageOrigin::Placeholder { label }))
    }
}

fn load_font(path: &Path) -> Option<FontArc> {
    let data = std::fs::read(path).ok()?;
    match FontArc::try_from_vec(data) {
        Ok(font) => Some(font),
        Err(e) => {
            debug!("Skipping font {}: {e}", path.display());
            None
        }
    }
}

fn embedded_font() -> Option<FontArc> {
    match FontArc::try_from_slice(EMBEDDED_FONT) {
        Ok(font) => Some(font),
        Err(e) => {
            warn!("Embedded font is unusable: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_is_800_by_600_png_labelled_with_base_name() {
        let page = PlaceholderRenderer::without_font()
            .render("uploads/notes.txt")
            .unwrap();
        assert_eq!(page.index, 1);
        assert_eq!(page.mime_type, "image/png");
        assert_eq!(
            page.origin,
            PageOrigin::Placeholder {
                label: "notes.txt".into()
            }
        );

        let img = image::load_from_memory(&page.bytes).unwrap();
        assert_eq!((img.width(), img.height()), (800, 600));
    }

    fn inked_pixels(page: &PageImage) -> usize {
        image::load_from_memory(&page.bytes)
            .unwrap()
            .to_rgb8()
            .pixels()
            .filter(|p| p.0 != [255, 255, 255])
            .count()
    }

    #[test]
    fn unreadable_font_still_draws_the_label() {
        let r = PlaceholderRenderer::new(Some(Path::new("/no/such/font.ttf")));
        let page = r.render("a.txt").unwrap();
        assert!(inked_pixels(&page) > 0);
    }

    #[test]
    fn embedded_font_loads() {
        assert!(embedded_font().is_some());
    }

    #[test]
    fn without_font_page_is_blank() {
        let page = PlaceholderRenderer::without_font().render("a.txt").unwrap();
        assert_eq!(inked_pixels(&page), 0);
    }
}
