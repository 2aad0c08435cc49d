//! Paged-document rasterisation via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! `tokio::task::spawn_blocking` moves the work onto a dedicated thread pool
//! thread designed for blocking operations, preventing the Tokio worker
//! threads from stalling during CPU-heavy rendering.
//!
//! ## Why cap pixels as well as DPI?
//!
//! Page sizes vary wildly: an A0 poster at 200 DPI would produce a
//! 6,600 × 9,400 px image. `max_pixels` caps the longest edge regardless of
//! physical size, keeping memory bounded.

use super::encode::{encode_png, PNG_MIME};
use super::rasterize::{RasterInput, RasterStrategy};
use crate::error::RasterError;
use crate::output::{PageImage, PageOrigin};
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Renders every page of a PDF with pdfium.
///
/// The library is bound per document, so constructing the strategy never
/// fails even on hosts without pdfium; the error surfaces on first use and
/// goes through the fallback policy like any other.
#[derive(Debug, Clone)]
pub struct PdfiumStrategy {
    library: Option<PathBuf>,
    max_pixels: u32,
}

impl PdfiumStrategy {
    pub fn new(library: Option<PathBuf>, max_pixels: u32) -> Self {
        Self {
            library,
            max_pixels,
        }
    }
}

#[async_trait]
impl RasterStrategy for PdfiumStrategy {
    fn name(&self) -> &'static str {
        "pdfium"
    }

    async fn rasterize(&self, input: RasterInput<'_>) -> Result<Vec<PageImage>, RasterError> {
        let path = input.path.to_path_buf();
        let library = self.library.clone();
        let dpi = input.dpi;
        let max_pixels = self.max_pixels;

        tokio::task::spawn_blocking(move || {
            render_pages_blocking(&path, library.as_deref(), dpi, max_pixels)
        })
        .await
        .map_err(|e| RasterError::Join(e.to_string()))?
    }
}

/// Bind pdfium: explicit path, then `PDFIUM_LIB_PATH`, then the working
/// directory, then the system library.
fn bind(library: Option<&Path>) -> Result<Pdfium, RasterError> {
    let configured = library
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

    let bindings = match configured {
        Some(p) if p.is_dir() => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&p))
        }
        Some(p) => Pdfium::bind_to_library(&p),
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| RasterError::PdfiumUnavailable(format!("{e:?}")))?;

    Ok(Pdfium::new(bindings))
}

fn render_pages_blocking(
    pdf_path: &Path,
    library: Option<&Path>,
    dpi: u32,
    max_pixels: u32,
) -> Result<Vec<PageImage>, RasterError> {
    let pdfium = bind(library)?;

    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| RasterError::Pdfium(format!("{}: {e:?}", pdf_path.display())))?;

    let pages = document.pages();
    info!("PDF loaded: {} pages", pages.len());

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(dpi as f32 / 72.0)
        .set_maximum_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut results = Vec::with_capacity(pages.len() as usize);

    for (idx, page) in pages.iter().enumerate() {
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| RasterError::Pdfium(format!("page {}: {e:?}", idx + 1)))?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );

        let png = encode_png(&image)?;
        results.push(PageImage::new(idx + 1, png, PNG_MIME, PageOrigin::Rendered));
    }

    Ok(results)
}
