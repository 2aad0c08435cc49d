//! Document → ordered page images, with strategy dispatch and fallback.
//!
//! ```text
//!   filename ──▶ classify ──▶ strategy table ──▶ pages (renumbered 1..N)
//!                                   │
//!                     error / empty │ FallbackPolicy::Placeholder
//!                                   ▼
//!                           one placeholder page
//! ```
//!
//! The placeholder renderer is the last resort; only its own failure (or
//! [`FallbackPolicy::Fail`]) makes rasterisation fatal.

use super::format::{classify, FormatClass};
use super::image::ImageStrategy;
use super::office::OfficeStrategy;
use super::placeholder::PlaceholderRenderer;
use super::render::PdfiumStrategy;
use crate::config::{ConversionConfig, FallbackPolicy};
use crate::error::{Doc2MdError, RasterError};
use crate::output::PageImage;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// What a strategy gets to work with.
#[derive(Debug, Clone, Copy)]
pub struct RasterInput<'a> {
    pub path: &'a Path,
    /// Lower-cased declared extension, e.g. `".docx"`.
    pub extension: &'a str,
    pub dpi: u32,
}

/// One way of turning a file into page images.
#[async_trait]
pub trait RasterStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Page indices in the result need not be contiguous; the rasterizer
    /// renumbers them.
    async fn rasterize(&self, input: RasterInput<'_>) -> Result<Vec<PageImage>, RasterError>;
}

/// Owns the dispatch table and the fallback policy.
pub struct DocumentRasterizer {
    strategies: BTreeMap<FormatClass, Arc<dyn RasterStrategy>>,
    placeholder: PlaceholderRenderer,
    policy: FallbackPolicy,
}

impl DocumentRasterizer {
    /// The standard table: pdfium, office converter, image passthrough.
    pub fn from_config(config: &ConversionConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: &ConversionConfig) -> RasterizerBuilder {
        RasterizerBuilder {
            config: config.clone(),
            overrides: BTreeMap::new(),
            disabled: BTreeSet::new(),
            placeholder: None,
        }
    }

    pub fn strategy_for(&self, class: FormatClass) -> Option<&Arc<dyn RasterStrategy>> {
        self.strategies.get(&class)
    }

    pub fn fallback_policy(&self) -> FallbackPolicy {
        self.policy
    }

    /// Rasterise the file at `path`, declared as `filename`.
    ///
    /// Never returns an empty list.
    pub async fn convert(
        &self,
        path: &Path,
        filename: &str,
        dpi: u32,
    ) -> Result<Vec<PageImage>, Doc2MdError> {
        let (extension, class) = classify(filename)?;

        let Some(strategy) = self.strategy_for(class) else {
            info!("No renderer for {extension} ({class}); using placeholder");
            return self.placeholder(filename);
        };

        let input = RasterInput {
            path,
            extension: &extension,
            dpi,
        };
        let outcome = match strategy.rasterize(input).await {
            Ok(pages) if pages.is_empty() => Err(RasterError::NoPages),
            other => other,
        };

        match outcome {
            Ok(pages) => {
                info!("{}: {} page(s) via {}", filename, pages.len(), strategy.name());
                Ok(renumber(pages))
            }
            Err(e) => match self.policy {
                FallbackPolicy::Placeholder => {
                    warn!(
                        "{} strategy failed for {}: {}; falling back to placeholder",
                        strategy.name(),
                        filename,
                        e
                    );
                    self.placeholder(filename)
                }
                FallbackPolicy::Fail => Err(Doc2MdError::RasterisationFailed {
                    filename: filename.to_string(),
                    source: e,
                }),
            },
        }
    }

    fn placeholder(&self, filename: &str) -> Result<Vec<PageImage>, Doc2MdError> {
        self.placeholder
            .render(filename)
            .map(|page| vec![page])
            .map_err(|e| Doc2MdError::RasterisationUnavailable {
                reason: format!("placeholder could not be rendered: {e}"),
            })
    }
}

fn renumber(mut pages: Vec<PageImage>) -> Vec<PageImage> {
    for (i, page) in pages.iter_mut().enumerate() {
        page.index = i + 1;
    }
    pages
}

/// Builder for [`DocumentRasterizer`].
///
/// Unless overridden, the office strategy wraps whatever the paged strategy
/// ends up being.
pub struct RasterizerBuilder {
    config: ConversionConfig,
    overrides: BTreeMap<FormatClass, Arc<dyn RasterStrategy>>,
    disabled: BTreeSet<FormatClass>,
    placeholder: Option<PlaceholderRenderer>,
}

impl RasterizerBuilder {
    pub fn strategy(mut self, class: FormatClass, strategy: Arc<dyn RasterStrategy>) -> Self {
        self.disabled.remove(&class);
        self.overrides.insert(class, strategy);
        self
    }

    /// Route `class` straight to the placeholder.
    pub fn without_strategy(mut self, class: FormatClass) -> Self {
        self.overrides.remove(&class);
        self.disabled.insert(class);
        self
    }

    pub fn placeholder(mut self, renderer: PlaceholderRenderer) -> Self {
        self.placeholder = Some(renderer);
        self
    }

    pub fn fallback_policy(mut self, policy: FallbackPolicy) -> Self {
        self.config.fallback_policy = policy;
        self
    }

    pub fn build(mut self) -> DocumentRasterizer {
        let c = &self.config;
        let paged: Arc<dyn RasterStrategy> = self
            .overrides
            .remove(&FormatClass::Paged)
            .unwrap_or_else(|| {
                Arc::new(PdfiumStrategy::new(
                    c.pdfium_library.clone(),
                    c.max_rendered_pixels,
                ))
            });
        let office: Arc<dyn RasterStrategy> = self
            .overrides
            .remove(&FormatClass::Office)
            .unwrap_or_else(|| {
                Arc::new(OfficeStrategy::new(
                    c.office_converter.clone(),
                    c.converter_timeout_secs,
                    Arc::clone(&paged),
                ))
            });
        let image: Arc<dyn RasterStrategy> = self
            .overrides
            .remove(&FormatClass::Image)
            .unwrap_or_else(|| Arc::new(ImageStrategy));

        let mut strategies = BTreeMap::new();
        strategies.insert(FormatClass::Paged, paged);
        strategies.insert(FormatClass::Office, office);
        strategies.insert(FormatClass::Image, image);
        // Anything left (e.g. a custom `Other` strategy).
        strategies.extend(self.overrides);
        for class in &self.disabled {
            strategies.remove(class);
        }

        let placeholder = self
            .placeholder
            .unwrap_or_else(|| PlaceholderRenderer::new(c.placeholder_font.as_deref()));

        DocumentRasterizer {
            strategies,
            placeholder,
            policy: c.fallback_policy,
        }
    }
}
