//! Pipeline stages for document-to-Markdown conversion.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. a different office converter) without
//! touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ rasterize ──▶ analyze ──▶ reorder ──▶ aggregate ──▶ enhance
//! (file)    (pages)       (model)     (order)     (join)        (optional)
//! ```
//!
//! 1. [`input`]     — materialise a path or byte buffer as a readable file
//! 2. [`rasterize`] — dispatch on [`format::FormatClass`] to [`render`]
//!    (pdfium), [`office`] (external converter + pdfium) or [`image`],
//!    falling back to [`placeholder`]
//! 3. [`analyze`]   — one vision-model call per page; [`encode`] builds the
//!    image payload and [`postprocess`] tidies the answer
//! 4. [`reorder`]   — page-order release behind the concurrent worker pool
//! 5. [`aggregate`] — join fragments with an explicit page separator
//! 6. [`enhance`]   — line-level structure heuristics

pub mod aggregate;
pub mod analyze;
pub mod encode;
pub mod enhance;
pub mod format;
pub mod image;
pub mod input;
pub mod office;
pub mod placeholder;
pub mod postprocess;
pub mod rasterize;
pub mod render;
pub mod reorder;
