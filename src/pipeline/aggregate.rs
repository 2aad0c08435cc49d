//! Joining page fragments into one document.

use crate::output::PageResult;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Placed between consecutive page fragments.
pub const PAGE_SEPARATOR: &str = "\n\n---\n\n";

static RE_DASH_RULE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*-{3,}[ \t]*$").unwrap());

/// The combined document plus page counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedDocument {
    pub markdown: String,
    pub pages_processed: usize,
    pub successful_pages: usize,
    pub failed_pages: usize,
}

impl AggregatedDocument {
    /// The per-page sections, in order.
    pub fn sections(&self) -> Vec<&str> {
        self.markdown.split(PAGE_SEPARATOR).collect()
    }
}

/// Join `results` (already in page order) with [`PAGE_SEPARATOR`].
///
/// Dash-only lines inside a fragment are rewritten to `***` so the
/// separator is the only `---` rule and the section count equals the page
/// count.
pub fn aggregate(results: &[PageResult]) -> AggregatedDocument {
    let fragments: Vec<String> = results
        .iter()
        .map(|r| RE_DASH_RULE.replace_all(r.markdown.trim_end(), "***").into_owned())
        .collect();
    let successful_pages = results.iter().filter(|r| r.is_success()).count();

    AggregatedDocument {
        markdown: fragments.join(PAGE_SEPARATOR),
        pages_processed: results.len(),
        successful_pages,
        failed_pages: results.len() - successful_pages,
    }
}
