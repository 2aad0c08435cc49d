//! Format classification by declared extension.

use crate::error::Doc2MdError;
use crate::job::extension_of;
use std::fmt;

/// Extensions accepted for conversion. Anything else is an input error.
pub const PERMITTED_EXTENSIONS: &[&str] = &[
    ".docx", ".doc", ".pptx", ".ppt", ".xlsx", ".xls", ".pdf", ".jpg", ".jpeg", ".png", ".gif",
    ".bmp", ".tiff", ".tif", ".webp", ".wav", ".mp3", ".txt", ".csv", ".json", ".xml", ".html",
    ".htm", ".zip", ".epub", ".msg",
];

/// Which rasterisation strategy a document goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FormatClass {
    /// Rendered directly by pdfium.
    Paged,
    /// Converted to PDF by an external program first.
    Office,
    /// Already an image: one page.
    Image,
    /// Permitted, but no renderer; always a placeholder.
    Other,
}

impl FormatClass {
    /// Classify a lower-cased `.ext`.
    pub fn of_extension(ext: &str) -> Self {
        match ext {
            ".pdf" => FormatClass::Paged,
            ".docx" | ".doc" | ".pptx" | ".ppt" | ".xlsx" | ".xls" => FormatClass::Office,
            ".png" | ".jpg" | ".jpeg" | ".gif" | ".webp" | ".bmp" | ".tiff" | ".tif" => {
                FormatClass::Image
            }
            _ => FormatClass::Other,
        }
    }
}

impl fmt::Display for FormatClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FormatClass::Paged => "paged",
            FormatClass::Office => "office",
            FormatClass::Image => "image",
            FormatClass::Other => "other",
        };
        f.write_str(s)
    }
}

pub fn is_permitted(ext: &str) -> bool {
    PERMITTED_EXTENSIONS.contains(&ext)
}

/// Extension and class of a declared file name, rejecting unpermitted ones.
pub fn classify(filename: &str) -> Result<(String, FormatClass), Doc2MdError> {
    let ext = extension_of(filename).unwrap_or_default();
    if !is_permitted(&ext) {
        return Err(Doc2MdError::UnsupportedExtension {
            filename: filename.to_string(),
            extension: if ext.is_empty() { "(none)".into() } else { ext },
        });
    }
    let class = FormatClass::of_extension(&ext);
    Ok((ext, class))
}
