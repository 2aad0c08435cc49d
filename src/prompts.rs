//! Prompts for vision-model page analysis.
//!
//! Every prompt lives here so the instruction text can change without
//! touching request building or error handling in
//! [`crate::pipeline::analyze`]. Callers can override the system prompt via
//! [`crate::config::ConversionConfig::system_prompt`].

/// Default system message sent with every page.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert at analyzing images and converting \
visual content to markdown format. You have full vision capabilities and can see and analyze \
images perfectly.";

/// Build the user instruction for one page.
///
/// `page_num` is 1-indexed. The returned text asks the model to transcribe
/// everything, keep document structure, and stick to a fixed Markdown
/// vocabulary so the enhancement pass sees predictable input.
pub fn page_instruction(page_num: usize) -> String {
    format!(
        r#"You MUST analyze the image I'm providing. Do not refuse or say you cannot see images.

Please carefully examine this page {page_num} image and:

1. Extract ALL visible text exactly as it appears
2. Describe visual elements, charts, diagrams, or illustrations in detail
3. Maintain document structure (headings, lists, tables, etc.)
4. Convert everything to proper markdown format

Required markdown syntax:
- # for main headings
- ## for subheadings
- **bold** for emphasis
- - for bullet points
- | col1 | col2 | for tables
- [Image: detailed description] for visual elements

Output requirements:
- Write in the same language as the content of the page (e.g. Korean if the page is Korean)
- Include both text content AND visual descriptions
- Format as clean, well-structured markdown

Begin your analysis now:"#
    )
}

/// Extra note appended for placeholder pages.
///
/// The placeholder image carries the file name as drawn text; repeating it
/// here keeps the model's answer meaningful when no font was available to
/// draw it.
pub fn placeholder_note(label: &str) -> String {
    format!(
        "\n\nNote: this image is a placeholder standing in for the document \"{label}\", \
which could not be rendered page by page. Transcribe the visible text and mention the \
document name."
    )
}

/// Markdown emitted in place of a page whose analysis failed.
pub fn error_fragment(page_num: usize, reason: &str) -> String {
    format!("# Page {page_num}\n\n[Error: Failed to analyze this page - {reason}]\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_names_page_and_symbol_set() {
        let p = page_instruction(7);
        assert!(p.contains("page 7"));
        for sym in ["# for main headings", "**bold**", "| col1 | col2 |", "[Image:"] {
            assert!(p.contains(sym), "missing {sym}");
        }
    }

    #[test]
    fn error_fragment_has_heading_and_reason() {
        let f = error_fragment(2, "HTTP 500");
        assert!(f.starts_with("# Page 2\n"));
        assert!(f.contains("[Error: Failed to analyze this page - HTTP 500]"));
    }
}
