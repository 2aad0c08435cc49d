//! Post-processing: deterministic cleanup of one page's model output.
//!
//! Even well-prompted vision models occasionally wrap the answer in
//! ` ```markdown ... ``` ` fences, use `\r\n` line endings or leak
//! zero-width characters. These cheap rules fix such quirks without touching
//! content. Heading and table structure is left to the enhancement pass.
//!
//! ## Rule Order
//!
//! Fences are stripped before line endings are normalised so the fence
//! pattern sees the model's raw output; invisible characters go last so a
//! BOM in front of a fence does not hide it.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all tidy rules to a successful page fragment.
///
/// 1. Strip outer markdown fences
/// 2. Normalise line endings (CRLF → LF)
/// 3. Trim trailing whitespace per line
/// 4. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, …)
/// 5. Trim leading and trailing blank lines
pub fn tidy_fragment(input: &str) -> String {
    let s = input.trim_start_matches('\u{FEFF}');
    let s = strip_markdown_fences(s);
    let s = normalise_line_endings(&s);
    let s = trim_trailing_whitespace(&s);
    let s = remove_invisible_chars(&s);
    s.trim_matches('\n').to_string()
}

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?\r?\n(.*?)\r?\n```\s*$").unwrap());

fn strip_markdown_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}
