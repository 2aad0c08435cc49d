//! Heuristic structure pass over the aggregated Markdown.
//!
//! Each trimmed line goes through the rules below; the first that matches
//! wins:
//!
//! | # | Match | Output |
//! |---|-------|--------|
//! | 1 | blank | blank |
//! | 2 | `<addr@host>` | `[addr@host](mailto:addr@host)` |
//! | 3 | first non-blank line over 10 chars, or a title keyword | `# line` + blank line |
//! | 4 | a date | `**line**` |
//! | 5 | exactly one `:` | `**key**: value` |
//! | 6 | under 20 chars with a label keyword | `**line**` |
//! | 7 | anything else | unchanged |
//!
//! Runs of blank lines are then collapsed to one. Lines that are already
//! Markdown structure (headings, rules, tables, lists, bold-led lines,
//! bracketed annotations, mail links) are passed through, which keeps the
//! pass idempotent.

use once_cell::sync::Lazy;
use regex::Regex;

const TITLE_KEYWORDS: &[&str] = &["확인서", "증명서", "참가", "Conference", "Certificate"];
const LABEL_KEYWORDS: &[&str] = &[
    "성명", "이름", "날짜", "시간", "장소", "Name", "Date", "Time", "Place",
];

static RE_EMAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"<([^@<>]+@[^>]+)>").unwrap());

static RE_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{4}년\s*\d{1,2}월\s*\d{1,2}일|\d{1,2}월\s*\d{1,2}일|\d{4}-\d{2}-\d{2}").unwrap()
});

static RE_LIST: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([-*+]|\d+[.)])\s").unwrap());

/// Apply the structure heuristics to `text`.
pub fn enhance_markdown(text: &str) -> String {
    if text.trim().is_empty() {
        return text.to_string();
    }

    let mut out: Vec<String> = Vec::new();
    let mut seen_content = false;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            out.push(String::new());
            continue;
        }
        let first = !seen_content;
        seen_content = true;

        if is_structural(line) {
            out.push(line.to_string());
            continue;
        }

        if line.contains('<') && line.contains('@') && line.contains('>') {
            out.push(RE_EMAIL.replace_all(line, "[$1](mailto:$1)").into_owned());
            continue;
        }

        if (first && line.chars().count() > 10) || TITLE_KEYWORDS.iter().any(|k| line.contains(k)) {
            out.push(format!("# {line}"));
            out.push(String::new());
            continue;
        }

        if RE_DATE.is_match(line) {
            out.push(format!("**{line}**"));
            continue;
        }

        if line.matches(':').count() == 1 {
            if let Some((key, value)) = line.split_once(':') {
                out.push(format!("**{}**: {}", key.trim(), value.trim()));
                continue;
            }
        }

        if line.chars().count() < 20 && LABEL_KEYWORDS.iter().any(|k| line.contains(k)) {
            out.push(format!("**{line}**"));
            continue;
        }

        out.push(line.to_string());
    }

    collapse_blank_lines(out)
}

fn is_structural(line: &str) -> bool {
    line.starts_with('#')
        || line.starts_with('|')
        || line.starts_with("**")
        || line.contains("](mailto:")
        || (line.starts_with('[') && line.ends_with(']'))
        || is_rule(line)
        || RE_LIST.is_match(line)
}

fn is_rule(line: &str) -> bool {
    line.len() >= 3
        && (line.chars().all(|c| c == '-') || line.chars().all(|c| c == '*'))
}

fn collapse_blank_lines(lines: Vec<String>) -> String {
    let mut result = Vec::with_capacity(lines.len());
    let mut prev_empty = false;
    for line in lines {
        let empty = line.is_empty();
        if !(empty && prev_empty) {
            result.push(line);
        }
        prev_empty = empty;
    }
    result.join("\n")
}
