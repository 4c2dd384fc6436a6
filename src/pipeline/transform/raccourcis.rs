//! SPIP "raccourcis" shorthand to HTML.
//!
//! Handles the subset of SPIP's lightweight markup that actually occurs in
//! the exports: `[label->url]` links, `{{strong}}`, `{emphasis}`, `-*` /
//! `-#` list lines, and blank-line paragraph blocks. Inline `<docNNN|…>`
//! tags are deliberately left intact for the embed pass.

use super::{absolutize, escape_html};
use once_cell::sync::Lazy;
use regex::Regex;

static RE_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(.*?)->([^\]]+)\]").unwrap());
static RE_STRONG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{\{\s*(.+?)\s*\}\}").unwrap());
// Only single braces survive the strong pass, so no lookaround is needed.
static RE_EM: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\s*([^{}]+?)\s*\}").unwrap());
static RE_UL_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*-\*\s+(.*)$").unwrap());
static RE_OL_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*-#\s+(.*)$").unwrap());
static RE_BLANK_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").unwrap());
static RE_BLOCK_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*</?(?:ul|ol|li|p|h[1-6]|blockquote|table|pre|div|drupal-media)[\s>]")
        .unwrap()
});
static RE_INNER_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n+").unwrap());

/// Convert SPIP shorthand markup to an HTML fragment.
pub fn raccourcis_to_html(text: &str, base_url: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    // ── Step 1: normalize line endings ──
    let text = text.replace("\r\n", "\n").replace('\r', "\n");

    // ── Step 2: [label->url] links ──
    let text = RE_LINK.replace_all(&text, |caps: &regex::Captures<'_>| {
        let label = caps[1].trim();
        let url = absolutize(caps[2].trim(), base_url);
        format!(
            "<a href=\"{}\">{}</a>",
            escape_html(&url),
            escape_html(label)
        )
    });

    // ── Step 3: {{strong}} then {emphasis} ──
    let text = RE_STRONG.replace_all(&text, "<strong>$1</strong>");
    let text = RE_EM.replace_all(&text, "<em>$1</em>");

    // ── Step 4: -* / -# list lines ──
    let text = group_list_lines(&text);

    // ── Step 5: blank-line blocks become paragraphs ──
    paragraphize(&text)
}

/// Group consecutive `-*` / `-#` lines into `<ul>` / `<ol>`; any other
/// line closes the open list.
fn group_list_lines(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut in_ul = false;
    let mut in_ol = false;

    for line in text.split('\n') {
        if let Some(caps) = RE_UL_LINE.captures(line) {
            if !in_ul {
                if in_ol {
                    out.push("</ol>".into());
                    in_ol = false;
                }
                out.push("<ul>".into());
                in_ul = true;
            }
            out.push(format!("<li>{}</li>", &caps[1]));
            continue;
        }
        if let Some(caps) = RE_OL_LINE.captures(line) {
            if !in_ol {
                if in_ul {
                    out.push("</ul>".into());
                    in_ul = false;
                }
                out.push("<ol>".into());
                in_ol = true;
            }
            out.push(format!("<li>{}</li>", &caps[1]));
            continue;
        }
        if in_ul {
            out.push("</ul>".into());
            in_ul = false;
        }
        if in_ol {
            out.push("</ol>".into());
            in_ol = false;
        }
        out.push(line.to_string());
    }
    if in_ul {
        out.push("</ul>".into());
    }
    if in_ol {
        out.push("</ol>".into());
    }

    out.join("\n")
}

/// Wrap blank-line-separated blocks in `<p>`, leaving blocks that already
/// start with a block-level tag alone. Single newlines inside a paragraph
/// collapse to spaces.
fn paragraphize(text: &str) -> String {
    let mut parts: Vec<String> = Vec::new();
    for block in RE_BLANK_SPLIT.split(text.trim()) {
        let trimmed = block.trim();
        if trimmed.is_empty() {
            continue;
        }
        if RE_BLOCK_TAG.is_match(trimmed) {
            parts.push(trimmed.to_string());
        } else {
            parts.push(format!(
                "<p>{}</p>",
                RE_INNER_NEWLINES.replace_all(trimmed, " ")
            ));
        }
    }
    parts.join("\n")
}
