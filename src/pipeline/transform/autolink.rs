//! Auto-linking of bare URLs in HTML fragments.
//!
//! Walks the fragment tag by tag, linkifying only text that is not already
//! inside an anchor, and normalizes relative `href`s on existing anchors
//! against the configured base. The walker is a plain scanner rather than a
//! DOM round-trip: the fragments are small, and a scanner cannot reorder or
//! re-serialize markup it does not touch.

use super::absolutize;
use once_cell::sync::Lazy;
use regex::Regex;

/// A URL-ish token in prose: `http(s)://…` or `www.…`, optionally preceded
/// by `@` (mention style, kept outside the link).
static RE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)@?(?:https?://|www\.)[^\s<]+").unwrap());

static RE_HREF: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)\bhref\s*=\s*"([^"]*)""#).unwrap());

/// Punctuation that commonly trails a URL in prose but is not part of it.
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ')', ';', ':', '!', '?', ']', '}', '\'', '"'];

/// Wrap bare URLs in anchors and absolutize relative anchor hrefs.
pub fn autolink(html: &str, base_url: &str) -> String {
    if html.is_empty() {
        return String::new();
    }

    let mut out = String::with_capacity(html.len());
    let mut anchor_depth: usize = 0;
    let mut rest = html;

    while let Some(lt) = rest.find('<') {
        let (text, tail) = rest.split_at(lt);
        push_text(&mut out, text, anchor_depth, base_url);

        let Some(gt) = tail.find('>') else {
            // Unterminated tag; emit verbatim and stop.
            out.push_str(tail);
            return out;
        };
        let tag = &tail[..=gt];

        if is_anchor_open(tag) {
            anchor_depth += 1;
            out.push_str(&absolutize_href(tag, base_url));
        } else if is_anchor_close(tag) {
            anchor_depth = anchor_depth.saturating_sub(1);
            out.push_str(tag);
        } else {
            out.push_str(tag);
        }
        rest = &tail[gt + 1..];
    }
    push_text(&mut out, rest, anchor_depth, base_url);
    out
}

fn push_text(out: &mut String, text: &str, anchor_depth: usize, base_url: &str) {
    if text.is_empty() {
        return;
    }
    if anchor_depth == 0 {
        out.push_str(&linkify(text, base_url));
    } else {
        out.push_str(text);
    }
}

fn is_anchor_open(tag: &str) -> bool {
    let lower = tag.to_ascii_lowercase();
    lower.starts_with("<a")
        && matches!(lower.as_bytes().get(2), Some(b' ' | b'>' | b'\t' | b'\n'))
        && !lower.ends_with("/>")
}

fn is_anchor_close(tag: &str) -> bool {
    tag.to_ascii_lowercase().starts_with("</a")
}

/// Absolutize a relative `href` on an anchor open tag.
fn absolutize_href(tag: &str, base_url: &str) -> String {
    if base_url.is_empty() {
        return tag.to_string();
    }
    RE_HREF
        .replace(tag, |caps: &regex::Captures<'_>| {
            let href = &caps[1];
            if href.is_empty() {
                caps[0].to_string()
            } else {
                format!("href=\"{}\"", absolutize(href, base_url))
            }
        })
        .into_owned()
}

/// Wrap URL tokens in a text run with anchors.
fn linkify(text: &str, base_url: &str) -> String {
    RE_URL
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let raw = &caps[0];

            let (leading_at, url) = match raw.strip_prefix('@') {
                Some(stripped) => ("@", stripped),
                None => ("", raw),
            };

            let trimmed = url.trim_end_matches(TRAILING_PUNCTUATION);
            let trailing = &url[trimmed.len()..];

            let mut href = trimmed.to_string();
            if href.to_ascii_lowercase().starts_with("www.") {
                href = format!("http://{href}");
            }
            let href = absolutize(&href, base_url);

            format!("{leading_at}<a href=\"{href}\">{trimmed}</a>{trailing}")
        })
        .into_owned()
}
