//! Thumbnail-anchor simplification.
//!
//! SPIP wraps inline images in two layers of chrome: a `<span
//! class="spip_document_…">` decoration and an `<a class="thumbnail">`
//! linking the thumbnail to the full-size file. Neither survives the
//! migration; this pass unwraps the spans and collapses each thumbnail
//! anchor down to its bare `<img>`, deriving an alt from the filename when
//! the source left it empty.
//!
//! Running the pass on its own output is a no-op: the simplified markup
//! contains neither pattern.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_SPIP_SPAN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<span\b[^>]*class\s*=\s*"[^"]*spip_document[^"]*"[^>]*>"#).unwrap()
});
static RE_ANY_SPAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</?span\b[^>]*>").unwrap());
static RE_THUMB_ANCHOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<a\b[^>]*class\s*=\s*"(?:[^"]*\s)?thumbnail(?:\s[^"]*)?"[^>]*>"#).unwrap()
});
static RE_IMG_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<img\b[^>]*>").unwrap());

static RE_SRC: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)\bsrc\s*=\s*"([^"]*)""#).unwrap());
static RE_ALT: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)\balt\s*=\s*"([^"]*)""#).unwrap());
static RE_WIDTH: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)\bwidth\s*=\s*"([^"]*)""#).unwrap());
static RE_HEIGHT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\bheight\s*=\s*"([^"]*)""#).unwrap());

/// Unwrap SPIP document spans and collapse thumbnail anchors to `<img>`.
pub fn simplify_thumbnails(html: &str) -> String {
    let lower = html.to_ascii_lowercase();
    if !lower.contains("spip_document") && !lower.contains("thumbnail") {
        return html.to_string();
    }
    let text = unwrap_spip_spans(html);
    collapse_thumbnail_anchors(&text)
}

/// Replace each SPIP document span with its children.
fn unwrap_spip_spans(html: &str) -> String {
    let mut text = html.to_string();
    while let Some(open) = RE_SPIP_SPAN.find(&text) {
        let (open_start, open_end) = (open.start(), open.end());
        match matching_span_close(&text[open_end..]) {
            Some((close_start, close_end)) => {
                let inner = text[open_end..open_end + close_start].to_string();
                text.replace_range(open_start..open_end + close_end, &inner);
            }
            None => {
                // Dangling open tag; drop it and keep what follows.
                text.replace_range(open_start..open_end, "");
            }
        }
    }
    text
}

/// Offsets (start, end) of the `</span>` matching an already-consumed open
/// tag, honouring nested spans.
fn matching_span_close(rest: &str) -> Option<(usize, usize)> {
    let mut depth: usize = 1;
    for m in RE_ANY_SPAN.find_iter(rest) {
        if m.as_str().starts_with("</") {
            depth -= 1;
            if depth == 0 {
                return Some((m.start(), m.end()));
            }
        } else {
            depth += 1;
        }
    }
    None
}

/// Replace each `<a class="thumbnail">…<img …>…</a>` with the bare image.
fn collapse_thumbnail_anchors(html: &str) -> String {
    let mut text = html.to_string();
    let mut search_from = 0;

    while let Some(open) = RE_THUMB_ANCHOR.find_at(&text, search_from) {
        let (open_start, open_end) = (open.start(), open.end());
        let Some(close_rel) = text[open_end..].to_ascii_lowercase().find("</a") else {
            break;
        };
        let close_start = open_end + close_rel;
        let Some(close_gt) = text[close_start..].find('>') else {
            break;
        };
        let close_end = close_start + close_gt + 1;

        let inner = &text[open_end..close_start];
        let replacement = RE_IMG_TAG
            .find(inner)
            .and_then(|img| rebuild_img(img.as_str()));

        match replacement {
            Some(img) => {
                text.replace_range(open_start..close_end, &img);
                search_from = open_start + img.len();
            }
            None => {
                // Anchor without a usable image; leave it and scan past.
                search_from = close_end;
            }
        }
    }
    text
}

/// A clean `<img>` carrying over src/alt/width/height, or `None` when the
/// source image has no src.
fn rebuild_img(img_tag: &str) -> Option<String> {
    let src = RE_SRC.captures(img_tag)?.get(1)?.as_str().to_string();
    if src.is_empty() {
        return None;
    }

    let alt = RE_ALT
        .captures(img_tag)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| derive_alt(&src));

    let mut out = format!("<img src=\"{src}\"");
    if !alt.is_empty() {
        out.push_str(&format!(" alt=\"{alt}\""));
    }
    if let Some(width) = RE_WIDTH.captures(img_tag).and_then(|c| c.get(1)) {
        if !width.as_str().is_empty() {
            out.push_str(&format!(" width=\"{}\"", width.as_str()));
        }
    }
    if let Some(height) = RE_HEIGHT.captures(img_tag).and_then(|c| c.get(1)) {
        if !height.as_str().is_empty() {
            out.push_str(&format!(" height=\"{}\"", height.as_str()));
        }
    }
    out.push('>');
    Some(out)
}

/// Filename stem of the image path, used as a fallback alt.
pub(crate) fn derive_alt(src: &str) -> String {
    let path = src.split(['?', '#']).next().unwrap_or(src);
    let basename = path.trim_end_matches('/').rsplit('/').next().unwrap_or("");
    match basename.rfind('.') {
        Some(dot) => basename[..dot].to_string(),
        None => basename.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THUMB: &str = concat!(
        r#"<a class="thumbnail" href="https://spip.test/IMG/png/example.png">"#,
        r#"<span class="spip_document_12 spip_documents">"#,
        r#"<img src="https://spip.test/IMG/png/example.png" alt="" width="800" height="146">&nbsp;"#,
        r#"</span></a>"#
    );

    #[test]
    fn collapses_thumbnail_anchor_to_img() {
        assert_eq!(
            simplify_thumbnails(THUMB),
            r#"<img src="https://spip.test/IMG/png/example.png" alt="example" width="800" height="146">"#
        );
    }

    #[test]
    fn existing_alt_is_kept() {
        let html = r#"<a class="thumbnail" href="x"><img src="a/b.png" alt="hand written"></a>"#;
        assert_eq!(
            simplify_thumbnails(html),
            r#"<img src="a/b.png" alt="hand written">"#
        );
    }

    #[test]
    fn span_without_anchor_is_unwrapped() {
        let html = r#"<span class="spip_documents_center"><img src="a.png" alt="x"></span>"#;
        assert_eq!(simplify_thumbnails(html), r#"<img src="a.png" alt="x">"#);
    }

    #[test]
    fn nested_spans_keep_inner_content() {
        let html = concat!(
            r#"<span class="spip_document_3 spip_documents">"#,
            r#"outer <span>inner</span> tail</span>"#
        );
        assert_eq!(simplify_thumbnails(html), "outer <span>inner</span> tail");
    }

    #[test]
    fn plain_anchors_are_untouched() {
        let html = r#"<a href="https://x.test">link</a> with thumbnail word"#;
        assert_eq!(simplify_thumbnails(html), html);
    }

    #[test]
    fn anchor_without_img_is_left_alone() {
        let html = r#"<a class="thumbnail" href="x">just text</a>"#;
        assert_eq!(simplify_thumbnails(html), html);
    }

    #[test]
    fn idempotent_on_own_output() {
        let once = simplify_thumbnails(THUMB);
        assert_eq!(simplify_thumbnails(&once), once);
    }

    #[test]
    fn alt_derivation_strips_extension_keeps_underscores() {
        assert_eq!(derive_alt("https://x.test/IMG/png/flyer_-_copie.png"), "flyer_-_copie");
        assert_eq!(derive_alt("plain"), "plain");
    }
}
