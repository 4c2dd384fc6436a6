//! Inline `<img src=…>` localization.
//!
//! Body HTML still carries plain image tags after the thumbnail pass:
//! images the editors pasted in directly, plus the `<img>` elements the
//! thumbnail simplification keeps. This pass materializes each referenced
//! image and replaces the tag with a `<drupal-media>` embed, so body
//! images go through the same download-once store as everything else.
//! Tags whose image cannot be materialized are left exactly as they are.
//!
//! Alignment carries over from the SPIP wrapper classes
//! (`spip_documents_left` / `_center` / `_right`) when the class survived
//! onto the `<img>` itself.
//!
//! Like the document-tag pass, regex callbacks cannot await, so this runs
//! in three phases: collect distinct tags, materialize, substitute.

use super::{absolutize, embed::media_embed, url_extension, ItemContext};
use crate::config::HarvestConfig;
use crate::pipeline::materialize::MediaStore;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

static RE_IMG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<img\b[^>]*>").unwrap());
static RE_SRC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)\bsrc\s*=\s*["']([^"']*)["']"#).unwrap());
static RE_CLASS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)\bclass\s*=\s*["']([^"']*)["']"#).unwrap());

const ALIGN_CLASSES: [(&str, &str); 3] = [
    ("spip_documents_center", "center"),
    ("spip_documents_left", "left"),
    ("spip_documents_right", "right"),
];

/// Replace materializable `<img>` tags with media embeds.
///
/// A no-op when media downloads are disabled; the downstream fallback for
/// dry runs is the original tag itself.
pub async fn localize_images(
    text: &str,
    config: &HarvestConfig,
    store: &MediaStore,
    ctx: &mut ItemContext,
) -> String {
    if config.skip_media || !text.to_ascii_lowercase().contains("<img") {
        return text.to_string();
    }

    // ── Phase 1: collect distinct localizable tags ──
    let mut tags: Vec<(String, String, Option<&str>)> = Vec::new();
    for m in RE_IMG.find_iter(text) {
        let tag = m.as_str();
        if tags.iter().any(|(t, _, _)| t == tag) {
            continue;
        }
        let Some(src) = RE_SRC
            .captures(tag)
            .map(|c| c[1].trim().to_string())
            .filter(|s| !s.is_empty())
        else {
            continue;
        };
        if src.starts_with("data:") {
            continue;
        }
        match url_extension(&src) {
            Some(ext) if config.is_image_extension(ext) => {}
            _ => {
                debug!("inline image '{src}': not a known image extension, left as-is");
                continue;
            }
        }
        let url = absolute_src(&src, &config.base_url);
        tags.push((tag.to_string(), url, alignment_class(tag)));
    }

    // ── Phase 2: materialize each image ──
    let mut replacements: Vec<(String, String)> = Vec::with_capacity(tags.len());
    for (tag, url, align) in tags {
        match store.ensure(&url).await {
            Ok(reference) => {
                ctx.mark_embedded(reference.id);
                replacements.push((tag, media_embed(&reference.uuid, align)));
            }
            Err(e) => {
                warn!("inline image '{url}': materialization failed ({e}); tag kept");
            }
        }
    }

    // ── Phase 3: substitute ──
    let mut out = text.to_string();
    for (tag, markup) in replacements {
        out = out.replace(&tag, &markup);
    }
    out
}

/// Resolve an `<img src>` value against the item's base URL.
///
/// Unlike link hrefs, a rooted or protocol-relative image src must resolve
/// to a fetchable absolute URL, so the rules differ from [`absolutize`]:
/// `//host/x` gets `https:`, `/x` gets the base's origin.
fn absolute_src(src: &str, base_url: &str) -> String {
    let lower = src.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return src.to_string();
    }
    if src.starts_with("//") {
        return format!("https:{src}");
    }
    if src.starts_with('/') {
        return format!("{}{src}", url_origin(base_url));
    }
    absolutize(src, base_url)
}

/// The `scheme://host[:port]` prefix of a URL, without any path.
fn url_origin(url: &str) -> &str {
    let Some(scheme_end) = url.find("://") else {
        return url.trim_end_matches('/');
    };
    match url[scheme_end + 3..].find('/') {
        Some(slash) => &url[..scheme_end + 3 + slash],
        None => url,
    }
}

fn alignment_class(tag: &str) -> Option<&'static str> {
    let classes = RE_CLASS.captures(tag)?;
    let classes = classes[1].to_ascii_lowercase();
    ALIGN_CLASSES
        .iter()
        .find(|(class, _)| classes.split_whitespace().any(|c| c == *class))
        .map(|(_, align)| *align)
}
