//! Markup transformers, composed in a fixed order per field.
//!
//! Each transformer is a function from markup to markup: the SPIP
//! shorthand pass first, then auto-linking, then thumbnail simplification,
//! then inline image localization, then inline document embedding. Gallery
//! fields go through the portfolio resolver instead. The order matters:
//! auto-linking must not run before raccourcis links are converted (it
//! would link the raw URLs inside `[label->url]`), image localization
//! needs the bare `<img>` tags the thumbnail pass produces, and the two
//! embedding passes run last so the earlier passes never see
//! `<drupal-media>` elements.
//!
//! The failure policy is fail-open throughout: a transformer that cannot
//! improve its input returns it unchanged. Nothing in this module aborts
//! an item, let alone the run.

pub mod autolink;
pub mod embed;
pub mod images;
pub mod portfolio;
pub mod raccourcis;
pub mod thumbnails;

use crate::config::HarvestConfig;
use crate::pipeline::materialize::MediaStore;
use crate::pipeline::resolve::DocumentResolver;
use std::collections::HashSet;

/// Media ids embedded so far while processing one item.
///
/// Scoped to a single item's pipeline run: the embed pass records every
/// media it inlines into the body, and the portfolio pass consults the set
/// to keep the gallery free of images the reader already sees inline.
#[derive(Debug, Default, Clone)]
pub struct DedupSet {
    embedded: HashSet<u64>,
}

impl DedupSet {
    pub fn add(&mut self, media_id: u64) {
        self.embedded.insert(media_id);
    }

    pub fn contains(&self, media_id: u64) -> bool {
        self.embedded.contains(&media_id)
    }

    pub fn all(&self) -> &HashSet<u64> {
        &self.embedded
    }
}

/// Per-item working state threaded through the transform chain.
///
/// Replaces the loosely-typed temporary row properties the original
/// migration used to pass state between plugins.
#[derive(Debug, Default)]
pub struct ItemContext {
    /// Media embedded inline into this item's body fields.
    pub dedup: DedupSet,
    /// The item's featured-image URL, once resolved; the portfolio pass
    /// skips gallery entries that duplicate it.
    pub featured_url: Option<String>,
}

impl ItemContext {
    pub fn mark_embedded(&mut self, media_id: u64) {
        self.dedup.add(media_id);
    }

    pub fn is_embedded(&self, media_id: u64) -> bool {
        self.dedup.contains(media_id)
    }

    pub fn embedded_ids(&self) -> &HashSet<u64> {
        self.dedup.all()
    }
}

/// Run the synchronous markup passes, in order.
///
/// This is the front half of the per-field chain; the caller follows it
/// with the (async) embed pass.
pub fn markup_passes(text: &str, config: &HarvestConfig) -> String {
    let html = raccourcis::raccourcis_to_html(text, &config.base_url);
    let html = autolink::autolink(&html, &config.base_url);
    thumbnails::simplify_thumbnails(&html)
}

/// Run the full per-field chain: markup passes, then the media passes
/// (inline image localization, then document embedding).
pub async fn transform_field(
    text: &str,
    config: &HarvestConfig,
    resolver: &DocumentResolver,
    store: &MediaStore,
    ctx: &mut ItemContext,
) -> String {
    let html = markup_passes(text, config);
    let html = images::localize_images(&html, config, store, ctx).await;
    embed::embed_documents(&html, config, resolver, store, ctx).await
}

// ── Shared helpers ───────────────────────────────────────────────────────

/// Escape text for placement inside an HTML attribute or text node.
pub(crate) fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

/// Prefix a relative URL with the base, leaving absolute, `mailto:`,
/// `tel:` and root-relative URLs untouched.
pub(crate) fn absolutize(url: &str, base_url: &str) -> String {
    if base_url.is_empty() || is_absolute_or_rooted(url) {
        return url.to_string();
    }
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        url.trim_start_matches('/')
    )
}

/// Extension of the URL's path component, if any.
pub(crate) fn url_extension(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let basename = path.rsplit('/').next().unwrap_or(path);
    match basename.rfind('.') {
        Some(dot) if dot + 1 < basename.len() => Some(&basename[dot + 1..]),
        _ => None,
    }
}

fn is_absolute_or_rooted(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("http://")
        || lower.starts_with("https://")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || url.starts_with('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_set_scoping() {
        let mut set = DedupSet::default();
        assert!(!set.contains(4));
        set.add(4);
        set.add(4);
        assert!(set.contains(4));
        assert_eq!(set.all().len(), 1);
    }

    #[test]
    fn escape_html_covers_the_five() {
        assert_eq!(
            escape_html(r#"a&b<c>d"e'f"#),
            "a&amp;b&lt;c&gt;d&quot;e&#039;f"
        );
    }

    #[test]
    fn url_extension_ignores_query_and_fragment() {
        assert_eq!(url_extension("https://a.test/IMG/x.png?v=1#top"), Some("png"));
        assert_eq!(url_extension("https://a.test/IMG/doc7"), None);
        assert_eq!(url_extension("https://a.test/IMG/ends."), None);
    }

    #[test]
    fn absolutize_rules() {
        let base = "https://spip.test";
        assert_eq!(absolutize("IMG/x.png", base), "https://spip.test/IMG/x.png");
        assert_eq!(absolutize("https://other.test/x", base), "https://other.test/x");
        assert_eq!(absolutize("mailto:a@b.test", base), "mailto:a@b.test");
        assert_eq!(absolutize("/rooted", base), "/rooted");
        assert_eq!(absolutize("IMG/x.png", ""), "IMG/x.png");
    }
}
