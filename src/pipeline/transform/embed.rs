//! Inline `<docNNN|align>` / `<imgNNN|align>` tag resolution.
//!
//! SPIP body text references uploaded documents by numeric id. This pass
//! resolves each id to a URL, materializes the file, and emits a
//! `<drupal-media>` element carrying the media's deterministic UUID. When
//! materialization is skipped or fails, the tag degrades to a plain `<img>`
//! pointing at the resolved URL, so the reader still gets the picture.
//!
//! Regex replacement callbacks cannot await, so the pass runs in three
//! phases: collect the distinct tags, resolve and materialize each, then
//! substitute the results back in.

use super::{escape_html, ItemContext};
use crate::config::HarvestConfig;
use crate::pipeline::materialize::MediaStore;
use crate::pipeline::resolve::DocumentResolver;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

static RE_DOC_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<(?:doc|img)(\d+)(?:\|(left|center|right))?>").unwrap());

/// Replace inline document tags with media embeds (or `<img>` fallbacks).
pub async fn embed_documents(
    text: &str,
    config: &HarvestConfig,
    resolver: &DocumentResolver,
    store: &MediaStore,
    ctx: &mut ItemContext,
) -> String {
    if !RE_DOC_TAG.is_match(text) {
        return text.to_string();
    }

    // ── Phase 1: collect distinct tags ──
    let mut tags: Vec<(String, u64, Option<String>)> = Vec::new();
    for caps in RE_DOC_TAG.captures_iter(text) {
        let whole = caps[0].to_string();
        if tags.iter().any(|(t, _, _)| *t == whole) {
            continue;
        }
        let Ok(id) = caps[1].parse::<u64>() else {
            continue;
        };
        let align = caps.get(2).map(|m| m.as_str().to_ascii_lowercase());
        tags.push((whole, id, align));
    }

    // ── Phase 2: resolve and materialize each tag ──
    let mut replacements: Vec<(String, String)> = Vec::with_capacity(tags.len());
    for (tag, id, align) in tags {
        let url = resolver.resolve_or_guess(id).await;
        let markup = if config.skip_media {
            fallback_img(&url, id, align.as_deref())
        } else {
            match store.ensure(&url).await {
                Ok(reference) => {
                    ctx.mark_embedded(reference.id);
                    media_embed(&reference.uuid, align.as_deref())
                }
                Err(e) => {
                    warn!("doc{id}: materialization failed ({e}); using <img> fallback");
                    fallback_img(&url, id, align.as_deref())
                }
            }
        };
        replacements.push((tag, markup));
    }

    // ── Phase 3: substitute ──
    let mut out = text.to_string();
    for (tag, markup) in replacements {
        out = out.replace(&tag, &markup);
    }
    out
}

pub(crate) fn media_embed(uuid: &str, align: Option<&str>) -> String {
    match align {
        Some(align) => format!(
            "<drupal-media data-entity-type=\"media\" data-entity-uuid=\"{uuid}\" data-align=\"{align}\"></drupal-media>"
        ),
        None => format!(
            "<drupal-media data-entity-type=\"media\" data-entity-uuid=\"{uuid}\"></drupal-media>"
        ),
    }
}

fn fallback_img(url: &str, id: u64, align: Option<&str>) -> String {
    let class = match align {
        Some(align) => format!(" class=\"spip_documents_{align}\""),
        None => String::new(),
    };
    format!(
        "<img src=\"{}\"{class} alt=\"doc{id}\">",
        escape_html(url)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HarvestError;
    use crate::pipeline::fetch::Fetcher;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct FixtureFetcher;

    #[async_trait]
    impl Fetcher for FixtureFetcher {
        async fn fetch(&self, _url: &str) -> Result<String, HarvestError> {
            Ok(r#"<docs>
                <doc xml:id="doc12"><doc_url>https://spip.test/IMG/png/chart.png</doc_url></doc>
                <doc xml:id="doc13"><doc_url>https://spip.test/IMG/pdf/notes.pdf</doc_url></doc>
            </docs>"#
                .to_string())
        }

        async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, HarvestError> {
            if url.contains("notes.pdf") {
                return Err(HarvestError::Fetch {
                    url: url.to_string(),
                    reason: "HTTP 404 Not Found".to_string(),
                });
            }
            Ok(b"image bytes".to_vec())
        }
    }

    fn fixtures(root: &TempDir, skip_media: bool) -> (HarvestConfig, DocumentResolver, MediaStore) {
        let fetcher: Arc<dyn Fetcher> = Arc::new(FixtureFetcher);
        let config = HarvestConfig::builder()
            .base_url("https://spip.test")
            .index_url("https://spip.test/docs.xml")
            .media_root(root.path())
            .skip_media(skip_media)
            .build()
            .unwrap();
        let resolver = DocumentResolver::new(
            Arc::clone(&fetcher),
            config.index_urls.clone(),
            config.id_param.clone(),
            config.base_url.clone(),
            config.doc_path_pattern.clone(),
        );
        let store = MediaStore::new(&config, fetcher);
        (config, resolver, store)
    }

    #[tokio::test]
    async fn doc_tag_becomes_media_embed() {
        let root = TempDir::new().unwrap();
        let (config, resolver, store) = fixtures(&root, false);
        let mut ctx = ItemContext::default();

        let html =
            embed_documents("before <doc12|center> after", &config, &resolver, &store, &mut ctx)
                .await;

        assert!(html.starts_with("before <drupal-media data-entity-type=\"media\""));
        assert!(html.contains("data-align=\"center\""));
        assert!(html.ends_with("</drupal-media> after"));
        assert!(!html.contains("<doc12"));
        assert_eq!(ctx.embedded_ids().len(), 1);
    }

    #[tokio::test]
    async fn align_is_optional() {
        let root = TempDir::new().unwrap();
        let (config, resolver, store) = fixtures(&root, false);
        let mut ctx = ItemContext::default();

        let html = embed_documents("<doc12>", &config, &resolver, &store, &mut ctx).await;
        assert!(!html.contains("data-align"));
    }

    #[tokio::test]
    async fn repeated_tags_share_one_media() {
        let root = TempDir::new().unwrap();
        let (config, resolver, store) = fixtures(&root, false);
        let mut ctx = ItemContext::default();

        let html = embed_documents(
            "<doc12|left> text <doc12|left>",
            &config,
            &resolver,
            &store,
            &mut ctx,
        )
        .await;

        assert_eq!(html.matches("<drupal-media").count(), 2);
        assert_eq!(store.counters().await.created, 1);
        assert_eq!(ctx.embedded_ids().len(), 1);
    }

    #[tokio::test]
    async fn failed_download_falls_back_to_img() {
        let root = TempDir::new().unwrap();
        let (config, resolver, store) = fixtures(&root, false);
        let mut ctx = ItemContext::default();

        let html = embed_documents("<doc13|left>", &config, &resolver, &store, &mut ctx).await;

        assert_eq!(
            html,
            "<img src=\"https://spip.test/IMG/pdf/notes.pdf\" class=\"spip_documents_left\" alt=\"doc13\">"
        );
        assert!(ctx.embedded_ids().is_empty());
        assert_eq!(store.counters().await.failed, 1);
    }

    #[tokio::test]
    async fn skip_media_always_falls_back() {
        let root = TempDir::new().unwrap();
        let (config, resolver, store) = fixtures(&root, true);
        let mut ctx = ItemContext::default();

        let html = embed_documents("<doc12>", &config, &resolver, &store, &mut ctx).await;
        assert_eq!(
            html,
            "<img src=\"https://spip.test/IMG/png/chart.png\" alt=\"doc12\">"
        );
        assert_eq!(store.counters().await.created, 0);
    }

    #[tokio::test]
    async fn unresolved_id_uses_heuristic_url() {
        let root = TempDir::new().unwrap();
        let (config, resolver, store) = fixtures(&root, true);
        let mut ctx = ItemContext::default();

        let html = embed_documents("<doc777>", &config, &resolver, &store, &mut ctx).await;
        assert!(html.contains("https://spip.test/IMG/doc777"), "got: {html}");
    }

    #[tokio::test]
    async fn text_without_tags_is_untouched() {
        let root = TempDir::new().unwrap();
        let (config, resolver, store) = fixtures(&root, false);
        let mut ctx = ItemContext::default();

        let input = "<p>no tags here, only <img src=\"x.png\"> markup</p>";
        let html = embed_documents(input, &config, &resolver, &store, &mut ctx).await;
        assert_eq!(html, input);
    }

    #[tokio::test]
    async fn rerun_on_output_is_a_noop() {
        let root = TempDir::new().unwrap();
        let (config, resolver, store) = fixtures(&root, false);
        let mut ctx = ItemContext::default();

        let once =
            embed_documents("x <doc12|right> y", &config, &resolver, &store, &mut ctx).await;
        let twice = embed_documents(&once, &config, &resolver, &store, &mut ctx).await;
        assert_eq!(once, twice);
    }
}
