//! Portfolio field resolution: `comdoc123;doc456;` into gallery media.
//!
//! The portfolio field lists document ids behind configurable prefixes.
//! Each id resolves to a URL and materializes into a media reference, with
//! two skips keeping the gallery clean: ids whose URL matches the item's
//! featured image (the theme already shows it), and ids already embedded
//! inline in the body (recorded in the item's [`DedupSet`] by the embed
//! pass). Non-image documents are skipped too; the gallery is image-only.

use super::{url_extension, ItemContext};
use crate::config::HarvestConfig;
use crate::output::MediaReference;
use crate::pipeline::materialize::MediaStore;
use crate::pipeline::resolve::DocumentResolver;
use regex::Regex;
use tracing::debug;

/// Resolve a portfolio field into an ordered list of gallery media.
///
/// An empty result means the field contributes nothing; it is never an
/// error.
pub async fn portfolio_to_media(
    value: &str,
    config: &HarvestConfig,
    resolver: &DocumentResolver,
    store: &MediaStore,
    ctx: &ItemContext,
) -> Vec<MediaReference> {
    if value.trim().is_empty() || config.skip_media {
        return Vec::new();
    }

    let ids = extract_ids(value, &config.portfolio_prefixes);
    if ids.is_empty() {
        return Vec::new();
    }

    let mut gallery = Vec::new();
    for id in ids {
        let url = resolver.resolve_or_guess(id).await;

        if ctx.featured_url.as_deref() == Some(url.as_str()) {
            debug!("portfolio: doc{id} duplicates the featured image, skipped");
            continue;
        }
        if let Some(ext) = url_extension(&url) {
            if !config.is_image_extension(ext) {
                debug!("portfolio: doc{id} is not an image ({ext}), skipped");
                continue;
            }
        }

        match store.ensure(&url).await {
            Ok(reference) => {
                if ctx.is_embedded(reference.id) {
                    debug!("portfolio: doc{id} already embedded inline, skipped");
                    continue;
                }
                gallery.push(reference);
            }
            Err(e) => {
                debug!("portfolio: doc{id} materialization failed ({e}), skipped");
            }
        }
    }
    gallery
}

/// Pull numeric ids out of the field, in order of first appearance.
///
/// Prefixes match case-insensitively with an optional `#` before the
/// digits (`comdoc123`, `doc#123`). Longer prefixes are tried first so a
/// `comdoc` entry is never consumed by the shorter `doc`.
fn extract_ids(value: &str, prefixes: &[String]) -> Vec<u64> {
    let mut sorted: Vec<&String> = prefixes.iter().filter(|p| !p.is_empty()).collect();
    if sorted.is_empty() {
        return Vec::new();
    }
    sorted.sort_by_key(|p| std::cmp::Reverse(p.len()));

    let alternation = sorted
        .iter()
        .map(|p| regex::escape(p))
        .collect::<Vec<_>>()
        .join("|");
    let Ok(re) = Regex::new(&format!(r"(?i)(?:{alternation})#?(\d+)")) else {
        return Vec::new();
    };

    let mut ids = Vec::new();
    for caps in re.captures_iter(value) {
        if let Ok(id) = caps[1].parse::<u64>() {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HarvestError;
    use crate::pipeline::fetch::Fetcher;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct GalleryFetcher;

    #[async_trait]
    impl Fetcher for GalleryFetcher {
        async fn fetch(&self, _url: &str) -> Result<String, HarvestError> {
            Ok(r#"<docs>
                <doc xml:id="doc1"><doc_url>https://spip.test/IMG/png/featured.png</doc_url></doc>
                <doc xml:id="doc2"><doc_url>https://spip.test/IMG/png/second.png</doc_url></doc>
                <doc xml:id="doc3"><doc_url>https://spip.test/IMG/pdf/paper.pdf</doc_url></doc>
                <doc xml:id="doc4"><doc_url>https://spip.test/IMG/jpg/fourth.jpg</doc_url></doc>
            </docs>"#
                .to_string())
        }

        async fn fetch_bytes(&self, _url: &str) -> Result<Vec<u8>, HarvestError> {
            Ok(b"image bytes".to_vec())
        }
    }

    fn fixtures(root: &TempDir) -> (HarvestConfig, DocumentResolver, MediaStore) {
        let fetcher: Arc<dyn Fetcher> = Arc::new(GalleryFetcher);
        let config = HarvestConfig::builder()
            .base_url("https://spip.test")
            .index_url("https://spip.test/docs.xml")
            .media_root(root.path())
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

    #[test]
    fn id_extraction_handles_prefixes_and_order() {
        let prefixes = vec!["comdoc".to_string(), "doc".to_string()];
        assert_eq!(
            extract_ids("comdoc12;doc34;comdoc#56;DOC78;", &prefixes),
            vec![12, 34, 56, 78]
        );
        assert_eq!(extract_ids("comdoc12;comdoc12;", &prefixes), vec![12]);
        assert_eq!(extract_ids("nothing here", &prefixes), Vec::<u64>::new());
    }

    #[tokio::test]
    async fn featured_image_is_skipped() {
        let root = TempDir::new().unwrap();
        let (config, resolver, store) = fixtures(&root);
        let ctx = ItemContext {
            featured_url: Some("https://spip.test/IMG/png/featured.png".to_string()),
            ..Default::default()
        };

        let gallery =
            portfolio_to_media("comdoc1;comdoc2;", &config, &resolver, &store, &ctx).await;

        assert_eq!(gallery.len(), 1);
        assert_eq!(gallery[0].uri, "spip/images/second.png");
    }

    #[tokio::test]
    async fn inline_embedded_media_is_skipped() {
        let root = TempDir::new().unwrap();
        let (config, resolver, store) = fixtures(&root);

        // Simulate the embed pass having already inlined doc2.
        let inlined = store
            .ensure("https://spip.test/IMG/png/second.png")
            .await
            .unwrap();
        let mut ctx = ItemContext::default();
        ctx.mark_embedded(inlined.id);

        let gallery = portfolio_to_media("doc2;doc4;", &config, &resolver, &store, &ctx).await;
        assert_eq!(gallery.len(), 1);
        assert_eq!(gallery[0].uri, "spip/images/fourth.jpg");
    }

    #[tokio::test]
    async fn non_image_documents_are_skipped() {
        let root = TempDir::new().unwrap();
        let (config, resolver, store) = fixtures(&root);
        let ctx = ItemContext::default();

        let gallery = portfolio_to_media("doc3;doc4;", &config, &resolver, &store, &ctx).await;
        assert_eq!(gallery.len(), 1);
        assert_eq!(gallery[0].bundle, "image");
    }

    #[tokio::test]
    async fn empty_field_yields_empty_gallery() {
        let root = TempDir::new().unwrap();
        let (config, resolver, store) = fixtures(&root);
        let ctx = ItemContext::default();

        assert!(portfolio_to_media("  ", &config, &resolver, &store, &ctx)
            .await
            .is_empty());
        assert!(
            portfolio_to_media("no ids at all", &config, &resolver, &store, &ctx)
                .await
                .is_empty()
        );
    }

    #[tokio::test]
    async fn skip_media_disables_the_gallery() {
        let root = TempDir::new().unwrap();
        let (mut config, resolver, store) = fixtures(&root);
        config.skip_media = true;
        let ctx = ItemContext::default();

        assert!(
            portfolio_to_media("comdoc2;", &config, &resolver, &store, &ctx)
                .await
                .is_empty()
        );
    }
}
