//! Document index resolution: SPIP document id → absolute URL.
//!
//! ## Two-tier strategy
//!
//! SPIP sites expose one or more auxiliary "document index" XML endpoints
//! listing `<doc xml:id="docNNN">` records with the document's storage URL.
//! The resolver fetches each configured endpoint **once**, merges the
//! results into an in-memory map (earlier endpoints win per id), and serves
//! every lookup from that snapshot. Ids missing from the bulk map fall back
//! to a per-id query against the same endpoints, and finally to a
//! deterministic path heuristic — a miss is never fatal.
//!
//! The legacy migration memoized the map in a process-global static,
//! rebuilt implicitly on first use. Here the cache is owned by one
//! `DocumentResolver` instance (one per pipeline run) and built through a
//! `OnceCell`, so concurrent callers within a run observe one consistent
//! snapshot and nothing leaks across runs.

use crate::pipeline::fetch::{fetch_document, Fetcher};
use roxmltree::Document;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

/// Resolves SPIP document ids to absolute URLs.
pub struct DocumentResolver {
    fetcher: Arc<dyn Fetcher>,
    index_urls: Vec<String>,
    id_param: String,
    base_url: String,
    doc_path_pattern: String,
    /// Bulk index map, built at most once per resolver instance.
    map: OnceCell<HashMap<u64, String>>,
    /// Per-id lookup results, misses included, so a doc referenced by
    /// several items is only queried once.
    single_cache: Mutex<HashMap<u64, Option<String>>>,
}

impl DocumentResolver {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        index_urls: Vec<String>,
        id_param: impl Into<String>,
        base_url: impl Into<String>,
        doc_path_pattern: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            index_urls,
            id_param: id_param.into(),
            base_url: base_url.into(),
            doc_path_pattern: doc_path_pattern.into(),
            map: OnceCell::new(),
            single_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve an id to its indexed URL, or `None` on a miss.
    pub async fn resolve(&self, id: u64) -> Option<String> {
        if let Some(url) = self.index_map().await.get(&id) {
            return Some(url.clone());
        }

        {
            let cache = self.single_cache.lock().await;
            if let Some(cached) = cache.get(&id) {
                return cached.clone();
            }
        }

        let url = self.lookup_single(id).await;
        self.single_cache.lock().await.insert(id, url.clone());
        url
    }

    /// Resolve an id, falling back to the `{base}/{pattern}/doc{id}`
    /// heuristic when neither the bulk map nor a per-id lookup knows it.
    pub async fn resolve_or_guess(&self, id: u64) -> String {
        match self.resolve(id).await {
            Some(url) => url,
            None => {
                debug!("doc{id}: unresolved, using path heuristic");
                format!(
                    "{}/{}/doc{}",
                    self.base_url.trim_end_matches('/'),
                    self.doc_path_pattern.trim_matches('/'),
                    id
                )
            }
        }
    }

    /// The merged bulk map; fetched and built on first use only.
    async fn index_map(&self) -> &HashMap<u64, String> {
        self.map
            .get_or_init(|| async {
                let mut merged: HashMap<u64, String> = HashMap::new();
                for endpoint in &self.index_urls {
                    match fetch_document(self.fetcher.as_ref(), endpoint).await {
                        Ok(text) => {
                            let entries = parse_index(&text);
                            let before = merged.len();
                            for (id, url) in entries {
                                merged.entry(id).or_insert(url);
                            }
                            info!(
                                "document index '{}': {} entries ({} new)",
                                endpoint,
                                merged.len(),
                                merged.len() - before
                            );
                        }
                        Err(e) => {
                            // Per-id lookups still cover this endpoint.
                            warn!("document index '{}' unavailable: {}", endpoint, e);
                        }
                    }
                }
                merged
            })
            .await
    }

    /// Query the endpoints for a single id (`?{id_param}={id}`).
    async fn lookup_single(&self, id: u64) -> Option<String> {
        for endpoint in &self.index_urls {
            let separator = if endpoint.contains('?') { '&' } else { '?' };
            let url = format!("{endpoint}{separator}{}={id}", self.id_param);
            match fetch_document(self.fetcher.as_ref(), &url).await {
                Ok(text) => {
                    let mut entries = parse_index(&text);
                    if let Some(position) = entries.iter().position(|(i, _)| *i == id) {
                        return Some(entries.swap_remove(position).1);
                    }
                    // Some index variants answer a single-id query with one
                    // anonymous <doc>; trust it only when it is alone.
                    if entries.len() == 1 {
                        return Some(entries.remove(0).1);
                    }
                }
                Err(e) => debug!("single-id lookup failed for doc{id}: {e}"),
            }
        }
        None
    }
}

/// Parse index XML into `(id, url)` pairs.
///
/// Accepts `<doc>` elements by local name; the id comes from an `xml:id`
/// (or plain `id`) attribute or an `<id>` child, with the first run of
/// digits extracted (`doc123` and `123` are equivalent); the URL from a
/// `doc_url` or `url` child.
pub fn parse_index(xml_text: &str) -> Vec<(u64, String)> {
    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..Default::default()
    };
    let document = match Document::parse_with_options(xml_text, options) {
        Ok(d) => d,
        Err(_) => return Vec::new(),
    };

    let mut entries = Vec::new();
    for node in document
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "doc")
    {
        let raw_id = node
            .attributes()
            .find(|a| a.name() == "id")
            .map(|a| a.value().to_string())
            .or_else(|| child_text(node, "id"));

        let Some(raw_id) = raw_id else { continue };
        let Some(id) = extract_digits(&raw_id) else {
            continue;
        };

        let url = child_text(node, "doc_url").or_else(|| child_text(node, "url"));
        if let Some(url) = url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()) {
            entries.push((id, url));
        }
    }
    entries
}

fn child_text(node: roxmltree::Node<'_, '_>, name: &str) -> Option<String> {
    node.children()
        .find(|c| c.is_element() && c.tag_name().name() == name)
        .and_then(|c| c.text())
        .map(|t| t.to_string())
}

fn extract_digits(value: &str) -> Option<u64> {
    let digits: String = value
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
