//! Eager harvest entry points.
//!
//! [`harvest`] walks the whole export and returns every item at once;
//! [`harvest_to_file`] additionally writes the result as JSON;
//! [`fetch_single_page`] processes exactly one page and surfaces fetch and
//! parse errors instead of treating them as end-of-data. For processing
//! items as they arrive, see [`crate::stream::harvest_stream`].

use crate::config::HarvestConfig;
use crate::error::{HarvestError, ItemError};
use crate::output::{HarvestOutput, HarvestStats, HarvestedItem};
use crate::pipeline::extract::SourceItem;
use crate::pipeline::fetch::{Fetcher, HttpFetcher};
use crate::pipeline::materialize::MediaStore;
use crate::pipeline::paginate::{build_page_url, PageWalker};
use crate::pipeline::resolve::DocumentResolver;
use crate::pipeline::transform::{self, ItemContext};
use crate::pipeline::transform::thumbnails::derive_alt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// The per-run collaborators shared by every pipeline stage.
pub(crate) struct PipelineParts {
    pub fetcher: Arc<dyn Fetcher>,
    pub resolver: DocumentResolver,
    pub store: MediaStore,
}

pub(crate) fn build_parts(config: &HarvestConfig) -> Result<PipelineParts, HarvestError> {
    let fetcher: Arc<dyn Fetcher> = match &config.fetcher {
        Some(custom) => Arc::clone(custom),
        None => Arc::new(HttpFetcher::new(config.fetch_timeout_secs)?),
    };
    let resolver = DocumentResolver::new(
        Arc::clone(&fetcher),
        config.index_urls.clone(),
        config.id_param.clone(),
        config.base_url.clone(),
        config.doc_path_pattern.clone(),
    );
    let store = MediaStore::new(config, Arc::clone(&fetcher));
    Ok(PipelineParts {
        fetcher,
        resolver,
        store,
    })
}

/// Harvest the whole export: walk pages, transform every item, collect
/// the rows and run statistics.
///
/// Item-level failures never abort the run; fatal errors (unreachable
/// source, page bound exceeded, zero items overall) do.
pub async fn harvest(config: &HarvestConfig) -> Result<HarvestOutput, HarvestError> {
    let total_start = Instant::now();
    let parts = build_parts(config)?;
    if config.reuse_existing && !config.skip_media {
        parts.store.load_ledger().await;
    }

    let progress = config.progress_callback.clone();
    if let Some(cb) = &progress {
        cb.on_harvest_start();
    }

    // ── Step 1: walk pages, transforming each page's items in order ──
    let mut walker = PageWalker::new(Arc::clone(&parts.fetcher), config.clone());
    let mut items: Vec<HarvestedItem> = Vec::new();
    let mut transform_duration_ms: u64 = 0;

    loop {
        let Some((page_no, page_items)) = walker.next_page().await? else {
            break;
        };
        if let Some(cb) = &progress {
            cb.on_page_fetched(page_no, page_items.len());
        }

        let transform_start = Instant::now();
        for source in &page_items {
            let index = items.len();
            let item = process_item(source, config, &parts.resolver, &parts.store).await;
            if let Some(cb) = &progress {
                match &item.error {
                    Some(e) => cb.on_item_error(index, &item.id, &e.to_string()),
                    None => cb.on_item_complete(index, &item.id),
                }
            }
            items.push(item);
        }
        transform_duration_ms += transform_start.elapsed().as_millis() as u64;
    }

    // ── Step 2: reject an entirely empty harvest ──
    if items.is_empty() {
        return Err(HarvestError::NoItems {
            url: build_page_url(&config.base_url, config.page, config.per_page),
            selector: config.item_tag.clone(),
        });
    }

    // ── Step 3: persist the media ledger for the next run ──
    if config.reuse_existing && !config.skip_media {
        if let Err(e) = parts.store.persist_ledger().await {
            warn!("could not persist media ledger: {e}");
        }
    }

    // ── Step 4: assemble stats ──
    let media = parts.store.counters().await;
    let items_failed = items.iter().filter(|i| i.error.is_some()).count();
    let stats = HarvestStats {
        pages_fetched: walker.pages_fetched(),
        items_harvested: items.len(),
        items_failed,
        media_created: media.created,
        media_reused: media.reused,
        media_failed: media.failed,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
        fetch_duration_ms: walker.fetch_duration_ms(),
        transform_duration_ms,
    };

    if let Some(cb) = &progress {
        cb.on_harvest_complete(stats.items_harvested, stats.items_failed);
    }
    info!(
        "harvest complete: {} item(s) over {} page(s), {} failed",
        stats.items_harvested, stats.pages_fetched, stats.items_failed
    );

    Ok(HarvestOutput { items, stats })
}

/// Harvest and write the output as pretty-printed JSON.
///
/// The file is written via a temp path and renamed into place, so an
/// interrupted run never leaves a truncated output file.
pub async fn harvest_to_file(
    config: &HarvestConfig,
    path: impl AsRef<Path>,
) -> Result<HarvestOutput, HarvestError> {
    let path = path.as_ref();
    let output = harvest(config).await?;

    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| HarvestError::Internal(format!("output serialization failed: {e}")))?;

    let temp = path.with_extension("json.tmp");
    let write = async {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&temp, json.as_bytes()).await?;
        tokio::fs::rename(&temp, path).await
    };
    write.await.map_err(|source| HarvestError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(output)
}

/// Process exactly one page (non-paginated mode).
///
/// Unlike [`harvest`], fetch and XML errors surface here: a caller asking
/// for one specific page wants to know why it is missing.
pub async fn fetch_single_page(
    config: &HarvestConfig,
    page: usize,
) -> Result<HarvestOutput, HarvestError> {
    let mut single = config.clone();
    single.auto_paginate = false;
    single.page = page.max(1);
    harvest(&single).await
}

/// Run one source item through the full transform chain.
pub(crate) async fn process_item(
    source: &SourceItem,
    config: &HarvestConfig,
    resolver: &DocumentResolver,
    store: &MediaStore,
) -> HarvestedItem {
    let mut ctx = ItemContext::default();
    let mut error: Option<ItemError> = None;

    // ── Featured image first, so the portfolio pass can skip it ──
    let mut featured_media = None;
    let mut featured_alt = None;
    if let Some(logourl) = source.non_empty_field("logourl") {
        let url = transform::absolutize(logourl, &config.base_url);
        featured_alt = Some(derive_alt(&url)).filter(|a| !a.is_empty());
        if !config.skip_media {
            match store.ensure(&url).await {
                Ok(reference) => {
                    ctx.mark_embedded(reference.id);
                    featured_media = Some(reference);
                }
                Err(e) => warn!("item {}: featured image failed ({e})", source.id),
            }
        }
        ctx.featured_url = Some(url);
    }

    // ── Body-like fields through the markup chain ──
    let body_html = transform_body_field(
        source, "texte", config, resolver, store, &mut ctx, &mut error,
    )
    .await;
    let postscript_html = transform_body_field(
        source, "ps", config, resolver, store, &mut ctx, &mut error,
    )
    .await;

    // ── Gallery last: it consults the dedup set filled above ──
    let gallery = match source.non_empty_field("portfolio") {
        Some(portfolio) => {
            transform::portfolio::portfolio_to_media(portfolio, config, resolver, store, &ctx)
                .await
        }
        None => Vec::new(),
    };

    HarvestedItem {
        id: source.id.clone(),
        title: source.non_empty_field("titre").map(str::to_string),
        body_html,
        postscript_html,
        featured_media,
        featured_alt,
        gallery,
        raw: source.fields.clone(),
        error,
    }
}

/// Transform one body-like field, failing open on panic.
///
/// The markup passes are pure string code; if one of them trips over
/// pathological input, the field keeps its original value and the item
/// records the failure instead of poisoning the run.
async fn transform_body_field(
    source: &SourceItem,
    field: &str,
    config: &HarvestConfig,
    resolver: &DocumentResolver,
    store: &MediaStore,
    ctx: &mut ItemContext,
    error: &mut Option<ItemError>,
) -> Option<String> {
    let text = source.non_empty_field(field)?;

    match catch_unwind(AssertUnwindSafe(|| transform::markup_passes(text, config))) {
        Ok(html) => {
            let html = transform::images::localize_images(&html, config, store, ctx).await;
            let html =
                transform::embed::embed_documents(&html, config, resolver, store, ctx).await;
            Some(html)
        }
        Err(_) => {
            warn!("item {}: markup transform of '{field}' failed open", source.id);
            *error = Some(ItemError::TransformFailed {
                id: source.id.clone(),
                field: field.to_string(),
                detail: "markup transform panicked; field left untransformed".to_string(),
            });
            Some(text.to_string())
        }
    }
}
