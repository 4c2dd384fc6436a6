//! Pagination walker over the export endpoint.
//!
//! The export is paged with `num_page`/`par_page` query parameters and has
//! no total count: the walker fetches pages until one comes back empty (or
//! unparseable), which is the source's way of saying "no more data". That
//! makes absence of items the *normal* termination condition; only the
//! safety page bound is reported as an error.
//!
//! Fetches are strictly sequential with a fixed inter-page delay. The
//! source sites are legacy servers that fall over under parallel load.

use crate::config::HarvestConfig;
use crate::error::HarvestError;
use crate::pipeline::extract::{extract_items, SourceItem};
use crate::pipeline::fetch::{fetch_document, Fetcher};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Append pagination parameters to the endpoint URL.
pub fn build_page_url(base_url: &str, page: usize, per_page: usize) -> String {
    let separator = if base_url.contains('?') { '&' } else { '?' };
    format!("{base_url}{separator}num_page={page}&par_page={per_page}")
}

/// Pull-based page iterator; each call to [`PageWalker::next_page`] fetches
/// one page. Owns its fetcher and config so it can be moved into a stream.
pub struct PageWalker {
    fetcher: Arc<dyn Fetcher>,
    config: HarvestConfig,
    next_page_no: usize,
    pages_fetched: usize,
    items_seen: usize,
    fetch_ms: u64,
    done: bool,
}

impl PageWalker {
    pub fn new(fetcher: Arc<dyn Fetcher>, config: HarvestConfig) -> Self {
        let next_page_no = config.page;
        Self {
            fetcher,
            config,
            next_page_no,
            pages_fetched: 0,
            items_seen: 0,
            fetch_ms: 0,
            done: false,
        }
    }

    /// Pages fetched so far, the terminating empty page included.
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Cumulative time spent fetching and parsing pages. The inter-page
    /// politeness delay is idle time, not fetch time, and is excluded.
    pub fn fetch_duration_ms(&self) -> u64 {
        self.fetch_ms
    }

    /// Fetch the next page of items. `Ok(None)` means the source is
    /// exhausted (or the single configured page has been served in
    /// non-paginated mode).
    ///
    /// In auto-paginate mode fetch and parse failures end the walk
    /// normally; in single-page mode they surface to the caller.
    pub async fn next_page(&mut self) -> Result<Option<(usize, Vec<SourceItem>)>, HarvestError> {
        if self.done {
            return Ok(None);
        }
        if !self.config.auto_paginate && self.pages_fetched > 0 {
            self.done = true;
            return Ok(None);
        }
        if let Some(cap) = self.config.max_items {
            if self.items_seen >= cap {
                debug!("item cap {cap} reached; stopping");
                self.done = true;
                return Ok(None);
            }
        }
        if self.pages_fetched >= self.config.max_pages {
            self.done = true;
            return Err(HarvestError::PageBoundExceeded {
                pages: self.config.max_pages,
            });
        }

        if self.pages_fetched > 0 && self.config.page_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.page_delay_ms)).await;
        }

        let page_no = self.next_page_no;
        let url = build_page_url(&self.config.base_url, page_no, self.config.per_page);
        self.next_page_no += 1;
        self.pages_fetched += 1;

        let started = Instant::now();
        let text = match fetch_document(self.fetcher.as_ref(), &url).await {
            Ok(text) => text,
            Err(e) if self.config.auto_paginate => {
                self.fetch_ms += started.elapsed().as_millis() as u64;
                info!("page {page_no}: {e}; treating as end of data");
                self.done = true;
                return Ok(None);
            }
            Err(e) => {
                self.fetch_ms += started.elapsed().as_millis() as u64;
                self.done = true;
                return Err(e);
            }
        };

        let mut items = extract_items(&text, &self.config.item_tag, self.items_seen);
        self.fetch_ms += started.elapsed().as_millis() as u64;
        if items.is_empty() {
            info!("page {page_no} is empty; harvest complete");
            self.done = true;
            return Ok(None);
        }

        if let Some(cap) = self.config.max_items {
            let remaining = cap - self.items_seen;
            if items.len() >= remaining {
                items.truncate(remaining);
                self.done = true;
            }
        }

        self.items_seen += items.len();
        debug!("page {page_no}: {} item(s)", items.len());
        Ok(Some((page_no, items)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves `pages` pages of `per_page` items each, then empty pages.
    struct PagedFetcher {
        pages: usize,
        per_page: usize,
        fetches: AtomicUsize,
    }

    impl PagedFetcher {
        fn new(pages: usize, per_page: usize) -> Arc<Self> {
            Arc::new(Self {
                pages,
                per_page,
                fetches: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Fetcher for PagedFetcher {
        async fn fetch(&self, url: &str) -> Result<String, HarvestError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let page: usize = url
                .split("num_page=")
                .nth(1)
                .and_then(|s| s.split('&').next())
                .and_then(|s| s.parse().ok())
                .unwrap();
            if page > self.pages {
                return Ok("<rubriques></rubriques>".to_string());
            }
            let mut body = String::from("<rubriques>");
            for i in 0..self.per_page {
                let id = (page - 1) * self.per_page + i + 1;
                body.push_str(&format!(
                    "<rubrique><id>art{id}</id><titre>T{id}</titre></rubrique>"
                ));
            }
            body.push_str("</rubriques>");
            Ok(body)
        }
    }

    fn config() -> HarvestConfig {
        HarvestConfig::builder()
            .base_url("https://spip.test/export")
            .page_delay_ms(0)
            .build()
            .unwrap()
    }

    async fn drain(walker: &mut PageWalker) -> Vec<SourceItem> {
        let mut all = Vec::new();
        while let Some((_, items)) = walker.next_page().await.unwrap() {
            all.extend(items);
        }
        all
    }

    #[test]
    fn page_url_separator() {
        assert_eq!(
            build_page_url("https://a.test/export", 3, 50),
            "https://a.test/export?num_page=3&par_page=50"
        );
        assert_eq!(
            build_page_url("https://a.test/export?format=xml", 1, 20),
            "https://a.test/export?format=xml&num_page=1&par_page=20"
        );
    }

    #[tokio::test]
    async fn walks_k_pages_plus_terminator() {
        let fetcher = PagedFetcher::new(3, 2);
        let mut walker = PageWalker::new(Arc::clone(&fetcher) as Arc<dyn Fetcher>, config());

        let items = drain(&mut walker).await;

        assert_eq!(items.len(), 6);
        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["art1", "art2", "art3", "art4", "art5", "art6"]);
        // 3 content pages + 1 empty terminator.
        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 4);
        assert_eq!(walker.pages_fetched(), 4);
    }

    #[tokio::test]
    async fn max_items_truncates_final_page() {
        let fetcher = PagedFetcher::new(5, 2);
        let mut config = config();
        config.max_items = Some(3);
        let mut walker = PageWalker::new(Arc::clone(&fetcher) as Arc<dyn Fetcher>, config);

        let items = drain(&mut walker).await;

        assert_eq!(items.len(), 3);
        assert_eq!(items[2].id, "art3");
        // Page 2 was truncated; no further fetch happened.
        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fetch_duration_excludes_the_politeness_delay() {
        let fetcher = PagedFetcher::new(2, 1);
        let mut config = config();
        config.page_delay_ms = 200;
        let mut walker = PageWalker::new(Arc::clone(&fetcher) as Arc<dyn Fetcher>, config);

        // 2 content pages + 1 empty terminator = 2 sleeps of 200ms each.
        drain(&mut walker).await;

        assert_eq!(walker.pages_fetched(), 3);
        assert!(
            walker.fetch_duration_ms() < 200,
            "fetch duration {}ms includes delay time",
            walker.fetch_duration_ms()
        );
    }

    #[tokio::test]
    async fn page_bound_is_an_error() {
        let fetcher = PagedFetcher::new(usize::MAX, 1);
        let mut config = config();
        config.max_pages = 3;
        let mut walker = PageWalker::new(fetcher as Arc<dyn Fetcher>, config);

        for _ in 0..3 {
            assert!(walker.next_page().await.unwrap().is_some());
        }
        let err = walker.next_page().await.unwrap_err();
        assert!(matches!(err, HarvestError::PageBoundExceeded { pages: 3 }));
    }

    #[tokio::test]
    async fn fetch_failure_ends_walk_when_paginating() {
        struct FailingFetcher;
        #[async_trait]
        impl Fetcher for FailingFetcher {
            async fn fetch(&self, url: &str) -> Result<String, HarvestError> {
                Err(HarvestError::Fetch {
                    url: url.to_string(),
                    reason: "connection refused".to_string(),
                })
            }
        }

        let mut walker = PageWalker::new(Arc::new(FailingFetcher), config());
        assert!(walker.next_page().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn single_page_mode_fetches_once_and_surfaces_errors() {
        let fetcher = PagedFetcher::new(5, 2);
        let mut config = config();
        config.auto_paginate = false;
        config.page = 2;
        let mut walker = PageWalker::new(Arc::clone(&fetcher) as Arc<dyn Fetcher>, config);

        let (page, items) = walker.next_page().await.unwrap().unwrap();
        assert_eq!(page, 2);
        assert_eq!(items[0].id, "art3");
        assert!(walker.next_page().await.unwrap().is_none());
        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 1);

        // Same mode, but the endpoint serves garbage: the error surfaces.
        struct GarbageFetcher;
        #[async_trait]
        impl Fetcher for GarbageFetcher {
            async fn fetch(&self, _url: &str) -> Result<String, HarvestError> {
                Ok("<broken".to_string())
            }
        }
        let mut config = self::config();
        config.auto_paginate = false;
        let mut walker = PageWalker::new(Arc::new(GarbageFetcher), config);
        let err = walker.next_page().await.unwrap_err();
        assert!(matches!(err, HarvestError::InvalidXml { .. }));
    }

    #[tokio::test]
    async fn fallback_ids_are_numbered_across_pages() {
        struct AnonFetcher;
        #[async_trait]
        impl Fetcher for AnonFetcher {
            async fn fetch(&self, url: &str) -> Result<String, HarvestError> {
                if url.contains("num_page=1") {
                    Ok("<r><rubrique><titre>a</titre></rubrique>\
                        <rubrique><titre>b</titre></rubrique></r>"
                        .to_string())
                } else if url.contains("num_page=2") {
                    Ok("<r><rubrique><titre>c</titre></rubrique></r>".to_string())
                } else {
                    Ok("<r></r>".to_string())
                }
            }
        }

        let mut walker = PageWalker::new(Arc::new(AnonFetcher), config());
        let items = drain(&mut walker).await;
        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["item_0", "item_1", "item_2"]);
    }
}
