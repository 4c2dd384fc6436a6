//! Streaming harvest API.
//!
//! [`harvest_stream`] yields items one by one as pages arrive, instead of
//! buffering the whole export like [`crate::harvest`]. Useful for piping a
//! large site into a persistence layer without holding every row in
//! memory, or for showing progress in interactive tooling.
//!
//! The stream is strictly sequential: one page is fetched, its items are
//! transformed in order, then the next page is fetched. A fatal walker
//! error is yielded as the final `Err` element, after which the stream is
//! exhausted.

use crate::config::HarvestConfig;
use crate::error::HarvestError;
use crate::harvest::{build_parts, process_item};
use crate::output::HarvestedItem;
use crate::pipeline::materialize::MediaStore;
use crate::pipeline::paginate::PageWalker;
use crate::pipeline::resolve::DocumentResolver;
use futures::stream::{self, Stream};
use std::collections::VecDeque;
use std::sync::Arc;

struct StreamState {
    walker: PageWalker,
    pending: VecDeque<crate::pipeline::extract::SourceItem>,
    resolver: Arc<DocumentResolver>,
    store: Arc<MediaStore>,
    config: HarvestConfig,
    finished: bool,
}

/// Harvest the export as a stream of items.
///
/// Construction fails only on configuration problems (an HTTP client that
/// cannot be built); everything that happens while walking is reported
/// through the stream itself.
pub fn harvest_stream(
    config: HarvestConfig,
) -> Result<impl Stream<Item = Result<HarvestedItem, HarvestError>>, HarvestError> {
    let parts = build_parts(&config)?;
    let state = StreamState {
        walker: PageWalker::new(Arc::clone(&parts.fetcher), config.clone()),
        pending: VecDeque::new(),
        resolver: Arc::new(parts.resolver),
        store: Arc::new(parts.store),
        config,
        finished: false,
    };

    Ok(stream::unfold(state, |mut state| async move {
        loop {
            if state.finished {
                return None;
            }
            if let Some(source) = state.pending.pop_front() {
                let item = process_item(
                    &source,
                    &state.config,
                    &state.resolver,
                    &state.store,
                )
                .await;
                return Some((Ok(item), state));
            }
            match state.walker.next_page().await {
                Ok(Some((_, items))) => state.pending.extend(items),
                Ok(None) => {
                    state.finished = true;
                    return None;
                }
                Err(e) => {
                    state.finished = true;
                    return Some((Err(e), state));
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::fetch::Fetcher;
    use async_trait::async_trait;
    use futures::StreamExt;

    struct TwoPageFetcher;

    #[async_trait]
    impl Fetcher for TwoPageFetcher {
        async fn fetch(&self, url: &str) -> Result<String, HarvestError> {
            if url.contains("num_page=1") {
                Ok("<r><rubrique><id>a</id><titre>A</titre></rubrique>\
                    <rubrique><id>b</id><titre>B</titre></rubrique></r>"
                    .to_string())
            } else if url.contains("num_page=2") {
                Ok("<r><rubrique><id>c</id><titre>C</titre></rubrique></r>".to_string())
            } else {
                Ok("<r></r>".to_string())
            }
        }
    }

    fn config() -> HarvestConfig {
        HarvestConfig::builder()
            .base_url("https://spip.test/export")
            .page_delay_ms(0)
            .skip_media(true)
            .fetcher(Arc::new(TwoPageFetcher))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn yields_items_in_page_order() {
        let stream = harvest_stream(config()).unwrap();
        let items: Vec<_> = stream.collect().await;

        let ids: Vec<_> = items
            .iter()
            .map(|r| r.as_ref().unwrap().id.clone())
            .collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn page_bound_error_is_the_last_element() {
        struct EndlessFetcher;
        #[async_trait]
        impl Fetcher for EndlessFetcher {
            async fn fetch(&self, _url: &str) -> Result<String, HarvestError> {
                Ok("<r><rubrique><titre>again</titre></rubrique></r>".to_string())
            }
        }

        let mut config = config();
        config.fetcher = Some(Arc::new(EndlessFetcher));
        config.max_pages = 2;

        let results: Vec<_> = harvest_stream(config).unwrap().collect().await;
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_ok());
        assert!(matches!(
            results[2],
            Err(HarvestError::PageBoundExceeded { pages: 2 })
        ));
    }

    #[tokio::test]
    async fn respects_max_items() {
        let mut config = config();
        config.max_items = Some(2);

        let results: Vec<_> = harvest_stream(config).unwrap().collect().await;
        assert_eq!(results.len(), 2);
    }
}
