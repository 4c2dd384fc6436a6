//! Progress-callback trait for per-page and per-item harvest events.
//!
//! Inject an [`Arc<dyn HarvestProgressCallback>`] via
//! [`crate::config::HarvestConfigBuilder::progress_callback`] to receive
//! real-time events as the walker fetches pages and the transform chain
//! processes items.
//!
//! Callbacks rather than channels keep the integration point small: the CLI
//! forwards events to an indicatif bar, a service might forward them to a
//! websocket, and the library never needs to know. Unlike a page count in a
//! PDF, the total number of items is unknown until the source runs dry, so
//! the events report running counts instead of a fixed total.

use std::sync::Arc;

/// Called by the harvest pipeline as it walks pages and processes items.
///
/// The pipeline is strictly sequential (one page, then each of its items,
/// to completion), so implementations are never called concurrently; the
/// `Send + Sync` bound only lets the callback travel into the async entry
/// points. All methods have default no-op implementations.
pub trait HarvestProgressCallback: Send + Sync {
    /// Called once before the first page fetch.
    fn on_harvest_start(&self) {}

    /// Called after a page has been fetched and its items extracted.
    ///
    /// `item_count` is zero for the terminating empty page.
    fn on_page_fetched(&self, page: usize, item_count: usize) {
        let _ = (page, item_count);
    }

    /// Called when one item has gone through the full transform chain.
    ///
    /// * `index` — 0-based position in the overall run
    /// * `id`    — the item's source id
    fn on_item_complete(&self, index: usize, id: &str) {
        let _ = (index, id);
    }

    /// Called when an item recorded a non-fatal error (it is still emitted,
    /// with the affected fields untransformed).
    fn on_item_error(&self, index: usize, id: &str, error: &str) {
        let _ = (index, id, error);
    }

    /// Called once after the walker terminates.
    fn on_harvest_complete(&self, total_items: usize, failed_items: usize) {
        let _ = (total_items, failed_items);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl HarvestProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::HarvestConfig`].
pub type ProgressCallback = Arc<dyn HarvestProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TrackingCallback {
        pages: AtomicUsize,
        items: AtomicUsize,
        errors: AtomicUsize,
    }

    impl HarvestProgressCallback for TrackingCallback {
        fn on_page_fetched(&self, _page: usize, _item_count: usize) {
            self.pages.fetch_add(1, Ordering::SeqCst);
        }

        fn on_item_complete(&self, _index: usize, _id: &str) {
            self.items.fetch_add(1, Ordering::SeqCst);
        }

        fn on_item_error(&self, _index: usize, _id: &str, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_harvest_start();
        cb.on_page_fetched(1, 20);
        cb.on_item_complete(0, "art1");
        cb.on_item_error(1, "art2", "boom");
        cb.on_harvest_complete(2, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback {
            pages: AtomicUsize::new(0),
            items: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
        };
        tracker.on_page_fetched(1, 2);
        tracker.on_item_complete(0, "a");
        tracker.on_item_error(1, "b", "bad");
        tracker.on_page_fetched(2, 0);

        assert_eq!(tracker.pages.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.items.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: Arc<dyn HarvestProgressCallback> = Arc::new(NoopProgressCallback);
        cb.on_harvest_start();
        cb.on_item_complete(0, "x");
    }
}
