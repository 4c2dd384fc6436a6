//! Error types for the spip-harvest library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`HarvestError`] — **Fatal**: the harvest cannot proceed at all
//!   (unreachable source, invalid configuration, output not writable).
//!   Returned as `Err(HarvestError)` from the top-level `harvest*` functions.
//!
//! * [`ItemError`] — **Non-fatal**: a single item's markup could not be
//!   transformed but all other items are fine. Stored inside
//!   [`crate::output::HarvestedItem`] so callers can inspect partial
//!   success rather than losing the whole run to one bad record.
//!
//! Resolution misses (a document id with no known URL) are not errors at
//! all — the resolver degrades to a heuristic URL, so they never appear
//! here. Materialization failures degrade to plain-link fallbacks inside
//! the transformers and are surfaced only as counters in the run stats.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the spip-harvest library.
///
/// Item-level failures use [`ItemError`] and are stored in
/// [`crate::output::HarvestedItem`] rather than propagated here.
#[derive(Debug, Error)]
pub enum HarvestError {
    // ── Fetch errors ──────────────────────────────────────────────────────
    /// The HTTP request failed (connection refused, DNS, non-2xx status).
    #[error("Failed to fetch '{url}': {reason}\nCheck the source URL and your network connection.")]
    Fetch { url: String, reason: String },

    /// The HTTP request exceeded the configured timeout.
    #[error("Fetch timed out after {secs}s for '{url}'\nIncrease --fetch-timeout.")]
    FetchTimeout { url: String, secs: u64 },

    // ── XML errors ────────────────────────────────────────────────────────
    /// The response did not parse as XML even after sanitization.
    ///
    /// Only the non-paginated single-page path returns this; the pagination
    /// walker treats an unparseable page as end-of-data instead.
    #[error("Invalid XML received from '{url}': {detail}")]
    InvalidXml { url: String, detail: String },

    // ── Pagination errors ─────────────────────────────────────────────────
    /// The walker hit the safety page bound without the source ever
    /// returning an empty page. An operational guard against a misbehaving
    /// endpoint, reported distinctly from normal completion.
    #[error(
        "Aborted after {pages} pages without reaching end-of-data.\n\
         The source endpoint may be ignoring pagination parameters."
    )]
    PageBoundExceeded { pages: usize },

    /// Every fetched page parsed but the harvest produced zero items.
    #[error("No items found at '{url}' (item tag '{selector}')\nCheck --item-tag against the export format.")]
    NoItems { url: String, selector: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single harvested item.
///
/// Stored alongside [`crate::output::HarvestedItem`] when a transform
/// failed open. The overall harvest continues; the affected field keeps
/// its original, untransformed value.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ItemError {
    /// A transformer raised internally; the field was left untouched.
    #[error("Item '{id}': transform of '{field}' failed: {detail}")]
    TransformFailed {
        id: String,
        field: String,
        detail: String,
    },
}

/// Errors internal to the media store.
///
/// Transformers never propagate these — a failed materialization degrades
/// to a plain `<img>` fallback or a skipped gallery entry — but the store
/// API reports them so the stats can count failed downloads.
#[derive(Debug, Error)]
pub enum MaterializeError {
    /// The remote file could not be downloaded.
    #[error("Download failed for '{url}': {reason}")]
    Download { url: String, reason: String },

    /// The remote server returned an empty body.
    #[error("Empty response body from '{url}'")]
    EmptyBody { url: String },

    /// The file could not be written under the media root.
    #[error("Failed to store '{uri}': {source}")]
    Io {
        uri: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_timeout_display() {
        let e = HarvestError::FetchTimeout {
            url: "https://spip.test/export".into(),
            secs: 30,
        };
        let msg = e.to_string();
        assert!(msg.contains("30s"), "got: {msg}");
        assert!(msg.contains("spip.test"));
    }

    #[test]
    fn page_bound_display() {
        let e = HarvestError::PageBoundExceeded { pages: 2000 };
        assert!(e.to_string().contains("2000"));
    }

    #[test]
    fn item_error_roundtrips_through_json() {
        let e = ItemError::TransformFailed {
            id: "art42".into(),
            field: "texte".into(),
            detail: "boom".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        let back: ItemError = serde_json::from_str(&json).unwrap();
        assert!(back.to_string().contains("art42"));
    }

    #[test]
    fn materialize_error_display() {
        let e = MaterializeError::EmptyBody {
            url: "https://spip.test/IMG/doc1.png".into(),
        };
        assert!(e.to_string().contains("doc1.png"));
    }
}
