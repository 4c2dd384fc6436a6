//! Output types: harvested items, media references, and run statistics.
//!
//! Everything here derives `Serialize`/`Deserialize` so a harvest can be
//! dumped as JSON for the downstream persistence layer (the CLI's default
//! output) and re-read for inspection or incremental imports. Items carry
//! their full raw field map alongside the transformed fields — the
//! transformation is lossy by design, and keeping the raw values means a
//! re-import never has to re-fetch the source.

use crate::error::ItemError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A materialized file + media record for one resolved URL.
///
/// The `uuid` is derived from the destination URI (sha256, shaped like a
/// UUID), so two runs over the same source with the same media root
/// produce byte-identical references. `id` is sequential per store and
/// stable across a run; it is what the dedup tracker and gallery lists
/// carry around.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaReference {
    /// Sequential media id, stable within one store.
    pub id: u64,
    /// Deterministic UUID used in `<drupal-media data-entity-uuid=…>`.
    pub uuid: String,
    /// Local destination URI under the media root, e.g. `spip/images/logo.png`.
    pub uri: String,
    /// Bundle name: "image" or "document" by default.
    pub bundle: String,
    /// The remote URL the file was materialized from.
    pub source_url: String,
}

/// One fully-processed SPIP content item, ready for the persistence layer.
///
/// Keyed by `id` for upsert semantics: a destination record with a matching
/// source id is updated in place, otherwise a new one is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestedItem {
    /// Stable source identifier (the SPIP `id` field, or `item_N` when the
    /// export omits one).
    pub id: String,

    /// Item title (`titre`), unmodified.
    pub title: Option<String>,

    /// Body text (`texte`) after the full transform chain.
    pub body_html: Option<String>,

    /// Post-scriptum (`ps`) after the full transform chain.
    pub postscript_html: Option<String>,

    /// Featured image (`logourl`) materialized as media, when configured.
    pub featured_media: Option<MediaReference>,

    /// Alt text derived from the featured image URL basename.
    pub featured_alt: Option<String>,

    /// Gallery media resolved from the `portfolio` field, in source order,
    /// with the featured image and inline-embedded media deduplicated out.
    pub gallery: Vec<MediaReference>,

    /// Every raw field exactly as extracted from the export XML.
    pub raw: BTreeMap<String, String>,

    /// Set when a transformer failed open on one of this item's fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ItemError>,
}

/// Statistics for a completed harvest run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarvestStats {
    /// Pages fetched from the source (including the final empty page).
    pub pages_fetched: usize,
    /// Items extracted and processed.
    pub items_harvested: usize,
    /// Items whose processing recorded a non-fatal [`ItemError`].
    pub items_failed: usize,
    /// Media entries created by downloading a file.
    pub media_created: usize,
    /// Media entries served from the reuse ledger without a download.
    pub media_reused: usize,
    /// Materialization attempts that failed and fell back to plain markup.
    pub media_failed: usize,
    /// Wall-clock duration of the whole run.
    pub total_duration_ms: u64,
    /// Time spent fetching and parsing source pages, excluding the
    /// politeness delay between page requests.
    pub fetch_duration_ms: u64,
    /// Time spent in the transform chain (including media downloads).
    pub transform_duration_ms: u64,
}

/// The complete result of a harvest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestOutput {
    /// All processed items, in source order.
    pub items: Vec<HarvestedItem>,
    /// Run statistics.
    pub stats: HarvestStats,
}

impl HarvestedItem {
    /// Convenience accessor into the raw field map.
    pub fn raw_field(&self, name: &str) -> Option<&str> {
        self.raw.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_item() -> HarvestedItem {
        let mut raw = BTreeMap::new();
        raw.insert("id".to_string(), "art12".to_string());
        raw.insert("titre".to_string(), "Hello".to_string());
        HarvestedItem {
            id: "art12".into(),
            title: Some("Hello".into()),
            body_html: Some("<p>Hi</p>".into()),
            postscript_html: None,
            featured_media: None,
            featured_alt: None,
            gallery: Vec::new(),
            raw,
            error: None,
        }
    }

    #[test]
    fn item_serialises_without_error_field_when_none() {
        let json = serde_json::to_string(&sample_item()).unwrap();
        assert!(!json.contains("\"error\""));
        assert!(json.contains("\"art12\""));
    }

    #[test]
    fn raw_field_lookup() {
        let item = sample_item();
        assert_eq!(item.raw_field("titre"), Some("Hello"));
        assert_eq!(item.raw_field("missing"), None);
    }

    #[test]
    fn output_roundtrips_through_json() {
        let output = HarvestOutput {
            items: vec![sample_item()],
            stats: HarvestStats {
                pages_fetched: 2,
                items_harvested: 1,
                ..Default::default()
            },
        };
        let json = serde_json::to_string(&output).unwrap();
        let back: HarvestOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(back.items.len(), 1);
        assert_eq!(back.stats.pages_fetched, 2);
    }
}
