//! # spip-harvest
//!
//! Harvest content out of legacy SPIP sites: paginated XML exports in,
//! clean HTML and materialized media out.
//!
//! ## Why this crate?
//!
//! SPIP exports are hostile to off-the-shelf tooling — the XML carries raw
//! control characters, HTML-only entities and bare ampersands; the body
//! text mixes SPIP's "raccourcis" shorthand with theme-generated markup;
//! and images are referenced by opaque numeric document ids that only an
//! auxiliary index endpoint can resolve. This crate deals with all of it
//! in one pass, producing items a destination CMS can import directly:
//! transformed HTML bodies, a featured image, a deduplicated gallery, and
//! every media file downloaded once under a local media root.
//!
//! ## Pipeline Overview
//!
//! ```text
//! SPIP export endpoint
//!  │
//!  ├─ 1. Fetch      GET page N, sanitize to parseable XML
//!  ├─ 2. Extract    <rubrique> items, namespace-tolerant
//!  ├─ 3. Transform  raccourcis → HTML, autolink, thumbnails, inline
//!  │                <img> localization, <docN> embeds
//!  ├─ 4. Resolve    document id → URL via the index endpoints
//!  ├─ 5. Media      download once, dedup, deterministic UUIDs
//!  └─ 6. Output     HarvestedItems + run stats (JSON via the CLI)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use spip_harvest::{harvest, HarvestConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = HarvestConfig::builder()
//!         .base_url("https://spip.example.org/export")
//!         .index_url("https://spip.example.org/documents.xml")
//!         .per_page(50)
//!         .build()?;
//!     let output = harvest(&config).await?;
//!     println!("{} items over {} pages",
//!         output.stats.items_harvested,
//!         output.stats.pages_fetched);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `spip-harvest` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! spip-harvest = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod harvest;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{HarvestConfig, HarvestConfigBuilder};
pub use error::{HarvestError, ItemError, MaterializeError};
pub use harvest::{fetch_single_page, harvest, harvest_to_file};
pub use output::{HarvestOutput, HarvestStats, HarvestedItem, MediaReference};
pub use pipeline::fetch::{Fetcher, HttpFetcher};
pub use pipeline::materialize::MediaStore;
pub use pipeline::resolve::DocumentResolver;
pub use progress::{HarvestProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::harvest_stream;
