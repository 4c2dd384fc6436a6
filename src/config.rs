//! Configuration types for a SPIP harvest run.
//!
//! All harvest behaviour is controlled through [`HarvestConfig`], built via
//! its [`HarvestConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share configs across calls, serialise them for logging, and
//! diff two runs to understand why their outputs differ.
//!
//! The original migration passed per-run overrides through process-global
//! flags; here every override is an explicit field, so nothing leaks
//! between runs.

use crate::error::HarvestError;
use crate::pipeline::fetch::Fetcher;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for a harvest run.
///
/// Built via [`HarvestConfig::builder()`] or using
/// [`HarvestConfig::default()`].
///
/// # Example
/// ```rust
/// use spip_harvest::HarvestConfig;
///
/// let config = HarvestConfig::builder()
///     .base_url("https://spip.example.org")
///     .per_page(50)
///     .max_items(200)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct HarvestConfig {
    /// Base URL prepended to relative links, image paths and the document
    /// path heuristic. Default: empty (relative URLs pass through).
    pub base_url: String,

    /// Local name of the XML element holding one content item. Default: "rubrique".
    ///
    /// Matched by local name so the same selector works whether the export
    /// declares a default namespace or none at all.
    pub item_tag: String,

    /// First page to fetch (1-indexed). Default: 1.
    pub page: usize,

    /// Items requested per page (`par_page` query parameter). Default: 20.
    pub per_page: usize,

    /// Walk pages until the source runs dry. Default: true.
    ///
    /// When false, exactly one page (`self.page`) is fetched and fetch/parse
    /// errors surface to the caller instead of being treated as end-of-data.
    pub auto_paginate: bool,

    /// Global item cap. The walker stops once this many items have been
    /// accumulated, truncating the final page's contribution. Default: none.
    pub max_items: Option<usize>,

    /// Delay between successive page fetches in milliseconds. Default: 500.
    ///
    /// The source sites are legacy servers that fall over under load; a
    /// fixed inter-page delay keeps the harvest polite. Lowering it below
    /// ~100 ms is not recommended against production SPIP instances.
    pub page_delay_ms: u64,

    /// Safety bound on the number of pages the walker may fetch. Default: 2000.
    ///
    /// Purely an operational guard against an endpoint that ignores
    /// pagination parameters and returns the same non-empty page forever.
    pub max_pages: usize,

    /// Timeout for each remote request in seconds. Default: 30.
    pub fetch_timeout_secs: u64,

    /// Document-index endpoints, tried in order. Default: empty.
    ///
    /// Each returns `<doc xml:id="docNNN">` records with a nested URL;
    /// earlier endpoints win for ids present in more than one.
    pub index_urls: Vec<String>,

    /// Query parameter for single-id index lookups. Default: "id_document".
    pub id_param: String,

    /// Path segment used by the URL heuristic when an id cannot be resolved
    /// (`{base_url}/{doc_path_pattern}/doc{id}`). Default: "IMG".
    pub doc_path_pattern: String,

    /// Portfolio id prefixes, e.g. "comdoc123;doc456;". Default: comdoc, doc.
    pub portfolio_prefixes: Vec<String>,

    /// Extensions classified as images (lower-case, no dot). Anything else
    /// with an extension is treated as a document. Default: jpg jpeg png gif webp.
    pub image_extensions: Vec<String>,

    /// Root directory for downloaded media. Default: "media".
    pub media_root: PathBuf,

    /// Subdirectory for image files under the media root. Default: "spip/images".
    pub images_subdir: String,

    /// Subdirectory for document files. Default: "spip/documents".
    pub documents_subdir: String,

    /// Media bundle name recorded for images. Default: "image".
    pub image_bundle: String,

    /// Media bundle name recorded for documents. Default: "document".
    pub document_bundle: String,

    /// Reuse an existing file/media pair for an already-seen destination URI
    /// instead of downloading again. Default: true.
    pub reuse_existing: bool,

    /// Skip all media downloads. Default: false.
    ///
    /// Inline doc tags fall back to plain `<img>` markup and portfolio
    /// fields come out empty. Useful for markup-only dry runs.
    pub skip_media: bool,

    /// Pre-constructed fetcher. Takes precedence over the built-in HTTP
    /// fetcher — the seam used by tests and by callers that need custom
    /// middleware (caching, recording, auth).
    pub fetcher: Option<Arc<dyn Fetcher>>,

    /// Progress callback fired per page and per item. Default: none.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            item_tag: "rubrique".to_string(),
            page: 1,
            per_page: 20,
            auto_paginate: true,
            max_items: None,
            page_delay_ms: 500,
            max_pages: 2000,
            fetch_timeout_secs: 30,
            index_urls: Vec::new(),
            id_param: "id_document".to_string(),
            doc_path_pattern: "IMG".to_string(),
            portfolio_prefixes: vec!["comdoc".to_string(), "doc".to_string()],
            image_extensions: ["jpg", "jpeg", "png", "gif", "webp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            media_root: PathBuf::from("media"),
            images_subdir: "spip/images".to_string(),
            documents_subdir: "spip/documents".to_string(),
            image_bundle: "image".to_string(),
            document_bundle: "document".to_string(),
            reuse_existing: true,
            skip_media: false,
            fetcher: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for HarvestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HarvestConfig")
            .field("base_url", &self.base_url)
            .field("item_tag", &self.item_tag)
            .field("page", &self.page)
            .field("per_page", &self.per_page)
            .field("auto_paginate", &self.auto_paginate)
            .field("max_items", &self.max_items)
            .field("page_delay_ms", &self.page_delay_ms)
            .field("max_pages", &self.max_pages)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("index_urls", &self.index_urls)
            .field("doc_path_pattern", &self.doc_path_pattern)
            .field("media_root", &self.media_root)
            .field("reuse_existing", &self.reuse_existing)
            .field("skip_media", &self.skip_media)
            .field("fetcher", &self.fetcher.as_ref().map(|_| "<dyn Fetcher>"))
            .finish()
    }
}

impl HarvestConfig {
    /// Create a new builder for `HarvestConfig`.
    pub fn builder() -> HarvestConfigBuilder {
        HarvestConfigBuilder {
            config: Self::default(),
        }
    }

    /// Does this extension belong to the image bundle?
    pub fn is_image_extension(&self, ext: &str) -> bool {
        let ext = ext.to_ascii_lowercase();
        self.image_extensions.iter().any(|e| *e == ext)
    }
}

/// Builder for [`HarvestConfig`].
#[derive(Debug)]
pub struct HarvestConfigBuilder {
    config: HarvestConfig,
}

impl HarvestConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn item_tag(mut self, tag: impl Into<String>) -> Self {
        self.config.item_tag = tag.into();
        self
    }

    pub fn page(mut self, page: usize) -> Self {
        self.config.page = page.max(1);
        self
    }

    pub fn per_page(mut self, n: usize) -> Self {
        self.config.per_page = n.max(1);
        self
    }

    pub fn auto_paginate(mut self, v: bool) -> Self {
        self.config.auto_paginate = v;
        self
    }

    pub fn max_items(mut self, n: usize) -> Self {
        self.config.max_items = Some(n);
        self
    }

    pub fn page_delay_ms(mut self, ms: u64) -> Self {
        self.config.page_delay_ms = ms;
        self
    }

    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.max_pages = n.max(1);
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs.max(1);
        self
    }

    pub fn index_url(mut self, url: impl Into<String>) -> Self {
        self.config.index_urls.push(url.into());
        self
    }

    pub fn index_urls(mut self, urls: Vec<String>) -> Self {
        self.config.index_urls = urls;
        self
    }

    pub fn id_param(mut self, param: impl Into<String>) -> Self {
        self.config.id_param = param.into();
        self
    }

    pub fn doc_path_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.config.doc_path_pattern = pattern.into();
        self
    }

    pub fn portfolio_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.config.portfolio_prefixes = prefixes;
        self
    }

    pub fn image_extensions(mut self, exts: Vec<String>) -> Self {
        self.config.image_extensions = exts.into_iter().map(|e| e.to_ascii_lowercase()).collect();
        self
    }

    pub fn media_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.media_root = root.into();
        self
    }

    pub fn reuse_existing(mut self, v: bool) -> Self {
        self.config.reuse_existing = v;
        self
    }

    pub fn skip_media(mut self, v: bool) -> Self {
        self.config.skip_media = v;
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.config.fetcher = Some(fetcher);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<HarvestConfig, HarvestError> {
        let c = &self.config;
        if c.item_tag.trim().is_empty() {
            return Err(HarvestError::InvalidConfig(
                "item_tag must not be empty".into(),
            ));
        }
        if c.per_page == 0 {
            return Err(HarvestError::InvalidConfig("per_page must be ≥ 1".into()));
        }
        if let Some(0) = c.max_items {
            return Err(HarvestError::InvalidConfig(
                "max_items must be ≥ 1 when set".into(),
            ));
        }
        Ok(self.config)
    }
}
