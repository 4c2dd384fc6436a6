//! Remote fetching and XML sanitization.
//!
//! ## Why sanitize before parsing?
//!
//! SPIP exports are assembled from decades of hand-edited content. In
//! practice they contain raw control characters, HTML-only named entities
//! (`&nbsp;`, `&mdash;`, …) and bare ampersands — all of which a strict XML
//! parser rejects. The sanitizer fixes exactly those three defect classes
//! with deterministic string passes before the parser ever sees the text.
//! roxmltree only knows XML's five predefined entities, so the named-entity
//! table is replaced with numeric character references up front.

use crate::error::HarvestError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Abstraction over "GET this URL, give me text".
///
/// The pipeline only ever talks to the source through this trait. The
/// default implementation is [`HttpFetcher`]; tests inject an in-memory
/// fake via [`crate::config::HarvestConfigBuilder::fetcher`].
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the URL and return the response body as (lossy) UTF-8 text.
    async fn fetch(&self, url: &str) -> Result<String, HarvestError>;

    /// Fetch the URL and return the raw response bytes.
    ///
    /// Used for media downloads, which must not go through lossy UTF-8.
    /// The default goes through [`Fetcher::fetch`], which is adequate for
    /// text fixtures; [`HttpFetcher`] overrides it with a binary-safe path.
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, HarvestError> {
        Ok(self.fetch(url).await?.into_bytes())
    }
}

/// The production fetcher: a shared `reqwest` client with a bounded timeout
/// and the migration User-Agent.
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout_secs: u64,
}

impl HttpFetcher {
    /// Build a fetcher with the given per-request timeout.
    pub fn new(timeout_secs: u64) -> Result<Self, HarvestError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent("spip-harvest/0.3 (SPIP migration)")
            .build()
            .map_err(|e| HarvestError::Internal(format!("HTTP client init failed: {e}")))?;
        Ok(Self {
            client,
            timeout_secs,
        })
    }
}

impl HttpFetcher {
    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, HarvestError> {
        debug!("GET {}", url);
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                HarvestError::FetchTimeout {
                    url: url.to_string(),
                    secs: self.timeout_secs,
                }
            } else {
                HarvestError::Fetch {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        if !response.status().is_success() {
            return Err(HarvestError::Fetch {
                url: url.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        let bytes = response.bytes().await.map_err(|e| HarvestError::Fetch {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, HarvestError> {
        let bytes = self.get_bytes(url).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, HarvestError> {
        self.get_bytes(url).await
    }
}

// ── Sanitization ─────────────────────────────────────────────────────────

/// HTML-only named entities seen in real SPIP exports, mapped to numeric
/// character references the XML parser accepts.
const ENTITY_TABLE: &[(&str, &str)] = &[
    ("&nbsp;", "&#160;"),
    ("&ldquo;", "&#8220;"),
    ("&rdquo;", "&#8221;"),
    ("&lsquo;", "&#8216;"),
    ("&rsquo;", "&#8217;"),
    ("&mdash;", "&#8212;"),
    ("&ndash;", "&#8211;"),
    ("&hellip;", "&#8230;"),
    ("&trade;", "&#8482;"),
    ("&reg;", "&#174;"),
    ("&copy;", "&#169;"),
];

/// Matches either a valid entity/character reference or a lone `&`.
/// Alternation is leftmost-first, so a valid reference always wins over
/// the bare-ampersand branch at the same position.
static RE_AMP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(?:amp|lt|gt|quot|apos|#\d+|#x[0-9a-fA-F]+);|&").unwrap());

/// Clean raw export text into something an XML parser will accept.
///
/// Three passes, in order:
/// 1. Strip control characters outside the XML character range
///    (`\x00-\x08 \x0B \x0C \x0E-\x1F \x7F`), keeping tab/LF/CR.
/// 2. Replace the fixed named-entity table with numeric references.
/// 3. Escape any bare `&` that is not already part of a valid reference.
pub fn sanitize_xml(input: &str) -> String {
    let mut text: String = input
        .chars()
        .filter(|&c| !matches!(c, '\u{00}'..='\u{08}' | '\u{0B}' | '\u{0C}' | '\u{0E}'..='\u{1F}' | '\u{7F}'))
        .collect();

    for (entity, numeric) in ENTITY_TABLE {
        if text.contains(entity) {
            text = text.replace(entity, numeric);
        }
    }

    RE_AMP
        .replace_all(&text, |caps: &regex::Captures<'_>| {
            if &caps[0] == "&" {
                "&amp;".to_string()
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

/// Parse-check sanitized text, returning the parser's complaint on failure.
///
/// roxmltree documents borrow their input, so this returns only the
/// verdict; call sites re-parse the (cheaply cloned) text when they need
/// the tree.
pub fn check_xml(text: &str) -> Result<(), String> {
    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..Default::default()
    };
    roxmltree::Document::parse_with_options(text, options)
        .map(|_| ())
        .map_err(|e| e.to_string())
}

/// Fetch a URL and return sanitized, parse-checked XML text.
///
/// Returns [`HarvestError::InvalidXml`] when the sanitized text still does
/// not parse. The pagination walker downgrades that to end-of-data; the
/// single-page path lets it surface.
pub async fn fetch_document(fetcher: &dyn Fetcher, url: &str) -> Result<String, HarvestError> {
    let raw = fetcher.fetch(url).await?;
    if raw.trim().is_empty() {
        return Err(HarvestError::Fetch {
            url: url.to_string(),
            reason: "empty response body".to_string(),
        });
    }
    let sanitized = sanitize_xml(&raw);
    check_xml(&sanitized).map_err(|detail| HarvestError::InvalidXml {
        url: url.to_string(),
        detail,
    })?;
    Ok(sanitized)
}
