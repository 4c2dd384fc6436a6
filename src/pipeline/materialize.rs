//! Media materialization: download a resolved URL once, record it forever.
//!
//! ## Dedup ledger
//!
//! The store keeps an in-memory ledger keyed two ways: by source URL (the
//! same remote file referenced from several items downloads once) and by
//! destination URI (two *different* remote files that happen to share a
//! basename get distinct URIs via a short content-independent suffix).
//! With `reuse_existing` enabled the ledger also persists as `media.json`
//! under the media root, so a re-run over the same source re-uses every
//! previously materialized file instead of downloading it again.
//!
//! ## Determinism
//!
//! Media UUIDs are derived from the destination URI (sha256, shaped like a
//! UUID), not generated randomly: two runs over the same source produce
//! byte-identical `<drupal-media data-entity-uuid>` markup, which keeps the
//! downstream import idempotent.
//!
//! Files are written via a `.part` temp file renamed into place, so a
//! crashed run never leaves a truncated file that a later run would trust.

use crate::config::HarvestConfig;
use crate::error::MaterializeError;
use crate::output::MediaReference;
use crate::pipeline::fetch::Fetcher;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Name of the persisted ledger file under the media root.
const LEDGER_FILE: &str = "media.json";

/// Downloads and records media files, deduplicating across items and runs.
pub struct MediaStore {
    fetcher: Arc<dyn Fetcher>,
    config: HarvestConfig,
    state: Mutex<StoreState>,
}

#[derive(Default)]
struct StoreState {
    /// Destination URI → reference. Source of truth for the ledger.
    by_uri: HashMap<String, MediaReference>,
    /// Source URL → destination URI, for within- and cross-run reuse.
    by_source: HashMap<String, String>,
    next_id: u64,
    created: usize,
    reused: usize,
    failed: usize,
}

/// Counters reported into [`crate::output::HarvestStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaCounters {
    pub created: usize,
    pub reused: usize,
    pub failed: usize,
}

impl MediaStore {
    pub fn new(config: &HarvestConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            config: config.clone(),
            state: Mutex::new(StoreState {
                next_id: 1,
                ..Default::default()
            }),
        }
    }

    /// Ensure the URL is materialized, returning its media reference.
    ///
    /// Never downloads the same source URL twice; never overwrites a URI
    /// already claimed by a different source URL (a suffixed URI is used
    /// instead). Download and write failures are counted and returned, and
    /// the caller degrades to plain markup.
    pub async fn ensure(&self, source_url: &str) -> Result<MediaReference, MaterializeError> {
        let mut state = self.state.lock().await;

        if let Some(uri) = state.by_source.get(source_url) {
            let reference = state.by_uri[uri].clone();
            state.reused += 1;
            debug!("media reuse (ledger): {} -> {}", source_url, reference.uri);
            return Ok(reference);
        }

        let (uri, bundle) = self.destination_for(source_url, &state.by_uri);
        let path = self.config.media_root.join(&uri);

        if self.config.reuse_existing && path.is_file() {
            // File survives from a previous run whose ledger we didn't see.
            let reference = state.record(source_url, &uri, &bundle);
            state.reused += 1;
            debug!("media reuse (disk): {} -> {}", source_url, uri);
            return Ok(reference);
        }

        let bytes = match self.fetcher.fetch_bytes(source_url).await {
            Ok(b) => b,
            Err(e) => {
                state.failed += 1;
                return Err(MaterializeError::Download {
                    url: source_url.to_string(),
                    reason: e.to_string(),
                });
            }
        };
        if bytes.is_empty() {
            state.failed += 1;
            return Err(MaterializeError::EmptyBody {
                url: source_url.to_string(),
            });
        }

        if let Err(source) = write_atomic(&path, &bytes).await {
            state.failed += 1;
            return Err(MaterializeError::Io {
                uri: uri.clone(),
                source,
            });
        }

        let reference = state.record(source_url, &uri, &bundle);
        state.created += 1;
        debug!("media created: {} -> {} ({} bytes)", source_url, uri, bytes.len());
        Ok(reference)
    }

    /// Every reference recorded so far, ordered by id.
    pub async fn references(&self) -> Vec<MediaReference> {
        let state = self.state.lock().await;
        let mut refs: Vec<_> = state.by_uri.values().cloned().collect();
        refs.sort_by_key(|r| r.id);
        refs
    }

    pub async fn counters(&self) -> MediaCounters {
        let state = self.state.lock().await;
        MediaCounters {
            created: state.created,
            reused: state.reused,
            failed: state.failed,
        }
    }

    /// Preload the ledger persisted by a previous run, if any.
    ///
    /// A missing or unreadable ledger is not an error; the store just
    /// starts empty (disk probes still catch surviving files).
    pub async fn load_ledger(&self) {
        let path = self.config.media_root.join(LEDGER_FILE);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(t) => t,
            Err(_) => return,
        };
        let refs: Vec<MediaReference> = match serde_json::from_str(&text) {
            Ok(r) => r,
            Err(e) => {
                warn!("ignoring corrupt media ledger {}: {}", path.display(), e);
                return;
            }
        };

        let mut state = self.state.lock().await;
        for reference in refs {
            state.next_id = state.next_id.max(reference.id + 1);
            state
                .by_source
                .insert(reference.source_url.clone(), reference.uri.clone());
            state.by_uri.insert(reference.uri.clone(), reference);
        }
        debug!("loaded media ledger: {} entries", state.by_uri.len());
    }

    /// Persist the ledger for the next run.
    pub async fn persist_ledger(&self) -> Result<(), MaterializeError> {
        let refs = self.references().await;
        let path = self.config.media_root.join(LEDGER_FILE);
        let json = serde_json::to_string_pretty(&refs).map_err(|e| MaterializeError::Io {
            uri: LEDGER_FILE.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;
        write_atomic(&path, json.as_bytes())
            .await
            .map_err(|source| MaterializeError::Io {
                uri: LEDGER_FILE.to_string(),
                source,
            })
    }

    /// Pick the destination URI and bundle for a source URL.
    fn destination_for(
        &self,
        source_url: &str,
        by_uri: &HashMap<String, MediaReference>,
    ) -> (String, String) {
        let basename = url_basename(source_url);
        let filename = if basename.is_empty() {
            // Pathless URL; fall back to a source-derived name.
            let digest = Sha256::digest(source_url.as_bytes());
            let tag: String = digest[..6].iter().map(|b| format!("{b:02x}")).collect();
            format!("doc_{tag}")
        } else {
            sanitize_filename(basename)
        };
        let extension = filename.rsplit('.').next().filter(|e| *e != filename);

        let is_image = extension
            .map(|e| self.config.is_image_extension(e))
            .unwrap_or(false);
        let (subdir, bundle) = if is_image {
            (&self.config.images_subdir, &self.config.image_bundle)
        } else {
            (&self.config.documents_subdir, &self.config.document_bundle)
        };

        let uri = format!("{}/{}", subdir.trim_matches('/'), filename);
        match by_uri.get(&uri) {
            Some(existing) if existing.source_url != source_url => {
                // Basename collision between two different remote files.
                (suffixed_uri(&uri, source_url), bundle.clone())
            }
            _ => (uri, bundle.clone()),
        }
    }
}

impl StoreState {
    fn record(&mut self, source_url: &str, uri: &str, bundle: &str) -> MediaReference {
        let reference = MediaReference {
            id: self.next_id,
            uuid: uuid_for_uri(uri),
            uri: uri.to_string(),
            bundle: bundle.to_string(),
            source_url: source_url.to_string(),
        };
        self.next_id += 1;
        self.by_source
            .insert(source_url.to_string(), uri.to_string());
        self.by_uri.insert(uri.to_string(), reference.clone());
        reference
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

/// Last path segment of a URL, query and fragment stripped.
fn url_basename(url: &str) -> &str {
    let without_fragment = url.split('#').next().unwrap_or(url);
    let without_query = without_fragment.split('?').next().unwrap_or(without_fragment);
    without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(without_query)
}

/// Restrict a filename to a filesystem-safe alphabet.
fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches('.').to_string();
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed
    }
}

/// Disambiguate a URI claimed by a different source URL: insert a short
/// source-derived hash before the extension.
fn suffixed_uri(uri: &str, source_url: &str) -> String {
    let digest = Sha256::digest(source_url.as_bytes());
    let tag: String = digest[..4].iter().map(|b| format!("{b:02x}")).collect();
    match uri.rfind('.') {
        Some(dot) if dot > uri.rfind('/').map_or(0, |s| s + 1) => {
            format!("{}-{}{}", &uri[..dot], tag, &uri[dot..])
        }
        _ => format!("{uri}-{tag}"),
    }
}

/// Deterministic UUID-shaped string derived from the destination URI.
pub fn uuid_for_uri(uri: &str) -> String {
    let digest = Sha256::digest(uri.as_bytes());
    let hex: String = digest[..16].iter().map(|b| format!("{b:02x}")).collect();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

/// Write bytes via a `.part` temp file renamed into place.
async fn write_atomic(path: &PathBuf, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut temp = path.clone();
    temp.set_extension(match path.extension() {
        Some(ext) => format!("{}.part", ext.to_string_lossy()),
        None => "part".to_string(),
    });
    tokio::fs::write(&temp, bytes).await?;
    tokio::fs::rename(&temp, path).await
}
