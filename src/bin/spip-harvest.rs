//! CLI binary for spip-harvest.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `HarvestConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use spip_harvest::{
    fetch_single_page, harvest, harvest_to_file, HarvestConfig, HarvestProgressCallback,
    ProgressCallback,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner with running counts. The total
/// number of items is unknown until the source runs dry, so there is no
/// percentage bar — pages and items tick up as they arrive.
struct CliProgressCallback {
    bar: ProgressBar,
    items: AtomicUsize,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Harvesting");
        bar.set_message("connecting…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            items: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
        })
    }
}

impl HarvestProgressCallback for CliProgressCallback {
    fn on_harvest_start(&self) {
        self.bar
            .println(format!("{} {}", cyan("◆"), bold("Starting harvest…")));
    }

    fn on_page_fetched(&self, page: usize, item_count: usize) {
        if item_count == 0 {
            self.bar
                .println(format!("  {} page {page}: empty (end of data)", dim("·")));
        } else {
            self.bar.println(format!(
                "  {} page {page}: {item_count} item(s)",
                green("✓")
            ));
        }
    }

    fn on_item_complete(&self, _index: usize, id: &str) {
        let done = self.items.fetch_add(1, Ordering::SeqCst) + 1;
        self.bar.set_message(format!("{done} items  (last: {id})"));
    }

    fn on_item_error(&self, _index: usize, id: &str, error: &str) {
        self.items.fetch_add(1, Ordering::SeqCst);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg = if error.chars().count() > 80 {
            let truncated: String = error.chars().take(79).collect();
            format!("{truncated}\u{2026}")
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} item {id}  {}", red("✗"), red(&msg)));
    }

    fn on_harvest_complete(&self, total_items: usize, failed_items: usize) {
        self.bar.finish_and_clear();
        if failed_items == 0 {
            eprintln!(
                "{} {} items harvested successfully",
                green("✔"),
                bold(&total_items.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} items harvested  ({} with transform errors)",
                cyan("⚠"),
                bold(&(total_items - failed_items).to_string()),
                total_items,
                red(&failed_items.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Harvest a whole site to stdout (JSON)
  spip-harvest https://spip.example.org/export

  # Harvest to a file, with the document index for media resolution
  spip-harvest https://spip.example.org/export \
      --index-url https://spip.example.org/documents.xml \
      -o harvest.json

  # Markup-only dry run: no media downloads
  spip-harvest https://spip.example.org/export --skip-media -o dry.json

  # One specific page, bigger page size
  spip-harvest https://spip.example.org/export --single-page 3 --per-page 100

  # Cap the run for a quick sample
  spip-harvest https://spip.example.org/export --max-items 20 --page-delay-ms 100

OUTPUT:
  A JSON document with an "items" array (transformed HTML, featured media,
  gallery references, raw source fields) and a "stats" object. Media files
  land under --media-root together with a media.json ledger that makes
  re-runs reuse already-downloaded files.

ENVIRONMENT VARIABLES:
  SPIP_HARVEST_OUTPUT      Default for -o/--output
  SPIP_HARVEST_MEDIA_ROOT  Default for --media-root
  SPIP_HARVEST_VERBOSE     Enable debug logs (same as -v)
  RUST_LOG                 Full tracing filter override
"#;

/// Harvest SPIP XML exports into clean HTML and materialized media.
#[derive(Parser, Debug)]
#[command(
    name = "spip-harvest",
    version,
    about = "Harvest SPIP XML exports into clean HTML and materialized media",
    long_about = "Walks a paginated SPIP XML export, converts SPIP markup (raccourcis, inline \
<docNNN> tags, thumbnail chrome) into clean HTML, resolves document ids through the site's \
document index, downloads each referenced media file exactly once, and emits JSON rows ready \
for import into a destination CMS.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Export endpoint URL (pagination parameters are appended).
    url: String,

    /// Write the JSON output to this file instead of stdout.
    #[arg(short, long, env = "SPIP_HARVEST_OUTPUT")]
    output: Option<PathBuf>,

    /// XML element holding one content item.
    #[arg(long, default_value = "rubrique")]
    item_tag: String,

    /// First page to fetch.
    #[arg(long, default_value_t = 1)]
    page: usize,

    /// Items requested per page.
    #[arg(long, default_value_t = 20)]
    per_page: usize,

    /// Fetch exactly this one page and surface fetch/parse errors.
    #[arg(long, conflicts_with = "page")]
    single_page: Option<usize>,

    /// Stop after this many items in total.
    #[arg(long)]
    max_items: Option<usize>,

    /// Delay between page fetches in milliseconds.
    #[arg(long, default_value_t = 500)]
    page_delay_ms: u64,

    /// Safety bound on the number of pages fetched.
    #[arg(long, default_value_t = 2000)]
    max_pages: usize,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 30)]
    fetch_timeout: u64,

    /// Document-index endpoint (repeatable; tried in order).
    #[arg(long = "index-url")]
    index_urls: Vec<String>,

    /// Query parameter for single-id index lookups.
    #[arg(long, default_value = "id_document")]
    id_param: String,

    /// Path segment for the unresolved-document URL heuristic.
    #[arg(long, default_value = "IMG")]
    doc_path_pattern: String,

    /// Root directory for downloaded media files.
    #[arg(long, env = "SPIP_HARVEST_MEDIA_ROOT", default_value = "media")]
    media_root: PathBuf,

    /// Skip all media downloads (markup-only dry run).
    #[arg(long)]
    skip_media: bool,

    /// Re-download media even when an identical file already exists.
    #[arg(long)]
    no_reuse: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "SPIP_HARVEST_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SPIP_HARVEST_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and the JSON result.
    #[arg(short, long, env = "SPIP_HARVEST_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the spinner is active; the
    // progress callback provides the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn HarvestProgressCallback>)
    } else {
        None
    };

    let mut builder = HarvestConfig::builder()
        .base_url(&cli.url)
        .item_tag(&cli.item_tag)
        .page(cli.page)
        .per_page(cli.per_page)
        .page_delay_ms(cli.page_delay_ms)
        .max_pages(cli.max_pages)
        .fetch_timeout_secs(cli.fetch_timeout)
        .index_urls(cli.index_urls.clone())
        .id_param(&cli.id_param)
        .doc_path_pattern(&cli.doc_path_pattern)
        .media_root(&cli.media_root)
        .skip_media(cli.skip_media)
        .reuse_existing(!cli.no_reuse);
    if let Some(max) = cli.max_items {
        builder = builder.max_items(max);
    }
    if let Some(cb) = progress_cb {
        builder = builder.progress_callback(cb);
    }
    let config = builder.build().context("Invalid configuration")?;

    // ── Run harvest ──────────────────────────────────────────────────────
    let output = match (cli.single_page, &cli.output) {
        (Some(page), _) => fetch_single_page(&config, page)
            .await
            .context("Single-page harvest failed")?,
        (None, Some(path)) => harvest_to_file(&config, path)
            .await
            .context("Harvest failed")?,
        (None, None) => harvest(&config).await.context("Harvest failed")?,
    };

    // ── Emit results ─────────────────────────────────────────────────────
    match &cli.output {
        Some(path) => {
            if cli.single_page.is_some() {
                // Single-page mode bypassed harvest_to_file; write here.
                let json = serde_json::to_string_pretty(&output)
                    .context("Failed to serialise output")?;
                std::fs::write(path, json).context("Failed to write output file")?;
            }
            if !cli.quiet {
                let stats = &output.stats;
                eprintln!(
                    "{}  {} items / {} pages  {}ms  →  {}",
                    if stats.items_failed == 0 {
                        green("✔")
                    } else {
                        cyan("⚠")
                    },
                    stats.items_harvested,
                    stats.pages_fetched,
                    stats.total_duration_ms,
                    bold(&path.display().to_string()),
                );
                eprintln!(
                    "   media: {} created  /  {} reused  /  {} failed",
                    dim(&stats.media_created.to_string()),
                    dim(&stats.media_reused.to_string()),
                    dim(&stats.media_failed.to_string()),
                );
            }
        }
        None => {
            let json =
                serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(json.as_bytes())
                .context("Failed to write to stdout")?;
            handle.write_all(b"\n").context("Failed to write to stdout")?;
        }
    }

    Ok(())
}
