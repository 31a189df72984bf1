//! CLI binary for edgequake-picdesc.
//!
//! A thin shim over the library crate: loads `.env`, resolves the backend
//! from the environment, prints the non-secret configuration summary, then
//! describes every picture in the source document.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_picdesc::env::SOURCE_DOCUMENT;
use edgequake_picdesc::pipeline::input::DEFAULT_SOURCE_DOCUMENT;
use edgequake_picdesc::{
    annotate, options, AnnotationOutput, AnnotationProgressCallback, EnvMap, PageSelection,
    PipelineConfig, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
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

const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar with one log line per finished picture. Pictures
/// finish out of order, so start times are keyed by `(page, index)`.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<(usize, usize), Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(SPINNER),
        );
        bar.set_prefix("Extracting");
        bar.set_message("Looking for pictures…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, key: (usize, usize)) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&key))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl AnnotationProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_pictures: usize) {
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} pictures  \
                 ⏱ {elapsed_precise}  ETA {eta_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(SPINNER),
        );
        self.bar.set_length(total_pictures as u64);
        self.bar.set_prefix("Describing");
        self.bar.reset_eta();
    }

    fn on_picture_start(&self, page_num: usize, index: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert((page_num, index), Instant::now());
        }
        self.bar.set_message(format!("page {page_num} #{index}"));
    }

    fn on_picture_complete(&self, page_num: usize, index: usize, text_len: usize) {
        let secs = self.elapsed_secs((page_num, index));
        self.bar.println(format!(
            "  {} Page {:>3} #{:<2}  {}  {}",
            green("✓"),
            page_num,
            index,
            dim(&format!("{text_len:>5} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_picture_error(&self, page_num: usize, index: usize, error: &str) {
        let secs = self.elapsed_secs((page_num, index));
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3} #{:<2}  {}  {}",
            red("✗"),
            page_num,
            index,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, _total_pictures: usize, _described: usize) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Azure OpenAI (all four AZURE_OPENAI_* variables in .env)
  picdesc paper.pdf

  # Local vLLM / LiteLLM gateway
  OPENAI_COMPATIBLE_API_URL=http://localhost:8000/v1/chat/completions picdesc paper.pdf

  # Gateway expecting a bearer token
  OPENAI_COMPATIBLE_API_HEADER_NAME=Authorization \
  OPENAI_COMPATIBLE_API_KEY="Bearer sk-..." picdesc paper.pdf

  # Show which backend would be used, without touching any document
  picdesc --show-config

  # Pages 1-5 only, JSON output
  picdesc --pages 1-5 --json https://arxiv.org/pdf/2408.09869 > pictures.json

ENVIRONMENT VARIABLES:
  AZURE_OPENAI_API_KEY                   Azure key (sent as `api-key`)
  AZURE_OPENAI_ENDPOINT                  https://<resource>.openai.azure.com
  AZURE_OPENAI_DEPLOYMENT                Vision-capable deployment name
  AZURE_OPENAI_API_VERSION               e.g. 2024-02-01
  OPENAI_COMPATIBLE_API_URL              Fallback endpoint (default http://localhost:8000/v1/chat/completions)
  OPENAI_COMPATIBLE_API_KEY              Fallback credential (optional)
  OPENAI_COMPATIBLE_API_HEADER_NAME      Fallback auth header name (default api-key)
  PICTURE_DESCRIPTION_PROMPT             Prompt sent with every picture
  PICTURE_DESCRIPTION_TIMEOUT            Per-request timeout in seconds (default 90)
  PICTURE_DESCRIPTION_TOKEN_EXTRACT_KEY  Response field holding token usage (default usage, empty disables)
  SOURCE_DOCUMENT                        Path or URL used when no SOURCE argument is given
  PDFIUM_LIB_PATH                        pdfium library file or directory

The Azure backend is used only when all four AZURE_OPENAI_* values are set;
otherwise the OpenAI-compatible backend is used.
"#;

/// Describe the pictures in a PDF with a vision LLM.
#[derive(Parser, Debug)]
#[command(
    name = "picdesc",
    version,
    about = "Describe the pictures in a PDF with Azure OpenAI or an OpenAI-compatible vision endpoint",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF path or HTTP/HTTPS URL. Falls back to SOURCE_DOCUMENT.
    source: Option<String>,

    /// Load environment variables from this file instead of ./.env.
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Print the resolved backend configuration and exit.
    #[arg(long)]
    show_config: bool,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "PICDESC_PAGES", default_value = "all")]
    pages: String,

    /// Number of concurrent picture requests.
    #[arg(short, long, env = "PICDESC_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Retries per picture on transient failures.
    #[arg(long, env = "PICDESC_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Skip pictures whose shorter edge is below this many pixels.
    #[arg(long, env = "PICDESC_MIN_PICTURE_PIXELS", default_value_t = 16)]
    min_picture_pixels: u32,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PICDESC_PASSWORD")]
    password: Option<String>,

    /// HTTP download timeout in seconds for URL sources.
    #[arg(long, env = "PICDESC_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// pdfium library file or directory.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,

    /// Output structured JSON instead of the text report.
    #[arg(long, env = "PICDESC_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PICDESC_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PICDESC_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and results.
    #[arg(short, long, env = "PICDESC_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // The env file must be loaded before clap reads its env fallbacks, so
    // `--env-file` is picked out of the raw args ahead of parsing.
    let dotenv_path = load_env_file(env_file_arg(std::env::args_os()).as_deref())?;

    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.show_config;
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

    if let Some(path) = dotenv_path {
        tracing::debug!("Loaded environment from {}", path.display());
    }

    // ── Resolve configuration ────────────────────────────────────────────
    let env = EnvMap::from_process();
    let resolved = options::resolve_options(&env);

    if cli.show_config {
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&resolved.summary)
                    .context("Failed to serialise configuration summary")?
            );
        } else {
            println!("{}", resolved.summary);
        }
        return Ok(());
    }

    if !cli.quiet && !cli.json {
        eprintln!("{}", resolved.summary);
    }

    let source = cli
        .source
        .clone()
        .or_else(|| env.get_non_empty(SOURCE_DOCUMENT).map(str::to_string))
        .unwrap_or_else(|| DEFAULT_SOURCE_DOCUMENT.to_string());

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as ProgressCallback)
    } else {
        None
    };
    let config = build_config(&cli, progress)?;

    if !cli.quiet && !cli.json {
        eprintln!("\n{} {}\n", bold("Converting source:"), source);
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let output = annotate(&source, Arc::new(resolved.options), &config)
        .await
        .context("Picture annotation failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to serialise output")?
        );
    } else {
        print_report(&output);
        if !cli.quiet {
            eprintln!(
                "\n{}  {}/{} pictures described  {} tokens  {}ms",
                if output.stats.failed == 0 { green("✔") } else { red("⚠") },
                output.stats.described,
                output.stats.pictures_found,
                output.stats.total_token_usage,
                output.stats.total_duration_ms,
            );
        }
    }

    Ok(())
}

/// The value of `--env-file`, in either `--env-file PATH` or
/// `--env-file=PATH` form. Scanning stops at `--`.
fn env_file_arg<I>(args: I) -> Option<PathBuf>
where
    I: IntoIterator,
    I::Item: Into<OsString>,
{
    let mut args = args.into_iter().map(Into::into);
    let mut found = None;
    while let Some(arg) = args.next() {
        if arg == "--" {
            break;
        }
        if arg == "--env-file" {
            found = args.next().map(PathBuf::from);
        } else if let Some(path) = arg.to_str().and_then(|a| a.strip_prefix("--env-file=")) {
            found = Some(PathBuf::from(path));
        }
    }
    found
}

/// Load `explicit` if given, otherwise `./.env` when present. Variables
/// already set in the process environment are never replaced.
fn load_env_file(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    match explicit {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("Failed to load environment file {:?}", path))?;
            Ok(Some(path.to_path_buf()))
        }
        None => Ok(dotenvy::dotenv().ok()),
    }
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .pages(parse_pages(&cli.pages)?)
        .concurrency(cli.concurrency)
        .max_retries(cli.max_retries)
        .min_picture_pixels(cli.min_picture_pixels)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(ref path) = cli.pdfium_lib_path {
        builder = builder.pdfium_lib_path(path.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Per-picture text report on stdout.
fn print_report(output: &AnnotationOutput) {
    if output.pictures.is_empty() {
        println!("No pictures found.");
        return;
    }

    for (idx, pic) in output.pictures.iter().enumerate() {
        println!("\nPicture #{idx}:");
        println!(
            "  provenance: page={} index={} size={}x{}",
            pic.page_num, pic.index, pic.width, pic.height
        );

        if let Some(ref err) = pic.error {
            println!("  (no annotations: {err})");
            continue;
        }
        if pic.annotations.is_empty() {
            println!("  (no annotations)");
            continue;
        }
        for (ann_idx, ann) in pic.annotations.iter().enumerate() {
            println!(
                "  Annotation {}: text={:?} token_usage={:?}",
                ann_idx, ann.text, ann.token_usage
            );
        }
    }
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start.trim().parse().context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;
        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }
        if start > end {
            anyhow::bail!("Invalid page range '{}-{}': start must be <= end", start, end);
        }
        return Ok(PageSelection::Range(start, end));
    }

    if s.contains(',') {
        let pages = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .with_context(|| format!("Invalid page number: '{}'", p.trim()))
            })
            .collect::<Result<Vec<_>>>()?;
        if let Some(&p) = pages.iter().find(|&&p| p < 1) {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", p);
        }
        return Ok(PageSelection::Set(pages));
    }

    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }
    Ok(PageSelection::Single(page))
}
