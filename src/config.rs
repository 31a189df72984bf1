//! Pipeline configuration: how pictures are found and how the per-picture
//! requests are scheduled.
//!
//! This is deliberately separate from [`crate::options::PictureDescriptionOptions`].
//! The options say *what* to send and *where*; this struct says how many
//! requests run at once, how often to retry, which pages to look at.
//! Build it via [`PipelineConfig::builder()`] or use the defaults.

use crate::error::PicDescError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Configuration for a picture-annotation run.
///
/// # Example
/// ```rust
/// use edgequake_picdesc::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .concurrency(8)
///     .max_retries(2)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Number of concurrent picture requests. Default: 4.
    ///
    /// Each request is bounded by the options' timeout; failures on one
    /// picture never cancel the others.
    pub concurrency: usize,

    /// Maximum retry attempts on a transient failure. Default: 3.
    ///
    /// Permanent errors (401, 400, malformed body) are not retried.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Pictures whose shorter edge is below this many pixels are skipped. Default: 16.
    ///
    /// PDFs are full of 1×1 spacers and hairline rules stored as images;
    /// describing them costs a request each and yields nothing.
    pub min_picture_pixels: u32,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Page selection. Default: All pages.
    pub pages: PageSelection,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Explicit pdfium library file or directory. `None` uses the system loader.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Optional per-picture progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_retries: 3,
            retry_backoff_ms: 500,
            min_picture_pixels: 16,
            password: None,
            pages: PageSelection::default(),
            download_timeout_secs: 120,
            pdfium_lib_path: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("concurrency", &self.concurrency)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("min_picture_pixels", &self.min_picture_pixels)
            .field("password", &self.password.as_ref().map(|_| "<hidden>"))
            .field("pages", &self.pages)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn AnnotationProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn min_picture_pixels(mut self, px: u32) -> Self {
        self.config.min_picture_pixels = px;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PicDescError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(PicDescError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.download_timeout_secs == 0 {
            return Err(PicDescError::InvalidConfig(
                "Download timeout must be ≥ 1 second".into(),
            ));
        }
        if let PageSelection::Range(start, end) = c.pages {
            if start == 0 || start > end {
                return Err(PicDescError::InvalidConfig(format!(
                    "Invalid page range {start}-{end}"
                )));
            }
        }
        Ok(self.config)
    }
}

/// Specifies which pages of the PDF to scan for pictures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Scan all pages (default).
    #[default]
    All,
    /// A single page (1-indexed).
    Single(usize),
    /// A contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}
