//! Error types for the edgequake-picdesc library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PicDescError`] — **Fatal**: the run cannot proceed at all (bad
//!   input file, pdfium missing, unusable auth header). Returned as
//!   `Err(PicDescError)` from the top-level `annotate*` functions.
//!
//! * [`PictureError`] — **Non-fatal**: a single picture could not be
//!   described (timeout, HTTP 500, malformed body) but every other picture
//!   is fine. Stored inside [`crate::output::PictureResult`].
//!
//! Resolving the backend and building the options never produces either:
//! missing or malformed configuration always degrades to a default.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-picdesc library.
#[derive(Debug, Error)]
pub enum PicDescError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The page selection matched no page of the document.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// pdfium returned an error while walking a page's objects.
    #[error("Picture extraction failed for page {page}: {detail}")]
    ExtractionFailed { page: usize, detail: String },

    // ── Request configuration errors ──────────────────────────────────────
    /// A header name or value cannot be sent over HTTP.
    #[error("Invalid HTTP header '{name}': {reason}\nCheck OPENAI_COMPATIBLE_API_HEADER_NAME and the API key.")]
    InvalidHeader { name: String, reason: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install pdfium (https://github.com/bblanchon/pdfium-binaries) and either\n\
  • place it where the system loader finds it, or\n\
  • set PDFIUM_LIB_PATH=/path/to/libpdfium (file or containing directory).\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single picture.
///
/// `page` is 1-indexed; `index` is the picture's position on its page.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum PictureError {
    /// The picture could not be encoded for upload.
    #[error("Page {page} picture {index}: encoding failed: {detail}")]
    EncodeFailed {
        page: usize,
        index: usize,
        detail: String,
    },

    /// The request did not complete within the configured timeout.
    #[error("Page {page} picture {index}: request timed out after {secs}s")]
    Timeout { page: usize, index: usize, secs: f64 },

    /// The endpoint answered with a non-success status.
    #[error("Page {page} picture {index}: HTTP {status}: {body}")]
    HttpStatus {
        page: usize,
        index: usize,
        status: u16,
        body: String,
    },

    /// Connection, TLS or other transport failure.
    #[error("Page {page} picture {index}: request failed: {detail}")]
    Transport {
        page: usize,
        index: usize,
        detail: String,
    },

    /// The body was not JSON or had no description text.
    #[error("Page {page} picture {index}: malformed response: {detail}")]
    MalformedResponse {
        page: usize,
        index: usize,
        detail: String,
    },

    /// Every attempt failed; `last` is the final attempt's error.
    #[error("Page {page} picture {index}: failed after {retries} retries: {last}")]
    RetriesExhausted {
        page: usize,
        index: usize,
        retries: u32,
        last: Box<PictureError>,
    },
}

impl PictureError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// Timeouts, transport errors, 408, 429 and 5xx are transient. Other
    /// 4xx (bad key, bad request) and malformed bodies are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            PictureError::Timeout { .. } | PictureError::Transport { .. } => true,
            PictureError::HttpStatus { status, .. } => {
                *status == 408 || *status == 429 || (500..600).contains(status)
            }
            PictureError::EncodeFailed { .. }
            | PictureError::MalformedResponse { .. }
            | PictureError::RetriesExhausted { .. } => false,
        }
    }
}
