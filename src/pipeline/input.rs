//! Source resolution: turn `SOURCE_DOCUMENT` (a path or an http(s) URL)
//! into a local PDF file pdfium can open.
//!
//! URLs are downloaded into a `TempDir` owned by [`SourceDocument`], so the
//! file disappears when the run ends. Both paths check the `%PDF` magic
//! before returning.

use crate::error::PicDescError;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info};

/// Default document when `SOURCE_DOCUMENT` is unset.
pub const DEFAULT_SOURCE_DOCUMENT: &str = "https://arxiv.org/pdf/2408.09869";

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// A PDF ready to be opened.
#[derive(Debug)]
pub enum SourceDocument {
    /// The source was already a local file.
    Local(PathBuf),
    /// The source was a URL. `_temp_dir` keeps the download alive.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl SourceDocument {
    pub fn path(&self) -> &Path {
        match self {
            SourceDocument::Local(p) => p,
            SourceDocument::Downloaded { path, .. } => path,
        }
    }

    pub fn is_downloaded(&self) -> bool {
        matches!(self, SourceDocument::Downloaded { .. })
    }
}

/// Check if the source string looks like a URL.
pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Resolve a path or URL to a local PDF.
pub async fn resolve_source(source: &str, timeout_secs: u64) -> Result<SourceDocument, PicDescError> {
    if is_url(source) {
        download(source, timeout_secs).await
    } else {
        open_local(source)
    }
}

fn open_local(source: &str) -> Result<SourceDocument, PicDescError> {
    let path = PathBuf::from(source);

    let mut file = match std::fs::File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(PicDescError::PermissionDenied { path });
        }
        Err(_) => return Err(PicDescError::FileNotFound { path }),
    };

    let mut magic = [0u8; 4];
    if file.read_exact(&mut magic).is_ok() {
        check_magic(&path, &magic)?;
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(SourceDocument::Local(path))
}

async fn download(url: &str, timeout_secs: u64) -> Result<SourceDocument, PicDescError> {
    info!("Downloading PDF from: {}", url);

    let failed = |reason: String| PicDescError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            PicDescError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;

    let temp_dir = TempDir::new().map_err(|e| PicDescError::Internal(e.to_string()))?;
    let path = temp_dir.path().join(filename_from_url(url));

    if let Some(magic) = bytes.get(..4) {
        let mut head = [0u8; 4];
        head.copy_from_slice(magic);
        check_magic(&path, &head)?;
    }

    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|e| PicDescError::Internal(format!("Failed to write temp file: {}", e)))?;

    info!("Downloaded {} bytes to: {}", bytes.len(), path.display());

    Ok(SourceDocument::Downloaded {
        path,
        _temp_dir: temp_dir,
    })
}

fn check_magic(path: &Path, magic: &[u8; 4]) -> Result<(), PicDescError> {
    if magic == PDF_MAGIC {
        Ok(())
    } else {
        Err(PicDescError::NotAPdf {
            path: path.to_path_buf(),
            magic: *magic,
        })
    }
}

/// Last path segment of `url` when it looks like a file name, else `document.pdf`.
///
/// arXiv-style URLs (`/pdf/2408.09869`) end in a dotted id, not a file
/// name, so a `.pdf` suffix is appended when missing.
pub fn filename_from_url(url: &str) -> String {
    let last = reqwest::Url::parse(url).ok().and_then(|parsed| {
        parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back().map(str::to_string))
    });

    match last {
        Some(name) if !name.is_empty() => {
            if name.to_ascii_lowercase().ends_with(".pdf") {
                name
            } else {
                format!("{name}.pdf")
            }
        }
        _ => "document.pdf".to_string(),
    }
}
