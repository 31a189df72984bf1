//! Run entry points: find every picture in a document and describe it.
//!
//! ```text
//! source ──▶ input ──▶ extract ──▶ encode ──▶ describe ──▶ AnnotationOutput
//! (path/URL)  (local)   (pdfium)   (data URL)  (HTTP, concurrent)
//! ```
//!
//! Fatal problems (missing file, pdfium not found, invalid header) return
//! `Err`. Problems with individual pictures are recorded on their
//! [`PictureResult`] and the run carries on.

use crate::config::PipelineConfig;
use crate::describe::{EncodedPicture, PictureDescriber};
use crate::error::{PicDescError, PictureError};
use crate::options::PictureDescriptionOptions;
use crate::output::{AnnotationOutput, AnnotationStats, PictureResult};
use crate::pipeline::{encode, extract, input};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Describe every picture in `source` (a local path or an http(s) URL).
///
/// `options` is shared read-only by all concurrent requests of the run.
///
/// # Example
/// ```rust,no_run
/// use edgequake_picdesc::{annotate, options, EnvMap, PipelineConfig};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let opts = Arc::new(options::build(&EnvMap::from_process()));
/// let output = annotate("paper.pdf", opts, &PipelineConfig::default()).await?;
/// for pic in &output.pictures {
///     println!("page {} #{}: {:?}", pic.page_num, pic.index, pic.annotations);
/// }
/// # Ok(())
/// # }
/// ```
pub async fn annotate(
    source: impl AsRef<str>,
    options: Arc<PictureDescriptionOptions>,
    config: &PipelineConfig,
) -> Result<AnnotationOutput, PicDescError> {
    let total_start = Instant::now();
    let source = source.as_ref();
    info!("Starting picture annotation: {}", source);

    // Fail on unusable headers before touching the document.
    let describer = Arc::new(PictureDescriber::new(options)?);

    // ── Step 1: Resolve source ───────────────────────────────────────────
    let document = input::resolve_source(source, config.download_timeout_secs).await?;

    // ── Step 2: Extract pictures ─────────────────────────────────────────
    let extract_start = Instant::now();
    let extraction = extract::extract_pictures(document.path(), config).await?;
    let extract_duration_ms = extract_start.elapsed().as_millis() as u64;
    info!(
        "Found {} pictures on {} pages in {}ms",
        extraction.pictures.len(),
        extraction.scanned_pages,
        extract_duration_ms
    );

    // ── Step 3: Encode ───────────────────────────────────────────────────
    let pictures_found = extraction.pictures.len();
    let (encoded, mut failed_encodes) = encode_all(extraction.pictures);

    if let Some(ref cb) = config.progress_callback {
        cb.on_run_start(pictures_found);
    }

    // ── Step 4: Describe ─────────────────────────────────────────────────
    let describe_start = Instant::now();
    let mut pictures = describe_all(&describer, encoded, config).await;
    let describe_duration_ms = describe_start.elapsed().as_millis() as u64;

    pictures.append(&mut failed_encodes);
    pictures.sort_by_key(|p| (p.page_num, p.index));

    // ── Step 5: Stats ────────────────────────────────────────────────────
    let described = pictures.iter().filter(|p| p.is_described()).count();
    let stats = AnnotationStats {
        total_pages: extraction.total_pages,
        scanned_pages: extraction.scanned_pages,
        pictures_found,
        described,
        failed: pictures.len() - described,
        total_token_usage: total_token_usage(&pictures),
        extract_duration_ms,
        describe_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Annotation complete: {}/{} pictures described, {} tokens, {}ms total",
        stats.described, stats.pictures_found, stats.total_token_usage, stats.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_run_complete(pictures_found, described);
    }

    Ok(AnnotationOutput {
        source: source.to_string(),
        pictures,
        stats,
    })
}

/// Token usage across all pictures. Saturates instead of overflowing.
fn total_token_usage(pictures: &[PictureResult]) -> u64 {
    pictures
        .iter()
        .filter_map(PictureResult::token_usage)
        .fold(0, u64::saturating_add)
}

/// Synchronous wrapper around [`annotate`].
///
/// Creates a temporary tokio runtime internally.
pub fn annotate_sync(
    source: impl AsRef<str>,
    options: Arc<PictureDescriptionOptions>,
    config: &PipelineConfig,
) -> Result<AnnotationOutput, PicDescError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| PicDescError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(annotate(source, options, config))
}

/// Describe already-encoded pictures with bounded concurrency.
///
/// Results arrive in completion order.
pub async fn describe_all(
    describer: &Arc<PictureDescriber>,
    pictures: Vec<EncodedPicture>,
    config: &PipelineConfig,
) -> Vec<PictureResult> {
    stream::iter(pictures.into_iter().map(|picture| {
        let describer = Arc::clone(describer);
        let config = config.clone();
        async move {
            if let Some(ref cb) = config.progress_callback {
                cb.on_picture_start(picture.page_num, picture.index);
            }
            let result = describer.describe_with_retry(&picture, &config).await;
            if let Some(ref cb) = config.progress_callback {
                match &result.error {
                    None => {
                        let len: usize = result
                            .annotations
                            .iter()
                            .filter_map(|a| a.text.as_deref())
                            .map(str::len)
                            .sum();
                        cb.on_picture_complete(result.page_num, result.index, len)
                    }
                    Some(e) => cb.on_picture_error(result.page_num, result.index, &e.to_string()),
                }
            }
            result
        }
    }))
    .buffer_unordered(config.concurrency.max(1))
    .collect()
    .await
}

/// Encode every picture; pictures that fail become failed results.
fn encode_all(pictures: Vec<extract::ExtractedPicture>) -> (Vec<EncodedPicture>, Vec<PictureResult>) {
    let mut encoded = Vec::with_capacity(pictures.len());
    let mut failed = Vec::new();

    for pic in pictures {
        let (width, height) = (pic.image.width(), pic.image.height());
        match encode::encode_data_url(&pic.image) {
            Ok(data_url) => encoded.push(EncodedPicture {
                page_num: pic.page_num,
                index: pic.index,
                width,
                height,
                data_url,
            }),
            Err(e) => {
                warn!("Failed to encode page {} picture {}: {}", pic.page_num, pic.index, e);
                failed.push(PictureResult {
                    page_num: pic.page_num,
                    index: pic.index,
                    width,
                    height,
                    annotations: Vec::new(),
                    retries: 0,
                    duration_ms: 0,
                    error: Some(PictureError::EncodeFailed {
                        page: pic.page_num,
                        index: pic.index,
                        detail: e.to_string(),
                    }),
                });
            }
        }
    }

    (encoded, failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::EnvMap;
    use crate::options;
    use crate::progress::AnnotationProgressCallback;
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn encode_all_keeps_positions() {
        let pictures = vec![
            extract::ExtractedPicture {
                page_num: 2,
                index: 1,
                image: DynamicImage::ImageRgba8(RgbaImage::from_pixel(20, 30, Rgba([0, 0, 0, 255]))),
            },
            extract::ExtractedPicture {
                page_num: 1,
                index: 0,
                image: DynamicImage::ImageRgba8(RgbaImage::from_pixel(40, 40, Rgba([9, 9, 9, 255]))),
            },
        ];
        let (encoded, failed) = encode_all(pictures);
        assert!(failed.is_empty());
        assert_eq!(encoded.len(), 2);
        assert_eq!((encoded[0].page_num, encoded[0].index), (2, 1));
        assert_eq!((encoded[0].width, encoded[0].height), (20, 30));
        assert!(encoded[1].data_url.starts_with("data:image/png;base64,"));
    }

    fn result_with_usage(index: usize, usage: &[u64]) -> PictureResult {
        PictureResult {
            page_num: 1,
            index,
            width: 1,
            height: 1,
            annotations: usage
                .iter()
                .map(|&u| crate::output::Annotation {
                    text: Some("x".into()),
                    token_usage: Some(u),
                })
                .collect(),
            retries: 0,
            duration_ms: 0,
            error: None,
        }
    }

    #[test]
    fn token_totals_saturate() {
        let pictures = vec![
            result_with_usage(0, &[u64::MAX, 5]),
            result_with_usage(1, &[10]),
        ];
        assert_eq!(pictures[0].token_usage(), Some(u64::MAX));
        assert_eq!(total_token_usage(&pictures), u64::MAX);
        assert_eq!(total_token_usage(&[result_with_usage(0, &[3, 4])]), 7);
    }

    #[derive(Default)]
    struct Counting {
        started: AtomicUsize,
        errors: AtomicUsize,
    }

    impl AnnotationProgressCallback for Counting {
        fn on_picture_start(&self, _page_num: usize, _index: usize) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }
        fn on_picture_error(&self, _page_num: usize, _index: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn failures_do_not_abort_siblings() {
        let env = EnvMap::new().with(
            crate::env::OPENAI_COMPATIBLE_API_URL,
            "http://127.0.0.1:9/v1/chat/completions",
        );
        let describer = Arc::new(PictureDescriber::new(Arc::new(options::build(&env))).unwrap());
        let counter = Arc::new(Counting::default());
        let config = PipelineConfig::builder()
            .max_retries(0)
            .concurrency(2)
            .progress_callback(counter.clone())
            .build()
            .unwrap();

        let pictures = (0..3)
            .map(|i| EncodedPicture {
                page_num: 1,
                index: i,
                width: 1,
                height: 1,
                data_url: "data:,".into(),
            })
            .collect();

        let results = describe_all(&describer, pictures, &config).await;
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.error.is_some()));
        assert_eq!(counter.started.load(Ordering::SeqCst), 3);
        assert_eq!(counter.errors.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn invalid_header_is_fatal_before_input() {
        let env = EnvMap::new()
            .with(crate::env::OPENAI_COMPATIBLE_API_KEY, "k")
            .with(crate::env::OPENAI_COMPATIBLE_API_HEADER_NAME, "not valid");
        let err = annotate(
            "/definitely/not/here.pdf",
            Arc::new(options::build(&env)),
            &PipelineConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PicDescError::InvalidHeader { .. }));
    }

    #[tokio::test]
    async fn missing_source_is_fatal() {
        let err = annotate(
            "/definitely/not/here.pdf",
            Arc::new(options::build(&EnvMap::new())),
            &PipelineConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PicDescError::FileNotFound { .. }));
    }
}
