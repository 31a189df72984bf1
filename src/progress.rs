//! Progress-callback trait for per-picture annotation events.
//!
//! Inject an [`Arc<dyn AnnotationProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as the pipeline describes each picture.
//!
//! # Example
//!
//! ```rust
//! use edgequake_picdesc::{AnnotationProgressCallback, PipelineConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     described: AtomicUsize,
//! }
//!
//! impl AnnotationProgressCallback for CountingCallback {
//!     fn on_picture_complete(&self, page_num: usize, index: usize, text_len: usize) {
//!         self.described.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("page {page_num} picture {index}: {text_len} chars");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { described: AtomicUsize::new(0) });
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(counter as Arc<dyn AnnotationProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it describes each picture.
///
/// Pictures are described concurrently, so `on_picture_*` may be called
/// from several tasks at once. Implementations must protect shared mutable
/// state (`Mutex`, atomics). Every method defaults to a no-op.
pub trait AnnotationProgressCallback: Send + Sync {
    /// Called once, after extraction, with the number of pictures to describe.
    fn on_run_start(&self, total_pictures: usize) {
        let _ = total_pictures;
    }

    /// Called just before the first request for a picture is sent.
    fn on_picture_start(&self, page_num: usize, index: usize) {
        let _ = (page_num, index);
    }

    /// Called when a picture was described.
    ///
    /// `text_len` is the byte length of the returned description.
    fn on_picture_complete(&self, page_num: usize, index: usize, text_len: usize) {
        let _ = (page_num, index, text_len);
    }

    /// Called when a picture failed after all retries.
    fn on_picture_error(&self, page_num: usize, index: usize, error: &str) {
        let _ = (page_num, index, error);
    }

    /// Called once after every picture has been attempted.
    fn on_run_complete(&self, total_pictures: usize, described: usize) {
        let _ = (total_pictures, described);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl AnnotationProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn AnnotationProgressCallback>;
