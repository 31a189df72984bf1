//! Result types produced by an annotation run.

use crate::error::PictureError;
use serde::{Deserialize, Serialize};

/// One description attached to a picture.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    /// Description returned by the endpoint.
    pub text: Option<String>,
    /// Token count pulled from the response, when extraction is enabled
    /// and the response carried one.
    pub token_usage: Option<u64>,
}

/// Outcome for a single picture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PictureResult {
    /// 1-indexed page number.
    pub page_num: usize,
    /// 0-indexed position among the pictures kept on that page.
    pub index: usize,
    pub width: u32,
    pub height: u32,
    /// Empty when the picture failed.
    pub annotations: Vec<Annotation>,
    /// Attempts beyond the first.
    pub retries: u32,
    pub duration_ms: u64,
    pub error: Option<PictureError>,
}

impl PictureResult {
    pub fn is_described(&self) -> bool {
        self.error.is_none()
    }

    /// Sum of the token usage across this picture's annotations.
    pub fn token_usage(&self) -> Option<u64> {
        self.annotations
            .iter()
            .filter_map(|a| a.token_usage)
            .reduce(u64::saturating_add)
    }
}

/// Aggregate numbers for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationStats {
    pub total_pages: usize,
    pub scanned_pages: usize,
    pub pictures_found: usize,
    pub described: usize,
    pub failed: usize,
    pub total_token_usage: u64,
    pub extract_duration_ms: u64,
    pub describe_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything an annotation run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationOutput {
    /// The path or URL that was processed.
    pub source: String,
    /// Sorted by `(page_num, index)`.
    pub pictures: Vec<PictureResult>,
    pub stats: AnnotationStats,
}
