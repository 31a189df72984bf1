//! Document-side stages that feed the describer.
//!
//! ```text
//! input ──▶ extract ──▶ encode
//! (path/URL)  (pdfium)   (data URL)
//! ```
//!
//! 1. [`input`]   — canonicalise `SOURCE_DOCUMENT` to a local PDF file
//! 2. [`extract`] — collect embedded image objects from the selected pages;
//!    runs in `spawn_blocking` because pdfium is not async-safe
//! 3. [`encode`]  — PNG-encode each picture as a base64 data URL

pub mod encode;
pub mod extract;
pub mod input;
