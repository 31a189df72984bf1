//! Prompt text sent alongside each picture.
//!
//! Overridden at runtime by `PICTURE_DESCRIPTION_PROMPT`; the constant here
//! is used only when no override is configured.

/// Default instruction for describing a single picture.
pub const DEFAULT_PICTURE_PROMPT: &str =
    "Describe the image in three sentences. Be concise and accurate.";
