//! # edgequake-picdesc
//!
//! Describe the pictures inside PDF documents with a vision-capable
//! chat-completions endpoint: Azure OpenAI or anything OpenAI-compatible
//! (vLLM, LiteLLM, Ollama, a custom gateway).
//!
//! ## Backend selection
//!
//! The backend is resolved once per run from named configuration values,
//! first match wins:
//!
//! | Backend | Selected when | URL |
//! |---------|---------------|-----|
//! | `azure` | `AZURE_OPENAI_API_KEY`, `_ENDPOINT`, `_DEPLOYMENT`, `_API_VERSION` all set | `{endpoint}/openai/deployments/{deployment}/chat/completions?api-version={version}` |
//! | `openai-compatible` | otherwise | `OPENAI_COMPATIBLE_API_URL` or `http://localhost:8000/v1/chat/completions` |
//!
//! Resolution and option building never fail: missing or malformed values
//! fall back to documented defaults (see [`options`]).
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     resolve local file or download from URL
//!  ├─ 2. Extract   embedded image objects via pdfium (spawn_blocking)
//!  ├─ 3. Encode    PNG → base64 data URL
//!  ├─ 4. Describe  concurrent chat-completions calls, retry on 429/5xx
//!  └─ 5. Output    per-picture annotations (text + token usage) and stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_picdesc::{annotate, options, EnvMap, PipelineConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let opts = Arc::new(options::build(&EnvMap::from_process()));
//!     let output = annotate("document.pdf", opts, &PipelineConfig::default()).await?;
//!     for pic in &output.pictures {
//!         for ann in &pic.annotations {
//!             println!("page {}: {:?} ({:?} tokens)", pic.page_num, ann.text, ann.token_usage);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `picdesc` binary (clap + anyhow + tracing-subscriber + dotenvy) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod annotate;
pub mod backend;
pub mod config;
pub mod describe;
pub mod env;
pub mod error;
pub mod options;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod usage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use annotate::{annotate, annotate_sync};
pub use backend::{resolve as resolve_backend, BackendConfig, Provider};
pub use config::{PageSelection, PipelineConfig, PipelineConfigBuilder};
pub use describe::{EncodedPicture, PictureDescriber};
pub use env::EnvMap;
pub use error::{PicDescError, PictureError};
pub use options::{ConfigSummary, PictureDescriptionOptions, ResolvedOptions, Setting};
pub use output::{Annotation, AnnotationOutput, AnnotationStats, PictureResult};
pub use progress::{AnnotationProgressCallback, NoopProgressCallback, ProgressCallback};
pub use usage::extract_token_usage;
