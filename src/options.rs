//! Picture-description options: everything the pipeline needs to issue one
//! HTTP request per picture, resolved once per run.
//!
//! [`build`] never fails. Malformed or missing values fall back to
//! documented defaults, but each value is first parsed into a [`Setting`]
//! so the summary can say which fields were defaulted.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `PICTURE_DESCRIPTION_PROMPT` | [`DEFAULT_PICTURE_PROMPT`] |
//! | `PICTURE_DESCRIPTION_TIMEOUT` | `90.0` seconds |
//! | `PICTURE_DESCRIPTION_TOKEN_EXTRACT_KEY` | `"usage"` (`""` disables extraction) |

use crate::backend::{self, BackendConfig, Provider};
use crate::env::{
    EnvMap, PICTURE_DESCRIPTION_PROMPT, PICTURE_DESCRIPTION_TIMEOUT,
    PICTURE_DESCRIPTION_TOKEN_EXTRACT_KEY,
};
use crate::prompts::DEFAULT_PICTURE_PROMPT;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::info;

/// Per-request timeout used when none (or an invalid one) is configured.
pub const DEFAULT_TIMEOUT_SECS: f64 = 90.0;

/// Response field holding token usage in OpenAI-style APIs.
pub const DEFAULT_TOKEN_EXTRACT_KEY: &str = "usage";

/// A configuration value together with where it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", content = "value", rename_all = "snake_case")]
pub enum Setting<T> {
    /// Read from configuration and accepted as-is.
    Explicit(T),
    /// Absent or rejected; the documented default applies.
    Defaulted(T),
}

impl<T> Setting<T> {
    pub fn value(&self) -> &T {
        match self {
            Setting::Explicit(v) | Setting::Defaulted(v) => v,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Setting::Explicit(v) | Setting::Defaulted(v) => v,
        }
    }

    pub fn is_defaulted(&self) -> bool {
        matches!(self, Setting::Defaulted(_))
    }
}

/// Immutable configuration handed to the picture pipeline.
///
/// One instance per run, shared read-only (behind an `Arc`) by every
/// concurrent picture request.
#[derive(Clone, PartialEq)]
pub struct PictureDescriptionOptions {
    /// Chat-completions endpoint.
    pub url: String,
    /// Auth headers. Values are secrets.
    pub headers: BTreeMap<String, String>,
    /// Extra top-level request-body fields. Empty unless a caller adds some.
    pub params: Map<String, Value>,
    /// Instruction sent with every picture.
    pub prompt: String,
    /// Per-request timeout in seconds. Always positive and finite.
    pub timeout: f64,
    /// Response field to read token usage from; `None` disables extraction.
    pub token_extract_key: Option<String>,
}

impl PictureDescriptionOptions {
    /// The timeout as a `Duration`. A value `Duration` cannot hold (only
    /// possible when `timeout` was set by hand) maps to the default.
    pub fn timeout_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout)
            .unwrap_or_else(|_| Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS))
    }

    pub fn header_names(&self) -> Vec<String> {
        self.headers.keys().cloned().collect()
    }

    /// Add a top-level request-body field, e.g. `model` or `max_tokens`.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

impl fmt::Debug for PictureDescriptionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PictureDescriptionOptions")
            .field("url", &self.url)
            .field("headers", &self.header_names())
            .field("params", &self.params)
            .field("prompt", &self.prompt)
            .field("timeout", &self.timeout)
            .field("token_extract_key", &self.token_extract_key)
            .finish()
    }
}

/// The non-secret view of a resolved configuration.
///
/// This is the only thing that gets logged or printed; it never holds a
/// header value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigSummary {
    pub provider: Provider,
    pub url: String,
    pub header_names: Vec<String>,
    pub timeout: Setting<f64>,
    pub token_extract_key: Setting<Option<String>>,
    pub prompt_defaulted: bool,
}

impl fmt::Display for ConfigSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Picture description backend selected:")?;
        writeln!(f, "  provider: {}", self.provider)?;
        writeln!(f, "  url: {}", self.url)?;
        writeln!(f, "  header names: {:?} (values hidden)", self.header_names)?;
        write!(f, "  timeout: {:?}s", self.timeout.value())?;
        if self.timeout.is_defaulted() {
            write!(f, " (default)")?;
        }
        if let Some(key) = self.token_extract_key.value() {
            write!(f, "\n  token_extract_key: {key}")?;
            if self.token_extract_key.is_defaulted() {
                write!(f, " (default)")?;
            }
        } else {
            write!(f, "\n  token_extract_key: disabled")?;
        }
        Ok(())
    }
}

/// Options plus the facts about how they were resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOptions {
    pub options: PictureDescriptionOptions,
    pub provider: Provider,
    pub summary: ConfigSummary,
}

/// Build the options for a run. Never fails.
pub fn build(env: &EnvMap) -> PictureDescriptionOptions {
    resolve_options(env).options
}

/// Build the options and keep the provider tag and summary alongside.
///
/// Logs the summary once at INFO level.
pub fn resolve_options(env: &EnvMap) -> ResolvedOptions {
    let prompt = parse_prompt(env.get(PICTURE_DESCRIPTION_PROMPT));
    let timeout = parse_timeout(env.get(PICTURE_DESCRIPTION_TIMEOUT));
    let token_extract_key = parse_token_extract_key(env.get(PICTURE_DESCRIPTION_TOKEN_EXTRACT_KEY));

    let BackendConfig {
        url,
        headers,
        provider,
    } = backend::resolve(env);

    let summary = ConfigSummary {
        provider,
        url: url.clone(),
        header_names: headers.keys().cloned().collect(),
        timeout: timeout.clone(),
        token_extract_key: token_extract_key.clone(),
        prompt_defaulted: prompt.is_defaulted(),
    };

    info!(
        provider = %summary.provider,
        url = %summary.url,
        header_names = ?summary.header_names,
        timeout_secs = *summary.timeout.value(),
        token_extract_key = ?summary.token_extract_key.value(),
        "Picture description backend selected"
    );

    let options = PictureDescriptionOptions {
        url,
        headers,
        params: Map::new(),
        prompt: prompt.into_value(),
        timeout: timeout.into_value(),
        token_extract_key: token_extract_key.into_value(),
    };

    ResolvedOptions {
        options,
        provider,
        summary,
    }
}

/// Parse a timeout in seconds. Only positive, finite numbers that fit in a
/// `Duration` are accepted.
pub fn parse_timeout(raw: Option<&str>) -> Setting<f64> {
    raw.map(str::trim)
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|t| t.is_finite() && *t > 0.0 && Duration::try_from_secs_f64(*t).is_ok())
        .map(Setting::Explicit)
        .unwrap_or(Setting::Defaulted(DEFAULT_TIMEOUT_SECS))
}

/// Unset → `"usage"`; the empty string → disabled; anything else as given.
pub fn parse_token_extract_key(raw: Option<&str>) -> Setting<Option<String>> {
    match raw {
        None => Setting::Defaulted(Some(DEFAULT_TOKEN_EXTRACT_KEY.to_string())),
        Some("") => Setting::Explicit(None),
        Some(key) => Setting::Explicit(Some(key.to_string())),
    }
}

/// Unset → the default prompt. Unlike a plain "default when absent" lookup,
/// a set-but-blank (empty or whitespace-only) value also maps to the
/// default, since a request without an instruction returns nothing useful.
pub fn parse_prompt(raw: Option<&str>) -> Setting<String> {
    match raw {
        Some(p) if !p.trim().is_empty() => Setting::Explicit(p.to_string()),
        _ => Setting::Defaulted(DEFAULT_PICTURE_PROMPT.to_string()),
    }
}
