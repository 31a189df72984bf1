//! Backend resolution: which HTTP endpoint to call and how to authenticate.
//!
//! Resolution walks [`BACKEND_RULES`] in order and uses the first rule whose
//! predicate matches. The last rule always matches, so [`resolve`] is total:
//! it never fails and never performs I/O.
//!
//! ```text
//! 1. azure              all four AZURE_OPENAI_* values set and non-empty
//! 2. openai-compatible  everything else
//! ```
//!
//! There is no partial-Azure mode. Setting only some of the Azure values
//! routes to the OpenAI-compatible rule exactly as if none were set.

use crate::env::{
    EnvMap, AZURE_OPENAI_API_KEY, AZURE_OPENAI_API_VERSION, AZURE_OPENAI_DEPLOYMENT,
    AZURE_OPENAI_ENDPOINT, OPENAI_COMPATIBLE_API_HEADER_NAME, OPENAI_COMPATIBLE_API_KEY,
    OPENAI_COMPATIBLE_API_URL,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Fallback endpoint when `OPENAI_COMPATIBLE_API_URL` is unset.
pub const DEFAULT_OPENAI_COMPATIBLE_URL: &str = "http://localhost:8000/v1/chat/completions";

/// Auth header used by Azure and, unless overridden, by the fallback backend.
pub const DEFAULT_API_KEY_HEADER: &str = "api-key";

const AZURE_VARS: [&str; 4] = [
    AZURE_OPENAI_API_KEY,
    AZURE_OPENAI_ENDPOINT,
    AZURE_OPENAI_DEPLOYMENT,
    AZURE_OPENAI_API_VERSION,
];

/// The remote API family a run targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provider {
    /// Azure OpenAI deployment endpoint.
    Azure,
    /// Any endpoint speaking the OpenAI chat-completions protocol
    /// (vLLM, LiteLLM, Ollama, a custom gateway, …).
    OpenaiCompatible,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Azure => "azure",
            Provider::OpenaiCompatible => "openai-compatible",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Endpoint, auth headers and provider tag chosen for a run.
#[derive(Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub provider: Provider,
}

impl BackendConfig {
    /// Header names in sorted order. Values are secrets and are never exposed here.
    pub fn header_names(&self) -> Vec<String> {
        self.headers.keys().cloned().collect()
    }
}

// Header values are credentials; keep them out of `{:?}` output.
impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("url", &self.url)
            .field("headers", &self.header_names())
            .field("provider", &self.provider)
            .finish()
    }
}

/// One entry of the ordered decision table.
pub struct BackendRule {
    pub provider: Provider,
    pub applies: fn(&EnvMap) -> bool,
    pub build: fn(&EnvMap) -> BackendConfig,
}

/// Ordered decision table. The first rule whose `applies` returns true wins.
///
/// New providers go above the final catch-all entry.
pub static BACKEND_RULES: &[BackendRule] = &[
    BackendRule {
        provider: Provider::Azure,
        applies: azure_configured,
        build: build_azure,
    },
    BackendRule {
        provider: Provider::OpenaiCompatible,
        applies: always,
        build: build_openai_compatible,
    },
];

/// Resolve the backend from `env`.
pub fn resolve(env: &EnvMap) -> BackendConfig {
    log_partial_azure(env);

    BACKEND_RULES
        .iter()
        .find(|rule| (rule.applies)(env))
        .map(|rule| (rule.build)(env))
        .unwrap_or_else(|| build_openai_compatible(env))
}

/// Azure variables that are unset or empty, in declaration order.
pub fn missing_azure_vars(env: &EnvMap) -> Vec<&'static str> {
    AZURE_VARS
        .iter()
        .copied()
        .filter(|name| env.get_non_empty(name).is_none())
        .collect()
}

/// Build the Azure deployment URL. Trailing slashes on `endpoint` are removed.
pub fn azure_chat_completions_url(endpoint: &str, deployment: &str, api_version: &str) -> String {
    format!(
        "{}/openai/deployments/{}/chat/completions?api-version={}",
        endpoint.trim_end_matches('/'),
        deployment,
        api_version
    )
}

// ── Rules ────────────────────────────────────────────────────────────────

fn always(_: &EnvMap) -> bool {
    true
}

fn azure_configured(env: &EnvMap) -> bool {
    missing_azure_vars(env).is_empty()
}

fn build_azure(env: &EnvMap) -> BackendConfig {
    let value = |name: &str| env.get_non_empty(name).unwrap_or_default();

    let url = azure_chat_completions_url(
        value(AZURE_OPENAI_ENDPOINT),
        value(AZURE_OPENAI_DEPLOYMENT),
        value(AZURE_OPENAI_API_VERSION),
    );

    let mut headers = BTreeMap::new();
    headers.insert(
        DEFAULT_API_KEY_HEADER.to_string(),
        value(AZURE_OPENAI_API_KEY).to_string(),
    );

    BackendConfig {
        url,
        headers,
        provider: Provider::Azure,
    }
}

fn build_openai_compatible(env: &EnvMap) -> BackendConfig {
    let url = env
        .get(OPENAI_COMPATIBLE_API_URL)
        .unwrap_or(DEFAULT_OPENAI_COMPATIBLE_URL)
        .to_string();
    let header_name = env
        .get(OPENAI_COMPATIBLE_API_HEADER_NAME)
        .unwrap_or(DEFAULT_API_KEY_HEADER);

    let mut headers = BTreeMap::new();
    if let Some(key) = env.get_non_empty(OPENAI_COMPATIBLE_API_KEY) {
        headers.insert(header_name.to_string(), key.to_string());
    }

    BackendConfig {
        url,
        headers,
        provider: Provider::OpenaiCompatible,
    }
}

fn log_partial_azure(env: &EnvMap) {
    let missing = missing_azure_vars(env);
    if !missing.is_empty() && missing.len() < AZURE_VARS.len() {
        debug!(
            "Partial Azure configuration ignored (missing: {}); using OpenAI-compatible backend",
            missing.join(", ")
        );
    }
}
