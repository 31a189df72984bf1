//! Explicit key/value configuration source.
//!
//! The backend resolver and the options builder never read the process
//! environment directly. They take an [`EnvMap`], which the binary fills
//! from the real environment (after `.env` loading) and tests fill from a
//! literal list of pairs. This keeps resolution a pure function of its
//! input and lets tests run in parallel without mutating global state.

use std::collections::HashMap;

// ── Variable names ───────────────────────────────────────────────────────

pub const AZURE_OPENAI_API_KEY: &str = "AZURE_OPENAI_API_KEY";
pub const AZURE_OPENAI_ENDPOINT: &str = "AZURE_OPENAI_ENDPOINT";
pub const AZURE_OPENAI_DEPLOYMENT: &str = "AZURE_OPENAI_DEPLOYMENT";
pub const AZURE_OPENAI_API_VERSION: &str = "AZURE_OPENAI_API_VERSION";

pub const OPENAI_COMPATIBLE_API_URL: &str = "OPENAI_COMPATIBLE_API_URL";
pub const OPENAI_COMPATIBLE_API_KEY: &str = "OPENAI_COMPATIBLE_API_KEY";
pub const OPENAI_COMPATIBLE_API_HEADER_NAME: &str = "OPENAI_COMPATIBLE_API_HEADER_NAME";

pub const PICTURE_DESCRIPTION_PROMPT: &str = "PICTURE_DESCRIPTION_PROMPT";
pub const PICTURE_DESCRIPTION_TIMEOUT: &str = "PICTURE_DESCRIPTION_TIMEOUT";
pub const PICTURE_DESCRIPTION_TOKEN_EXTRACT_KEY: &str = "PICTURE_DESCRIPTION_TOKEN_EXTRACT_KEY";

pub const SOURCE_DOCUMENT: &str = "SOURCE_DOCUMENT";

/// Every variable the resolver and builder look at.
pub const KNOWN_VARS: &[&str] = &[
    AZURE_OPENAI_API_KEY,
    AZURE_OPENAI_ENDPOINT,
    AZURE_OPENAI_DEPLOYMENT,
    AZURE_OPENAI_API_VERSION,
    OPENAI_COMPATIBLE_API_URL,
    OPENAI_COMPATIBLE_API_KEY,
    OPENAI_COMPATIBLE_API_HEADER_NAME,
    PICTURE_DESCRIPTION_PROMPT,
    PICTURE_DESCRIPTION_TIMEOUT,
    PICTURE_DESCRIPTION_TOKEN_EXTRACT_KEY,
    SOURCE_DOCUMENT,
];

/// A snapshot of named configuration values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvMap {
    vars: HashMap<String, String>,
}

impl EnvMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the variables in [`KNOWN_VARS`] from the process environment.
    ///
    /// Values that are not valid unicode are treated as unset.
    pub fn from_process() -> Self {
        KNOWN_VARS
            .iter()
            .filter_map(|name| std::env::var(name).ok().map(|v| (*name, v)))
            .collect()
    }

    /// Insert or replace a value.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Raw lookup. `Some("")` means "set to the empty string".
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Lookup that treats the empty string as unset.
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for EnvMap
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
