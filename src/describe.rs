//! Per-picture description calls against the resolved backend.
//!
//! A [`PictureDescriber`] owns one `reqwest::Client` configured from the
//! shared [`PictureDescriptionOptions`]: auth headers become default
//! headers, `timeout` becomes the per-request timeout. Every picture is one
//! chat-completions POST:
//!
//! ```json
//! { ...params,
//!   "messages": [{ "role": "user", "content": [
//!       { "type": "text", "text": "<prompt>" },
//!       { "type": "image_url", "image_url": { "url": "data:image/png;base64,..." } } ] }] }
//! ```
//!
//! The first choice's message content becomes [`Annotation::text`]; the
//! configured token-extraction key is applied to the whole response body.
//!
//! ## Retry strategy
//!
//! Transient failures (timeouts, transport errors, 408/429/5xx) are retried
//! with exponential backoff, `retry_backoff_ms * 2^(attempt-1)`. Anything
//! else fails the picture immediately. A failed picture never affects its
//! siblings.

use crate::config::PipelineConfig;
use crate::error::{PicDescError, PictureError};
use crate::options::PictureDescriptionOptions;
use crate::output::{Annotation, PictureResult};
use crate::usage::extract_token_usage;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Longest error-body excerpt kept in [`PictureError::HttpStatus`].
const MAX_ERROR_BODY_CHARS: usize = 300;

/// A picture ready to send.
#[derive(Debug, Clone)]
pub struct EncodedPicture {
    pub page_num: usize,
    pub index: usize,
    pub width: u32,
    pub height: u32,
    pub data_url: String,
}

/// Issues description requests for one run.
#[derive(Debug, Clone)]
pub struct PictureDescriber {
    client: reqwest::Client,
    options: Arc<PictureDescriptionOptions>,
}

impl PictureDescriber {
    /// Build a describer. Fails only if a header cannot be sent over HTTP.
    pub fn new(options: Arc<PictureDescriptionOptions>) -> Result<Self, PicDescError> {
        let client = reqwest::Client::builder()
            .timeout(options.timeout_duration())
            .default_headers(header_map(&options.headers)?)
            .build()
            .map_err(|e| PicDescError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, options })
    }

    pub fn options(&self) -> &PictureDescriptionOptions {
        &self.options
    }

    /// One attempt for one picture.
    pub async fn describe(&self, picture: &EncodedPicture) -> Result<Annotation, PictureError> {
        let (page, index) = (picture.page_num, picture.index);
        let body = build_request_body(&self.options, &picture.data_url);

        let response = self
            .client
            .post(&self.options.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.request_error(page, index, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.request_error(page, index, e))?;

        if !status.is_success() {
            return Err(PictureError::HttpStatus {
                page,
                index,
                status: status.as_u16(),
                body: excerpt(&text),
            });
        }

        let json: Value =
            serde_json::from_str(&text).map_err(|e| PictureError::MalformedResponse {
                page,
                index,
                detail: format!("body is not JSON: {e}"),
            })?;

        parse_response(page, index, &json, self.options.token_extract_key.as_deref())
    }

    /// Describe a picture, retrying transient failures. Never returns an error:
    /// failures are recorded on the returned [`PictureResult`].
    pub async fn describe_with_retry(
        &self,
        picture: &EncodedPicture,
        config: &PipelineConfig,
    ) -> PictureResult {
        let start = Instant::now();
        let (page, index) = (picture.page_num, picture.index);
        let mut attempt: u32 = 0;

        let outcome = loop {
            if attempt > 0 {
                let backoff = backoff_ms(config.retry_backoff_ms, attempt);
                warn!(
                    "Page {} picture {}: retry {}/{} after {}ms",
                    page, index, attempt, config.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.describe(picture).await {
                Ok(annotation) => break Ok(annotation),
                Err(e) if e.is_retryable() && attempt < config.max_retries => {
                    warn!("Page {} picture {}: attempt {} failed — {}", page, index, attempt + 1, e);
                    attempt += 1;
                }
                Err(e) if attempt > 0 => {
                    break Err(PictureError::RetriesExhausted {
                        page,
                        index,
                        retries: attempt,
                        last: Box::new(e),
                    })
                }
                Err(e) => break Err(e),
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let (annotations, error) = match outcome {
            Ok(annotation) => {
                debug!(
                    "Page {} picture {}: {} chars, token_usage={:?}, {}ms",
                    page,
                    index,
                    annotation.text.as_deref().map_or(0, str::len),
                    annotation.token_usage,
                    duration_ms
                );
                (vec![annotation], None)
            }
            Err(e) => (Vec::new(), Some(e)),
        };

        PictureResult {
            page_num: page,
            index,
            width: picture.width,
            height: picture.height,
            annotations,
            retries: attempt,
            duration_ms,
            error,
        }
    }

    fn request_error(&self, page: usize, index: usize, e: reqwest::Error) -> PictureError {
        if e.is_timeout() {
            PictureError::Timeout {
                page,
                index,
                secs: self.options.timeout,
            }
        } else {
            PictureError::Transport {
                page,
                index,
                detail: e.to_string(),
            }
        }
    }
}

/// Turn the options' header mapping into sendable headers.
///
/// Values are marked sensitive so they are redacted from reqwest's debug output.
pub fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, PicDescError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| PicDescError::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        let mut header_value =
            HeaderValue::from_str(value).map_err(|e| PicDescError::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        header_value.set_sensitive(true);
        map.insert(header_name, header_value);
    }
    Ok(map)
}

/// Build the chat-completions body. `params` are merged at the top level;
/// a `messages` entry in `params` is replaced.
pub fn build_request_body(options: &PictureDescriptionOptions, data_url: &str) -> Value {
    let mut body = options.params.clone();
    body.insert(
        "messages".to_string(),
        json!([{
            "role": "user",
            "content": [
                { "type": "text", "text": options.prompt },
                { "type": "image_url", "image_url": { "url": data_url } }
            ]
        }]),
    );
    Value::Object(body)
}

/// Read the description and token usage out of a response body.
pub fn parse_response(
    page: usize,
    index: usize,
    body: &Value,
    token_extract_key: Option<&str>,
) -> Result<Annotation, PictureError> {
    let malformed = |detail: &str| PictureError::MalformedResponse {
        page,
        index,
        detail: detail.to_string(),
    };

    let content = body
        .pointer("/choices/0/message/content")
        .ok_or_else(|| malformed("missing choices[0].message.content"))?;

    let text = match content {
        Value::String(s) => s.trim().to_string(),
        // Some gateways return content as a list of typed parts.
        Value::Array(parts) => parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("")
            .trim()
            .to_string(),
        Value::Null => String::new(),
        _ => return Err(malformed("message content is neither text nor parts")),
    };

    let token_usage = token_extract_key.and_then(|key| extract_token_usage(body, key));

    Ok(Annotation {
        text: if text.is_empty() { None } else { Some(text) },
        token_usage,
    })
}

fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    base_ms.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() > MAX_ERROR_BODY_CHARS {
        let cut: String = trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect();
        format!("{cut}\u{2026}")
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{EnvMap, OPENAI_COMPATIBLE_API_HEADER_NAME, OPENAI_COMPATIBLE_API_KEY};
    use crate::options;

    fn default_options() -> PictureDescriptionOptions {
        options::build(&EnvMap::new())
    }

    #[test]
    fn request_body_shape() {
        let opts = default_options();
        let body = build_request_body(&opts, "data:image/png;base64,AAAA");

        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"][0]["type"], "text");
        assert_eq!(body["messages"][0]["content"][0]["text"], opts.prompt.as_str());
        assert_eq!(
            body["messages"][0]["content"][1]["image_url"]["url"],
            "data:image/png;base64,AAAA"
        );
        assert_eq!(body.as_object().map(|o| o.len()), Some(1));
    }

    #[test]
    fn params_are_merged_into_body() {
        let opts = default_options()
            .with_param("model", "gpt-4o-mini")
            .with_param("max_tokens", 200);
        let body = build_request_body(&opts, "data:,");
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["max_tokens"], 200);
        assert!(body["messages"].is_array());
    }

    #[test]
    fn parse_openai_response() {
        let body = json!({
            "choices": [{"message": {"role": "assistant", "content": "  A bar chart.  "}}],
            "usage": {"prompt_tokens": 900, "completion_tokens": 20, "total_tokens": 920}
        });
        let ann = parse_response(1, 0, &body, Some("usage")).unwrap();
        assert_eq!(ann.text.as_deref(), Some("A bar chart."));
        assert_eq!(ann.token_usage, Some(920));
    }

    #[test]
    fn parse_without_token_key_skips_usage() {
        let body = json!({
            "choices": [{"message": {"content": "x"}}],
            "usage": {"total_tokens": 5}
        });
        assert_eq!(parse_response(1, 0, &body, None).unwrap().token_usage, None);
    }

    #[test]
    fn parse_content_parts() {
        let body = json!({
            "choices": [{"message": {"content": [
                {"type": "text", "text": "A "},
                {"type": "text", "text": "diagram."}
            ]}}]
        });
        let ann = parse_response(1, 0, &body, Some("usage")).unwrap();
        assert_eq!(ann.text.as_deref(), Some("A diagram."));
        assert_eq!(ann.token_usage, None);
    }

    #[test]
    fn parse_rejects_missing_choices() {
        let err = parse_response(2, 3, &json!({"error": "nope"}), Some("usage")).unwrap_err();
        assert!(matches!(err, PictureError::MalformedResponse { page: 2, index: 3, .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn header_map_accepts_custom_names() {
        let opts = options::build(
            &EnvMap::new()
                .with(OPENAI_COMPATIBLE_API_KEY, "Bearer abc")
                .with(OPENAI_COMPATIBLE_API_HEADER_NAME, "Authorization"),
        );
        let map = header_map(&opts.headers).unwrap();
        let value = map.get("authorization").expect("header present");
        assert!(value.is_sensitive());
        assert_eq!(value.to_str().unwrap(), "Bearer abc");
    }

    #[test]
    fn header_map_rejects_invalid_name() {
        let mut headers = BTreeMap::new();
        headers.insert("bad header".to_string(), "v".to_string());
        let err = header_map(&headers).unwrap_err();
        assert!(matches!(err, PicDescError::InvalidHeader { .. }));
    }

    #[test]
    fn describer_builds_from_default_options() {
        let describer = PictureDescriber::new(Arc::new(default_options())).unwrap();
        assert_eq!(describer.options().timeout, 90.0);
    }

    #[test]
    fn backoff_doubles() {
        assert_eq!(backoff_ms(500, 1), 500);
        assert_eq!(backoff_ms(500, 2), 1000);
        assert_eq!(backoff_ms(500, 3), 2000);
        assert_eq!(backoff_ms(u64::MAX, 4), u64::MAX);
    }

    #[test]
    fn error_bodies_are_truncated() {
        let long = "x".repeat(1000);
        let cut = excerpt(&long);
        assert_eq!(cut.chars().count(), MAX_ERROR_BODY_CHARS + 1);
        assert_eq!(excerpt("  short  "), "short");
    }

    #[tokio::test]
    async fn unreachable_endpoint_fails_without_retry_budget() {
        let env = EnvMap::new().with(
            crate::env::OPENAI_COMPATIBLE_API_URL,
            "http://127.0.0.1:9/v1/chat/completions",
        );
        let describer = PictureDescriber::new(Arc::new(options::build(&env))).unwrap();
        let config = PipelineConfig::builder().max_retries(0).build().unwrap();
        let picture = EncodedPicture {
            page_num: 1,
            index: 0,
            width: 1,
            height: 1,
            data_url: "data:,".into(),
        };

        let result = describer.describe_with_retry(&picture, &config).await;
        assert!(!result.is_described());
        assert!(result.annotations.is_empty());
        assert_eq!(result.retries, 0);
    }
}
