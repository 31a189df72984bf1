//! End-to-end integration tests for edgequake-picdesc.
//!
//! The configuration tests run offline against explicit `EnvMap`s. The
//! annotation tests need a pdfium library, network access and a reachable
//! vision endpoint, so they are gated behind the `E2E_ENABLED` environment
//! variable and do not run in CI unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 DYLD_LIBRARY_PATH=. cargo test --test e2e -- --nocapture
//!
//! To restrict to a specific test:
//!   E2E_ENABLED=1 cargo test --test e2e test_annotate_arxiv -- --nocapture

use edgequake_picdesc::env::{
    AZURE_OPENAI_API_KEY, AZURE_OPENAI_API_VERSION, AZURE_OPENAI_DEPLOYMENT, AZURE_OPENAI_ENDPOINT,
    OPENAI_COMPATIBLE_API_HEADER_NAME, OPENAI_COMPATIBLE_API_KEY, OPENAI_COMPATIBLE_API_URL,
    PICTURE_DESCRIPTION_PROMPT, PICTURE_DESCRIPTION_TIMEOUT, PICTURE_DESCRIPTION_TOKEN_EXTRACT_KEY,
};
use edgequake_picdesc::pipeline::input::DEFAULT_SOURCE_DOCUMENT;
use edgequake_picdesc::prompts::DEFAULT_PICTURE_PROMPT;
use edgequake_picdesc::{
    annotate, options, resolve_backend, EnvMap, PageSelection, PicDescError, PipelineConfig,
    Provider,
};
use std::path::PathBuf;
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

fn azure_env() -> EnvMap {
    EnvMap::new()
        .with(AZURE_OPENAI_API_KEY, "k")
        .with(AZURE_OPENAI_ENDPOINT, "https://x.openai.azure.com/")
        .with(AZURE_OPENAI_DEPLOYMENT, "gpt4v")
        .with(AZURE_OPENAI_API_VERSION, "2024-02-01")
}

/// Every way of leaving out one to three of the four Azure values.
fn partial_azure_envs() -> Vec<EnvMap> {
    let vars = [
        (AZURE_OPENAI_API_KEY, "azure-secret"),
        (AZURE_OPENAI_ENDPOINT, "https://x.openai.azure.com"),
        (AZURE_OPENAI_DEPLOYMENT, "gpt4v"),
        (AZURE_OPENAI_API_VERSION, "2024-02-01"),
    ];
    (1u8..15)
        .map(|mask| {
            vars.iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, &(k, v))| (k, v))
                .collect()
        })
        .collect()
}

/// Skip this test unless E2E_ENABLED is set.
macro_rules! e2e_skip_unless_enabled {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
    }};
}

// ── Backend resolution (offline) ─────────────────────────────────────────────

#[test]
fn test_azure_end_to_end_scenario() {
    let backend = resolve_backend(&azure_env());

    assert_eq!(
        backend.url,
        "https://x.openai.azure.com/openai/deployments/gpt4v/chat/completions?api-version=2024-02-01"
    );
    assert_eq!(backend.headers.len(), 1);
    assert_eq!(backend.headers.get("api-key").map(String::as_str), Some("k"));
    assert_eq!(backend.provider, Provider::Azure);
    assert_eq!(backend.provider.to_string(), "azure");
}

#[test]
fn test_azure_endpoint_without_trailing_slash() {
    let env = azure_env().with(AZURE_OPENAI_ENDPOINT, "https://x.openai.azure.com");
    let backend = resolve_backend(&env);
    assert!(backend
        .url
        .contains("/openai/deployments/gpt4v/chat/completions?api-version=2024-02-01"));
    assert!(!backend.url.contains(".com//"));
}

#[test]
fn test_partial_azure_routes_to_fallback() {
    for env in partial_azure_envs() {
        let backend = resolve_backend(&env);
        assert_eq!(backend.provider, Provider::OpenaiCompatible, "{env:?}");
        assert_eq!(backend.url, "http://localhost:8000/v1/chat/completions");
        assert!(
            backend.headers.values().all(|v| v != "azure-secret"),
            "Azure key leaked into fallback headers"
        );
    }
}

#[test]
fn test_empty_azure_value_counts_as_missing() {
    let env = azure_env().with(AZURE_OPENAI_DEPLOYMENT, "");
    assert_eq!(resolve_backend(&env).provider, Provider::OpenaiCompatible);
}

#[test]
fn test_fallback_uses_configured_url_and_header() {
    let env = EnvMap::new()
        .with(AZURE_OPENAI_API_KEY, "azure-secret")
        .with(OPENAI_COMPATIBLE_API_URL, "http://gateway:4000/v1/chat/completions")
        .with(OPENAI_COMPATIBLE_API_KEY, "Bearer sk-test")
        .with(OPENAI_COMPATIBLE_API_HEADER_NAME, "Authorization");

    let backend = resolve_backend(&env);
    assert_eq!(backend.provider, Provider::OpenaiCompatible);
    assert_eq!(backend.url, "http://gateway:4000/v1/chat/completions");
    assert_eq!(
        backend.headers.get("Authorization").map(String::as_str),
        Some("Bearer sk-test")
    );
    assert!(backend.headers.values().all(|v| v != "azure-secret"));
}

#[test]
fn test_fallback_without_key_sends_no_auth_header() {
    let backend = resolve_backend(&EnvMap::new());
    assert!(backend.headers.is_empty());
}

#[test]
fn test_backend_debug_hides_header_values() {
    let rendered = format!("{:?}", resolve_backend(&azure_env()));
    assert!(rendered.contains("api-key"));
    assert!(!rendered.contains("\"k\""));
}

// ── Options building (offline) ───────────────────────────────────────────────

#[test]
fn test_options_defaults() {
    let opts = options::build(&EnvMap::new());
    assert_eq!(opts.timeout, 90.0);
    assert_eq!(opts.token_extract_key.as_deref(), Some("usage"));
    assert_eq!(opts.prompt, DEFAULT_PICTURE_PROMPT);
    assert!(opts.params.is_empty());
}

#[test]
fn test_options_timeout() {
    let bad = EnvMap::new().with(PICTURE_DESCRIPTION_TIMEOUT, "abc");
    assert_eq!(options::build(&bad).timeout, 90.0);

    let good = EnvMap::new().with(PICTURE_DESCRIPTION_TIMEOUT, "12.5");
    assert_eq!(options::build(&good).timeout, 12.5);

    for raw in ["0", "-3", "inf", "NaN", ""] {
        let env = EnvMap::new().with(PICTURE_DESCRIPTION_TIMEOUT, raw);
        assert_eq!(options::build(&env).timeout, 90.0, "timeout {raw:?}");
    }
}

#[test]
fn test_options_token_extract_key() {
    let disabled = EnvMap::new().with(PICTURE_DESCRIPTION_TOKEN_EXTRACT_KEY, "");
    assert_eq!(options::build(&disabled).token_extract_key, None);

    let custom = EnvMap::new().with(PICTURE_DESCRIPTION_TOKEN_EXTRACT_KEY, "count");
    assert_eq!(
        options::build(&custom).token_extract_key.as_deref(),
        Some("count")
    );
}

#[test]
fn test_options_prompt_override() {
    let env = EnvMap::new().with(PICTURE_DESCRIPTION_PROMPT, "List every label in the chart.");
    assert_eq!(options::build(&env).prompt, "List every label in the chart.");

    let blank = EnvMap::new().with(PICTURE_DESCRIPTION_PROMPT, "   ");
    assert_eq!(options::build(&blank).prompt, DEFAULT_PICTURE_PROMPT);
}

#[test]
fn test_options_carry_backend() {
    let opts = options::build(&azure_env());
    let backend = resolve_backend(&azure_env());
    assert_eq!(opts.url, backend.url);
    assert_eq!(opts.headers, backend.headers);
}

#[test]
fn test_options_idempotent() {
    let env = azure_env()
        .with(PICTURE_DESCRIPTION_TIMEOUT, "30")
        .with(PICTURE_DESCRIPTION_TOKEN_EXTRACT_KEY, "usage.total_tokens");
    assert_eq!(options::build(&env), options::build(&env));
    assert_eq!(options::resolve_options(&env), options::resolve_options(&env));
}

#[test]
fn test_summary_never_shows_secrets() {
    let resolved = options::resolve_options(&azure_env().with(AZURE_OPENAI_API_KEY, "top-secret"));
    let text = resolved.summary.to_string();
    let json = serde_json::to_string(&resolved.summary).unwrap();

    assert!(text.starts_with("Picture description backend selected:"));
    assert!(text.contains("provider: azure"));
    assert!(text.contains("api-key"));
    for rendered in [&text, &json, &format!("{:?}", resolved)] {
        assert!(!rendered.contains("top-secret"), "secret leaked: {rendered}");
    }
}

#[test]
fn test_summary_marks_defaults() {
    let resolved = options::resolve_options(&EnvMap::new());
    assert_eq!(resolved.provider, Provider::OpenaiCompatible);
    assert!(resolved.summary.timeout.is_defaulted());
    assert!(resolved.summary.token_extract_key.is_defaulted());
    assert!(resolved.summary.prompt_defaulted);

    let explicit = options::resolve_options(
        &EnvMap::new()
            .with(PICTURE_DESCRIPTION_TIMEOUT, "15")
            .with(PICTURE_DESCRIPTION_TOKEN_EXTRACT_KEY, ""),
    );
    assert!(!explicit.summary.timeout.is_defaulted());
    assert!(explicit.summary.to_string().contains("token_extract_key: disabled"));
}

// ── Annotation (offline failure paths) ───────────────────────────────────────

#[tokio::test]
async fn test_annotate_nonexistent_file() {
    let result = annotate(
        "/tmp/definitely_does_not_exist_picdesc.pdf",
        Arc::new(options::build(&EnvMap::new())),
        &PipelineConfig::default(),
    )
    .await;

    assert!(matches!(result, Err(PicDescError::FileNotFound { .. })));
}

#[tokio::test]
async fn test_annotate_rejects_non_pdf() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.pdf");
    std::fs::write(&path, b"just some text, not a pdf").unwrap();

    let result = annotate(
        path.to_str().unwrap(),
        Arc::new(options::build(&EnvMap::new())),
        &PipelineConfig::default(),
    )
    .await;

    assert!(matches!(result, Err(PicDescError::NotAPdf { .. })), "{result:?}");
}

// ── Live annotation (E2E_ENABLED) ────────────────────────────────────────────

#[tokio::test]
async fn test_annotate_arxiv_first_pages() {
    e2e_skip_unless_enabled!();
    let _ = dotenvy::dotenv();

    let resolved = options::resolve_options(&EnvMap::from_process());
    println!("{}", resolved.summary);

    let config = PipelineConfig::builder()
        .pages(PageSelection::Range(1, 3))
        .concurrency(2)
        .build()
        .expect("valid config");

    let output = annotate(DEFAULT_SOURCE_DOCUMENT, Arc::new(resolved.options), &config)
        .await
        .expect("annotate() should succeed");

    assert_eq!(output.stats.scanned_pages, 3);
    assert_eq!(output.pictures.len(), output.stats.pictures_found);
    assert_eq!(
        output.stats.described + output.stats.failed,
        output.stats.pictures_found
    );

    let positions: Vec<_> = output.pictures.iter().map(|p| (p.page_num, p.index)).collect();
    let mut sorted = positions.clone();
    sorted.sort();
    assert_eq!(positions, sorted, "pictures must be in document order");

    for pic in output.pictures.iter().filter(|p| p.is_described()) {
        let text = pic.annotations[0].text.as_deref().unwrap_or("");
        assert!(!text.trim().is_empty(), "page {} #{} empty", pic.page_num, pic.index);
        println!("page {} #{}: {}", pic.page_num, pic.index, text);
    }
}

#[tokio::test]
async fn test_annotate_local_test_case() {
    e2e_skip_unless_enabled!();
    let path = test_cases_dir().join("figures.pdf");
    if !path.exists() {
        println!("SKIP — test file not found: {}", path.display());
        return;
    }
    let _ = dotenvy::dotenv();

    let opts = Arc::new(options::build(&EnvMap::from_process()));
    let output = annotate(path.to_str().unwrap(), opts, &PipelineConfig::default())
        .await
        .expect("annotate() should succeed");

    assert!(output.stats.total_pages > 0);
    println!(
        "{} pictures, {} described, {} tokens",
        output.stats.pictures_found, output.stats.described, output.stats.total_token_usage
    );
}
