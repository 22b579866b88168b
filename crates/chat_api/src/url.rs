/// Default base URL for the chat backend.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";

const COMPLETIONS_PATH: &str = "/v1/chat/completions";
const MODELS_PATH: &str = "/api/models";

/// Normalize a configured base URL.
///
/// Normalization rules:
/// 1) blank input falls back to [`DEFAULT_BASE_URL`]
/// 2) trailing slashes are removed
/// 3) a trailing `/v1` is removed so endpoint paths can be appended verbatim
pub fn normalize_base_url(input: &str) -> String {
    let base = if input.trim().is_empty() {
        DEFAULT_BASE_URL
    } else {
        input.trim()
    };

    let trimmed = base.trim_end_matches('/');
    trimmed
        .strip_suffix("/v1")
        .unwrap_or(trimmed)
        .to_string()
}

/// Streaming and non-streaming completion endpoint.
pub fn completions_url(base_url: &str) -> String {
    format!("{}{COMPLETIONS_PATH}", normalize_base_url(base_url))
}

/// Model listing endpoint.
pub fn models_url(base_url: &str) -> String {
    format!("{}{MODELS_PATH}", normalize_base_url(base_url))
}
