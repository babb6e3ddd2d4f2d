use reqwest::Url;

use crate::error::ChatApiError;

/// Default base URL of the chat backend.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

pub const CHAT_STREAM_SEGMENTS: &[&str] = &["chat", "stream"];
pub const CHAT_SEGMENTS: &[&str] = &["chat"];
pub const SESSIONS_SEGMENTS: &[&str] = &["sessions"];
pub const MODELS_SEGMENTS: &[&str] = &["models"];

/// Normalize a base URL: trim whitespace and trailing slashes, fall back to
/// [`DEFAULT_BASE_URL`] when blank.
pub fn normalize_base_url(input: &str) -> String {
    let base = if input.trim().is_empty() {
        DEFAULT_BASE_URL
    } else {
        input.trim()
    };

    base.trim_end_matches('/').to_string()
}

/// Append path segments to the normalized base URL. Segments are
/// percent-encoded, so session ids may contain any character.
pub fn endpoint_url(base: &str, segments: &[&str]) -> Result<Url, ChatApiError> {
    let normalized = normalize_base_url(base);
    let mut url = Url::parse(&normalized)
        .map_err(|error| ChatApiError::InvalidBaseUrl(format!("{normalized}: {error}")))?;

    url.path_segments_mut()
        .map_err(|_| ChatApiError::InvalidBaseUrl(normalized.clone()))?
        .pop_if_empty()
        .extend(segments);

    Ok(url)
}

pub fn session_messages_url(
    base: &str,
    session_id: &str,
    limit: usize,
) -> Result<Url, ChatApiError> {
    let mut url = endpoint_url(base, &["sessions", session_id, "messages"])?;
    url.query_pairs_mut()
        .append_pair("limit", &limit.to_string());
    Ok(url)
}
