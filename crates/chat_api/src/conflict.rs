use std::sync::OnceLock;

use regex::Regex;
use reqwest::StatusCode;

use crate::error::ErrorPayload;

fn session_locked_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"(?i)session[\s_-]*(is[\s_-]*)?(currently[\s_-]*)?(locked|busy|in[\s_-]*use)")
            .expect("session lock regex must compile")
    })
}

/// Returns the lock reason when a response means "session currently locked".
///
/// Only `409 Conflict` qualifies, and only when its machine-readable reason
/// (or, lacking one, the body text) names the session lock. Other conflicts,
/// such as duplicate names, are ordinary failures.
pub fn lock_reason(status: StatusCode, body: &str) -> Option<String> {
    if status != StatusCode::CONFLICT {
        return None;
    }

    let payload = ErrorPayload::parse(body);
    let code = payload.as_ref().and_then(ErrorPayload::code);
    let message = payload.as_ref().and_then(ErrorPayload::message);

    let matched = [code, message.as_deref(), Some(body)]
        .into_iter()
        .flatten()
        .any(|text| session_locked_regex().is_match(text));
    if !matched {
        return None;
    }

    let reason = code
        .map(ToOwned::to_owned)
        .or(message)
        .unwrap_or_else(|| body.trim().to_owned());
    Some(reason)
}

/// Conflict classification used by the transport.
pub fn is_session_locked(status: StatusCode, body: &str) -> bool {
    lock_reason(status, body).is_some()
}
