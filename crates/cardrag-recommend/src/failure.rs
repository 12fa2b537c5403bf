//! Classification of generation failures into user-actionable kinds.

use serde::Serialize;

use cardrag_core::config::{FailureKeywords, Messages};
use cardrag_core::GenerationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    QuotaExceeded,
    NetworkFailure,
    AuthFailure,
    Unknown,
}

/// Structured signals first (timeout, connect, HTTP status), then the
/// configured substring lists in quota, network, auth order.
pub fn classify(err: &GenerationError, keywords: &FailureKeywords) -> FailureKind {
    if err.timed_out || err.connect_failed {
        return FailureKind::NetworkFailure;
    }
    match err.status {
        Some(429) => return FailureKind::QuotaExceeded,
        Some(401) | Some(403) => return FailureKind::AuthFailure,
        _ => {}
    }
    let message = err.message.to_lowercase();
    let hit = |list: &[String]| list.iter().any(|k| !k.is_empty() && message.contains(&k.to_lowercase()));
    if hit(&keywords.quota) {
        FailureKind::QuotaExceeded
    } else if hit(&keywords.network) {
        FailureKind::NetworkFailure
    } else if hit(&keywords.auth) {
        FailureKind::AuthFailure
    } else {
        FailureKind::Unknown
    }
}

/// At most `max_chars` characters of `raw`, cut on a char boundary.
pub fn excerpt(raw: &str, max_chars: usize) -> &str {
    match raw.char_indices().nth(max_chars) {
        Some((idx, _)) => &raw[..idx],
        None => raw,
    }
}

pub fn render(kind: FailureKind, err: &GenerationError, messages: &Messages, max_chars: usize) -> String {
    let template = match kind {
        FailureKind::QuotaExceeded => &messages.quota_exceeded,
        FailureKind::NetworkFailure => &messages.network_failure,
        FailureKind::AuthFailure => &messages.auth_failure,
        FailureKind::Unknown => &messages.unknown_failure,
    };
    template.replace("{detail}", excerpt(&err.message, max_chars))
}
