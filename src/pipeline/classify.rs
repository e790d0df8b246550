//! Classification of upstream call failures into the shared error taxonomy.
//!
//! Providers report rate limiting inconsistently: some return a structured
//! HTTP 429, others surface `RESOURCE_EXHAUSTED` or "You exceeded your current
//! quota" inside an error string. Every heuristic for telling these apart
//! lives in [`classify_failure`], so when a provider changes its wording only
//! this module changes.
//!
//! Classification is a pure inspection of the failure. It never retries and
//! never sleeps; the retry loop in [`crate::pipeline::llm`] runs *before* a
//! failure is classified.

use crate::record::ErrorRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

/// HTTP status for "Too Many Requests".
pub const TOO_MANY_REQUESTS: u16 = 429;

/// Lower-case message fragments that mean the quota or rate limit was hit.
///
/// A bare "exceeded" is not a marker: "deadline exceeded" is a timeout.
const QUOTA_MARKERS: &[&str] = &[
    "quota",
    "rate limit",
    "rate-limit",
    "ratelimit",
    "rate_limit",
    "too many requests",
    "resource_exhausted",
    "resource exhausted",
    "limit exceeded",
];

/// A status code mentioned in an error string: "status: 429",
/// "HTTP 503", "error code 429".
static RE_STATUS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:status|http|code)\b\D{0,8}\b([1-5]\d\d)\b").unwrap());

/// A status code that opens the message: "429 Too Many Requests",
/// "Error 429: upstream busy".
static RE_LEADING_STATUS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\W*(?:error\W{0,3})?([1-5]\d\d)\b").unwrap());

/// The failure signal of an upstream generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFailure {
    /// Structured status code, when the transport exposed one.
    pub status: Option<u16>,
    pub message: String,
}

impl CallFailure {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Build a failure from an error message only, recovering a status code
    /// from the text when one is mentioned.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let status = status_in_text(&message);
        Self { status, message }
    }

    /// The call did not finish within `secs` seconds.
    pub fn timeout(secs: u64) -> Self {
        Self::new(None, format!("model call timed out after {secs}s"))
    }
}

impl fmt::Display for CallFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "status {status}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for CallFailure {}

/// Map an upstream failure to `quota_exceeded` or `model_call_failed`.
pub fn classify_failure(failure: &CallFailure) -> ErrorRecord {
    if is_quota_failure(failure) {
        ErrorRecord::quota_exceeded(failure.to_string())
    } else {
        ErrorRecord::model_call_failed(failure.to_string())
    }
}

/// True when the failure signals rate limiting or quota exhaustion.
///
/// A structured status wins; the message is only consulted when the status is
/// absent or does not settle it.
pub fn is_quota_failure(failure: &CallFailure) -> bool {
    if failure.status == Some(TOO_MANY_REQUESTS) {
        return true;
    }
    if status_in_text(&failure.message) == Some(TOO_MANY_REQUESTS) {
        return true;
    }
    let lower = failure.message.to_lowercase();
    QUOTA_MARKERS.iter().any(|m| lower.contains(m))
}

fn status_in_text(message: &str) -> Option<u16> {
    RE_STATUS
        .captures(message)
        .or_else(|| RE_LEADING_STATUS.captures(message))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
