//! Failure classification.
//!
//! Turns transport failures, HTTP statuses and GraphQL error payloads into
//! the small [`ErrorCategory`] taxonomy the sync loop makes retry decisions
//! on. Every classification is counted in
//! [`ERROR_CLASSIFICATIONS`](crate::metrics::ERROR_CLASSIFICATIONS).

use std::error::Error;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::graphql::{GraphQlError, GraphQlResponse, TransportError};
use crate::http::{HttpHeaders, header_get};
use crate::metrics;

/// Retry-decision taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network failures and 5xx responses. Retry with backoff.
    Retryable,
    /// Quota exhausted. Retry after the suggested wait.
    RateLimited,
    /// The target no longer exists. Nothing to do.
    NotFound,
    /// Credentials are missing, invalid or lack permission. Fatal.
    AuthError,
    /// The request itself is malformed. Fatal.
    ClientError,
    /// Anything unrecognized. Fatal to the current sweep.
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Retryable => "retryable",
            Self::RateLimited => "rate_limited",
            Self::NotFound => "not_found",
            Self::AuthError => "auth_error",
            Self::ClientError => "client_error",
            Self::Unknown => "unknown",
        }
    }

    /// True exactly for [`Retryable`](Self::Retryable) and
    /// [`RateLimited`](Self::RateLimited).
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Retryable | Self::RateLimited)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome of classifying one failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: ErrorCategory,
    pub message: String,
    /// Server-suggested wait before retrying, if any.
    pub suggested_wait: Option<Duration>,
    /// When the server says the quota resets, if known.
    pub rate_limit_reset_at: Option<DateTime<Utc>>,
}

impl Classification {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            suggested_wait: None,
            rate_limit_reset_at: None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.category.is_retryable()
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category, self.message)
    }
}

/// Classify a failure. `None` is [`ErrorCategory::Unknown`].
pub fn classify(failure: Option<&(dyn Error + 'static)>) -> ErrorCategory {
    classify_with_details(failure).category
}

/// True when the failure is worth retrying.
pub fn is_retryable(failure: Option<&(dyn Error + 'static)>) -> bool {
    classify(failure).is_retryable()
}

/// Classify a failure and extract any server-suggested wait.
///
/// Known error types are recognized directly; otherwise the error's
/// immediate cause is inspected once before falling back to
/// [`ErrorCategory::Unknown`].
pub fn classify_with_details(failure: Option<&(dyn Error + 'static)>) -> Classification {
    let now = Utc::now();
    let classification = match failure {
        None => Classification::new(ErrorCategory::Unknown, "no failure information"),
        Some(err) => recognize(err, now)
            .or_else(|| err.source().and_then(|cause| recognize(cause, now)))
            .unwrap_or_else(|| Classification::new(ErrorCategory::Unknown, err.to_string())),
    };
    metrics::record_classification(classification.category.as_str());
    classification
}

/// Classify the application-level errors of a transport-successful response.
///
/// Returns `None` when the response carries no errors.
pub fn classify_graphql_response(response: &GraphQlResponse) -> Option<Classification> {
    let now = Utc::now();
    let mut fallback = None;
    for error in response.errors() {
        let classification = classify_graphql_error(error, &response.headers, now);
        if classification.category != ErrorCategory::Unknown {
            metrics::record_classification(classification.category.as_str());
            return Some(classification);
        }
        fallback.get_or_insert(classification);
    }
    if let Some(classification) = &fallback {
        metrics::record_classification(classification.category.as_str());
    }
    fallback
}

/// Classify an HTTP status with its headers and body excerpt.
pub fn classify_http(status: u16, headers: &HttpHeaders, message: &str) -> Classification {
    classify_http_at(status, headers, message, Utc::now())
}

fn recognize(err: &(dyn Error + 'static), now: DateTime<Utc>) -> Option<Classification> {
    if let Some(e) = err.downcast_ref::<TransportError>() {
        return Some(classify_transport(e, now));
    }
    if let Some(e) = err.downcast_ref::<std::io::Error>() {
        return Some(Classification::new(ErrorCategory::Retryable, e.to_string()));
    }
    #[cfg(feature = "reqwest")]
    if let Some(e) = err.downcast_ref::<reqwest::Error>() {
        return Some(classify_reqwest(e, now));
    }
    None
}

fn classify_transport(err: &TransportError, now: DateTime<Utc>) -> Classification {
    match err {
        TransportError::Http {
            status,
            headers,
            message,
        } => classify_http_at(*status, headers, message, now),
        TransportError::Connect(_)
        | TransportError::Timeout(_)
        | TransportError::Dns(_)
        | TransportError::Io(_) => Classification::new(ErrorCategory::Retryable, err.to_string()),
        TransportError::Decode(_) => Classification::new(ErrorCategory::Unknown, err.to_string()),
    }
}

#[cfg(feature = "reqwest")]
fn classify_reqwest(err: &reqwest::Error, now: DateTime<Utc>) -> Classification {
    if let Some(status) = err.status() {
        return classify_http_at(status.as_u16(), &Vec::new(), &err.to_string(), now);
    }
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        return Classification::new(ErrorCategory::Retryable, err.to_string());
    }
    Classification::new(ErrorCategory::Unknown, err.to_string())
}

fn classify_http_at(
    status: u16,
    headers: &HttpHeaders,
    message: &str,
    now: DateTime<Utc>,
) -> Classification {
    let rate_signal = mentions_rate_limit(message)
        || header_get(headers, "x-ratelimit-remaining").is_some_and(|v| v.trim() == "0");

    let category = match status {
        401 => ErrorCategory::AuthError,
        403 if !rate_signal => ErrorCategory::AuthError,
        403 | 429 => ErrorCategory::RateLimited,
        404 => ErrorCategory::NotFound,
        400 | 422 => ErrorCategory::ClientError,
        408 | 500..=599 => ErrorCategory::Retryable,
        _ => ErrorCategory::Unknown,
    };

    let mut classification = Classification::new(category, format!("HTTP {status}: {message}"));
    if category == ErrorCategory::RateLimited {
        attach_rate_limit_details(&mut classification, headers, now);
    }
    classification
}

fn classify_graphql_error(
    error: &GraphQlError,
    headers: &HttpHeaders,
    now: DateTime<Utc>,
) -> Classification {
    let rate_message = mentions_rate_limit(&error.message);
    let category = match error.kind() {
        Some("NOT_FOUND") => ErrorCategory::NotFound,
        Some("FORBIDDEN") if rate_message => ErrorCategory::RateLimited,
        Some("FORBIDDEN" | "UNAUTHORIZED" | "INSUFFICIENT_SCOPES") => ErrorCategory::AuthError,
        Some("RATE_LIMITED" | "RATE_LIMIT") => ErrorCategory::RateLimited,
        Some("MAX_NODE_LIMIT_EXCEEDED" | "BAD_USER_INPUT" | "UNPROCESSABLE") => {
            ErrorCategory::ClientError
        }
        Some("INTERNAL" | "SERVICE_UNAVAILABLE" | "TIMEOUT") => ErrorCategory::Retryable,
        _ if rate_message => ErrorCategory::RateLimited,
        _ if mentions_timeout(&error.message) => ErrorCategory::Retryable,
        _ => ErrorCategory::Unknown,
    };

    let mut classification = Classification::new(category, error.message.clone());
    if category == ErrorCategory::RateLimited {
        attach_rate_limit_details(&mut classification, headers, now);
    }
    classification
}

fn attach_rate_limit_details(
    classification: &mut Classification,
    headers: &HttpHeaders,
    now: DateTime<Utc>,
) {
    let reset_at = header_get(headers, "x-ratelimit-reset")
        .and_then(|v| v.trim().parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0));

    let retry_after = header_get(headers, "retry-after").and_then(|v| parse_retry_after(v, now));

    classification.rate_limit_reset_at = reset_at;
    classification.suggested_wait = retry_after.or_else(|| {
        reset_at.map(|reset| (reset - now).to_std().unwrap_or(Duration::ZERO))
    });
}

/// `Retry-After` is either delta-seconds or an HTTP date.
fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?;
    Some(
        (at.with_timezone(&Utc) - now)
            .to_std()
            .unwrap_or(Duration::ZERO),
    )
}

fn mentions_rate_limit(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("rate limit") || lower.contains("ratelimit")
}

fn mentions_timeout(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("something went wrong")
}
