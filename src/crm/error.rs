use std::time::Duration;

use thiserror::Error;

const QUOTA_MARKERS: &[&str] = &[
    "quota",
    "rate limit",
    "too many requests",
    "quotaexceeded",
    "userlimitexceeded",
];

#[derive(Error, Debug)]
pub enum CrmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("CRM rate limited the request: {body}")]
    RateLimited {
        retry_after: Option<Duration>,
        body: String,
    },
    #[error("CRM returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to read document: {0}")]
    Io(#[from] std::io::Error),
    #[error("unexpected CRM response: {0}")]
    UnexpectedResponse(String),
}

impl CrmError {
    /// Rate limits, server faults, transport timeouts and quota messages are transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Server { status, body } => *status >= 500 || is_quota_message(body),
            Self::Http(err) => {
                err.is_timeout() || err.is_connect() || is_quota_message(&err.to_string())
            }
            Self::Json(_) | Self::Io(_) | Self::UnexpectedResponse(_) => false,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

fn is_quota_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    QUOTA_MARKERS.iter().any(|marker| lower.contains(marker))
}
