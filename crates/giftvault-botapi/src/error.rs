//! Bot API failures and their classification.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BotApiError {
    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The business connection id was refused; the token itself may be fine.
    #[error("business connection rejected: {0}")]
    ConnectionRejected(String),

    #[error("api error {code}: {description}")]
    Api { code: i64, description: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Coarse failure class used by retry and backoff policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transient,
    RateLimited,
    Unauthorized,
    Malformed,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::RateLimited => "rate_limited",
            Self::Unauthorized => "unauthorized",
            Self::Malformed => "malformed",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptions the Bot API uses when a business connection id is unknown,
/// revoked or lacks the rights for the call. They arrive as plain 400s.
const CONNECTION_REJECTIONS: [&str; 2] = [
    "BUSINESS_CONNECTION_INVALID",
    "BUSINESS_CONNECTION_NOT_ALLOWED",
];

impl BotApiError {
    /// Classify an error response by HTTP status / Bot API `error_code`.
    pub fn from_code(code: i64, description: String, retry_after: Option<u64>) -> Self {
        match code {
            429 => Self::RateLimited {
                retry_after: retry_after.map(Duration::from_secs),
            },
            401 | 403 => Self::Unauthorized(description),
            _ if CONNECTION_REJECTIONS.iter().any(|m| description.contains(m)) => {
                Self::ConnectionRejected(description)
            }
            _ => Self::Api { code, description },
        }
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Network(_) => FailureKind::Transient,
            Self::RateLimited { .. } => FailureKind::RateLimited,
            Self::Unauthorized(_) | Self::ConnectionRejected(_) => FailureKind::Unauthorized,
            // 5xx is upstream trouble; other codes usually mean a bad request
            // that will not fix itself.
            Self::Api { code, .. } if *code >= 500 => FailureKind::Transient,
            Self::Api { .. } | Self::Malformed(_) => FailureKind::Malformed,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for BotApiError {
    fn from(e: reqwest::Error) -> Self {
        // Request URLs embed the bot token.
        let e = e.without_url();
        if e.is_decode() {
            Self::Malformed(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_map_to_variants() {
        assert!(matches!(
            BotApiError::from_code(429, "Too Many Requests".into(), Some(7)),
            BotApiError::RateLimited { retry_after: Some(d) } if d == Duration::from_secs(7)
        ));
        assert!(matches!(
            BotApiError::from_code(401, "Unauthorized".into(), None),
            BotApiError::Unauthorized(_)
        ));
        assert!(matches!(
            BotApiError::from_code(403, "Forbidden".into(), None),
            BotApiError::Unauthorized(_)
        ));
        assert!(matches!(
            BotApiError::from_code(400, "Bad Request: chat not found".into(), None),
            BotApiError::Api { code: 400, .. }
        ));
    }

    #[test]
    fn rejected_connection_counts_as_unauthorized() {
        for description in [
            "Bad Request: BUSINESS_CONNECTION_INVALID",
            "Bad Request: BUSINESS_CONNECTION_NOT_ALLOWED",
        ] {
            let err = BotApiError::from_code(400, description.into(), None);
            assert!(matches!(err, BotApiError::ConnectionRejected(_)), "got {err:?}");
            assert_eq!(err.failure_kind(), FailureKind::Unauthorized);
            assert_eq!(err.retry_after(), None);
        }
    }

    #[test]
    fn classification() {
        assert_eq!(
            BotApiError::Network("reset".into()).failure_kind(),
            FailureKind::Transient
        );
        assert_eq!(
            BotApiError::Api { code: 502, description: "Bad Gateway".into() }.failure_kind(),
            FailureKind::Transient
        );
        assert_eq!(
            BotApiError::Api { code: 400, description: "Bad Request".into() }.failure_kind(),
            FailureKind::Malformed
        );
        assert_eq!(
            BotApiError::Unauthorized("x".into()).failure_kind(),
            FailureKind::Unauthorized
        );
    }

    #[test]
    fn retry_after_only_for_rate_limit() {
        let limited = BotApiError::RateLimited {
            retry_after: Some(Duration::from_secs(30)),
        };
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(30)));
        assert_eq!(BotApiError::Network("x".into()).retry_after(), None);
    }
}
