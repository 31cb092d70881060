//! Error types shared across Trellis crates.

use thiserror::Error;

/// Failure of a single call against the issue tracker.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The server answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Status {
        status: u16,
        /// Value of the rate-limit remaining header, when present.
        rate_remaining: Option<u64>,
        message: String,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Request timed out")]
    Timeout,
}

/// How the crawler should react to an [`ApiError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Back off and retry.
    RateLimited,
    /// The whole repository is forbidden or missing.
    RepoInaccessible,
    /// Give up on this item only.
    Other,
}

impl ApiError {
    pub fn status(status: u16, rate_remaining: Option<u64>, message: impl Into<String>) -> Self {
        ApiError::Status {
            status,
            rate_remaining,
            message: message.into(),
        }
    }

    pub fn disposition(&self) -> FailureKind {
        match self {
            ApiError::Status { status: 429, .. } => FailureKind::RateLimited,
            ApiError::Status {
                status: 403,
                rate_remaining: Some(0),
                ..
            } => FailureKind::RateLimited,
            ApiError::Status {
                status: 403 | 404, ..
            } => FailureKind::RepoInaccessible,
            _ => FailureKind::Other,
        }
    }
}

/// Failure to load a configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A target that is neither `owner/repo#N` nor an issue/pull URL.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TargetParseError {
    #[error("Empty target")]
    Empty,

    #[error("Expected owner/repo#number or an issue URL, got '{0}'")]
    Malformed(String),

    #[error("Invalid issue number in '{0}'")]
    InvalidNumber(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disposition() {
        assert_eq!(
            ApiError::status(429, None, "slow down").disposition(),
            FailureKind::RateLimited
        );
        assert_eq!(
            ApiError::status(403, Some(0), "quota").disposition(),
            FailureKind::RateLimited
        );
        assert_eq!(
            ApiError::status(403, Some(4999), "forbidden").disposition(),
            FailureKind::RepoInaccessible
        );
        assert_eq!(
            ApiError::status(403, None, "forbidden").disposition(),
            FailureKind::RepoInaccessible
        );
        assert_eq!(
            ApiError::status(404, Some(10), "missing").disposition(),
            FailureKind::RepoInaccessible
        );
        assert_eq!(
            ApiError::status(500, None, "boom").disposition(),
            FailureKind::Other
        );
        assert_eq!(ApiError::Timeout.disposition(), FailureKind::Other);
    }
}
