//! Error types for scraping, verification, fetching and persistence

use crate::fetch::transport::HttpResponse;
use thiserror::Error;

/// Failure of a single proxy source. Never aborts a scrape batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScrapeError {
    #[error("source request failed: {0}")]
    Transport(#[from] TransportError),

    #[error("source returned HTTP {0}")]
    Status(u16),
}

/// Why a candidate proxy was excluded from the verified set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeFailure {
    /// Stage 1: no TCP connection could be opened.
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// Stage 2: connected, but the proxy did not forward an HTTP request.
    #[error("not forwarding: {0}")]
    NotForwarding(String),
}

/// Transport-level failure of one HTTP attempt (no response was received).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("could not build client: {0}")]
    Build(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else if err.is_builder() {
            TransportError::Build(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

/// Terminal failure of a resilient fetch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Direct attempt and every proxy attempt failed. Carries the most useful
    /// response seen, if any arrived at all.
    #[error("no acceptable response after {attempts} attempt(s)")]
    Exhausted {
        attempts: usize,
        best_response: Option<HttpResponse>,
    },

    #[error("fetch cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: usize },
}

impl FetchError {
    /// The best response received before giving up, if any.
    pub fn response(&self) -> Option<&HttpResponse> {
        match self {
            FetchError::Exhausted { best_response, .. } => best_response.as_ref(),
            FetchError::Cancelled { .. } => None,
        }
    }
}

/// Failure to read or write the persisted proxy file.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_response() {
        let err = FetchError::Exhausted {
            attempts: 3,
            best_response: Some(HttpResponse::new(429, "")),
        };
        assert_eq!(err.response().map(|r| r.status), Some(429));
        assert_eq!(err.to_string(), "no acceptable response after 3 attempt(s)");

        let err = FetchError::Cancelled { attempts: 1 };
        assert!(err.response().is_none());
    }

    #[test]
    fn test_probe_failure_display() {
        let err = ProbeFailure::Unreachable("connection refused".to_string());
        assert_eq!(err.to_string(), "unreachable: connection refused");
    }
}
