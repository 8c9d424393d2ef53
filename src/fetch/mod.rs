//! Fetch module for resilient outbound HTTP
//!
//! This module provides:
//! - A transport seam over `reqwest` (direct or through a forward proxy)
//! - Challenge page detection
//! - Direct-then-proxy fallback fetching
//! - Exponential backoff for rate-limited upstream APIs

pub mod backoff;
pub mod challenge;
pub mod fetcher;
pub mod transport;

pub use backoff::{retry_with_backoff, BackoffConfig};
pub use challenge::is_challenge;
pub use fetcher::{FetchOutcome, FetcherConfig, ResilientFetcher};
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport};
