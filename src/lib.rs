//! GeoIntel - proxy-backed geolocation lookups
//!
//! Maintains a pool of verified HTTP forward proxies and uses it to fetch
//! from rate-limited or bot-protected endpoints, then merges the replies of
//! several geolocation providers into one record.

pub mod context;
pub mod error;
pub mod fetch;
pub mod geo;
pub mod logger;
pub mod proxy;

pub use context::RunContext;
pub use error::{FetchError, PersistenceError, ProbeFailure, ScrapeError, TransportError};

/// Application result type
pub type Result<T> = anyhow::Result<T>;
