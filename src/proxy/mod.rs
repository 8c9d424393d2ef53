//! Proxy module for building the verified proxy pool
//!
//! This module provides functionality for:
//! - Parsing proxy addresses from plain lists and HTML tables
//! - Scraping public proxy-list sites
//! - Deduplicating candidates and persisting the known-good file
//! - Verifying that candidates actually forward HTTP traffic

pub mod models;
pub mod parser;
pub mod pool;
pub mod scraper;
pub mod verifier;

pub use models::{ProbeResult, ProbeStatus, ProxyAddress, VerifiedSet};
pub use parser::ProxyParser;
pub use pool::ProxyPool;
pub use scraper::{ProxyScraper, ProxySource, ScrapeResult, ScraperConfig, SourceFormat};
pub use verifier::{
    NetworkProbe, ProxyProbe, ProxyVerifier, VerificationReport, VerifierConfig, VerifyProgress,
};
