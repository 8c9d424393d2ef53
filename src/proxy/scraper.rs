//! Proxy scraper module for fetching proxy lists from public sources
//!
//! Each source is fetched directly and parsed either as a plain list or as
//! an HTML table, depending on its URL. A failing source is logged and
//! contributes nothing; it never aborts the batch.

use crate::context::RunContext;
use crate::error::ScrapeError;
use crate::fetch::transport::HttpTransport;
use crate::proxy::models::ProxyAddress;
use crate::proxy::parser::ProxyParser;
use crate::proxy::pool::ProxyPool;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default timeout for source requests in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// How a source's page lists its proxies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// One `host:port` per line
    Plain,
    /// HTML table with host and port in the first two columns
    Table,
}

impl SourceFormat {
    /// Pick the parser from the URL: API endpoints and `.download`/`.txt`
    /// URLs serve plain lists, everything else is a table page.
    pub fn detect(url: &str) -> Self {
        if url.contains("api/v1") || url.ends_with(".download") || url.ends_with(".txt") {
            SourceFormat::Plain
        } else {
            SourceFormat::Table
        }
    }

    pub fn parse(self, content: &str) -> Vec<ProxyAddress> {
        match self {
            SourceFormat::Plain => ProxyParser::parse_plain(content),
            SourceFormat::Table => ProxyParser::parse_table(content),
        }
    }
}

/// Proxy source representing a website that provides proxy lists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySource {
    pub name: String,
    pub url: String,
    pub format: SourceFormat,
}

impl ProxySource {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            format: SourceFormat::detect(url),
        }
    }

    /// A source named after its URL
    pub fn from_url(url: &str) -> Self {
        Self::new(url, url)
    }
}

/// Result of scraping a single source
#[derive(Debug, Clone)]
pub struct ScrapeResult {
    pub source: String,
    pub addresses: Vec<ProxyAddress>,
    pub error: Option<ScrapeError>,
}

impl ScrapeResult {
    pub fn success(source: String, addresses: Vec<ProxyAddress>) -> Self {
        Self {
            source,
            addresses,
            error: None,
        }
    }

    pub fn failure(source: String, error: ScrapeError) -> Self {
        Self {
            source,
            addresses: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Configuration for the proxy scraper
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    /// Timeout for each source request
    pub timeout: Duration,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ScraperConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Proxy scraper for fetching candidate proxies from websites
pub struct ProxyScraper {
    config: ScraperConfig,
    transport: Arc<dyn HttpTransport>,
    cancel: CancellationToken,
}

impl ProxyScraper {
    pub fn new(ctx: &RunContext, config: ScraperConfig) -> Self {
        Self {
            config,
            transport: ctx.transport(),
            cancel: ctx.cancel_token().clone(),
        }
    }

    /// Fetch and parse a single source
    pub async fn scrape_source(&self, source: &ProxySource) -> Result<Vec<ProxyAddress>, ScrapeError> {
        let response = self
            .transport
            .get(&source.url, None, self.config.timeout)
            .await?;

        if !response.is_success() {
            return Err(ScrapeError::Status(response.status));
        }

        Ok(source.format.parse(&response.body))
    }

    /// Scrape every source in order, returning a result for each source
    /// fetched. Stops at the next source once the run is cancelled.
    pub async fn scrape_with_results(&self, sources: &[ProxySource]) -> Vec<ScrapeResult> {
        let mut results = Vec::new();

        for source in sources {
            if self.cancel.is_cancelled() {
                warn!(
                    "Interrupted, skipping {} remaining sources",
                    sources.len() - results.len()
                );
                break;
            }

            let result = match self.scrape_source(source).await {
                Ok(addresses) => {
                    info!("Fetched {} proxies from {}", addresses.len(), source.name);
                    ScrapeResult::success(source.name.clone(), addresses)
                }
                Err(e) => {
                    warn!("Failed to scrape {}: {}", source.name, e);
                    ScrapeResult::failure(source.name.clone(), e)
                }
            };
            results.push(result);
        }

        results
    }

    /// Scrape every source and merge the results, deduplicated in
    /// first-seen order
    pub async fn scrape(&self, sources: &[ProxySource]) -> Vec<ProxyAddress> {
        let mut pool = ProxyPool::new();
        for result in self.scrape_with_results(sources).await {
            pool.extend(result.addresses);
        }
        info!("Total unique proxies scraped: {}", pool.len());
        pool.into_addresses()
    }

    /// Built-in free proxy sources
    pub fn default_sources() -> Vec<ProxySource> {
        vec![
            ProxySource::new("free-proxy-list.net", "https://free-proxy-list.net/"),
            ProxySource::new("sslproxies", "https://www.sslproxies.org/"),
            ProxySource::new("us-proxy.org", "https://us-proxy.org/"),
            ProxySource::new(
                "proxy-list.download (http)",
                "https://www.proxy-list.download/api/v1/get?type=http",
            ),
            ProxySource::new(
                "proxy-list.download (https)",
                "https://www.proxy-list.download/api/v1/get?type=https",
            ),
        ]
    }
}
