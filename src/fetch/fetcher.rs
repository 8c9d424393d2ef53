//! Direct-then-proxy fetching for rate-limited and bot-protected endpoints

use crate::context::RunContext;
use crate::error::{FetchError, TransportError};
use crate::fetch::challenge::is_challenge;
use crate::fetch::transport::{HttpResponse, HttpTransport};
use crate::proxy::models::ProxyAddress;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default timeout for each individual attempt in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Statuses that mean "this route is throttled, try another one"
const RATE_LIMIT_STATUSES: [u16; 3] = [402, 429, 503];

/// Configuration for the resilient fetcher
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Timeout for each attempt (direct or proxied), not the whole chain
    pub timeout: Duration,
    /// Seed for the proxy fallback order; random when unset
    pub shuffle_seed: Option<u64>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            shuffle_seed: None,
        }
    }
}

impl FetcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_shuffle_seed(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self
    }
}

/// Result of a single fetch attempt
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Success(HttpResponse),
    Challenged(HttpResponse),
    RateLimited(HttpResponse),
    ConnectionFailed(TransportError),
    Other(HttpResponse),
}

impl FetchOutcome {
    /// Classify the raw result of one attempt
    pub fn classify(result: Result<HttpResponse, TransportError>) -> Self {
        match result {
            Err(e) => FetchOutcome::ConnectionFailed(e),
            Ok(response) if is_challenge(response.status, &response.body) => {
                FetchOutcome::Challenged(response)
            }
            Ok(response) if response.is_success() => FetchOutcome::Success(response),
            Ok(response) if RATE_LIMIT_STATUSES.contains(&response.status) => {
                FetchOutcome::RateLimited(response)
            }
            Ok(response) => FetchOutcome::Other(response),
        }
    }

    fn label(&self) -> String {
        match self {
            FetchOutcome::Success(r) => format!("success ({})", r.status),
            FetchOutcome::Challenged(r) => format!("challenge ({})", r.status),
            FetchOutcome::RateLimited(r) => format!("rate limited ({})", r.status),
            FetchOutcome::ConnectionFailed(e) => format!("transport error: {}", e),
            FetchOutcome::Other(r) => format!("HTTP {}", r.status),
        }
    }

    /// How informative a failed outcome's response is to the caller.
    /// A plain error page beats a rate-limit page, which beats a challenge.
    fn rank(&self) -> u8 {
        match self {
            FetchOutcome::Other(_) => 3,
            FetchOutcome::RateLimited(_) => 2,
            FetchOutcome::Challenged(_) => 1,
            FetchOutcome::Success(_) | FetchOutcome::ConnectionFailed(_) => 0,
        }
    }

    fn into_response(self) -> Option<HttpResponse> {
        match self {
            FetchOutcome::Success(r)
            | FetchOutcome::Challenged(r)
            | FetchOutcome::RateLimited(r)
            | FetchOutcome::Other(r) => Some(r),
            FetchOutcome::ConnectionFailed(_) => None,
        }
    }
}

/// Keeps the most informative failed response seen during one fetch
#[derive(Default)]
struct BestResponse {
    rank: u8,
    response: Option<HttpResponse>,
}

impl BestResponse {
    fn offer(&mut self, outcome: FetchOutcome) {
        let rank = outcome.rank();
        if rank > self.rank {
            if let Some(response) = outcome.into_response() {
                self.rank = rank;
                self.response = Some(response);
            }
        }
    }
}

/// Order in which proxies are tried for one fetch
pub(crate) fn fallback_order(proxies: &[ProxyAddress], seed: Option<u64>) -> Vec<ProxyAddress> {
    let mut order = proxies.to_vec();
    match seed {
        Some(seed) => order.shuffle(&mut StdRng::seed_from_u64(seed)),
        None => order.shuffle(&mut rand::rng()),
    }
    order
}

/// Fetches a URL directly, falling back to verified proxies on failure,
/// challenge or rate limiting.
pub struct ResilientFetcher {
    transport: Arc<dyn HttpTransport>,
    cancel: CancellationToken,
    config: FetcherConfig,
}

impl ResilientFetcher {
    pub fn new(ctx: &RunContext, config: FetcherConfig) -> Self {
        Self {
            transport: ctx.transport(),
            cancel: ctx.cancel_token().clone(),
            config,
        }
    }

    /// One direct attempt, then at most one attempt per proxy in shuffled
    /// order. Returns the first 2xx non-challenge response.
    pub async fn fetch(
        &self,
        url: &str,
        proxies: &[ProxyAddress],
    ) -> Result<HttpResponse, FetchError> {
        if self.cancel.is_cancelled() {
            return Err(FetchError::Cancelled { attempts: 0 });
        }

        let mut attempts = 1;
        let mut best = BestResponse::default();

        let outcome =
            FetchOutcome::classify(self.transport.get(url, None, self.config.timeout).await);
        match outcome {
            FetchOutcome::Success(response) => return Ok(response),
            outcome => {
                warn!("Direct request to {} failed: {}", url, outcome.label());
                best.offer(outcome);
            }
        }

        if proxies.is_empty() {
            return Err(FetchError::Exhausted {
                attempts,
                best_response: best.response,
            });
        }

        info!("Retrying {} through {} verified proxies", url, proxies.len());
        for proxy in fallback_order(proxies, self.config.shuffle_seed) {
            if self.cancel.is_cancelled() {
                return Err(FetchError::Cancelled { attempts });
            }

            attempts += 1;
            let outcome = FetchOutcome::classify(
                self.transport
                    .get(url, Some(&proxy), self.config.timeout)
                    .await,
            );
            match outcome {
                FetchOutcome::Success(response) => {
                    debug!("Fetched {} via {}", url, proxy);
                    return Ok(response);
                }
                outcome => {
                    debug!("Proxy {} failed for {}: {}", proxy, url, outcome.label());
                    best.offer(outcome);
                }
            }
        }

        Err(FetchError::Exhausted {
            attempts,
            best_response: best.response,
        })
    }
}
