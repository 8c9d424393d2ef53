//! Proxy verifier module for confirming candidates actually forward traffic

use crate::context::RunContext;
use crate::error::ProbeFailure;
use crate::fetch::transport::HttpTransport;
use crate::proxy::models::{ProbeResult, ProbeStatus, ProxyAddress, VerifiedSet};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Default timeout for each verification stage in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 3;

/// Default cap on concurrent checks
const DEFAULT_CONCURRENCY: usize = 50;

/// Concurrent checks allowed per available CPU
const WORKERS_PER_CPU: usize = 10;

/// The CPU-derived ceiling never drops below this
const MIN_WORKER_CEILING: usize = 8;

/// Default always-200 endpoint used to test forwarding
const DEFAULT_ECHO_URL: &str = "http://httpbin.org/ip";

/// Configuration for proxy verification
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Timeout for the connect stage and for the forwarding stage
    pub timeout: Duration,
    /// Upper bound on concurrent checks
    pub concurrency: usize,
    /// URL fetched through each candidate
    pub echo_url: String,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            concurrency: DEFAULT_CONCURRENCY,
            echo_url: DEFAULT_ECHO_URL.to_string(),
        }
    }
}

impl VerifierConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_echo_url(mut self, url: String) -> Self {
        self.echo_url = url;
        self
    }

    /// Number of workers for `candidates` checks: the configured cap,
    /// clamped to a multiple of the CPU count and to the amount of work.
    pub fn effective_concurrency(&self, candidates: usize) -> usize {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let ceiling = (cpus * WORKERS_PER_CPU).max(MIN_WORKER_CEILING);

        self.concurrency.min(ceiling).min(candidates).max(1)
    }
}

/// The two verification stages for a single candidate
#[async_trait]
pub trait ProxyProbe: Send + Sync {
    /// Stage 1: raw TCP connect
    async fn connect(&self, proxy: &ProxyAddress) -> Result<(), ProbeFailure>;

    /// Stage 2: HTTP GET forwarded through the proxy
    async fn forward(&self, proxy: &ProxyAddress) -> Result<(), ProbeFailure>;
}

/// Probe that talks to the real network
pub struct NetworkProbe {
    transport: Arc<dyn HttpTransport>,
    echo_url: String,
    timeout: Duration,
}

impl NetworkProbe {
    pub fn new(transport: Arc<dyn HttpTransport>, config: &VerifierConfig) -> Self {
        Self {
            transport,
            echo_url: config.echo_url.clone(),
            timeout: config.timeout,
        }
    }
}

#[async_trait]
impl ProxyProbe for NetworkProbe {
    async fn connect(&self, proxy: &ProxyAddress) -> Result<(), ProbeFailure> {
        let target = (proxy.host.as_str(), proxy.port);
        match tokio::time::timeout(self.timeout, TcpStream::connect(target)).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(ProbeFailure::Unreachable(e.to_string())),
            Err(_) => Err(ProbeFailure::Unreachable("connect timed out".to_string())),
        }
    }

    async fn forward(&self, proxy: &ProxyAddress) -> Result<(), ProbeFailure> {
        let response = self
            .transport
            .get(&self.echo_url, Some(proxy), self.timeout)
            .await
            .map_err(|e| ProbeFailure::NotForwarding(e.to_string()))?;

        if response.status != 200 {
            return Err(ProbeFailure::NotForwarding(format!(
                "HTTP status: {}",
                response.status
            )));
        }
        if response.body.trim().is_empty() {
            return Err(ProbeFailure::NotForwarding("empty body".to_string()));
        }

        Ok(())
    }
}

/// Live counters for an ongoing verification
#[derive(Debug, Default)]
pub struct VerifyProgress {
    total: AtomicUsize,
    done: AtomicUsize,
    verified: AtomicUsize,
}

impl VerifyProgress {
    fn reset(&self, total: usize) {
        self.total.store(total, Ordering::SeqCst);
        self.done.store(0, Ordering::SeqCst);
        self.verified.store(0, Ordering::SeqCst);
    }

    fn record(&self, result: &ProbeResult) {
        if result.is_verified() {
            self.verified.fetch_add(1, Ordering::SeqCst);
        }
        self.done.fetch_add(1, Ordering::SeqCst);
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    /// Candidates finished so far, including skipped ones
    pub fn done(&self) -> usize {
        self.done.load(Ordering::SeqCst)
    }

    pub fn verified(&self) -> usize {
        self.verified.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.done() >= self.total()
    }
}

/// Outcome of verifying a batch of candidates
#[derive(Debug, Clone)]
pub struct VerificationReport {
    /// Candidates that passed both stages, in input order
    pub verified: VerifiedSet,
    pub rejected: Vec<ProbeResult>,
    /// Candidates never dispatched because the run was cancelled
    pub skipped: Vec<ProxyAddress>,
}

impl VerificationReport {
    /// Proxies worth keeping in the known-good file: everything verified,
    /// followed by candidates an interruption left unchecked.
    pub fn retained(&self) -> Vec<ProxyAddress> {
        self.verified
            .proxies()
            .iter()
            .chain(self.skipped.iter())
            .cloned()
            .collect()
    }
}

/// Run both stages; stage 2 is only attempted when stage 1 passes.
async fn check_with(probe: &dyn ProxyProbe, proxy: ProxyAddress) -> ProbeResult {
    let start = Instant::now();

    if let Err(failure) = probe.connect(&proxy).await {
        return ProbeResult::rejected(proxy, failure);
    }
    if let Err(failure) = probe.forward(&proxy).await {
        return ProbeResult::rejected(proxy, failure);
    }

    ProbeResult::verified(proxy, start.elapsed().as_millis() as u64)
}

/// Proxy verifier running candidate checks on a bounded worker pool
pub struct ProxyVerifier {
    config: VerifierConfig,
    probe: Arc<dyn ProxyProbe>,
    cancel: CancellationToken,
    progress: Arc<VerifyProgress>,
}

impl ProxyVerifier {
    /// Verifier probing the real network through the run's transport
    pub fn new(ctx: &RunContext, config: VerifierConfig) -> Self {
        let probe = Arc::new(NetworkProbe::new(ctx.transport(), &config));
        Self::with_probe(ctx.cancel_token().clone(), config, probe)
    }

    pub fn with_probe(
        cancel: CancellationToken,
        config: VerifierConfig,
        probe: Arc<dyn ProxyProbe>,
    ) -> Self {
        Self {
            config,
            probe,
            cancel,
            progress: Arc::new(VerifyProgress::default()),
        }
    }

    /// Shared handle for observing progress while `verify_all` runs
    pub fn progress(&self) -> Arc<VerifyProgress> {
        Arc::clone(&self.progress)
    }

    /// Check a single proxy
    pub async fn check_proxy(&self, proxy: &ProxyAddress) -> ProbeResult {
        check_with(self.probe.as_ref(), proxy.clone()).await
    }

    /// Check every candidate concurrently and keep the ones that pass.
    ///
    /// Each check runs in its own task, so a failing or panicking probe only
    /// rejects its own candidate. Once the run is cancelled, no further
    /// checks are dispatched; results already collected are kept.
    pub async fn verify_all(&self, candidates: Vec<ProxyAddress>) -> VerificationReport {
        let total = candidates.len();
        self.progress.reset(total);

        let workers = self.config.effective_concurrency(total);
        info!("Verifying {} proxies with {} workers", total, workers);

        let mut results = stream::iter(candidates.into_iter().enumerate())
            .map(|(index, proxy)| {
                let probe = Arc::clone(&self.probe);
                let cancel = self.cancel.clone();
                let progress = Arc::clone(&self.progress);
                async move {
                    let result = if cancel.is_cancelled() {
                        ProbeResult::skipped(proxy)
                    } else {
                        let task = tokio::spawn({
                            let proxy = proxy.clone();
                            async move { check_with(probe.as_ref(), proxy).await }
                        });
                        match task.await {
                            Ok(result) => result,
                            Err(e) => ProbeResult::rejected(
                                proxy,
                                ProbeFailure::NotForwarding(format!("check aborted: {}", e)),
                            ),
                        }
                    };

                    if let ProbeStatus::Rejected(failure) = &result.status {
                        debug!("Rejected {}: {}", result.proxy, failure);
                    }
                    progress.record(&result);
                    (index, result)
                }
            })
            .buffer_unordered(workers)
            .collect::<Vec<_>>()
            .await;

        results.sort_by_key(|(index, _)| *index);

        let mut verified = Vec::new();
        let mut rejected = Vec::new();
        let mut skipped = Vec::new();
        for (_, result) in results {
            match result.status {
                ProbeStatus::Verified => verified.push(result.proxy),
                ProbeStatus::Rejected(_) => rejected.push(result),
                ProbeStatus::Skipped => skipped.push(result.proxy),
            }
        }

        info!(
            "Verified proxies: {} | Failed: {} | Skipped: {}",
            verified.len(),
            rejected.len(),
            skipped.len()
        );

        VerificationReport {
            verified: VerifiedSet::new(verified),
            rejected,
            skipped,
        }
    }
}
