//! Geolocation provider queries

use crate::context::RunContext;
use crate::fetch::backoff::{retry_with_backoff, BackoffConfig};
use crate::fetch::fetcher::{FetcherConfig, ResilientFetcher};
use crate::fetch::transport::HttpTransport;
use crate::geo::merge::GeoMerger;
use crate::geo::record::{GeoRecord, ProviderResponse};
use crate::proxy::models::ProxyAddress;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// ip-api field selector covering every field the default table reads
const IP_API_FIELDS: u32 = 66846719;

/// Timeout for public IP auto-detection
const DETECT_IP_TIMEOUT_SECS: u64 = 8;

/// Base URLs of the upstream providers
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub ip_api: String,
    pub ipwhois: String,
    pub opencage: String,
    pub ipify: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            ip_api: "http://ip-api.com".to_string(),
            ipwhois: "https://ipwho.is".to_string(),
            opencage: "https://api.opencagedata.com/geocode/v1/json".to_string(),
            ipify: "https://api.ipify.org".to_string(),
        }
    }
}

/// Configuration for geolocation lookups
#[derive(Debug, Clone, Default)]
pub struct LookupConfig {
    pub endpoints: ProviderEndpoints,
    pub fetcher: FetcherConfig,
    pub backoff: BackoffConfig,
    /// OpenCage API key; reverse geocoding is skipped without one
    pub opencage_key: Option<String>,
}

impl LookupConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoints(mut self, endpoints: ProviderEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_fetcher(mut self, fetcher: FetcherConfig) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_opencage_key(mut self, key: Option<String>) -> Self {
        self.opencage_key = key.filter(|k| !k.trim().is_empty());
        self
    }
}

/// Why no reverse geocode is available
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReverseGeocodeError {
    #[error("No OpenCage key configured")]
    NoKey,

    #[error("No coordinates to reverse geocode")]
    NoCoordinates,

    #[error("OpenCage: {0}")]
    Provider(String),

    #[error("OpenCage returned no results")]
    NoResults,
}

/// Best OpenCage match for a coordinate pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReverseGeocode {
    pub formatted: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
    pub postcode: Option<String>,
    pub confidence: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OpenCageReply {
    #[serde(default)]
    results: Vec<OpenCageResult>,
}

#[derive(Debug, Deserialize)]
struct OpenCageResult {
    formatted: Option<String>,
    confidence: Option<u32>,
    #[serde(default)]
    components: OpenCageComponents,
}

#[derive(Debug, Default, Deserialize)]
struct OpenCageComponents {
    country: Option<String>,
    state: Option<String>,
    city: Option<String>,
    town: Option<String>,
    postcode: Option<String>,
}

impl From<OpenCageResult> for ReverseGeocode {
    fn from(result: OpenCageResult) -> Self {
        let components = result.components;
        Self {
            formatted: result.formatted,
            country: components.country,
            state: components.state,
            city: components.city.or(components.town),
            postcode: components.postcode,
            confidence: result.confidence,
        }
    }
}

/// ip-api reports failures as `{"status": "fail", "message": ...}`
fn normalize_ip_api(response: ProviderResponse) -> ProviderResponse {
    match &response {
        ProviderResponse::Data(map) if map.get("status").and_then(Value::as_str) == Some("fail") => {
            ProviderResponse::error(
                map.get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("ip-api lookup failed"),
            )
        }
        _ => response,
    }
}

/// ipwho.is reports failures as `{"success": false, "message": ...}`
fn normalize_ipwhois(response: ProviderResponse) -> ProviderResponse {
    match &response {
        ProviderResponse::Data(map) if map.get("success").and_then(Value::as_bool) == Some(false) => {
            ProviderResponse::error(
                map.get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("ipwho.is lookup failed"),
            )
        }
        _ => response,
    }
}

/// Queries the geolocation providers through the resilient fetcher and
/// merges their replies
pub struct GeoLookup {
    config: LookupConfig,
    fetcher: ResilientFetcher,
    merger: GeoMerger,
    transport: Arc<dyn HttpTransport>,
    cancel: CancellationToken,
}

impl GeoLookup {
    pub fn new(ctx: &RunContext, config: LookupConfig) -> Self {
        Self {
            fetcher: ResilientFetcher::new(ctx, config.fetcher.clone()),
            merger: GeoMerger::default(),
            transport: ctx.transport(),
            cancel: ctx.cancel_token().clone(),
            config,
        }
    }

    /// Fetch `url`, retrying with backoff while the reply reports a rate limit
    async fn query(
        &self,
        url: &str,
        proxies: &[ProxyAddress],
        normalize: fn(ProviderResponse) -> ProviderResponse,
    ) -> ProviderResponse {
        retry_with_backoff(
            &self.config.backoff,
            &self.cancel,
            || async move {
                normalize(ProviderResponse::from_fetch(
                    self.fetcher.fetch(url, proxies).await,
                ))
            },
            ProviderResponse::is_rate_limited,
        )
        .await
    }

    pub async fn ip_api(&self, ip: &str, proxies: &[ProxyAddress]) -> ProviderResponse {
        let url = format!(
            "{}/json/{}?fields={}",
            self.config.endpoints.ip_api, ip, IP_API_FIELDS
        );
        self.query(&url, proxies, normalize_ip_api).await
    }

    pub async fn ipwhois(&self, ip: &str, proxies: &[ProxyAddress]) -> ProviderResponse {
        let url = format!("{}/{}", self.config.endpoints.ipwhois, ip);
        self.query(&url, proxies, normalize_ipwhois).await
    }

    /// Query both providers and merge: ip-api is primary, ipwho.is secondary
    pub async fn lookup(&self, ip: &str, proxies: &[ProxyAddress]) -> GeoRecord {
        let primary = self.ip_api(ip, proxies).await;
        if let Some(reason) = primary.error_reason() {
            warn!("ip-api lookup failed: {}", reason);
        }
        let secondary = self.ipwhois(ip, proxies).await;
        if let Some(reason) = secondary.error_reason() {
            warn!("ipwho.is lookup failed: {}", reason);
        }

        self.merger.merge(primary, secondary)
    }

    /// Reverse geocode the record's coordinates with OpenCage
    pub async fn reverse_geocode(
        &self,
        record: &GeoRecord,
        proxies: &[ProxyAddress],
    ) -> Result<ReverseGeocode, ReverseGeocodeError> {
        let key = self
            .config
            .opencage_key
            .as_deref()
            .ok_or(ReverseGeocodeError::NoKey)?;
        let (lat, lon) = record
            .coordinates()
            .ok_or(ReverseGeocodeError::NoCoordinates)?;

        info!("Fetching reverse geocode for {}, {}", lat, lon);
        let url = Url::parse_with_params(
            &self.config.endpoints.opencage,
            &[("q", format!("{} {}", lat, lon).as_str()), ("key", key)],
        )
        .map_err(|e| ReverseGeocodeError::Provider(e.to_string()))?;

        let map = match self.query(url.as_str(), proxies, |r| r).await {
            ProviderResponse::Data(map) => map,
            ProviderResponse::Error(reason) => return Err(ReverseGeocodeError::Provider(reason)),
        };

        let reply: OpenCageReply = serde_json::from_value(Value::Object(map))
            .map_err(|e| ReverseGeocodeError::Provider(e.to_string()))?;

        reply
            .results
            .into_iter()
            .next()
            .map(ReverseGeocode::from)
            .ok_or(ReverseGeocodeError::NoResults)
    }

    /// The caller's public IP, fetched directly
    pub async fn detect_public_ip(&self) -> Option<String> {
        let timeout = Duration::from_secs(DETECT_IP_TIMEOUT_SECS);
        match self
            .transport
            .get(&self.config.endpoints.ipify, None, timeout)
            .await
        {
            Ok(response) if response.is_success() => {
                let ip = response.body.trim().to_string();
                (!ip.is_empty()).then_some(ip)
            }
            Ok(response) => {
                warn!("Could not auto-detect IP: HTTP {}", response.status);
                None
            }
            Err(e) => {
                warn!("Could not auto-detect IP: {}", e);
                None
            }
        }
    }
}

/// Resolve a hostname to its first IP address; IPs and unresolvable names
/// are returned unchanged.
pub async fn resolve_target(target: &str) -> String {
    if target.parse::<IpAddr>().is_ok() {
        return target.to_string();
    }

    match tokio::net::lookup_host((target, 0)).await {
        Ok(mut addrs) => addrs
            .next()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| target.to_string()),
        Err(e) => {
            warn!("Could not resolve {}: {}", target, e);
            target.to_string()
        }
    }
}
