use anyhow::Result;
use clap::Parser;
use geointel::{
    context::RunContext,
    fetch::FetcherConfig,
    geo::{resolve_target, GeoLookup, GeoRecord, LookupConfig, ReverseGeocode},
    logger::init_logger,
    proxy::{
        ProxyAddress, ProxyPool, ProxyScraper, ProxySource, ProxyVerifier, ScraperConfig,
        VerificationReport, VerifiedSet, VerifierConfig,
    },
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// How often verification progress is logged
const PROGRESS_INTERVAL: Duration = Duration::from_secs(2);

/// IP geolocation through a pool of verified forward proxies
#[derive(Parser)]
#[command(name = "geointel")]
#[command(about = "IP geolocation through a pool of verified forward proxies")]
struct Cli {
    /// IP address or hostname to look up; your public IP when omitted
    target: Option<String>,

    /// Known-good proxy file, loaded at start and rewritten after verification
    #[arg(short, long, default_value = "proxies.txt")]
    proxies: PathBuf,

    /// Only use proxies from the known-good file
    #[arg(long)]
    no_scrape: bool,

    /// Use candidates without verifying them
    #[arg(long)]
    skip_verify: bool,

    /// Maximum number of concurrent proxy checks
    #[arg(short = 'n', long, default_value = "50")]
    concurrency: usize,

    /// Proxy check timeout in seconds
    #[arg(long, default_value = "3")]
    timeout: u64,

    /// URL fetched through each candidate to confirm it forwards traffic
    #[arg(long, default_value = "http://httpbin.org/ip")]
    echo_url: String,

    /// Proxy list URL to scrape (repeatable); defaults to the built-in sources
    #[arg(short, long)]
    source: Vec<String>,

    /// Seed for the proxy fallback order
    #[arg(long)]
    seed: Option<u64>,

    /// OpenCage API key for reverse geocoding
    #[arg(long, env = "OPENCAGE_API_KEY", hide_env_values = true)]
    opencage_key: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    let ctx = RunContext::with_defaults()?;
    ctx.cancel_on_ctrl_c();

    let verified = build_pool(&cli, &ctx).await;
    if ctx.is_cancelled() {
        info!("Interrupted, skipping lookups");
        return Ok(());
    }

    let mut fetcher = FetcherConfig::new();
    if let Some(seed) = cli.seed {
        fetcher = fetcher.with_shuffle_seed(seed);
    }
    let lookup = GeoLookup::new(
        &ctx,
        LookupConfig::new()
            .with_fetcher(fetcher)
            .with_opencage_key(cli.opencage_key.clone()),
    );

    let target = match cli.target.as_deref().map(str::trim) {
        Some(target) if !target.is_empty() => resolve_target(target).await,
        _ => match lookup.detect_public_ip().await {
            Some(ip) => ip,
            None => {
                println!("No target given and the public IP could not be detected.");
                println!("Run again with an IP address or hostname.");
                return Ok(());
            }
        },
    };

    info!(
        "Looking up {} with {} verified proxies",
        target,
        verified.len()
    );
    let record = lookup.lookup(&target, verified.proxies()).await;

    println!();
    println!("Target: {}", target);
    println!(
        "Proxies: {} verified at {}",
        verified.len(),
        verified.verified_at().format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!();

    if !record.has_data() {
        print_no_data(&record);
        return Ok(());
    }

    print_record(&record);

    if ctx.is_cancelled() {
        return Ok(());
    }
    match lookup.reverse_geocode(&record, verified.proxies()).await {
        Ok(geocode) => print_geocode(&geocode),
        Err(e) => println!("\nReverse geocode: {}", e),
    }

    Ok(())
}

/// Load, scrape, dedupe and verify candidates, persisting the verified set
async fn build_pool(cli: &Cli, ctx: &RunContext) -> VerifiedSet {
    let mut pool: ProxyPool = ProxyPool::load(&cli.proxies).into_iter().collect();

    if !cli.no_scrape && !ctx.is_cancelled() {
        let sources: Vec<ProxySource> = if cli.source.is_empty() {
            ProxyScraper::default_sources()
        } else {
            cli.source.iter().map(|url| ProxySource::from_url(url)).collect()
        };
        let scraper = ProxyScraper::new(ctx, ScraperConfig::default());
        pool.extend(scraper.scrape(&sources).await);
    }

    info!("{} candidate proxies", pool.len());
    let candidates = pool.into_addresses();

    if cli.skip_verify {
        return VerifiedSet::unchecked(candidates);
    }
    if candidates.is_empty() {
        return VerifiedSet::empty();
    }

    let config = VerifierConfig::new()
        .with_concurrency(cli.concurrency)
        .with_timeout(Duration::from_secs(cli.timeout))
        .with_echo_url(cli.echo_url.clone());
    let verifier = ProxyVerifier::new(ctx, config);

    let report = verify_with_progress(&verifier, candidates).await;
    if !report.skipped.is_empty() {
        info!(
            "Skipped {} proxies after interruption, keeping them unchecked",
            report.skipped.len()
        );
    }

    ProxyPool::save(&cli.proxies, &report.retained());
    report.verified
}

/// Run verification while logging its progress at a fixed interval
async fn verify_with_progress(
    verifier: &ProxyVerifier,
    candidates: Vec<ProxyAddress>,
) -> VerificationReport {
    let progress = verifier.progress();
    let verify = verifier.verify_all(candidates);
    tokio::pin!(verify);

    let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
    ticker.tick().await;

    loop {
        tokio::select! {
            report = &mut verify => return report,
            _ = ticker.tick() => {
                info!(
                    "Checked {}/{} proxies, {} verified",
                    progress.done(),
                    progress.total(),
                    progress.verified()
                );
            }
        }
    }
}

fn print_record(record: &GeoRecord) {
    for (name, value) in record.fields() {
        match value {
            Some(value) => println!("{:<10} {}", name, value),
            None => println!("{:<10} -", name),
        }
    }
}

fn print_no_data(record: &GeoRecord) {
    println!("No usable geolocation data returned");
    if let Some(reason) = record.primary().error_reason() {
        println!("  ip-api:   {}", reason);
    }
    if let Some(reason) = record.secondary().error_reason() {
        println!("  ipwho.is: {}", reason);
    }
}

fn print_geocode(geocode: &ReverseGeocode) {
    println!();
    println!("Reverse geocode");
    let rows = [
        ("address", geocode.formatted.clone()),
        ("country", geocode.country.clone()),
        ("state", geocode.state.clone()),
        ("city", geocode.city.clone()),
        ("postcode", geocode.postcode.clone()),
        ("confidence", geocode.confidence.map(|c| c.to_string())),
    ];
    for (name, value) in rows {
        println!("{:<10} {}", name, value.as_deref().unwrap_or("-"));
    }
}
