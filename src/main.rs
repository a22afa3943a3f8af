use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use futures::future::join_all;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cachegate::cache::InMemoryCache;
use cachegate::config::LimiterConfig;
use cachegate::ratelimit::{RateLimitDecision, RateLimiter};

/// Drive a configured rate limiter against an in-memory cache.
#[derive(Debug, Parser)]
#[command(name = "cachegate", version, about)]
struct Args {
    /// Limiter configuration file (YAML). Defaults to a fixed window.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Cache name used when no configuration file is given
    #[arg(long, default_value = "cachegate")]
    cache_name: String,

    /// Client identifier to throttle
    #[arg(long, default_value = "demo-client")]
    client: String,

    /// Number of requests to issue
    #[arg(short = 'n', long, default_value_t = 10)]
    requests: usize,

    /// Issue all requests at once instead of one after another
    #[arg(long)]
    concurrent: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }

    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => LimiterConfig::load(path)?,
        None => LimiterConfig::new(args.cache_name.clone()),
    };

    let cache = match config.default_ttl_secs {
        Some(secs) => InMemoryCache::with_default_ttl(Duration::from_secs(secs)),
        None => InMemoryCache::new(),
    };
    cache.create_cache(&config.cache_name);
    let cache = Arc::new(cache);

    let limiter = config.build(cache.clone())?;

    let decisions: Vec<RateLimitDecision> = if args.concurrent {
        join_all((0..args.requests).map(|_| limiter.limit(&args.client))).await
    } else {
        let mut decisions = Vec::with_capacity(args.requests);
        for _ in 0..args.requests {
            decisions.push(limiter.limit(&args.client).await);
        }
        decisions
    };

    for (i, decision) in decisions.iter().enumerate() {
        match &decision.error {
            Some(e) => warn!(request = i + 1, error = %e, "No reliable decision"),
            None => info!(
                request = i + 1,
                allow = decision.allow,
                remaining = decision.remaining,
                "Rate limit decision made"
            ),
        }
    }

    let allowed = decisions.iter().filter(|d| d.allow).count();
    let query = limiter.remaining(&args.client).await;
    match query.error {
        Some(e) => warn!(error = %e, "Could not read remaining capacity"),
        None => info!(
            client = %args.client,
            allowed = allowed,
            denied = decisions.len() - allowed,
            remaining = query.remaining.unwrap_or_default(),
            "Done"
        ),
    }

    Ok(())
}
