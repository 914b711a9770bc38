//! Pulseboard CLI
//!
//! Terminal tail of live metric values: subscribes to the requested buckets
//! and logs every frame as it arrives.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pulseboard::{CatalogClient, Config, MetricSession};

#[derive(Parser, Debug)]
#[command(name = "pulseboard", about = "Live metric dashboard client", version)]
struct Args {
    /// Buckets to watch (defaults to every bucket in the catalog)
    buckets: Vec<String>,

    /// Server base URL (overrides the config file)
    #[arg(long)]
    server: Option<String>,

    /// Path to a config file (defaults to the standard locations)
    #[arg(long)]
    config: Option<PathBuf>,

    /// List the catalog buckets and exit
    #[arg(long)]
    list: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    if let Some(server) = &args.server {
        config.server.base_url = server.clone();
    }

    init_logging(&config);

    tracing::info!("Pulseboard v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(server = %config.server.base_url, "connecting");

    let catalog = CatalogClient::new(
        &config.server.base_url,
        Duration::from_secs(config.server.request_timeout_secs),
    )?;

    let available = match catalog.fetch_buckets().await {
        Ok(buckets) => buckets,
        Err(e) if args.buckets.is_empty() || args.list => return Err(e.into()),
        Err(e) => {
            tracing::warn!(error = %e, "catalog unavailable, watching requested buckets anyway");
            Vec::new()
        }
    };

    if args.list {
        for bucket in &available {
            println!("{}", bucket.name);
        }
        return Ok(());
    }

    let wanted: Vec<String> = if args.buckets.is_empty() {
        available.iter().map(|b| b.name.clone()).collect()
    } else {
        args.buckets.clone()
    };
    anyhow::ensure!(!wanted.is_empty(), "no buckets to watch");

    for name in &wanted {
        if !available.is_empty() && !available.iter().any(|b| b.name == *name) {
            tracing::warn!(bucket = %name, "bucket not present in catalog");
        }
    }

    let session = MetricSession::new(&config)?;

    // One tap per bucket; the guards keep the listeners alive until exit.
    let _taps: Vec<_> = wanted
        .iter()
        .map(|name| {
            session.watch_metric(name, |event| {
                let at = event
                    .datetime()
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| event.ts.to_string());
                tracing::info!(metric = %event.metric, value = event.value, at = %at, "value");
            })
        })
        .collect();

    for name in &wanted {
        if let Err(e) = session.add_bucket(name).await {
            tracing::warn!(bucket = %name, error = %e, "connection failed, retrying in background");
        }
    }

    tracing::info!(buckets = wanted.len(), "watching, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    session.shutdown().await;
    tracing::info!("shutdown complete");
    Ok(())
}

/// Initialize tracing. RUST_LOG wins over the configured level.
fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG")
            .unwrap_or_else(|_| format!("pulseboard={}", config.logging.level)),
    );

    if config.logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
