//! Lowest-price tracker: one aggregation cycle, or one every `--every` seconds.

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;

use special_finder::index::{ElasticClient, LowestPriceIndex};
use special_finder::store::PgObservationStore;
use special_finder::{LowestPriceTracker, NotifierMux};

#[derive(Debug, Parser)]
#[command(about = "Track the lowest price per item, unit and vendor")]
struct Args {
    /// Repeat the update every N seconds instead of running once.
    #[arg(long, value_name = "SECS")]
    every: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let settings = special_finder::bootstrap()?;
    let cfg = settings.tracker().inspect_err(|e| {
        tracing::error!(error = %e, "tracker cannot start");
    })?;

    let store = PgObservationStore::connect(&cfg.db_conn)
        .await
        .context("failed to connect to the db")?;
    let index = LowestPriceIndex::new(ElasticClient::new(cfg.es_hosts.clone()), cfg.index.clone());
    let notifier = NotifierMux::from_settings(&cfg.notification)?;
    let tracker = LowestPriceTracker::new(Arc::new(store), Arc::new(index), Arc::new(notifier));

    let Some(secs) = args.every else {
        tracker.update_lowest_prices().await?;
        return Ok(());
    };

    let mut ticker = tokio::time::interval(Duration::from_secs(secs.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = tracker.update_lowest_prices().await {
                    tracing::error!(error = %e, "lowest price update aborted");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown requested");
                return Ok(());
            }
        }
    }
}
