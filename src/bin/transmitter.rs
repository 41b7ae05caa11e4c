//! Mirror stored observations into the items search index.

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;

use special_finder::config::settings::MAX_LOOKBACK_DAYS;
use special_finder::index::{ElasticClient, ItemsIndex};
use special_finder::store::PgObservationStore;
use special_finder::transmit::{Transmitter, ALL_DAYS};

#[derive(Debug, Parser)]
#[command(about = "Transfer observations from the db to the search index")]
struct Args {
    /// Transfer the data of x days ago, -1 means all data.
    #[arg(
        long,
        default_value_t = 1,
        allow_negative_numbers = true,
        value_parser = clap::value_parser!(i64).range(ALL_DAYS..=MAX_LOOKBACK_DAYS)
    )]
    days: i64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let settings = special_finder::bootstrap()?;
    let cfg = settings.transmitter().inspect_err(|e| {
        tracing::error!(error = %e, "transmitter cannot start");
    })?;

    let store = PgObservationStore::connect(&cfg.db_conn)
        .await
        .context("failed to connect to the db")?;
    let items = ItemsIndex::new(ElasticClient::new(cfg.es_hosts.clone()), cfg.index.clone());
    let report = Transmitter::new(Arc::new(store), items)
        .transmit(args.days)
        .await?;
    if report.failed > 0 {
        tracing::warn!(failed = report.failed, "some items were not transmitted");
    }
    Ok(())
}
