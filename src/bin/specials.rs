//! Special finder: notify on watched titles seen in the last days.

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;

use special_finder::config::settings::MAX_LOOKBACK_DAYS;
use special_finder::config::SearchBackend;
use special_finder::index::{ElasticClient, ItemsIndex, PriceSearch};
use special_finder::model::{MatchOperator, WatchedTitle};
use special_finder::specials::{SpecialsOutcome, StoreSearch};
use special_finder::store::PgObservationStore;
use special_finder::{NotifierMux, SpecialFinder};

#[derive(Debug, Parser)]
#[command(about = "Look for watched titles among recent observations")]
struct Args {
    /// Title to look for; repeatable. Replaces the configured titles.
    #[arg(long = "title", value_name = "TITLE")]
    titles: Vec<String>,

    /// Match any term of a --title instead of all of them.
    #[arg(long)]
    any: bool,

    /// Override the trailing window in days.
    #[arg(long, value_name = "DAYS", value_parser = clap::value_parser!(i64).range(1..=MAX_LOOKBACK_DAYS))]
    days: Option<i64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let settings = special_finder::bootstrap()?;
    let cfg = settings.specials().inspect_err(|e| {
        tracing::error!(error = %e, "special finder cannot start");
    })?;

    let search: Arc<dyn PriceSearch> = match &cfg.backend {
        SearchBackend::Index { es_hosts, index } => {
            Arc::new(ItemsIndex::new(ElasticClient::new(es_hosts.clone()), index.clone()))
        }
        SearchBackend::Store { db_conn } => {
            let store = PgObservationStore::connect(db_conn)
                .await
                .context("failed to connect to the db")?;
            Arc::new(StoreSearch::new(Arc::new(store)))
        }
    };
    let notifier = NotifierMux::from_settings(&cfg.notification)?;
    let finder = SpecialFinder::new(search, Arc::new(notifier))
        .with_watched(cfg.titles.clone())
        .with_window_days(args.days.unwrap_or(cfg.window_days));

    let operator = if args.any {
        MatchOperator::Or
    } else {
        MatchOperator::And
    };
    let explicit: Vec<WatchedTitle> = args
        .titles
        .iter()
        .map(|t| WatchedTitle::new(t.trim()).with_operator(operator))
        .collect();

    match finder.find_specials(Some(explicit.as_slice())).await {
        SpecialsOutcome::Completed { titles, notified, failed } => {
            tracing::info!(titles, notified, failed, "special search finished");
        }
        SpecialsOutcome::NotConfigured => {}
    }
    Ok(())
}
