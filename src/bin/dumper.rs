//! Ingestion consumer: drains the scrape result queue into the observation store.

use anyhow::Context;
use std::sync::Arc;

use special_finder::ingest::amqp::AmqpSource;
use special_finder::store::PgObservationStore;
use special_finder::Dumper;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = special_finder::bootstrap()?;
    let cfg = settings.ingest().inspect_err(|e| {
        tracing::error!(error = %e, "dumper cannot start");
    })?;

    let store = PgObservationStore::connect(&cfg.db_conn)
        .await
        .context("failed to connect to the db")?;
    let source = AmqpSource::connect(&cfg.queue)
        .await
        .context("failed to connect to the queue")?;

    let dumper = Dumper::new(Arc::new(store));
    source
        .run(&dumper, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "cannot listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await
}
