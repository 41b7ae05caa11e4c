// src/tracker.rs
//! # Lowest-price tracker
//! Aggregates stored observations per `(title, per, vendor)`, diffs the
//! minimum against the best-price index and notifies once per strict drop.
//!
//! The first sighting of a key only records a baseline. Index failures for
//! one key are logged and skipped; only schema setup or the aggregate query
//! failing aborts the run.

use metrics::counter;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::index::{BestPriceIndex, IndexError};
use crate::model::{BestPriceRecord, LowestPrice, PriceKey};
use crate::notify::NotifierMux;
use crate::store::{ObservationStore, StoreError};

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("failed to create index or mapping: {0}")]
    Schema(#[source] IndexError),

    #[error("failed to aggregate observations: {0}")]
    Aggregate(#[source] StoreError),
}

/// Counts for one `update_lowest_prices` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerReport {
    pub candidates: usize,
    pub created: usize,
    pub dropped: usize,
    pub unchanged: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyChange {
    Created,
    Dropped,
    Unchanged,
}

#[derive(Debug, Clone)]
struct Candidate {
    price: Decimal,
    url: Option<String>,
}

/// Keep the cheapest entry per key; the first one seen wins a tie.
fn candidate_map(rows: Vec<LowestPrice>) -> BTreeMap<PriceKey, Candidate> {
    let mut out: BTreeMap<PriceKey, Candidate> = BTreeMap::new();
    for row in rows {
        match out.get_mut(&row.key) {
            Some(c) if row.price < c.price => {
                c.price = row.price;
                c.url = row.url;
            }
            Some(_) => {}
            None => {
                out.insert(
                    row.key,
                    Candidate {
                        price: row.price,
                        url: row.url,
                    },
                );
            }
        }
    }
    out
}

pub fn price_drop_message(key: &PriceKey, price: Decimal, previous: Decimal, url: Option<&str>) -> String {
    let item = match &key.per {
        Some(per) => format!("{} ({per})", key.title),
        None => key.title.clone(),
    };
    let mut text = format!(
        "Lower price of {item} found at {}: {} (was {})",
        key.vendor,
        price.normalize(),
        previous.normalize()
    );
    if let Some(u) = url {
        text.push('\n');
        text.push_str(u);
    }
    text
}

pub struct LowestPriceTracker {
    store: Arc<dyn ObservationStore>,
    index: Arc<dyn BestPriceIndex>,
    notifier: Arc<NotifierMux>,
}

impl LowestPriceTracker {
    pub fn new(
        store: Arc<dyn ObservationStore>,
        index: Arc<dyn BestPriceIndex>,
        notifier: Arc<NotifierMux>,
    ) -> Self {
        Self {
            store,
            index,
            notifier,
        }
    }

    /// One full aggregation cycle. Safe to repeat.
    pub async fn update_lowest_prices(&self) -> Result<TrackerReport, TrackerError> {
        self.index.ensure_schema().await.map_err(TrackerError::Schema)?;

        let rows = self
            .store
            .lowest_prices()
            .await
            .map_err(TrackerError::Aggregate)?;
        let candidates = candidate_map(rows);

        let mut report = TrackerReport {
            candidates: candidates.len(),
            ..TrackerReport::default()
        };

        for (key, candidate) in &candidates {
            match self.apply(key, candidate).await {
                Ok(KeyChange::Created) => report.created += 1,
                Ok(KeyChange::Dropped) => report.dropped += 1,
                Ok(KeyChange::Unchanged) => report.unchanged += 1,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "skipping key after index failure");
                    counter!("tracker_key_failures_total").increment(1);
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            candidates = report.candidates,
            created = report.created,
            dropped = report.dropped,
            unchanged = report.unchanged,
            failed = report.failed,
            "lowest price update finished"
        );
        Ok(report)
    }

    async fn apply(&self, key: &PriceKey, candidate: &Candidate) -> Result<KeyChange, IndexError> {
        let Some(existing) = self.index.find(key).await? else {
            let record = BestPriceRecord::new(key, candidate.price, candidate.url.clone());
            self.index.create(&record).await?;
            tracing::info!(key = %key, price = %candidate.price, "lowest price recorded for the first time");
            return Ok(KeyChange::Created);
        };

        if candidate.price >= existing.record.price {
            tracing::trace!(key = %key, stored = %existing.record.price, "no lower price");
            return Ok(KeyChange::Unchanged);
        }

        self.index.update_price(&existing.id, candidate.price).await?;
        tracing::info!(
            key = %key,
            from = %existing.record.price,
            to = %candidate.price,
            "lower price found"
        );
        counter!("tracker_price_drops_total").increment(1);
        let url = candidate.url.as_deref().or(existing.record.url.as_deref());
        self.notifier
            .notify(&price_drop_message(key, candidate.price, existing.record.price, url))
            .await;
        Ok(KeyChange::Dropped)
    }
}
