// src/transmit.rs
//! Copies stored observations into the items index searched by the special finder.

use chrono::{Local, NaiveDate};
use std::sync::Arc;

use crate::index::items::PutOutcome;
use crate::index::{IndexError, ItemsIndex};
use crate::store::{days_before, DateFilter, ObservationStore, StoreError};

/// `-1` means every stored observation.
pub const ALL_DAYS: i64 = -1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransmitReport {
    pub added: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum TransmitError {
    #[error("failed to create index or mapping: {0}")]
    Schema(#[source] IndexError),

    #[error("failed to read observations: {0}")]
    Store(#[source] StoreError),
}

/// Which observations a run copies: all of them, or those of the day `days` ago.
pub fn filter_for(days: i64, today: NaiveDate) -> DateFilter {
    if days == ALL_DAYS {
        DateFilter::All
    } else {
        DateFilter::On(days_before(today, days))
    }
}

pub struct Transmitter {
    store: Arc<dyn ObservationStore>,
    items: ItemsIndex,
}

impl Transmitter {
    pub fn new(store: Arc<dyn ObservationStore>, items: ItemsIndex) -> Self {
        Self { store, items }
    }

    pub async fn transmit(&self, days: i64) -> Result<TransmitReport, TransmitError> {
        self.transmit_on(Local::now().date_naive(), days).await
    }

    pub async fn transmit_on(&self, today: NaiveDate, days: i64) -> Result<TransmitReport, TransmitError> {
        self.items.ensure_schema().await.map_err(TransmitError::Schema)?;

        let filter = filter_for(days, today);
        if let DateFilter::On(day) = filter {
            tracing::info!(%day, "going to import data");
        }
        let rows = self
            .store
            .observations(filter)
            .await
            .map_err(TransmitError::Store)?;

        let mut report = TransmitReport::default();
        for row in &rows {
            match self.items.put_item(row).await {
                Ok(PutOutcome::Created) => {
                    tracing::debug!(id = row.id, title = %row.observation.title, "add item");
                    report.added += 1;
                }
                Ok(PutOutcome::AlreadyPresent) => report.skipped += 1,
                Err(e) => {
                    tracing::warn!(id = row.id, error = %e, "failed to transmit item");
                    report.failed += 1;
                }
            }
        }
        tracing::info!(
            added = report.added,
            skipped = report.skipped,
            failed = report.failed,
            "transmit finished"
        );
        Ok(report)
    }
}
