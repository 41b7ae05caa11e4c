// src/store/mod.rs
//! Price observation store: the narrow query surface used by the consumer
//! and the batch jobs, plus the error taxonomy that drives recovery.

pub mod postgres;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use thiserror::Error;

use crate::model::{LowestPrice, Observation, StoredObservation};

pub use postgres::PgObservationStore;

/// Recovery class of a storage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connectivity was lost; a reconnect may fix it.
    Transient,
    /// The statement itself was refused (constraint, bad query state).
    NonRetryable,
    /// Anything the store could not classify.
    Unknown,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage connection lost: {0}")]
    Connection(String),

    #[error("constraint violated: {0}")]
    Constraint(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("invalid query state: {0}")]
    Query(String),

    #[error("unexpected storage failure: {0}")]
    Unexpected(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Connection(_) => ErrorKind::Transient,
            StoreError::Constraint(_) | StoreError::Database(_) | StoreError::Query(_) => {
                ErrorKind::NonRetryable
            }
            StoreError::Unexpected(_) => ErrorKind::Unknown,
        }
    }
}

/// Result of an insert attempt that reached the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// `(title, date)` was already stored; nothing was written.
    Duplicate,
}

/// Date filter for [`ObservationStore::observations`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFilter {
    All,
    On(NaiveDate),
    Since(NaiveDate),
}

impl DateFilter {
    pub fn accepts(&self, date: NaiveDate) -> bool {
        match *self {
            DateFilter::All => true,
            DateFilter::On(day) => date == day,
            DateFilter::Since(floor) => date >= floor,
        }
    }
}

/// The day `days` before `today`. Saturates at [`NaiveDate::MIN`] instead of
/// overflowing.
pub fn days_before(today: NaiveDate, days: i64) -> NaiveDate {
    Duration::try_days(days)
        .and_then(|d| today.checked_sub_signed(d))
        .unwrap_or(NaiveDate::MIN)
}

#[async_trait]
pub trait ObservationStore: Send + Sync {
    /// Insert one observation. A repeated `(title, date)` is reported as
    /// [`InsertOutcome::Duplicate`], not as an error.
    async fn insert(&self, observation: &Observation) -> Result<InsertOutcome, StoreError>;

    /// Cheapest observation per `(title, per, vendor)`.
    async fn lowest_prices(&self) -> Result<Vec<LowestPrice>, StoreError>;

    async fn observations(&self, filter: DateFilter) -> Result<Vec<StoredObservation>, StoreError>;

    /// Drop the current connection(s) and connect again.
    async fn reconnect(&self) -> Result<(), StoreError>;
}
