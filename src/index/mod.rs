// src/index/mod.rs
//! Document index seams: the best-price record index used by the tracker
//! and the price search used by the special finder.

pub mod elastic;
pub mod items;
pub mod lowest_price;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::model::{BestPriceRecord, IndexedRecord, MatchOperator, PriceKey, SpecialHit};

pub use elastic::ElasticClient;
pub use items::ItemsIndex;
pub use lowest_price::LowestPriceIndex;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("no index host configured")]
    NoHosts,

    #[error("index request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("index returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected index response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait BestPriceIndex: Send + Sync {
    /// Create the index and its mapping unless they already exist.
    async fn ensure_schema(&self) -> Result<(), IndexError>;

    /// Exact lookup on all three key fields.
    async fn find(&self, key: &PriceKey) -> Result<Option<IndexedRecord>, IndexError>;

    /// Store a new record, returning its document id.
    async fn create(&self, record: &BestPriceRecord) -> Result<String, IndexError>;

    async fn update_price(&self, id: &str, price: Decimal) -> Result<(), IndexError>;
}

#[async_trait]
pub trait PriceSearch: Send + Sync {
    /// Observations dated on or after `since` whose title matches `title`.
    async fn search(
        &self,
        title: &str,
        operator: MatchOperator,
        since: NaiveDate,
    ) -> Result<Vec<SpecialHit>, IndexError>;
}
