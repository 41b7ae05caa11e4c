// src/model.rs
//! Record types shared by the store, the indexes and the batch jobs.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One scraped price sample, as accepted by the ingestion consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub title: String,
    pub price: Decimal,
    pub per: Option<String>,
    pub url: Option<String>,
    pub image_url: Option<String>,
    pub date: NaiveDate,
    pub vendor: String,
}

impl Observation {
    pub fn key(&self) -> PriceKey {
        PriceKey {
            title: self.title.clone(),
            per: self.per.clone(),
            vendor: self.vendor.clone(),
        }
    }
}

/// An observation read back from the store, with its row id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObservation {
    pub id: i64,
    pub observation: Observation,
}

/// Identifies a comparable offer: same item, same unit, same vendor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PriceKey {
    pub title: String,
    pub per: Option<String>,
    pub vendor: String,
}

impl fmt::Display for PriceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.per {
            Some(per) => write!(f, "{} ({}) @ {}", self.title, per, self.vendor),
            None => write!(f, "{} @ {}", self.title, self.vendor),
        }
    }
}

/// Cheapest observation for a key, as produced by the store aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LowestPrice {
    pub key: PriceKey,
    pub price: Decimal,
    pub url: Option<String>,
}

/// Current known minimum for a key, as held in the best-price index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestPriceRecord {
    pub title: String,
    #[serde(default)]
    pub per: Option<String>,
    pub vendor: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(default)]
    pub url: Option<String>,
}

impl BestPriceRecord {
    pub fn new(key: &PriceKey, price: Decimal, url: Option<String>) -> Self {
        Self {
            title: key.title.clone(),
            per: key.per.clone(),
            vendor: key.vendor.clone(),
            price,
            url,
        }
    }

    pub fn key(&self) -> PriceKey {
        PriceKey {
            title: self.title.clone(),
            per: self.per.clone(),
            vendor: self.vendor.clone(),
        }
    }
}

/// A best-price record together with the index document id it lives under.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedRecord {
    pub id: String,
    pub record: BestPriceRecord,
}

/// How the terms of a watched title must match an observation title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchOperator {
    /// Every term must appear.
    #[default]
    And,
    /// At least one term must appear.
    Or,
}

impl MatchOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchOperator::And => "and",
            MatchOperator::Or => "or",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedTitle {
    pub title: String,
    pub operator: MatchOperator,
}

impl WatchedTitle {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            operator: MatchOperator::default(),
        }
    }

    pub fn with_operator(mut self, operator: MatchOperator) -> Self {
        self.operator = operator;
        self
    }
}

/// A search result for a watched title.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecialHit {
    pub title: String,
    pub price: Decimal,
    pub url: Option<String>,
    pub vendor: Option<String>,
    pub date: NaiveDate,
}
