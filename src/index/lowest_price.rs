// src/index/lowest_price.rs
use async_trait::async_trait;
use reqwest::Method;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use super::{BestPriceIndex, ElasticClient, IndexError};
use crate::model::{BestPriceRecord, IndexedRecord, PriceKey};

/// Best-price records stored in an Elasticsearch index, one document per key.
pub struct LowestPriceIndex {
    client: ElasticClient,
    index: String,
}

impl LowestPriceIndex {
    pub fn new(client: ElasticClient, index: impl Into<String>) -> Self {
        Self {
            client,
            index: index.into(),
        }
    }

    // Key fields are keywords so that term queries compare the whole value.
    fn mapping() -> Value {
        json!({
            "title": { "type": "keyword" },
            "per": { "type": "keyword" },
            "vendor": { "type": "keyword" },
            "price": { "type": "double" },
            "url": { "type": "keyword", "index": false }
        })
    }
}

/// Exact match on title, per and vendor. A missing `per` only matches
/// documents without one.
pub fn key_query(key: &PriceKey) -> Value {
    let mut filter = vec![
        json!({ "term": { "title": key.title } }),
        json!({ "term": { "vendor": key.vendor } }),
    ];
    let mut must_not = Vec::new();
    match &key.per {
        Some(per) => filter.push(json!({ "term": { "per": per } })),
        None => must_not.push(json!({ "exists": { "field": "per" } })),
    }
    json!({
        "size": 1,
        "query": { "bool": { "filter": filter, "must_not": must_not } }
    })
}

fn price_value(price: Decimal) -> Result<Value, IndexError> {
    price
        .to_f64()
        .map(Value::from)
        .ok_or_else(|| IndexError::Decode(format!("price {price} is not representable")))
}

#[async_trait]
impl BestPriceIndex for LowestPriceIndex {
    async fn ensure_schema(&self) -> Result<(), IndexError> {
        self.client.create_index(&self.index, Self::mapping()).await
    }

    async fn find(&self, key: &PriceKey) -> Result<Option<IndexedRecord>, IndexError> {
        let hits = self.client.search(&self.index, &key_query(key)).await?;
        let Some(hit) = hits.into_iter().next() else {
            return Ok(None);
        };
        let id = hit
            .get("_id")
            .and_then(Value::as_str)
            .ok_or_else(|| IndexError::Decode("hit without _id".into()))?
            .to_string();
        let source = hit
            .get("_source")
            .cloned()
            .ok_or_else(|| IndexError::Decode(format!("hit {id} without _source")))?;
        let record: BestPriceRecord = serde_json::from_value(source)
            .map_err(|e| IndexError::Decode(format!("hit {id}: {e}")))?;
        Ok(Some(IndexedRecord { id, record }))
    }

    async fn create(&self, record: &BestPriceRecord) -> Result<String, IndexError> {
        let body = serde_json::to_value(record).map_err(|e| IndexError::Decode(e.to_string()))?;
        let rsp = self
            .client
            .send(
                Method::POST,
                &format!("{}/_doc?refresh=wait_for", self.index),
                Some(&body),
            )
            .await?;
        if !rsp.is_success() {
            return Err(rsp.into_error());
        }
        rsp.body
            .get("_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| IndexError::Decode("create response without _id".into()))
    }

    async fn update_price(&self, id: &str, price: Decimal) -> Result<(), IndexError> {
        let body = json!({ "doc": { "price": price_value(price)? } });
        let rsp = self
            .client
            .send(
                Method::POST,
                &format!("{}/_update/{}?refresh=wait_for", self.index, id),
                Some(&body),
            )
            .await?;
        if rsp.is_success() {
            Ok(())
        } else {
            Err(rsp.into_error())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_query_with_unit_filters_on_all_three_fields() {
        let key = PriceKey {
            title: "Olive Oil".into(),
            per: Some("1L".into()),
            vendor: "Coles".into(),
        };
        let q = key_query(&key);
        let filter = q["query"]["bool"]["filter"].as_array().unwrap();
        assert_eq!(filter.len(), 3);
        assert!(filter.contains(&json!({ "term": { "per": "1L" } })));
        assert!(q["query"]["bool"]["must_not"].as_array().unwrap().is_empty());
    }

    #[test]
    fn key_query_without_unit_excludes_documents_with_one() {
        let key = PriceKey {
            title: "Olive Oil".into(),
            per: None,
            vendor: "Coles".into(),
        };
        let q = key_query(&key);
        assert_eq!(q["query"]["bool"]["filter"].as_array().unwrap().len(), 2);
        assert_eq!(
            q["query"]["bool"]["must_not"][0],
            json!({ "exists": { "field": "per" } })
        );
    }
}
