// src/index/items.rs
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Method;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{ElasticClient, IndexError, PriceSearch};
use crate::model::{MatchOperator, SpecialHit, StoredObservation};

/// Hits requested per search page.
const PAGE_SIZE: usize = 100;

/// Mirror of stored observations, searchable by title text.
pub struct ItemsIndex {
    client: ElasticClient,
    index: String,
}

/// Outcome of mirroring one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Created,
    AlreadyPresent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ItemDoc {
    /// Store row id; also the document id. Tie-breaker for paging.
    #[serde(default)]
    row_id: Option<i64>,
    title: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    price: Decimal,
    #[serde(default)]
    per: Option<String>,
    #[serde(default)]
    vendor: Option<String>,
    date: NaiveDate,
}

impl ItemsIndex {
    pub fn new(client: ElasticClient, index: impl Into<String>) -> Self {
        Self {
            client,
            index: index.into(),
        }
    }

    pub async fn ensure_schema(&self) -> Result<(), IndexError> {
        let properties = json!({
            "row_id": { "type": "long" },
            "title": { "type": "text" },
            "url": { "type": "keyword", "index": false },
            "price": { "type": "double" },
            "per": { "type": "keyword" },
            "vendor": { "type": "keyword" },
            "date": { "type": "date", "format": "yyyy-MM-dd" }
        });
        self.client.create_index(&self.index, properties).await
    }

    /// Create the document for `item` under its row id. An existing
    /// document is left untouched.
    pub async fn put_item(&self, item: &StoredObservation) -> Result<PutOutcome, IndexError> {
        let o = &item.observation;
        let doc = ItemDoc {
            row_id: Some(item.id),
            title: o.title.clone(),
            url: o.url.clone(),
            price: o.price,
            per: o.per.clone(),
            vendor: Some(o.vendor.clone()),
            date: o.date,
        };
        let body = serde_json::to_value(&doc).map_err(|e| IndexError::Decode(e.to_string()))?;
        let rsp = self
            .client
            .send(
                Method::PUT,
                &format!("{}/_create/{}", self.index, item.id),
                Some(&body),
            )
            .await?;
        match rsp.status {
            200..=299 => Ok(PutOutcome::Created),
            409 => Ok(PutOutcome::AlreadyPresent),
            _ => Err(rsp.into_error()),
        }
    }
}

/// One page of a title search, newest first. `after` is the `sort` value of
/// the last hit of the previous page.
pub fn title_query(
    title: &str,
    operator: MatchOperator,
    since: NaiveDate,
    after: Option<&Value>,
) -> Value {
    let mut query = json!({
        "size": PAGE_SIZE,
        "query": {
            "bool": {
                "must": [
                    { "match": { "title": { "query": title, "operator": operator.as_str() } } }
                ],
                "filter": [
                    { "range": { "date": { "gte": since.format("%Y-%m-%d").to_string() } } }
                ]
            }
        },
        "sort": [
            { "date": "desc" },
            { "row_id": { "order": "asc", "unmapped_type": "long" } }
        ]
    });
    if let Some(a) = after {
        query["search_after"] = a.clone();
    }
    query
}

fn to_hit(hit: &Value) -> Result<SpecialHit, IndexError> {
    let source = hit.get("_source").cloned().unwrap_or(Value::Null);
    let doc: ItemDoc = serde_json::from_value(source)
        .map_err(|e| IndexError::Decode(format!("item hit: {e}")))?;
    Ok(SpecialHit {
        title: doc.title,
        price: doc.price,
        url: doc.url,
        vendor: doc.vendor,
        date: doc.date,
    })
}

#[async_trait]
impl PriceSearch for ItemsIndex {
    async fn search(
        &self,
        title: &str,
        operator: MatchOperator,
        since: NaiveDate,
    ) -> Result<Vec<SpecialHit>, IndexError> {
        let mut out = Vec::new();
        let mut after: Option<Value> = None;
        loop {
            let page = self
                .client
                .search(&self.index, &title_query(title, operator, since, after.as_ref()))
                .await?;
            for hit in &page {
                out.push(to_hit(hit)?);
            }
            if page.len() < PAGE_SIZE {
                break;
            }
            let next = page
                .last()
                .and_then(|h| h.get("sort"))
                .cloned()
                .ok_or_else(|| IndexError::Decode("full page without sort values".into()))?;
            tracing::trace!(title, fetched = out.len(), "fetching next page");
            after = Some(next);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_query_carries_operator_and_floor() {
        let since = NaiveDate::from_ymd_opt(2026, 10, 9).unwrap();
        let q = title_query("Olive Oil", MatchOperator::Or, since, None);
        assert_eq!(
            q["query"]["bool"]["must"][0]["match"]["title"]["operator"],
            json!("or")
        );
        assert_eq!(
            q["query"]["bool"]["filter"][0]["range"]["date"]["gte"],
            json!("2026-10-09")
        );
        assert!(q.get("search_after").is_none());
    }

    #[test]
    fn next_page_continues_after_last_sort_values() {
        let since = NaiveDate::from_ymd_opt(2026, 10, 9).unwrap();
        let after = json!([1_760_313_600_000i64, 42]);
        let q = title_query("Olive Oil", MatchOperator::And, since, Some(&after));
        assert_eq!(q["search_after"], after);
        assert_eq!(q["sort"][1]["row_id"]["order"], json!("asc"));
    }
}
