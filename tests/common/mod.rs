// tests/common/mod.rs
// In-memory stand-ins for the store, the best-price index and a notification channel.
#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use special_finder::index::{BestPriceIndex, IndexError};
use special_finder::model::{BestPriceRecord, IndexedRecord, LowestPrice, Observation, PriceKey, StoredObservation};
use special_finder::notify::{Notifier, NotifierMux, Recipient, Recipients};
use special_finder::store::{DateFilter, InsertOutcome, ObservationStore, StoreError};

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn obs(title: &str, price: &str, vendor: &str, date: &str) -> Observation {
    Observation {
        title: title.into(),
        price: dec(price),
        per: None,
        url: Some(format!("https://shop.test/{}", title.to_lowercase().replace(' ', "-"))),
        image_url: None,
        date: day(date),
        vendor: vendor.into(),
    }
}

pub fn key(title: &str, per: Option<&str>, vendor: &str) -> PriceKey {
    PriceKey {
        title: title.into(),
        per: per.map(str::to_string),
        vendor: vendor.into(),
    }
}

// ---- store ----

#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<StoredObservation>>,
    insert_failures: Mutex<VecDeque<StoreError>>,
    reconnects: AtomicUsize,
    reconnect_fails: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<Observation>) -> Self {
        let s = Self::new();
        for (i, o) in rows.into_iter().enumerate() {
            s.rows.lock().unwrap().push(StoredObservation {
                id: i as i64 + 1,
                observation: o,
            });
        }
        s
    }

    pub fn push(&self, o: Observation) {
        let mut rows = self.rows.lock().unwrap();
        let id = rows.len() as i64 + 1;
        rows.push(StoredObservation { id, observation: o });
    }

    pub fn fail_next_insert(&self, err: StoreError) {
        self.insert_failures.lock().unwrap().push_back(err);
    }

    pub fn fail_reconnects(&self) {
        self.reconnect_fails.store(true, Ordering::SeqCst);
    }

    pub fn reconnects(&self) -> usize {
        self.reconnects.load(Ordering::SeqCst)
    }

    pub fn rows(&self) -> Vec<Observation> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.observation.clone())
            .collect()
    }
}

#[async_trait]
impl ObservationStore for MemoryStore {
    async fn insert(&self, o: &Observation) -> Result<InsertOutcome, StoreError> {
        if let Some(e) = self.insert_failures.lock().unwrap().pop_front() {
            return Err(e);
        }
        let mut rows = self.rows.lock().unwrap();
        if rows
            .iter()
            .any(|r| r.observation.title == o.title && r.observation.date == o.date)
        {
            return Ok(InsertOutcome::Duplicate);
        }
        let id = rows.len() as i64 + 1;
        rows.push(StoredObservation {
            id,
            observation: o.clone(),
        });
        Ok(InsertOutcome::Inserted)
    }

    async fn lowest_prices(&self) -> Result<Vec<LowestPrice>, StoreError> {
        let mut best: BTreeMap<PriceKey, LowestPrice> = BTreeMap::new();
        for r in self.rows.lock().unwrap().iter() {
            let o = &r.observation;
            let k = o.key();
            match best.get(&k) {
                Some(cur) if cur.price <= o.price => {}
                _ => {
                    best.insert(
                        k.clone(),
                        LowestPrice {
                            key: k,
                            price: o.price,
                            url: o.url.clone(),
                        },
                    );
                }
            }
        }
        Ok(best.into_values().collect())
    }

    async fn observations(&self, filter: DateFilter) -> Result<Vec<StoredObservation>, StoreError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| filter.accepts(r.observation.date))
            .cloned()
            .collect())
    }

    async fn reconnect(&self) -> Result<(), StoreError> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        if self.reconnect_fails.load(Ordering::SeqCst) {
            Err(StoreError::Connection("still down".into()))
        } else {
            Ok(())
        }
    }
}

// ---- best-price index ----

#[derive(Default)]
pub struct MemoryIndex {
    docs: Mutex<BTreeMap<String, BestPriceRecord>>,
    next_id: AtomicUsize,
    failing_titles: Mutex<HashSet<String>>,
    schema_fails: AtomicBool,
    pub ensure_calls: AtomicUsize,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, key: &PriceKey, price: &str) -> String {
        let id = format!("doc-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.docs
            .lock()
            .unwrap()
            .insert(id.clone(), BestPriceRecord::new(key, dec(price), None));
        id
    }

    pub fn fail_title(&self, title: &str) {
        self.failing_titles.lock().unwrap().insert(title.to_string());
    }

    pub fn fail_schema(&self) {
        self.schema_fails.store(true, Ordering::SeqCst);
    }

    pub fn price_of(&self, key: &PriceKey) -> Option<Decimal> {
        self.docs
            .lock()
            .unwrap()
            .values()
            .find(|r| &r.key() == key)
            .map(|r| r.price)
    }

    pub fn len(&self) -> usize {
        self.docs.lock().unwrap().len()
    }

    fn check(&self, title: &str) -> Result<(), IndexError> {
        if self.failing_titles.lock().unwrap().contains(title) {
            return Err(IndexError::Status {
                status: 503,
                body: "unavailable".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl BestPriceIndex for MemoryIndex {
    async fn ensure_schema(&self) -> Result<(), IndexError> {
        self.ensure_calls.fetch_add(1, Ordering::SeqCst);
        if self.schema_fails.load(Ordering::SeqCst) {
            return Err(IndexError::Status {
                status: 500,
                body: "mapping rejected".into(),
            });
        }
        Ok(())
    }

    async fn find(&self, key: &PriceKey) -> Result<Option<IndexedRecord>, IndexError> {
        self.check(&key.title)?;
        Ok(self
            .docs
            .lock()
            .unwrap()
            .iter()
            .find(|(_, r)| &r.key() == key)
            .map(|(id, r)| IndexedRecord {
                id: id.clone(),
                record: r.clone(),
            }))
    }

    async fn create(&self, record: &BestPriceRecord) -> Result<String, IndexError> {
        self.check(&record.title)?;
        let id = format!("doc-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.docs.lock().unwrap().insert(id.clone(), record.clone());
        Ok(id)
    }

    async fn update_price(&self, id: &str, price: Decimal) -> Result<(), IndexError> {
        match self.docs.lock().unwrap().get_mut(id) {
            Some(r) => {
                r.price = price;
                Ok(())
            }
            None => Err(IndexError::Status {
                status: 404,
                body: format!("{id} not found"),
            }),
        }
    }
}

// ---- notifications ----

pub struct RecordingNotifier(pub Arc<Mutex<Vec<String>>>);

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, text: &str, _recipients: &Recipients) -> Result<()> {
        self.0.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// A mux with one recording channel and one recipient.
pub fn recording_mux() -> (Arc<NotifierMux>, Arc<Mutex<Vec<String>>>) {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let mut recipients = Recipients::new();
    recipients.insert(
        "alice".into(),
        Recipient {
            telegram: Some("1001".into()),
            email: None,
        },
    );
    let mux = NotifierMux::new(vec![Box::new(RecordingNotifier(sent.clone()))], recipients);
    (Arc::new(mux), sent)
}
