// src/specials.rs
//! Special finder: notifies when a watched title shows up in recent
//! observations, independent of any price comparison.

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::settings::{DEFAULT_WINDOW_DAYS, MAX_LOOKBACK_DAYS};
use crate::index::{IndexError, PriceSearch};
use crate::model::{MatchOperator, SpecialHit, WatchedTitle};
use crate::notify::NotifierMux;
use crate::store::{days_before, DateFilter, ObservationStore};

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?u)\b\w+\b").expect("word regex"));

/// Lowercased Unicode word terms.
pub fn terms(text: &str) -> Vec<String> {
    WORD.find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Does `title` satisfy `query` under `operator`? A query without any
/// terms matches nothing.
pub fn title_matches(query: &str, title: &str, operator: MatchOperator) -> bool {
    let wanted = terms(query);
    if wanted.is_empty() {
        return false;
    }
    let have: HashSet<String> = terms(title).into_iter().collect();
    match operator {
        MatchOperator::And => wanted.iter().all(|t| have.contains(t)),
        MatchOperator::Or => wanted.iter().any(|t| have.contains(t)),
    }
}

/// Title search straight against the observation store.
pub struct StoreSearch {
    store: Arc<dyn ObservationStore>,
}

impl StoreSearch {
    pub fn new(store: Arc<dyn ObservationStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PriceSearch for StoreSearch {
    async fn search(
        &self,
        title: &str,
        operator: MatchOperator,
        since: NaiveDate,
    ) -> Result<Vec<SpecialHit>, IndexError> {
        let rows = self
            .store
            .observations(DateFilter::Since(since))
            .await
            .map_err(|e| IndexError::Decode(format!("store search: {e}")))?;
        Ok(rows
            .into_iter()
            .map(|r| r.observation)
            .filter(|o| title_matches(title, &o.title, operator))
            .map(|o| SpecialHit {
                title: o.title,
                price: o.price,
                url: o.url,
                vendor: Some(o.vendor),
                date: o.date,
            })
            .collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialsOutcome {
    Completed { titles: usize, notified: usize, failed: usize },
    /// No titles were given and none are configured.
    NotConfigured,
}

pub fn special_message(hit: &SpecialHit) -> String {
    let mut text = format!("Special found: {} at {}", hit.title, hit.price.normalize());
    if let Some(v) = &hit.vendor {
        text.push_str(&format!(" ({v})"));
    }
    if let Some(u) = &hit.url {
        text.push('\n');
        text.push_str(u);
    }
    text
}

pub struct SpecialFinder {
    search: Arc<dyn PriceSearch>,
    notifier: Arc<NotifierMux>,
    watched: Vec<WatchedTitle>,
    window_days: i64,
}

impl SpecialFinder {
    pub fn new(search: Arc<dyn PriceSearch>, notifier: Arc<NotifierMux>) -> Self {
        Self {
            search,
            notifier,
            watched: Vec::new(),
            window_days: DEFAULT_WINDOW_DAYS,
        }
    }

    pub fn with_watched(mut self, watched: Vec<WatchedTitle>) -> Self {
        self.watched = watched;
        self
    }

    /// Callers validate the window; out-of-range values are clamped to
    /// `1..=MAX_LOOKBACK_DAYS`.
    pub fn with_window_days(mut self, days: i64) -> Self {
        self.window_days = days.clamp(1, MAX_LOOKBACK_DAYS);
        self
    }

    pub async fn find_specials(&self, titles: Option<&[WatchedTitle]>) -> SpecialsOutcome {
        self.find_specials_on(Local::now().date_naive(), titles).await
    }

    /// Same as [`find_specials`](Self::find_specials) with an explicit "today".
    pub async fn find_specials_on(
        &self,
        today: NaiveDate,
        titles: Option<&[WatchedTitle]>,
    ) -> SpecialsOutcome {
        let titles = match titles {
            Some(t) if !t.is_empty() => t,
            _ => self.watched.as_slice(),
        };
        if titles.is_empty() {
            tracing::error!("incomplete configuration: no watched titles");
            return SpecialsOutcome::NotConfigured;
        }

        let since = days_before(today, self.window_days);
        let mut notified = 0usize;
        let mut failed = 0usize;

        for watched in titles {
            let hits = match self
                .search
                .search(&watched.title, watched.operator, since)
                .await
            {
                Ok(h) => h,
                Err(e) => {
                    tracing::warn!(title = %watched.title, error = %e, "special search failed");
                    failed += 1;
                    continue;
                }
            };
            if hits.is_empty() {
                tracing::debug!(title = %watched.title, %since, "no specials");
                continue;
            }
            tracing::info!(title = %watched.title, hits = hits.len(), "specials found");
            for hit in &hits {
                self.notifier.notify(&special_message(hit)).await;
                notified += 1;
            }
            counter!("specials_hits_total").increment(hits.len() as u64);
        }

        SpecialsOutcome::Completed {
            titles: titles.len(),
            notified,
            failed,
        }
    }
}
