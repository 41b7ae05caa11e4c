// src/ingest/mod.rs
//! Ingestion consumer: turns queue deliveries into stored observations and
//! decides, per failure class, whether a delivery is acked or requeued.

pub mod amqp;
pub mod message;

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use std::sync::Arc;

use crate::ingest::message::{decode, parse_observation, peek_title, Encoding, MessageError};
use crate::store::{ErrorKind, InsertOutcome, ObservationStore, StoreError};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "ingest_messages_total",
            "Queue deliveries handled, labelled by outcome."
        );
        describe_counter!(
            "ingest_reconnects_total",
            "Store reconnect attempts made after a connectivity failure."
        );
        describe_counter!(
            "ingest_queue_reconnects_total",
            "Broker reconnect attempts made after the consumer stream broke."
        );
    });
}

/// What happens to the delivery once handling is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    Requeue,
}

/// How a single delivery was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Stored,
    /// Same `(title, date)` already stored.
    Duplicate,
    /// Missing or invalid field; never retried.
    Malformed(MessageError),
    /// Storage refused the row; the write was rolled back.
    Rejected,
    /// Connectivity loss; one reconnect was attempted.
    Transient { reconnected: bool },
    Unknown,
}

impl Outcome {
    pub fn disposition(&self) -> Disposition {
        match self {
            Outcome::Stored | Outcome::Duplicate | Outcome::Malformed(_) | Outcome::Rejected => {
                Disposition::Ack
            }
            Outcome::Transient { .. } | Outcome::Unknown => Disposition::Requeue,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Stored => "stored",
            Outcome::Duplicate => "duplicate",
            Outcome::Malformed(_) => "malformed",
            Outcome::Rejected => "rejected",
            Outcome::Transient { .. } => "transient",
            Outcome::Unknown => "unknown",
        }
    }
}

/// Writes scraped observations into the store.
pub struct Dumper {
    store: Arc<dyn ObservationStore>,
}

impl Dumper {
    pub fn new(store: Arc<dyn ObservationStore>) -> Self {
        ensure_metrics_described();
        Self { store }
    }

    /// Handle one delivery body. Never panics and never leaves the delivery
    /// without a disposition.
    pub async fn handle(&self, payload: &[u8], encoding: Encoding) -> Outcome {
        tracing::debug!(bytes = payload.len(), ?encoding, "received delivery");

        let outcome = match decode(payload, encoding) {
            Err(e) => {
                tracing::error!(error = %e, "invalid result, discarding");
                Outcome::Malformed(e)
            }
            Ok(body) => self.handle_value(&body).await,
        };

        counter!("ingest_messages_total", "outcome" => outcome.as_str()).increment(1);
        outcome
    }

    async fn handle_value(&self, body: &serde_json::Value) -> Outcome {
        let observation = match parse_observation(body) {
            Ok(o) => o,
            Err(e) => {
                let title = peek_title(body).unwrap_or_default();
                tracing::error!(%title, error = %e, "invalid result, discarding");
                return Outcome::Malformed(e);
            }
        };
        let title = observation.title.as_str();

        match self.store.insert(&observation).await {
            Ok(InsertOutcome::Inserted) => {
                tracing::debug!(%title, vendor = %observation.vendor, date = %observation.date, "stored");
                Outcome::Stored
            }
            Ok(InsertOutcome::Duplicate) => {
                tracing::info!(%title, date = %observation.date, "already stored for this day, ignoring");
                Outcome::Duplicate
            }
            Err(e) => self.recover(title, e).await,
        }
    }

    async fn recover(&self, title: &str, err: StoreError) -> Outcome {
        match err.kind() {
            ErrorKind::Transient => {
                tracing::error!(%title, error = %err, class = "transient", "db error occurred");
                tracing::info!("trying to reconnect to the db");
                counter!("ingest_reconnects_total").increment(1);
                let reconnected = match self.store.reconnect().await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::error!(error = %e, "reconnect failed");
                        false
                    }
                };
                Outcome::Transient { reconnected }
            }
            ErrorKind::NonRetryable => {
                tracing::error!(%title, error = %err, class = "non_retryable", "db error occurred, discarding");
                Outcome::Rejected
            }
            ErrorKind::Unknown => {
                tracing::error!(%title, error = %err, class = "unknown", "error occurred when dumping the result");
                Outcome::Unknown
            }
        }
    }
}
