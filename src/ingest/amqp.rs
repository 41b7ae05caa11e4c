// src/ingest/amqp.rs
//! AMQP transport for the ingestion consumer.

use anyhow::{Context, Result};
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicQosOptions, BasicRejectOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties, Consumer, ExchangeKind};
use metrics::counter;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use super::message::Encoding;
use super::{Disposition, Dumper};
use crate::config::QueueSettings;

const CONSUMER_TAG: &str = "special-finder-dumper";
/// Ceiling for the delay between broker reconnect attempts.
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

pub fn exchange_kind(name: &str) -> ExchangeKind {
    match name.to_ascii_lowercase().as_str() {
        "fanout" => ExchangeKind::Fanout,
        "direct" => ExchangeKind::Direct,
        "topic" => ExchangeKind::Topic,
        "headers" => ExchangeKind::Headers,
        other => ExchangeKind::Custom(other.to_string()),
    }
}

/// Anything other than a delivery means the consumer is gone and has to be
/// rebuilt.
fn needs_reconnect<T, E>(next: &Option<Result<T, E>>) -> bool {
    !matches!(next, Some(Ok(_)))
}

/// `500ms << (attempt - 1)`, capped.
fn reconnect_delay(attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(16);
    Duration::from_millis(500u64 << shift).min(MAX_RECONNECT_DELAY)
}

async fn open(cfg: &QueueSettings) -> Result<(Connection, Channel, Consumer)> {
    let conn = Connection::connect(&cfg.conn, ConnectionProperties::default())
        .await
        .context("connect to queue")?;
    let channel = conn.create_channel().await.context("open channel")?;
    channel
        .basic_qos(1, BasicQosOptions::default())
        .await
        .context("set prefetch")?;
    channel
        .exchange_declare(
            &cfg.exchange,
            exchange_kind(&cfg.exchange_type),
            ExchangeDeclareOptions {
                durable: true,
                ..ExchangeDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await
        .with_context(|| format!("declare exchange {}", cfg.exchange))?;
    channel
        .queue_declare(
            &cfg.queue,
            QueueDeclareOptions {
                durable: true,
                ..QueueDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await
        .with_context(|| format!("declare queue {}", cfg.queue))?;
    channel
        .queue_bind(
            &cfg.queue,
            &cfg.exchange,
            "",
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .context("bind queue")?;
    let consumer = channel
        .basic_consume(
            &cfg.queue,
            CONSUMER_TAG,
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await
        .context("start consumer")?;
    Ok((conn, channel, consumer))
}

/// A bound queue consumer, delivering one message at a time.
pub struct AmqpSource {
    cfg: QueueSettings,
    conn: Connection,
    channel: Channel,
    consumer: Consumer,
}

impl AmqpSource {
    pub async fn connect(cfg: &QueueSettings) -> Result<Self> {
        let (conn, channel, consumer) = open(cfg).await?;
        tracing::info!(queue = %cfg.queue, exchange = %cfg.exchange, "dumper is ready for receiving results");
        Ok(Self {
            cfg: cfg.clone(),
            conn,
            channel,
            consumer,
        })
    }

    /// Consume until `shutdown` resolves. A broken consumer stream is rebuilt
    /// with backoff. A delivery being handled is always acked or requeued
    /// before exit.
    pub async fn run<F>(mut self, dumper: &Dumper, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            let next = tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    break;
                }
                next = self.consumer.next() => next,
            };
            if needs_reconnect(&next) {
                match &next {
                    Some(Err(e)) => tracing::error!(error = %e, "queue consumer failed"),
                    _ => tracing::warn!("consumer stream closed by broker"),
                }
                if !self.reconnect(shutdown.as_mut()).await {
                    break;
                }
                continue;
            }
            let Some(Ok(delivery)) = next else {
                continue;
            };

            let content_type = delivery
                .properties
                .content_type()
                .as_ref()
                .map(|ct| ct.as_str());
            let encoding = Encoding::from_content_type(content_type);
            let outcome = dumper.handle(&delivery.data, encoding).await;

            let res = match outcome.disposition() {
                Disposition::Ack => delivery.acker.ack(BasicAckOptions::default()).await,
                Disposition::Requeue => {
                    delivery
                        .acker
                        .reject(BasicRejectOptions { requeue: true })
                        .await
                }
            };
            if let Err(e) = res {
                tracing::error!(error = %e, outcome = outcome.as_str(), "failed to settle delivery");
            }
        }

        if let Err(e) = self.channel.close(200, "dumper shutdown").await {
            tracing::debug!(error = %e, "channel close failed");
        }
        if let Err(e) = self.conn.close(200, "dumper shutdown").await {
            tracing::warn!(error = %e, "queue connection did not close cleanly");
        }
        Ok(())
    }

    /// Rebuild connection, channel and consumer until it works. Returns
    /// `false` when shutdown was requested first.
    async fn reconnect<S>(&mut self, mut shutdown: Pin<&mut S>) -> bool
    where
        S: Future<Output = ()>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            counter!("ingest_queue_reconnects_total").increment(1);
            let opened = tokio::select! {
                _ = &mut shutdown => return false,
                opened = open(&self.cfg) => opened,
            };
            match opened {
                Ok((conn, channel, consumer)) => {
                    self.conn = conn;
                    self.channel = channel;
                    self.consumer = consumer;
                    tracing::info!(attempt, queue = %self.cfg.queue, "queue consumer re-established");
                    return true;
                }
                Err(e) => {
                    let delay = reconnect_delay(attempt);
                    tracing::warn!(attempt, error = %format!("{e:#}"), ?delay, "queue reconnect failed");
                    tokio::select! {
                        _ = &mut shutdown => return false,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchange_kinds_map_case_insensitively() {
        assert!(matches!(exchange_kind("FANOUT"), ExchangeKind::Fanout));
        assert!(matches!(exchange_kind("topic"), ExchangeKind::Topic));
        assert!(matches!(
            exchange_kind("x-delayed-message"),
            ExchangeKind::Custom(ref k) if k == "x-delayed-message"
        ));
    }

    #[test]
    fn only_a_delivery_keeps_the_consumer() {
        assert!(!needs_reconnect::<u8, String>(&Some(Ok(1))));
        assert!(needs_reconnect::<u8, String>(&Some(Err("channel closed".into()))));
        assert!(needs_reconnect::<u8, String>(&None));
    }

    #[test]
    fn reconnect_delay_doubles_up_to_the_cap() {
        assert_eq!(reconnect_delay(1), Duration::from_millis(500));
        assert_eq!(reconnect_delay(2), Duration::from_millis(1000));
        assert_eq!(reconnect_delay(4), Duration::from_millis(4000));
        assert_eq!(reconnect_delay(7), MAX_RECONNECT_DELAY);
        assert_eq!(reconnect_delay(u32::MAX), MAX_RECONNECT_DELAY);
    }
}
