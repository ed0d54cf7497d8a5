//! Durable publishing of canonical events to JetStream.
//!
//! Every publish carries a `Nats-Msg-Id` header so the broker deduplicates
//! replay-window overlap, and waits for the stream ack (bounded by the
//! configured timeout). An ack naming a different stream than the configured
//! one is treated as a failure.

pub mod subjects;

use anyhow::{anyhow, Context, Result};
use async_nats::jetstream;
use async_trait::async_trait;
use prost::Message;
use std::time::Duration;
use tokio::time;
use tracing::{debug, warn};

use lpstream_config::NatsConfig;
use lpstream_proto::{BlockHead, Candle, PoolSnapshot, SwapEvent, TxMeta};

const CLIENT_NAME: &str = "lpstream-ingestor";
const MSG_ID_HEADER: &str = "Nats-Msg-Id";
const CONTENT_TYPE_HEADER: &str = "Content-Type";
const CONTENT_TYPE_PROTOBUF: &str = "application/protobuf";
const DRAIN_BUDGET: Duration = Duration::from_secs(2);

/// Typed publish surface the processor drives. Implementations must be safe
/// to call concurrently and must not return before the broker acknowledged
/// the message (or the attempt failed).
#[async_trait]
pub trait SwapPublisher: Send + Sync {
    async fn publish_swap(&self, event: &SwapEvent) -> Result<()>;
    async fn publish_block_head(&self, head: &BlockHead) -> Result<()>;
    async fn publish_tx_meta(&self, meta: &TxMeta) -> Result<()>;
}

#[async_trait]
impl<P: SwapPublisher + ?Sized> SwapPublisher for std::sync::Arc<P> {
    async fn publish_swap(&self, event: &SwapEvent) -> Result<()> {
        (**self).publish_swap(event).await
    }

    async fn publish_block_head(&self, head: &BlockHead) -> Result<()> {
        (**self).publish_block_head(head).await
    }

    async fn publish_tx_meta(&self, meta: &TxMeta) -> Result<()> {
        (**self).publish_tx_meta(meta).await
    }
}

/// JetStream-backed publisher.
pub struct JetStreamPublisher {
    cfg: NatsConfig,
    client: async_nats::Client,
    jetstream: jetstream::Context,
}

impl JetStreamPublisher {
    /// Dials the broker and prepares a JetStream context.
    pub async fn connect(cfg: NatsConfig) -> Result<Self> {
        cfg.validate()?;
        let client = async_nats::ConnectOptions::new()
            .name(CLIENT_NAME)
            .connect(cfg.url.as_str())
            .await
            .with_context(|| format!("connect to nats at {}", cfg.url))?;
        let jetstream = jetstream::new(client.clone());
        Ok(Self {
            cfg,
            client,
            jetstream,
        })
    }

    pub fn config(&self) -> &NatsConfig {
        &self.cfg
    }

    /// Drains the connection, bounded by a two-second budget.
    pub async fn close(&self) {
        match time::timeout(DRAIN_BUDGET, self.client.drain()).await {
            Ok(Ok(())) => debug!("nats connection drained"),
            Ok(Err(error)) => warn!(error = %error, "nats drain failed"),
            Err(_) => warn!("nats drain timed out"),
        }
    }

    pub async fn publish_pool_snapshot(&self, snap: &PoolSnapshot) -> Result<()> {
        let subject = subjects::pool_snapshot_subject(&self.cfg.subject_root);
        self.publish(subject, snap.encode_to_vec(), subjects::pool_snapshot_msg_id(snap))
            .await
    }

    pub async fn publish_candle(&self, candle: &Candle) -> Result<()> {
        let subject = subjects::candle_subject(&self.cfg.subject_root, candle);
        self.publish(subject, candle.encode_to_vec(), subjects::candle_msg_id(candle))
            .await
    }

    async fn publish(&self, subject: String, payload: Vec<u8>, msg_id: String) -> Result<()> {
        let mut headers = async_nats::HeaderMap::new();
        headers.insert(MSG_ID_HEADER, msg_id.as_str());
        headers.insert(CONTENT_TYPE_HEADER, CONTENT_TYPE_PROTOBUF);

        let acked = time::timeout(self.cfg.publish_timeout, async {
            let ack_future = self
                .jetstream
                .publish_with_headers(subject.clone(), headers, payload.into())
                .await
                .map_err(anyhow::Error::from)?;
            ack_future.await.map_err(anyhow::Error::from)
        })
        .await;

        let ack = match acked {
            Ok(result) => result.with_context(|| format!("publish {subject}"))?,
            Err(_) => {
                return Err(anyhow!(
                    "publish {subject}: no ack within {:?}",
                    self.cfg.publish_timeout
                ))
            }
        };

        if !ack.stream.is_empty() && ack.stream != self.cfg.stream {
            return Err(anyhow!(
                "unexpected stream ack {:?} (expected {:?})",
                ack.stream,
                self.cfg.stream
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl SwapPublisher for JetStreamPublisher {
    async fn publish_swap(&self, event: &SwapEvent) -> Result<()> {
        let subject = subjects::swap_subject(&self.cfg.subject_root, &event.program_id);
        self.publish(subject, event.encode_to_vec(), subjects::swap_msg_id(event))
            .await
    }

    async fn publish_block_head(&self, head: &BlockHead) -> Result<()> {
        let subject = subjects::block_head_subject(&self.cfg.subject_root);
        self.publish(subject, head.encode_to_vec(), subjects::block_head_msg_id(head))
            .await
    }

    async fn publish_tx_meta(&self, meta: &TxMeta) -> Result<()> {
        let subject = subjects::tx_meta_subject(&self.cfg.subject_root);
        self.publish(subject, meta.encode_to_vec(), subjects::tx_meta_msg_id(meta))
            .await
    }
}
