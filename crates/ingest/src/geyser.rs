//! Primary Yellowstone Geyser stream client (`x-token` auth).

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tonic::transport::ClientTlsConfig;
use tracing::{debug, info, warn};
use yellowstone_grpc_client::GeyserGrpcClient;
use yellowstone_grpc_proto::prelude::{subscribe_update, SubscribeRequest, SubscribeRequestPing};

use lpstream_config::GeyserConfig;

use crate::client::{
    build_subscribe_request, ClientStreams, StreamClient, CONNECT_TIMEOUT, ERROR_BUFFER,
    KEEPALIVE_INTERVAL, KEEPALIVE_TIMEOUT, MAX_MESSAGE_SIZE, UPDATE_BUFFER,
};

/// Slots rewound on every (re)subscribe of the primary source.
pub const REPLAY_SLOT_WINDOW: u64 = 64;
const RETRY_DELAY: Duration = Duration::from_secs(5);

pub struct GeyserStreamClient {
    cfg: GeyserConfig,
    stream_task: Option<JoinHandle<()>>,
}

impl GeyserStreamClient {
    pub fn new(cfg: GeyserConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            stream_task: None,
        })
    }
}

#[async_trait]
impl StreamClient for GeyserStreamClient {
    fn name(&self) -> &'static str {
        "geyser"
    }

    fn replay_window(&self) -> u64 {
        REPLAY_SLOT_WINDOW
    }

    fn retry_delay(&self) -> Duration {
        RETRY_DELAY
    }

    async fn connect(&mut self) -> Result<()> {
        let endpoint = self.cfg.endpoint.trim();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(anyhow!(
                "geyser endpoint must be an explicit http(s):// URL: {endpoint}"
            ));
        }
        info!(
            endpoint = %endpoint,
            api_key = %self.cfg.masked_api_key(),
            programs = self.cfg.program_filters.len(),
            "connecting primary geyser source"
        );
        Ok(())
    }

    async fn subscribe(&mut self, start_slot: u64) -> Result<ClientStreams> {
        let (updates_tx, updates_rx) = mpsc::channel(UPDATE_BUFFER);
        let (errors_tx, errors_rx) = mpsc::channel(ERROR_BUFFER);

        let cfg = self.cfg.clone();
        self.stream_task = Some(tokio::spawn(async move {
            if let Err(error) = stream_updates(cfg, start_slot, updates_tx).await {
                let _ = errors_tx.send(error).await;
            }
        }));

        Ok(ClientStreams {
            updates: updates_rx,
            errors: errors_rx,
        })
    }

    async fn close(&mut self) {
        if let Some(task) = self.stream_task.take() {
            task.abort();
        }
    }
}

async fn stream_updates(
    cfg: GeyserConfig,
    start_slot: u64,
    updates: mpsc::Sender<yellowstone_grpc_proto::prelude::SubscribeUpdate>,
) -> Result<()> {
    let use_tls = cfg.endpoint.trim().to_ascii_lowercase().starts_with("https://");
    let mut builder = GeyserGrpcClient::build_from_shared(cfg.endpoint.clone())
        .context("invalid geyser endpoint")?
        .x_token(Some(cfg.api_key.clone()))
        .context("invalid geyser x-token metadata")?
        .connect_timeout(CONNECT_TIMEOUT)
        .http2_keep_alive_interval(KEEPALIVE_INTERVAL)
        .keep_alive_timeout(KEEPALIVE_TIMEOUT)
        .keep_alive_while_idle(true)
        .max_decoding_message_size(MAX_MESSAGE_SIZE)
        .tcp_nodelay(true);
    if use_tls {
        builder = builder
            .tls_config(ClientTlsConfig::new().with_native_roots())
            .context("invalid geyser TLS config")?;
    }

    let mut client = builder.connect().await.context("connect geyser")?;
    let (mut subscribe_tx, mut stream) = client.subscribe().await.context("open geyser stream")?;

    subscribe_tx
        .send(build_subscribe_request(&cfg.program_filters, start_slot))
        .await
        .context("send geyser subscribe request")?;
    info!(start_slot, "geyser subscription established");

    while let Some(message) = stream.next().await {
        let update = message.context("geyser stream recv")?;

        if matches!(
            update.update_oneof.as_ref(),
            Some(subscribe_update::UpdateOneof::Ping(_))
        ) {
            let pong = SubscribeRequest {
                ping: Some(SubscribeRequestPing { id: 1 }),
                ..SubscribeRequest::default()
            };
            if let Err(error) = subscribe_tx.send(pong).await {
                warn!(error = %error, "failed answering geyser ping");
                return Err(anyhow!("geyser ping response failed: {error}"));
            }
        }

        if updates.send(update).await.is_err() {
            debug!("geyser update receiver dropped; stopping stream task");
            return Ok(());
        }
    }

    Err(anyhow!("geyser stream closed by server"))
}
