//! Helius LaserStream fallback client.
//!
//! Speaks the same Yellowstone contract as the primary but authenticates
//! with an `x-api-key` metadata header, so the channel is dialed directly
//! and the key injected through a per-RPC interceptor.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tonic::metadata::AsciiMetadataValue;
use tonic::service::Interceptor;
use tonic::transport::{Channel, ClientTlsConfig};
use tracing::{debug, info};
use yellowstone_grpc_proto::geyser::geyser_client::GeyserClient;
use yellowstone_grpc_proto::prelude::SubscribeUpdate;

use lpstream_config::HeliusConfig;

use crate::client::{
    build_subscribe_request, ClientStreams, StreamClient, CONNECT_TIMEOUT, ERROR_BUFFER,
    KEEPALIVE_INTERVAL, KEEPALIVE_TIMEOUT, MAX_MESSAGE_SIZE, UPDATE_BUFFER,
};

const API_KEY_HEADER: &str = "x-api-key";

#[derive(Clone)]
struct ApiKeyInterceptor {
    api_key: AsciiMetadataValue,
}

impl ApiKeyInterceptor {
    fn new(api_key: &str) -> Result<Self> {
        let api_key = api_key
            .parse()
            .map_err(|_| anyhow!("helius api key is not valid header metadata"))?;
        Ok(Self { api_key })
    }
}

impl Interceptor for ApiKeyInterceptor {
    fn call(&mut self, mut request: tonic::Request<()>) -> Result<tonic::Request<()>, tonic::Status> {
        request
            .metadata_mut()
            .insert(API_KEY_HEADER, self.api_key.clone());
        Ok(request)
    }
}

pub struct HeliusStreamClient {
    cfg: HeliusConfig,
    interceptor: ApiKeyInterceptor,
    stream_task: Option<JoinHandle<()>>,
}

impl HeliusStreamClient {
    pub fn new(cfg: HeliusConfig) -> Result<Self> {
        cfg.validate()?;
        if cfg.program_filters.is_empty() {
            return Err(anyhow!("helius client requires at least one program filter"));
        }
        let interceptor = ApiKeyInterceptor::new(&cfg.api_key)?;
        Ok(Self {
            cfg,
            interceptor,
            stream_task: None,
        })
    }
}

#[async_trait]
impl StreamClient for HeliusStreamClient {
    fn name(&self) -> &'static str {
        "helius"
    }

    fn replay_window(&self) -> u64 {
        self.cfg.replay_slots
    }

    fn retry_delay(&self) -> Duration {
        self.cfg.reconnect_backoff
    }

    async fn connect(&mut self) -> Result<()> {
        let endpoint = self.cfg.grpc_endpoint.trim();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(anyhow!(
                "helius grpc endpoint must be an explicit http(s):// URL: {endpoint}"
            ));
        }
        info!(
            endpoint = %endpoint,
            api_key = %self.cfg.masked_api_key(),
            "connecting helius fallback source"
        );
        Ok(())
    }

    async fn subscribe(&mut self, start_slot: u64) -> Result<ClientStreams> {
        let (updates_tx, updates_rx) = mpsc::channel(UPDATE_BUFFER);
        let (errors_tx, errors_rx) = mpsc::channel(ERROR_BUFFER);

        let cfg = self.cfg.clone();
        let interceptor = self.interceptor.clone();
        self.stream_task = Some(tokio::spawn(async move {
            if let Err(error) = stream_updates(cfg, interceptor, start_slot, updates_tx).await {
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
    cfg: HeliusConfig,
    interceptor: ApiKeyInterceptor,
    start_slot: u64,
    updates: mpsc::Sender<SubscribeUpdate>,
) -> Result<()> {
    let mut endpoint = Channel::from_shared(cfg.grpc_endpoint.clone())
        .context("invalid helius endpoint")?
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(cfg.request_timeout)
        .http2_keep_alive_interval(KEEPALIVE_INTERVAL)
        .keep_alive_timeout(KEEPALIVE_TIMEOUT)
        .keep_alive_while_idle(true)
        .tcp_nodelay(true);
    if cfg.grpc_endpoint.trim().to_ascii_lowercase().starts_with("https://") {
        endpoint = endpoint
            .tls_config(ClientTlsConfig::new().with_native_roots())
            .context("invalid helius TLS config")?;
    }

    let channel = endpoint.connect().await.context("connect helius laserstream")?;
    let mut client = GeyserClient::with_interceptor(channel, interceptor)
        .max_decoding_message_size(MAX_MESSAGE_SIZE);

    let request = build_subscribe_request(&cfg.program_filters, start_slot);
    let mut stream = client
        .subscribe(futures_util::stream::iter(vec![request]))
        .await
        .context("open helius stream")?
        .into_inner();
    info!(start_slot, "helius subscription established");

    loop {
        match stream.message().await {
            Ok(Some(update)) => {
                if updates.send(update).await.is_err() {
                    debug!("helius update receiver dropped; stopping stream task");
                    return Ok(());
                }
            }
            Ok(None) => return Err(anyhow!("helius stream closed by server")),
            Err(status) => return Err(anyhow!("helius stream recv: {status}")),
        }
    }
}
