//! Failover source manager.
//!
//! Runs exactly one stream client at a time and feeds a bounded update
//! channel. When the active stream fails the client is closed, the failure
//! counted, and after the per-source backoff the other client takes over
//! (with only a primary the manager retries it). Every (re)subscribe rewinds
//! by the client's replay window; broker-side message-id dedup absorbs the
//! overlap.

use anyhow::{anyhow, Result};
use prometheus::{IntCounterVec, IntGauge, Opts, Registry};
use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use yellowstone_grpc_proto::prelude::SubscribeUpdate;

use crate::client::{extract_slot, ClientStreams, StreamClient};

/// Capacity of the source-manager -> processor channel. A stalled processor
/// backpressures through here to the upstream read.
pub const UPDATE_CHANNEL_CAPACITY: usize = 128;

/// Consecutive stream failures (across sources) tolerated before the run is
/// declared fatal.
const MAX_CONSECUTIVE_FAILURES: u32 = 12;

enum StreamOutcome {
    Cancelled,
    Failed(anyhow::Error),
}

/// Operator-facing gauges for the failover loop.
#[derive(Clone)]
pub struct SourceMetrics {
    active_source: IntGauge,
    failures: IntCounterVec,
}

impl SourceMetrics {
    pub fn register(registry: &Registry) -> Result<Self> {
        let active_source = IntGauge::with_opts(
            Opts::new(
                "active_source",
                "Which ingest source is currently active (1=primary, 2=fallback, 0=none)",
            )
            .namespace("dex")
            .subsystem("ingestor"),
        )?;
        let failures = IntCounterVec::new(
            Opts::new(
                "source_failures_total",
                "Count of stream failures per ingest source",
            )
            .namespace("dex")
            .subsystem("ingestor"),
            &["source"],
        )?;
        registry.register(Box::new(active_source.clone()))?;
        registry.register(Box::new(failures.clone()))?;
        Ok(Self {
            active_source,
            failures,
        })
    }

    fn set_active(&self, position: Option<usize>) {
        let value = match position {
            Some(0) => 1,
            Some(_) => 2,
            None => 0,
        };
        self.active_source.set(value);
    }

    fn record_failure(&self, source: &str) {
        self.failures.with_label_values(&[source]).inc();
    }

    pub fn failure_count(&self, source: &str) -> u64 {
        self.failures.with_label_values(&[source]).get()
    }

    pub fn active_source_value(&self) -> i64 {
        self.active_source.get()
    }
}

pub struct SourceManager {
    clients: Vec<Box<dyn StreamClient>>,
    metrics: SourceMetrics,
}

impl SourceManager {
    /// Builds a manager over a primary and an optional fallback client.
    pub fn new(
        primary: Box<dyn StreamClient>,
        fallback: Option<Box<dyn StreamClient>>,
        metrics: SourceMetrics,
    ) -> Self {
        let mut clients = vec![primary];
        clients.extend(fallback);
        Self { clients, metrics }
    }

    /// Runs the failover loop until cancellation or a fatal failure streak.
    pub async fn run(
        mut self,
        updates_tx: mpsc::Sender<SubscribeUpdate>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let mut current = 0usize;
        let mut last_observed_slot = 0u64;
        let mut consecutive_failures = 0u32;

        loop {
            if shutdown.is_cancelled() {
                self.metrics.set_active(None);
                return Ok(());
            }

            let client_count = self.clients.len();
            let client = &mut self.clients[current];
            self.metrics.set_active(Some(current));

            let start_slot = last_observed_slot.saturating_sub(client.replay_window());
            let outcome = match open_stream(client.as_mut(), start_slot).await {
                Ok(streams) => {
                    info!(source = client.name(), start_slot, "source streaming");
                    consume_stream(
                        streams,
                        &updates_tx,
                        &shutdown,
                        &mut last_observed_slot,
                        &mut consecutive_failures,
                    )
                    .await
                }
                Err(error) => StreamOutcome::Failed(error),
            };
            client.close().await;

            match outcome {
                StreamOutcome::Cancelled => {
                    self.metrics.set_active(None);
                    return Ok(());
                }
                StreamOutcome::Failed(error) => {
                    consecutive_failures += 1;
                    self.metrics.record_failure(client.name());
                    warn!(
                        source = client.name(),
                        error = %error,
                        consecutive_failures,
                        "stream ended; backing off"
                    );
                    if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                        self.metrics.set_active(None);
                        return Err(anyhow!(
                            "giving up after {consecutive_failures} consecutive source failures: {error}"
                        ));
                    }

                    let delay = client.retry_delay();
                    current = (current + 1) % client_count;
                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            self.metrics.set_active(None);
                            return Ok(());
                        }
                        _ = time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}

async fn open_stream(client: &mut dyn StreamClient, start_slot: u64) -> Result<ClientStreams> {
    client.connect().await?;
    client.subscribe(start_slot).await
}

async fn consume_stream(
    streams: ClientStreams,
    updates_tx: &mpsc::Sender<SubscribeUpdate>,
    shutdown: &CancellationToken,
    last_observed_slot: &mut u64,
    consecutive_failures: &mut u32,
) -> StreamOutcome {
    let ClientStreams {
        mut updates,
        mut errors,
    } = streams;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return StreamOutcome::Cancelled,
            error = errors.recv() => {
                let error = error.unwrap_or_else(|| anyhow!("stream task ended"));
                return StreamOutcome::Failed(error);
            }
            update = updates.recv() => {
                let Some(update) = update else {
                    return StreamOutcome::Failed(anyhow!("update stream closed"));
                };
                *consecutive_failures = 0;
                let slot = extract_slot(&update);
                if slot > *last_observed_slot {
                    *last_observed_slot = slot;
                }
                if updates_tx.send(update).await.is_err() {
                    return StreamOutcome::Cancelled;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientStreams, ERROR_BUFFER};
    use async_trait::async_trait;
    use std::time::Duration;
    use yellowstone_grpc_proto::prelude::{subscribe_update, SubscribeUpdateBlockMeta};

    /// Scripted client: either fails on subscribe or serves a fixed list of
    /// updates and then goes quiet.
    struct ScriptedClient {
        name: &'static str,
        fail_immediately: bool,
        updates: Vec<SubscribeUpdate>,
        subscribed_from: std::sync::Arc<std::sync::Mutex<Vec<u64>>>,
    }

    #[async_trait]
    impl StreamClient for ScriptedClient {
        fn name(&self) -> &'static str {
            self.name
        }

        fn replay_window(&self) -> u64 {
            64
        }

        fn retry_delay(&self) -> Duration {
            Duration::from_millis(5)
        }

        async fn connect(&mut self) -> Result<()> {
            Ok(())
        }

        async fn subscribe(&mut self, start_slot: u64) -> Result<ClientStreams> {
            self.subscribed_from.lock().unwrap().push(start_slot);
            let (updates_tx, updates_rx) = mpsc::channel(16);
            let (errors_tx, errors_rx) = mpsc::channel(ERROR_BUFFER);

            if self.fail_immediately {
                errors_tx
                    .send(anyhow!("primary stream failed"))
                    .await
                    .expect("error channel");
            } else {
                for update in self.updates.clone() {
                    updates_tx.send(update).await.expect("update channel");
                }
                // Keep the channels open so the manager stays on this source.
                tokio::spawn(async move {
                    let _updates_tx = updates_tx;
                    let _errors_tx = errors_tx;
                    time::sleep(Duration::from_secs(60)).await;
                });
            }

            Ok(ClientStreams {
                updates: updates_rx,
                errors: errors_rx,
            })
        }

        async fn close(&mut self) {}
    }

    fn block_meta_update(slot: u64) -> SubscribeUpdate {
        SubscribeUpdate {
            update_oneof: Some(subscribe_update::UpdateOneof::BlockMeta(
                SubscribeUpdateBlockMeta {
                    slot,
                    ..SubscribeUpdateBlockMeta::default()
                },
            )),
            ..SubscribeUpdate::default()
        }
    }

    #[tokio::test]
    async fn failover_switches_to_fallback_and_counts_failure() {
        let registry = Registry::new();
        let metrics = SourceMetrics::register(&registry).expect("metrics");
        let metrics_view = metrics.clone();

        let primary_subscribes = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let fallback_subscribes = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));

        let primary = Box::new(ScriptedClient {
            name: "geyser",
            fail_immediately: true,
            updates: Vec::new(),
            subscribed_from: primary_subscribes.clone(),
        });
        let fallback = Box::new(ScriptedClient {
            name: "helius",
            fail_immediately: false,
            updates: vec![block_meta_update(456)],
            subscribed_from: fallback_subscribes.clone(),
        });

        let manager = SourceManager::new(primary, Some(fallback), metrics);
        let (updates_tx, mut updates_rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
        let shutdown = CancellationToken::new();

        let run = tokio::spawn(manager.run(updates_tx, shutdown.clone()));

        let update = time::timeout(Duration::from_secs(5), updates_rx.recv())
            .await
            .expect("fallback update within deadline")
            .expect("update");
        assert_eq!(extract_slot(&update), 456);

        // The fallback is now the active source and the primary failure is
        // accounted for.
        assert_eq!(metrics_view.active_source_value(), 2);
        assert_eq!(metrics_view.failure_count("geyser"), 1);
        assert_eq!(metrics_view.failure_count("helius"), 0);

        shutdown.cancel();
        let result = time::timeout(Duration::from_secs(5), run)
            .await
            .expect("manager stops")
            .expect("join");
        assert!(result.is_ok());

        assert_eq!(primary_subscribes.lock().unwrap().len(), 1);
        assert_eq!(fallback_subscribes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failover_metrics_track_failures_and_active_source() {
        let registry = Registry::new();
        let metrics = SourceMetrics::register(&registry).expect("metrics");
        metrics.set_active(Some(1));
        assert_eq!(metrics.active_source_value(), 2);
        metrics.record_failure("geyser");
        assert_eq!(metrics.failure_count("geyser"), 1);
        assert_eq!(metrics.failure_count("helius"), 0);
        metrics.set_active(None);
        assert_eq!(metrics.active_source_value(), 0);
    }

    #[tokio::test]
    async fn first_subscribes_start_from_slot_zero() {
        let registry = Registry::new();
        let metrics = SourceMetrics::register(&registry).expect("metrics");

        let primary_subscribes = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let primary = Box::new(ScriptedClient {
            name: "geyser",
            fail_immediately: true,
            updates: Vec::new(),
            subscribed_from: primary_subscribes.clone(),
        });
        let fallback_subscribes = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let fallback = Box::new(ScriptedClient {
            name: "helius",
            fail_immediately: false,
            updates: vec![block_meta_update(1_000)],
            subscribed_from: fallback_subscribes.clone(),
        });

        let manager = SourceManager::new(primary, Some(fallback), metrics);
        let (updates_tx, mut updates_rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
        let shutdown = CancellationToken::new();
        let run = tokio::spawn(manager.run(updates_tx, shutdown.clone()));

        let _ = time::timeout(Duration::from_secs(5), updates_rx.recv())
            .await
            .expect("update within deadline");

        shutdown.cancel();
        let _ = time::timeout(Duration::from_secs(5), run).await.expect("stops");

        // First subscribes start from zero (no slots observed yet).
        assert_eq!(primary_subscribes.lock().unwrap().as_slice(), &[0]);
        assert_eq!(fallback_subscribes.lock().unwrap().as_slice(), &[0]);
    }
}
