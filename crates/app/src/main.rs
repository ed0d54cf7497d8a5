//! lpstream ingestor: streams the Solana firehose, decodes AMM swaps, and
//! publishes the canonical feed to JetStream.

mod metrics;

use anyhow::{anyhow, Context, Result};
use prometheus::Registry;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use lpstream_config::AppConfig;
use lpstream_ingest::{
    GeyserStreamClient, HeliusStreamClient, Processor, ProcessorError, ProcessorMetrics,
    SlotTimeCache, SourceManager, SourceMetrics, StreamClient, UPDATE_CHANNEL_CAPACITY,
};
use lpstream_publish::JetStreamPublisher;

/// Consecutive publish failures tolerated before the run is declared fatal.
const MAX_PUBLISH_FAILURES: u32 = 5;

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(error) = run().await {
        error!(error = %format_error_chain(&error), "ingestor failed");
        std::process::exit(1);
    }
    info!("ingestor stopped");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_JSON")
        .map(|value| matches!(value.trim(), "1" | "true"))
        .unwrap_or(false);
    if json {
        tracing_subscriber::fmt()
            .with_target(false)
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_target(false)
            .with_env_filter(filter)
            .compact()
            .init();
    }
}

async fn run() -> Result<()> {
    let config = AppConfig::from_env().context("load configuration")?;
    info!(
        geyser_endpoint = %config.geyser.endpoint,
        geyser_api_key = %config.geyser.masked_api_key(),
        programs = config.geyser.program_filters.len(),
        helius_fallback = config.helius.is_some(),
        nats_stream = %config.nats.stream,
        subject_root = %config.nats.subject_root,
        "configuration loaded"
    );

    let registry = Registry::new();
    let source_metrics = SourceMetrics::register(&registry).context("register source metrics")?;
    let processor_metrics =
        ProcessorMetrics::register(&registry).context("register processor metrics")?;

    let publisher = Arc::new(
        JetStreamPublisher::connect(config.nats.clone())
            .await
            .context("init nats publisher")?,
    );
    let slot_cache = Arc::new(SlotTimeCache::new());
    let mut processor = Processor::new(
        Arc::clone(&publisher),
        Arc::clone(&slot_cache),
        processor_metrics,
    );

    let primary: Box<dyn StreamClient> = Box::new(
        GeyserStreamClient::new(config.geyser.clone()).context("init geyser client")?,
    );
    let fallback: Option<Box<dyn StreamClient>> = match config.helius.clone() {
        Some(helius_cfg) => {
            info!("helius fallback enabled");
            Some(Box::new(
                HeliusStreamClient::new(helius_cfg).context("init helius client")?,
            ))
        }
        None => None,
    };

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let metrics_task = config.metrics_addr.clone().map(|addr| {
        tokio::spawn(metrics::serve_metrics(
            addr,
            registry.clone(),
            shutdown.clone(),
        ))
    });

    let (updates_tx, mut updates_rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
    let manager = SourceManager::new(primary, fallback, source_metrics);
    let source_task = tokio::spawn(manager.run(updates_tx, shutdown.clone()));

    // The processor is the single owner of all pipeline state; it consumes
    // updates until cancellation or until the source manager gives up.
    let mut run_result: Result<()> = Ok(());
    let mut publish_failures = 0u32;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            update = updates_rx.recv() => {
                let Some(update) = update else {
                    break;
                };
                match processor.handle_update(&update).await {
                    Ok(()) => publish_failures = 0,
                    Err(ProcessorError::Decode(decode)) => {
                        warn!(
                            program = %decode.program,
                            error = %decode,
                            "transaction aborted by decode error"
                        );
                    }
                    Err(ProcessorError::Publish(publish)) => {
                        publish_failures += 1;
                        error!(
                            error = %format_error_chain(&publish),
                            publish_failures,
                            "publish failed"
                        );
                        if publish_failures >= MAX_PUBLISH_FAILURES {
                            run_result = Err(anyhow!(
                                "giving up after {publish_failures} consecutive publish failures"
                            ));
                            break;
                        }
                    }
                }
            }
        }
    }

    // Teardown order: stop the source, let the channel drain, shut the
    // metrics endpoint, then drain the publisher.
    shutdown.cancel();
    match source_task.await {
        Ok(Ok(())) => {}
        Ok(Err(source_error)) => {
            if run_result.is_ok() {
                run_result = Err(source_error.context("source manager"));
            }
        }
        Err(join_error) => {
            if run_result.is_ok() {
                run_result = Err(anyhow!("source manager panicked: {join_error}"));
            }
        }
    }
    if let Some(task) = metrics_task {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(metrics_error)) => warn!(error = %metrics_error, "metrics server error"),
            Err(join_error) => warn!(error = %join_error, "metrics server panicked"),
        }
    }
    publisher.close().await;

    run_result
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(stream) => stream,
                    Err(error) => {
                        warn!(error = %error, "failed installing SIGTERM handler");
                        let _ = ctrl_c.await;
                        info!("shutdown signal received");
                        shutdown.cancel();
                        return;
                    }
                };
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }
        info!("shutdown signal received");
        shutdown.cancel();
    });
}

fn format_error_chain(error: &anyhow::Error) -> String {
    let mut chain = String::new();
    for (idx, cause) in error.chain().enumerate() {
        if idx > 0 {
            chain.push_str(" | ");
        }
        chain.push_str(&cause.to_string());
    }
    chain
}
