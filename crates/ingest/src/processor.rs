//! Update dispatch and slot-commitment tracking.
//!
//! The processor runs in a single task and owns every piece of mutable
//! pipeline state: the decoder's account registry, the slot-time cache, the
//! pending provisional swaps, and the per-slot block heads. Swaps are
//! published eagerly at confirmed commitment and resolved into cleared or
//! undo copies when the slot finalizes or dies.

use anyhow::Result;
use prometheus::{IntCounter, Opts, Registry};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use yellowstone_grpc_proto::prelude::{
    subscribe_update, CommitmentLevel, SubscribeUpdate, SubscribeUpdateAccount,
    SubscribeUpdateBlockMeta, SubscribeUpdateSlot, SubscribeUpdateTransaction,
};

use lpstream_decoder::{meteora, orca, raydium, DecodeError, SwapDecoder};
use lpstream_proto::{block_status, BlockHead, SwapEvent, CHAIN_ID_SOLANA};
use lpstream_publish::SwapPublisher;

use crate::slot_cache::SlotTimeCache;
use crate::txmeta::convert_tx_meta;

/// Pending slots older than this many slots behind the live tip are dropped
/// as abandoned so an upstream that never resolves them cannot leak memory.
pub const DEFAULT_ABANDON_HORIZON_SLOTS: u64 = 1_024;

/// Processor failure modes. Decode errors abort only the offending
/// transaction; publish errors bubble up so the caller can decide when the
/// run is no longer healthy.
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("publish: {0}")]
    Publish(#[source] anyhow::Error),
}

/// Per-program swap and error counters.
pub struct ProcessorMetrics {
    raydium_swaps: IntCounter,
    raydium_errors: IntCounter,
    orca_swaps: IntCounter,
    orca_errors: IntCounter,
    meteora_swaps: IntCounter,
    meteora_errors: IntCounter,
}

impl ProcessorMetrics {
    pub fn register(registry: &Registry) -> Result<Self> {
        let build = |name: &str, help: &str| -> Result<IntCounter> {
            let counter =
                IntCounter::with_opts(Opts::new(name, help).namespace("dex").subsystem("geyser"))?;
            registry.register(Box::new(counter.clone()))?;
            Ok(counter)
        };
        Ok(Self {
            raydium_swaps: build(
                "ingestor_raydium_swaps_total",
                "Total Raydium swaps decoded from geyser transactions",
            )?,
            raydium_errors: build(
                "ingestor_raydium_decode_errors_total",
                "Raydium swap decode or publish errors",
            )?,
            orca_swaps: build(
                "ingestor_orca_swaps_total",
                "Total Orca swaps decoded from geyser transactions",
            )?,
            orca_errors: build(
                "ingestor_orca_decode_errors_total",
                "Orca swap decode or publish errors",
            )?,
            meteora_swaps: build(
                "ingestor_meteora_swaps_total",
                "Total Meteora swaps decoded from geyser transactions",
            )?,
            meteora_errors: build(
                "ingestor_meteora_decode_errors_total",
                "Meteora swap decode or publish errors",
            )?,
        })
    }

    fn record_swap(&self, program_id: &str) {
        match program_id {
            raydium::PROGRAM_ID => self.raydium_swaps.inc(),
            orca::PROGRAM_ID => self.orca_swaps.inc(),
            _ => {
                if meteora::program_kind_for_id(program_id).is_some() {
                    self.meteora_swaps.inc();
                }
            }
        }
    }

    fn record_error(&self, program_id: &str) {
        match program_id {
            raydium::PROGRAM_ID => self.raydium_errors.inc(),
            orca::PROGRAM_ID => self.orca_errors.inc(),
            _ => {
                if meteora::program_kind_for_id(program_id).is_some() {
                    self.meteora_errors.inc();
                }
            }
        }
    }

    pub fn raydium_error_count(&self) -> u64 {
        self.raydium_errors.get()
    }

    pub fn raydium_swap_count(&self) -> u64 {
        self.raydium_swaps.get()
    }
}

/// Single-owner update dispatcher.
pub struct Processor<P: SwapPublisher> {
    publisher: P,
    decoder: SwapDecoder,
    slot_cache: Arc<SlotTimeCache>,
    pending: HashMap<u64, Vec<SwapEvent>>,
    heads: HashMap<u64, BlockHead>,
    abandon_horizon: u64,
    metrics: ProcessorMetrics,
}

impl<P: SwapPublisher> Processor<P> {
    pub fn new(publisher: P, slot_cache: Arc<SlotTimeCache>, metrics: ProcessorMetrics) -> Self {
        Self {
            publisher,
            decoder: SwapDecoder::new(),
            slot_cache,
            pending: HashMap::new(),
            heads: HashMap::new(),
            abandon_horizon: DEFAULT_ABANDON_HORIZON_SLOTS,
            metrics,
        }
    }

    pub fn with_abandon_horizon(mut self, slots: u64) -> Self {
        self.abandon_horizon = slots;
        self
    }

    pub fn decoder_mut(&mut self) -> &mut SwapDecoder {
        &mut self.decoder
    }

    pub fn metrics(&self) -> &ProcessorMetrics {
        &self.metrics
    }

    pub fn pending_slot_count(&self) -> usize {
        self.pending.len()
    }

    /// Routes one upstream update. Ping and unrecognised variants are
    /// ignored.
    pub async fn handle_update(&mut self, update: &SubscribeUpdate) -> Result<(), ProcessorError> {
        match update.update_oneof.as_ref() {
            Some(subscribe_update::UpdateOneof::Transaction(tx)) => {
                self.handle_transaction(tx).await
            }
            Some(subscribe_update::UpdateOneof::BlockMeta(meta)) => {
                self.handle_block_meta(meta).await
            }
            Some(subscribe_update::UpdateOneof::Account(account)) => {
                self.handle_account(account);
                Ok(())
            }
            Some(subscribe_update::UpdateOneof::Slot(slot)) => self.handle_slot(slot).await,
            _ => Ok(()),
        }
    }

    async fn handle_transaction(
        &mut self,
        tx: &SubscribeUpdateTransaction,
    ) -> Result<(), ProcessorError> {
        let events = match self.decoder.decode_transaction(tx) {
            Ok(events) => events,
            Err(error) => {
                self.metrics.record_error(&error.program);
                return Err(ProcessorError::Decode(error));
            }
        };

        if let Some(meta) = convert_tx_meta(tx) {
            self.publisher
                .publish_tx_meta(&meta)
                .await
                .map_err(ProcessorError::Publish)?;
        }

        for event in events {
            self.metrics.record_swap(&event.program_id);
            if let Err(error) = self.publisher.publish_swap(&event).await {
                self.metrics.record_error(&event.program_id);
                return Err(ProcessorError::Publish(error));
            }
            self.pending.entry(event.slot).or_default().push(event);
        }
        Ok(())
    }

    async fn handle_block_meta(
        &mut self,
        meta: &SubscribeUpdateBlockMeta,
    ) -> Result<(), ProcessorError> {
        let ts_sec = meta
            .block_time
            .as_ref()
            .map(|ts| ts.timestamp.max(0) as u64)
            .unwrap_or(0);
        if ts_sec > 0 {
            self.slot_cache.set(meta.slot, ts_sec as i64);
        }

        let head = BlockHead {
            chain_id: CHAIN_ID_SOLANA,
            slot: meta.slot,
            ts_sec,
            status: block_status::CONFIRMED.to_string(),
        };
        self.heads.insert(head.slot, head.clone());
        self.publisher
            .publish_block_head(&head)
            .await
            .map_err(ProcessorError::Publish)
    }

    fn handle_account(&mut self, account: &SubscribeUpdateAccount) {
        self.decoder.handle_account(account);
    }

    async fn handle_slot(&mut self, update: &SubscribeUpdateSlot) -> Result<(), ProcessorError> {
        let slot = update.slot;
        match update.status() {
            CommitmentLevel::Finalized => {
                self.resolve_slot(slot, false).await?;
                self.publish_block_head_status(slot, block_status::FINALIZED)
                    .await?;
            }
            CommitmentLevel::Dead => {
                self.resolve_slot(slot, true).await?;
                self.publish_block_head_status(slot, block_status::DEAD)
                    .await?;
            }
            _ => return Ok(()),
        }
        self.prune_abandoned(slot);
        Ok(())
    }

    /// Republishes every pending swap for the slot as a cleared copy
    /// (`is_undo = false`) or an undo copy (`is_undo = true`), preserving the
    /// original publish order, then forgets the slot.
    async fn resolve_slot(&mut self, slot: u64, is_undo: bool) -> Result<(), ProcessorError> {
        let Some(events) = self.pending.get(&slot) else {
            return Ok(());
        };
        for event in events {
            let mut resolved = event.clone();
            resolved.provisional = false;
            resolved.is_undo = is_undo;
            if let Err(error) = self.publisher.publish_swap(&resolved).await {
                self.metrics.record_error(&resolved.program_id);
                return Err(ProcessorError::Publish(error));
            }
        }
        self.pending.remove(&slot);
        Ok(())
    }

    async fn publish_block_head_status(
        &mut self,
        slot: u64,
        status: &str,
    ) -> Result<(), ProcessorError> {
        let Some(head) = self.heads.get(&slot) else {
            return Ok(());
        };
        let mut updated = head.clone();
        updated.status = status.to_string();
        self.publisher
            .publish_block_head(&updated)
            .await
            .map_err(ProcessorError::Publish)?;
        self.heads.remove(&slot);
        Ok(())
    }

    /// Backstop against slots the upstream never resolves.
    fn prune_abandoned(&mut self, current_slot: u64) {
        if self.abandon_horizon == 0 {
            return;
        }
        let threshold = current_slot.saturating_sub(self.abandon_horizon);
        if threshold == 0 {
            return;
        }

        let stale: Vec<u64> = self
            .pending
            .keys()
            .chain(self.heads.keys())
            .filter(|slot| **slot < threshold)
            .copied()
            .collect();
        for slot in stale {
            let dropped_swaps = self.pending.remove(&slot).map(|v| v.len()).unwrap_or(0);
            let had_head = self.heads.remove(&slot).is_some();
            if dropped_swaps > 0 || had_head {
                warn!(slot, dropped_swaps, had_head, "abandoned unresolved slot");
            } else {
                debug!(slot, "abandoned empty slot entry");
            }
        }
    }
}
