//! Ingest pipeline: upstream stream clients, the failover source manager,
//! the slot-time cache, and the processor that turns raw updates into
//! published canonical events.

mod client;
mod geyser;
mod helius;
mod processor;
mod slot_cache;
mod source;
mod txmeta;

pub use client::{extract_slot, ClientStreams, StreamClient};
pub use geyser::{GeyserStreamClient, REPLAY_SLOT_WINDOW};
pub use helius::HeliusStreamClient;
pub use processor::{
    Processor, ProcessorError, ProcessorMetrics, DEFAULT_ABANDON_HORIZON_SLOTS,
};
pub use slot_cache::SlotTimeCache;
pub use source::{SourceManager, SourceMetrics, UPDATE_CHANNEL_CAPACITY};
pub use txmeta::convert_tx_meta;
