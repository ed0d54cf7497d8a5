//! Message definitions for the `dex.sol.v1` wire contract. Field numbers are
//! frozen; only additive changes are allowed.

/// Unsigned 128-bit value split into two u64 words.
#[derive(Clone, Copy, PartialEq, Eq, ::prost::Message)]
pub struct U128 {
    #[prost(uint64, tag = "1")]
    pub hi: u64,
    #[prost(uint64, tag = "2")]
    pub lo: u64,
}

/// A single decoded swap, canonically oriented (`mint_base` < `mint_quote`
/// under the quote-priority order). Exactly one of `base_in`/`base_out` and
/// one of `quote_in`/`quote_out` is non-zero.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SwapEvent {
    #[prost(uint32, tag = "1")]
    pub chain_id: u32,
    #[prost(uint64, tag = "2")]
    pub slot: u64,
    #[prost(string, tag = "3")]
    pub sig: ::prost::alloc::string::String,
    #[prost(uint32, tag = "4")]
    pub index: u32,
    #[prost(string, tag = "5")]
    pub program_id: ::prost::alloc::string::String,
    #[prost(string, tag = "6")]
    pub pool_id: ::prost::alloc::string::String,
    #[prost(string, tag = "7")]
    pub mint_base: ::prost::alloc::string::String,
    #[prost(string, tag = "8")]
    pub mint_quote: ::prost::alloc::string::String,
    #[prost(uint32, tag = "9")]
    pub dec_base: u32,
    #[prost(uint32, tag = "10")]
    pub dec_quote: u32,
    #[prost(uint64, tag = "11")]
    pub base_in: u64,
    #[prost(uint64, tag = "12")]
    pub base_out: u64,
    #[prost(uint64, tag = "13")]
    pub quote_in: u64,
    #[prost(uint64, tag = "14")]
    pub quote_out: u64,
    #[prost(uint32, tag = "15")]
    pub fee_bps: u32,
    #[prost(uint64, tag = "16")]
    pub reserves_base: u64,
    #[prost(uint64, tag = "17")]
    pub reserves_quote: u64,
    #[prost(message, optional, tag = "18")]
    pub sqrt_price_q64_pre: ::core::option::Option<U128>,
    #[prost(message, optional, tag = "19")]
    pub sqrt_price_q64_post: ::core::option::Option<U128>,
    #[prost(int32, tag = "20")]
    pub tick_pre: i32,
    #[prost(int32, tag = "21")]
    pub tick_post: i32,
    #[prost(bool, tag = "22")]
    pub provisional: bool,
    #[prost(bool, tag = "23")]
    pub is_undo: bool,
}

/// Block-level commitment marker. `status` is one of `confirmed`,
/// `finalized`, `dead`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BlockHead {
    #[prost(uint32, tag = "1")]
    pub chain_id: u32,
    #[prost(uint64, tag = "2")]
    pub slot: u64,
    #[prost(uint64, tag = "3")]
    pub ts_sec: u64,
    #[prost(string, tag = "4")]
    pub status: ::prost::alloc::string::String,
}

/// Per-transaction execution metadata.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TxMeta {
    #[prost(uint32, tag = "1")]
    pub chain_id: u32,
    #[prost(uint64, tag = "2")]
    pub slot: u64,
    #[prost(string, tag = "3")]
    pub sig: ::prost::alloc::string::String,
    #[prost(bool, tag = "4")]
    pub success: bool,
    #[prost(uint64, tag = "5")]
    pub cu_used: u64,
    #[prost(uint64, tag = "6")]
    pub cu_price: u64,
    #[prost(string, repeated, tag = "7")]
    pub log_msgs: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

/// Point-in-time pool state, published by state-snapshot consumers.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PoolSnapshot {
    #[prost(uint32, tag = "1")]
    pub chain_id: u32,
    #[prost(uint64, tag = "2")]
    pub slot: u64,
    #[prost(string, tag = "3")]
    pub pool_id: ::prost::alloc::string::String,
    #[prost(string, tag = "4")]
    pub mint_base: ::prost::alloc::string::String,
    #[prost(string, tag = "5")]
    pub mint_quote: ::prost::alloc::string::String,
    #[prost(uint64, tag = "6")]
    pub reserves_base: u64,
    #[prost(uint64, tag = "7")]
    pub reserves_quote: u64,
    #[prost(message, optional, tag = "8")]
    pub sqrt_price_q64: ::core::option::Option<U128>,
    #[prost(int32, tag = "9")]
    pub tick: i32,
    #[prost(uint32, tag = "10")]
    pub fee_bps: u32,
    #[prost(uint64, tag = "11")]
    pub ts_sec: u64,
}

/// OHLCV aggregate over a pool or a canonical pair, produced downstream from
/// the swap feed.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Candle {
    #[prost(uint32, tag = "1")]
    pub chain_id: u32,
    #[prost(string, tag = "2")]
    pub pair_id: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub pool_id: ::prost::alloc::string::String,
    #[prost(string, tag = "4")]
    pub timeframe: ::prost::alloc::string::String,
    #[prost(uint64, tag = "5")]
    pub window_start: u64,
    #[prost(double, tag = "6")]
    pub open: f64,
    #[prost(double, tag = "7")]
    pub high: f64,
    #[prost(double, tag = "8")]
    pub low: f64,
    #[prost(double, tag = "9")]
    pub close: f64,
    #[prost(message, optional, tag = "10")]
    pub volume_base: ::core::option::Option<U128>,
    #[prost(message, optional, tag = "11")]
    pub volume_quote: ::core::option::Option<U128>,
    #[prost(uint64, tag = "12")]
    pub trade_count: u64,
    #[prost(bool, tag = "13")]
    pub provisional: bool,
}
