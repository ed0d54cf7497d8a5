//! Canonical wire types exchanged over the broker (`dex.sol.v1`).
//!
//! The message structs mirror the checked-in protobuf schema; downstream
//! sinks decode the same definitions, so field numbers must never be reused.

mod dex;

pub use dex::{BlockHead, Candle, PoolSnapshot, SwapEvent, TxMeta, U128};

/// Chain identifier for Solana mainnet in the canonical feed.
pub const CHAIN_ID_SOLANA: u32 = 501;

pub mod block_status {
    pub const CONFIRMED: &str = "confirmed";
    pub const FINALIZED: &str = "finalized";
    pub const DEAD: &str = "dead";
}

impl U128 {
    pub fn from_u128(value: u128) -> Self {
        Self {
            hi: (value >> 64) as u64,
            lo: value as u64,
        }
    }

    pub fn as_u128(&self) -> u128 {
        ((self.hi as u128) << 64) | self.lo as u128
    }

    pub fn is_zero(&self) -> bool {
        self.hi == 0 && self.lo == 0
    }
}

impl From<u128> for U128 {
    fn from(value: u128) -> Self {
        Self::from_u128(value)
    }
}

impl From<U128> for u128 {
    fn from(value: U128) -> Self {
        value.as_u128()
    }
}
