//! Account registry: pool metadata snooped from the account update stream.
//!
//! Raydium CLMM fee rates live behind an indirection (`PoolState` points at
//! an `AmmConfig` which carries the trade fee); Orca Whirlpool accounts carry
//! everything inline. Entries are overwritten on re-observation and never
//! deleted.

use anyhow::{anyhow, Result};
use std::collections::HashMap;

use crate::{orca, raydium};

const DISCRIMINATOR_LEN: usize = 8;

// Raydium CLMM account discriminators (anchor account name hashes).
const RAYDIUM_POOL_STATE_DISCRIMINATOR: [u8; 8] = [247, 237, 227, 245, 215, 195, 222, 70];
const RAYDIUM_AMM_CONFIG_DISCRIMINATOR: [u8; 8] = [218, 244, 33, 104, 203, 203, 43, 111];

// Raydium PoolState: discriminator, bump, then the amm_config pubkey.
const POOL_CONFIG_OFFSET: usize = DISCRIMINATOR_LEN + 1;
const POOL_CONFIG_END: usize = POOL_CONFIG_OFFSET + 32;
// AmmConfig: discriminator, bump, index u16, owner pubkey, then trade_fee_rate.
const AMM_TRADE_FEE_OFFSET: usize = DISCRIMINATOR_LEN + 1 + 2 + 32 + 4;
const AMM_REQUIRED_LEN: usize = AMM_TRADE_FEE_OFFSET + 4;
// AmmConfig accounts are small; anything larger is almost certainly a pool.
const APPROX_CONFIG_ACCOUNT_MAX: usize = 256;

// Orca Whirlpool fixed layout offsets.
const ORCA_CONFIG_OFFSET: usize = DISCRIMINATOR_LEN;
const ORCA_FEE_RATE_OFFSET: usize = ORCA_CONFIG_OFFSET + 32 + 1 + 2 + 2;
const ORCA_PROTOCOL_FEE_OFFSET: usize = ORCA_FEE_RATE_OFFSET + 2;
const ORCA_LIQUIDITY_OFFSET: usize = ORCA_PROTOCOL_FEE_OFFSET + 2;
const ORCA_SQRT_PRICE_OFFSET: usize = ORCA_LIQUIDITY_OFFSET + 16;
const ORCA_TICK_OFFSET: usize = ORCA_SQRT_PRICE_OFFSET + 16;
const ORCA_PROTOCOL_FEE_A_OFFSET: usize = ORCA_TICK_OFFSET + 4;
const ORCA_PROTOCOL_FEE_B_OFFSET: usize = ORCA_PROTOCOL_FEE_A_OFFSET + 8;
const ORCA_TOKEN_MINT_A_OFFSET: usize = ORCA_PROTOCOL_FEE_B_OFFSET + 8;
const ORCA_TOKEN_VAULT_A_OFFSET: usize = ORCA_TOKEN_MINT_A_OFFSET + 32;
const ORCA_FEE_GROWTH_A_OFFSET: usize = ORCA_TOKEN_VAULT_A_OFFSET + 32;
const ORCA_TOKEN_MINT_B_OFFSET: usize = ORCA_FEE_GROWTH_A_OFFSET + 16;
const ORCA_TOKEN_VAULT_B_OFFSET: usize = ORCA_TOKEN_MINT_B_OFFSET + 32;
const ORCA_REQUIRED_LEN: usize = ORCA_TOKEN_VAULT_B_OFFSET + 32;

/// Metadata decoded from an Orca Whirlpool account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhirlpoolInfo {
    pub config: String,
    /// Hundredths of a basis point, as stored on chain.
    pub fee_rate: u16,
    pub protocol_fee_rate: u16,
    pub token_mint_a: String,
    pub token_vault_a: String,
    pub token_mint_b: String,
    pub token_vault_b: String,
    pub sqrt_price: u128,
    pub tick_current: i32,
    /// Slot the snapshot was observed at; used to tell pre- from post-swap
    /// state when enriching swap events.
    pub observed_slot: u64,
}

impl WhirlpoolInfo {
    pub fn fee_bps(&self) -> u16 {
        self.fee_rate / 100
    }
}

#[derive(Debug, Default)]
pub struct AccountRegistry {
    /// Raydium pool -> amm_config pubkey.
    pool_config: HashMap<String, String>,
    /// Raydium pool -> fee bps, once the bound config has been seen.
    pool_fees: HashMap<String, u16>,
    /// Raydium amm_config -> fee bps.
    config_fees: HashMap<String, u16>,
    whirlpools: HashMap<String, WhirlpoolInfo>,
}

impl AccountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes an account update by owning program.
    pub fn handle_account(&mut self, owner: &str, pubkey: &str, data: &[u8], slot: u64) {
        match owner {
            raydium::PROGRAM_ID => self.handle_raydium_account(pubkey, data),
            orca::PROGRAM_ID => {
                if let Ok(info) = decode_whirlpool(data, slot) {
                    self.whirlpools.insert(pubkey.to_string(), info);
                }
            }
            _ => {}
        }
    }

    /// Fee in basis points for a Raydium pool, when known.
    pub fn raydium_pool_fee_bps(&self, pool: &str) -> Option<u16> {
        self.pool_fees.get(pool).copied()
    }

    pub fn whirlpool(&self, pool: &str) -> Option<&WhirlpoolInfo> {
        self.whirlpools.get(pool)
    }

    pub fn raydium_pool_count(&self) -> usize {
        self.pool_config.len()
    }

    pub fn whirlpool_count(&self) -> usize {
        self.whirlpools.len()
    }

    // Future Raydium account versions may shift the discriminators, so the
    // exact checks are followed by length-based attempts.
    fn handle_raydium_account(&mut self, pubkey: &str, data: &[u8]) {
        if has_discriminator(data, &RAYDIUM_POOL_STATE_DISCRIMINATOR) {
            if let Ok(config_key) = decode_raydium_pool_config(data) {
                self.bind_pool(pubkey, config_key);
                return;
            }
        }

        if has_discriminator(data, &RAYDIUM_AMM_CONFIG_DISCRIMINATOR) {
            if let Ok(trade_fee_rate) = decode_amm_config_trade_fee(data) {
                self.bind_config(pubkey, trade_fee_rate);
                return;
            }
        }

        if data.len() > APPROX_CONFIG_ACCOUNT_MAX {
            if let Ok(config_key) = decode_raydium_pool_config(data) {
                self.bind_pool(pubkey, config_key);
                return;
            }
        }

        if let Ok(trade_fee_rate) = decode_amm_config_trade_fee(data) {
            self.bind_config(pubkey, trade_fee_rate);
            return;
        }

        if let Ok(config_key) = decode_raydium_pool_config(data) {
            self.bind_pool(pubkey, config_key);
        }
    }

    fn bind_pool(&mut self, pool: &str, config_key: String) {
        if let Some(fee) = self.config_fees.get(&config_key) {
            self.pool_fees.insert(pool.to_string(), *fee);
        }
        self.pool_config.insert(pool.to_string(), config_key);
    }

    fn bind_config(&mut self, config_key: &str, trade_fee_rate: u32) {
        // trade_fee_rate is in hundred-thousandths; /100 yields bps.
        let fee_bps = (trade_fee_rate / 100) as u16;
        self.config_fees.insert(config_key.to_string(), fee_bps);
        for (pool, config) in &self.pool_config {
            if config == config_key {
                self.pool_fees.insert(pool.clone(), fee_bps);
            }
        }
    }
}

fn has_discriminator(data: &[u8], discriminator: &[u8; 8]) -> bool {
    data.len() >= DISCRIMINATOR_LEN && &data[..DISCRIMINATOR_LEN] == discriminator
}

/// Extracts the `amm_config` pubkey from a Raydium CLMM `PoolState` account.
pub fn decode_raydium_pool_config(data: &[u8]) -> Result<String> {
    if data.len() < POOL_CONFIG_END {
        return Err(anyhow!(
            "raydium pool account too short: have {} want >= {}",
            data.len(),
            POOL_CONFIG_END
        ));
    }
    Ok(bs58::encode(&data[POOL_CONFIG_OFFSET..POOL_CONFIG_END]).into_string())
}

/// Extracts the raw `trade_fee_rate` (1e-6 units) from an `AmmConfig` account.
pub fn decode_amm_config_trade_fee(data: &[u8]) -> Result<u32> {
    if data.len() < AMM_REQUIRED_LEN {
        return Err(anyhow!(
            "amm config account too short: have {} want >= {}",
            data.len(),
            AMM_REQUIRED_LEN
        ));
    }
    let bytes: [u8; 4] = data[AMM_TRADE_FEE_OFFSET..AMM_TRADE_FEE_OFFSET + 4]
        .try_into()
        .expect("slice length checked");
    Ok(u32::from_le_bytes(bytes))
}

/// Decodes the fixed Whirlpool account layout.
pub fn decode_whirlpool(data: &[u8], slot: u64) -> Result<WhirlpoolInfo> {
    if data.len() < ORCA_REQUIRED_LEN {
        return Err(anyhow!(
            "orca pool account too short: have {} want >= {}",
            data.len(),
            ORCA_REQUIRED_LEN
        ));
    }
    Ok(WhirlpoolInfo {
        config: encode_pubkey(&data[ORCA_CONFIG_OFFSET..ORCA_CONFIG_OFFSET + 32]),
        fee_rate: read_u16_le(data, ORCA_FEE_RATE_OFFSET),
        protocol_fee_rate: read_u16_le(data, ORCA_PROTOCOL_FEE_OFFSET),
        token_mint_a: encode_pubkey(&data[ORCA_TOKEN_MINT_A_OFFSET..ORCA_TOKEN_MINT_A_OFFSET + 32]),
        token_vault_a: encode_pubkey(
            &data[ORCA_TOKEN_VAULT_A_OFFSET..ORCA_TOKEN_VAULT_A_OFFSET + 32],
        ),
        token_mint_b: encode_pubkey(&data[ORCA_TOKEN_MINT_B_OFFSET..ORCA_TOKEN_MINT_B_OFFSET + 32]),
        token_vault_b: encode_pubkey(
            &data[ORCA_TOKEN_VAULT_B_OFFSET..ORCA_TOKEN_VAULT_B_OFFSET + 32],
        ),
        sqrt_price: read_u128_le(data, ORCA_SQRT_PRICE_OFFSET),
        tick_current: read_i32_le(data, ORCA_TICK_OFFSET),
        observed_slot: slot,
    })
}

fn encode_pubkey(bytes: &[u8]) -> String {
    bs58::encode(bytes).into_string()
}

fn read_u16_le(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes(data[offset..offset + 2].try_into().expect("length checked"))
}

fn read_i32_le(data: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes(data[offset..offset + 4].try_into().expect("length checked"))
}

fn read_u128_le(data: &[u8], offset: usize) -> u128 {
    u128::from_le_bytes(
        data[offset..offset + 16]
            .try_into()
            .expect("length checked"),
    )
}
