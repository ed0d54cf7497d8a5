//! Raydium CLMM swap decoding.
//!
//! The swap instruction layout is discriminator (8), `amount` (u64),
//! `other_amount_threshold` (u64), `sqrt_price_limit` (u128), and the
//! `is_base_input` flag. The flag is advisory only: the observed vault deltas
//! decide the swap direction.

use anyhow::{anyhow, Result};
use lpstream_proto::{SwapEvent, CHAIN_ID_SOLANA};

use crate::balances::VaultBalance;
use crate::pair::PairResolver;
use crate::registry::AccountRegistry;

pub const PROGRAM_ID: &str = "CAMMCzo5YL8w4VFF8KVHrK22GGUsp5VTaW7grrKgrWqK";

/// Anchor `global:swap` sighash, shared by every anchor program whose swap
/// instruction is named `swap`.
pub(crate) const ANCHOR_SWAP_DISCRIMINATOR: [u8; 8] = [248, 198, 158, 145, 225, 117, 135, 200];
/// Raydium CLMM `swap_v2` sighash.
pub(crate) const RAYDIUM_SWAP_V2_DISCRIMINATOR: [u8; 8] = [43, 4, 237, 11, 26, 201, 30, 98];

const MIN_INSTRUCTION_LEN: usize = 41;

/// Decoded swap instruction payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapInstruction {
    pub amount: u64,
    pub other_amount_threshold: u64,
    pub sqrt_price_limit: u128,
    pub is_base_input: bool,
}

/// True when the data starts with a Raydium swap discriminator.
pub fn is_swap_instruction(data: &[u8]) -> bool {
    data.len() >= 8
        && (data[..8] == ANCHOR_SWAP_DISCRIMINATOR || data[..8] == RAYDIUM_SWAP_V2_DISCRIMINATOR)
}

/// Parses the swap instruction payload. Requires at least 41 bytes.
pub fn parse_swap_instruction(data: &[u8]) -> Result<SwapInstruction> {
    if data.len() < MIN_INSTRUCTION_LEN {
        return Err(anyhow!(
            "instruction data too short: got {} bytes, need at least {MIN_INSTRUCTION_LEN}",
            data.len()
        ));
    }

    Ok(SwapInstruction {
        amount: u64::from_le_bytes(data[8..16].try_into().expect("length checked")),
        other_amount_threshold: u64::from_le_bytes(data[16..24].try_into().expect("length checked")),
        sqrt_price_limit: u128::from_le_bytes(data[24..40].try_into().expect("length checked")),
        is_base_input: data[40] != 0,
    })
}

/// Builds a canonical swap event from the instruction and the pool's two
/// vault balance records (instruction-account order).
pub(crate) fn build_swap(
    signature: &str,
    slot: u64,
    index: u32,
    pool: &str,
    vault_a: &VaultBalance,
    vault_b: &VaultBalance,
    registry: &AccountRegistry,
    pairs: &PairResolver,
) -> Result<SwapEvent> {
    let delta_a = vault_a.delta();
    let delta_b = vault_b.delta();
    if !((delta_a > 0 && delta_b < 0) || (delta_a < 0 && delta_b > 0)) {
        return Err(anyhow!(
            "unable to determine swap direction: delta_a={delta_a} delta_b={delta_b}"
        ));
    }

    let pair = pairs.resolve(&vault_a.mint, &vault_b.mint)?;
    let (base_vault, quote_vault) = if vault_a.mint == pair.base_mint {
        (vault_a, vault_b)
    } else {
        (vault_b, vault_a)
    };

    let mut event = SwapEvent {
        chain_id: CHAIN_ID_SOLANA,
        slot,
        sig: signature.to_string(),
        index,
        program_id: PROGRAM_ID.to_string(),
        pool_id: pool.to_string(),
        mint_base: pair.base_mint.clone(),
        mint_quote: pair.quote_mint.clone(),
        dec_base: base_vault.decimals as u32,
        dec_quote: quote_vault.decimals as u32,
        fee_bps: registry.raydium_pool_fee_bps(pool).unwrap_or(0) as u32,
        provisional: true,
        ..SwapEvent::default()
    };

    if base_vault.delta() < 0 {
        event.base_out = base_vault.outgoing();
        event.quote_in = quote_vault.incoming();
    } else {
        event.base_in = base_vault.incoming();
        event.quote_out = quote_vault.outgoing();
    }

    let amount_in = event.base_in.max(event.quote_in);
    let amount_out = event.base_out.max(event.quote_out);
    if amount_in == 0 {
        return Err(anyhow!("invalid swap: amount in is zero"));
    }
    if amount_out == 0 {
        return Err(anyhow!("invalid swap: amount out is zero"));
    }

    Ok(event)
}
