//! Orca Whirlpool swap decoding.
//!
//! Swaps are identified by the anchor `swap` discriminator; everything after
//! it is `{amount, other_amount_threshold, sqrt_price_limit: u128,
//! amount_specified_is_input, a_to_b}`. Decoding requires the pool's
//! `WhirlpoolInfo` from the account registry so vaults can be matched by
//! mint.

use anyhow::{anyhow, Result};
use lpstream_proto::{SwapEvent, U128, CHAIN_ID_SOLANA};

use crate::balances::VaultBalance;
use crate::pair::PairResolver;
use crate::raydium::ANCHOR_SWAP_DISCRIMINATOR;
use crate::registry::WhirlpoolInfo;

pub const PROGRAM_ID: &str = "whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc";

// discriminator + u64 + u64 + u128 + bool + bool
const MIN_INSTRUCTION_LEN: usize = 8 + 8 + 8 + 16 + 1 + 1;
const POOL_ACCOUNT_POSITION: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapInstruction {
    pub amount: u64,
    pub other_amount_threshold: u64,
    pub sqrt_price_limit: u128,
    pub amount_specified_is_input: bool,
    pub a_to_b: bool,
}

pub fn is_swap_instruction(data: &[u8]) -> bool {
    data.len() >= 8 && data[..8] == ANCHOR_SWAP_DISCRIMINATOR
}

pub fn parse_swap_instruction(data: &[u8]) -> Result<SwapInstruction> {
    if data.len() < MIN_INSTRUCTION_LEN {
        return Err(anyhow!(
            "swap instruction data too short: {} bytes",
            data.len()
        ));
    }
    Ok(SwapInstruction {
        amount: u64::from_le_bytes(data[8..16].try_into().expect("length checked")),
        other_amount_threshold: u64::from_le_bytes(data[16..24].try_into().expect("length checked")),
        sqrt_price_limit: u128::from_le_bytes(data[24..40].try_into().expect("length checked")),
        amount_specified_is_input: data[40] != 0,
        a_to_b: data[41] != 0,
    })
}

/// Resolves the whirlpool address from the instruction account list
/// (position 2 in the standard swap layout).
pub(crate) fn pool_address<'a>(
    instruction_accounts: &[u8],
    account_keys: &'a [String],
) -> Option<&'a str> {
    let index = *instruction_accounts.get(POOL_ACCOUNT_POSITION)? as usize;
    account_keys.get(index).map(String::as_str)
}

/// Builds a canonical swap event from vault deltas and the registry
/// snapshot. Returns `None` when the transaction did not move the vaults.
pub(crate) fn build_swap(
    signature: &str,
    slot: u64,
    index: u32,
    pool: &str,
    info: &WhirlpoolInfo,
    pool_balances: &[&VaultBalance],
    pairs: &PairResolver,
) -> Result<Option<SwapEvent>> {
    let vault_a = pool_balances
        .iter()
        .find(|balance| balance.mint == info.token_mint_a);
    let vault_b = pool_balances
        .iter()
        .find(|balance| balance.mint == info.token_mint_b);
    // Without both vault balances there is nothing to measure; state-only
    // touches of the pool account land here.
    let (Some(vault_a), Some(vault_b)) = (vault_a, vault_b) else {
        return Ok(None);
    };

    if vault_a.delta() == 0 && vault_b.delta() == 0 {
        return Ok(None);
    }

    let pair = pairs.resolve(&info.token_mint_a, &info.token_mint_b)?;
    let (base_vault, quote_vault) = if vault_a.mint == pair.base_mint {
        (*vault_a, *vault_b)
    } else {
        (*vault_b, *vault_a)
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
        fee_bps: info.fee_bps() as u32,
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

    // Optional enrichment: a snapshot observed before this slot is pre-swap
    // state, one from the same slot is post-swap state.
    if info.sqrt_price != 0 {
        if info.observed_slot == slot {
            event.sqrt_price_q64_post = Some(U128::from_u128(info.sqrt_price));
            event.tick_post = info.tick_current;
        } else {
            event.sqrt_price_q64_pre = Some(U128::from_u128(info.sqrt_price));
            event.tick_pre = info.tick_current;
        }
    }

    Ok(Some(event))
}
