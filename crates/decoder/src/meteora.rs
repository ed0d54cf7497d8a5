//! Meteora swap decoding (DLMM and constant-product pools).
//!
//! Both pool flavours place the interesting accounts at fixed positions in
//! the swap instruction: position 1 is the pool, 2 the input vault, 3 the
//! output vault. Reserves and the fee rate are recovered from program log
//! lines when the pool emits them.

use anyhow::{anyhow, Result};
use lpstream_proto::{SwapEvent, CHAIN_ID_SOLANA};
use std::collections::HashMap;
use tracing::warn;

use crate::balances::VaultBalance;
use crate::pair::PairResolver;
use crate::raydium::ANCHOR_SWAP_DISCRIMINATOR;

/// Meteora DLMM (bin-based) program.
pub const DLMM_PROGRAM_IDS: [&str; 1] = ["LBUZKhRxPF3XUpBCjp4YzTKgLccjZhTSDM9YuVaPwxo"];
/// Meteora constant-product programs (dynamic AMM v1 and DAMM v2).
pub const CPMM_PROGRAM_IDS: [&str; 2] = [
    "Eo7WjKq67rjJQSZxS6z3YkapzY3eMj6Xy8X5EQVn5UaB",
    "cpamdpZCGKUy5JxQXB4dcpGPiikHawvSWAd6mEn1sGG",
];

const POOL_POSITION: usize = 1;
const INPUT_VAULT_POSITION: usize = 2;
const OUTPUT_VAULT_POSITION: usize = 3;
const MIN_ACCOUNTS: usize = 8;

const LOG_PREFIX: &str = "Program log: ";
const RESERVES_LOG_TAG: &str = "cpmm_reserves";
const FEE_LOG_TAG: &str = "fee_bps=";

/// Pool flavour; decoding is shared, the kind is kept for labelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    Dlmm,
    Cpmm,
}

impl PoolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolKind::Dlmm => "dlmm",
            PoolKind::Cpmm => "cpmm",
        }
    }
}

/// Maps a program id to its Meteora pool kind, if it is one.
pub fn program_kind_for_id(program_id: &str) -> Option<PoolKind> {
    if DLMM_PROGRAM_IDS.contains(&program_id) {
        return Some(PoolKind::Dlmm);
    }
    if CPMM_PROGRAM_IDS.contains(&program_id) {
        return Some(PoolKind::Cpmm);
    }
    None
}

pub fn is_swap_instruction(data: &[u8]) -> bool {
    data.len() >= 8 && data[..8] == ANCHOR_SWAP_DISCRIMINATOR
}

/// Builds a canonical swap event from the fixed account map and the
/// transaction's balance records.
#[allow(clippy::too_many_arguments)]
pub(crate) fn build_swap(
    signature: &str,
    slot: u64,
    index: u32,
    program_id: &str,
    kind: PoolKind,
    instruction_accounts: &[u8],
    account_keys: &[String],
    balances: &HashMap<u32, VaultBalance>,
    logs: &[String],
    pairs: &PairResolver,
) -> Result<SwapEvent> {
    if instruction_accounts.len() < MIN_ACCOUNTS {
        return Err(anyhow!(
            "{} swap instruction has {} accounts, need at least {MIN_ACCOUNTS}",
            kind.as_str(),
            instruction_accounts.len()
        ));
    }

    let pool = account_at(instruction_accounts, account_keys, POOL_POSITION)?;
    let input_index = instruction_accounts[INPUT_VAULT_POSITION] as u32;
    let output_index = instruction_accounts[OUTPUT_VAULT_POSITION] as u32;

    let input_vault = balances
        .get(&input_index)
        .ok_or_else(|| anyhow!("input vault balance missing at account index {input_index}"))?;
    let output_vault = balances
        .get(&output_index)
        .ok_or_else(|| anyhow!("output vault balance missing at account index {output_index}"))?;

    let amount_in = input_vault.outgoing();
    let amount_out = output_vault.incoming();
    if amount_in == 0 || amount_out == 0 {
        return Err(anyhow!(
            "vault deltas do not describe a swap: in={amount_in} out={amount_out}"
        ));
    }

    let pair = pairs.resolve(&input_vault.mint, &output_vault.mint)?;
    let base_decreased = if pair.base_mint == input_vault.mint {
        true
    } else if pair.base_mint == output_vault.mint {
        false
    } else {
        // Degenerate vault pair: orientation is ambiguous, keep the event
        // but flag it.
        warn!(
            pool = %pool,
            sig = %signature,
            base_mint = %pair.base_mint,
            "canonical base mint matches neither vault; assuming base bought"
        );
        false
    };

    let (base_vault, quote_vault, base_amount, quote_amount) = if base_decreased {
        (input_vault, output_vault, amount_in, amount_out)
    } else {
        (output_vault, input_vault, amount_out, amount_in)
    };

    let mut event = SwapEvent {
        chain_id: CHAIN_ID_SOLANA,
        slot,
        sig: signature.to_string(),
        index,
        program_id: program_id.to_string(),
        pool_id: pool.to_string(),
        mint_base: pair.base_mint.clone(),
        mint_quote: pair.quote_mint.clone(),
        dec_base: base_vault.decimals as u32,
        dec_quote: quote_vault.decimals as u32,
        fee_bps: parse_fee_bps_from_logs(logs).unwrap_or(0),
        provisional: true,
        ..SwapEvent::default()
    };

    if base_decreased {
        event.base_out = base_amount;
        event.quote_in = quote_amount;
    } else {
        event.base_in = base_amount;
        event.quote_out = quote_amount;
    }

    if let Some((reserves_base, reserves_quote)) = parse_reserves_from_logs(logs) {
        event.reserves_base = reserves_base;
        event.reserves_quote = reserves_quote;
    }

    Ok(event)
}

fn account_at<'a>(
    instruction_accounts: &[u8],
    account_keys: &'a [String],
    position: usize,
) -> Result<&'a str> {
    let index = instruction_accounts[position] as usize;
    account_keys
        .get(index)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("instruction account index {index} out of range"))
}

/// Parses `Program log: cpmm_reserves base=X quote=Y`.
pub fn parse_reserves_from_logs(logs: &[String]) -> Option<(u64, u64)> {
    for log in logs {
        let Some(body) = log.strip_prefix(LOG_PREFIX) else {
            continue;
        };
        let Some(rest) = body.trim().strip_prefix(RESERVES_LOG_TAG) else {
            continue;
        };
        let mut base = None;
        let mut quote = None;
        for field in rest.split_whitespace() {
            if let Some(value) = field.strip_prefix("base=") {
                base = value.parse().ok();
            } else if let Some(value) = field.strip_prefix("quote=") {
                quote = value.parse().ok();
            }
        }
        if let (Some(base), Some(quote)) = (base, quote) {
            return Some((base, quote));
        }
    }
    None
}

/// Parses `Program log: fee_bps=N`.
pub fn parse_fee_bps_from_logs(logs: &[String]) -> Option<u32> {
    for log in logs {
        let Some(body) = log.strip_prefix(LOG_PREFIX) else {
            continue;
        };
        if let Some(value) = body.trim().strip_prefix(FEE_LOG_TAG) {
            if let Ok(fee) = value.trim().parse() {
                return Some(fee);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pair::{SOL_MINT, USDC_MINT};

    fn vault(index: u32, mint: &str, pre: u64, post: u64, decimals: u8) -> (u32, VaultBalance) {
        (
            index,
            VaultBalance {
                account_index: index,
                mint: mint.to_string(),
                owner: "pool-authority".to_string(),
                pre,
                post,
                decimals,
            },
        )
    }

    fn account_keys() -> Vec<String> {
        vec![
            "authority".to_string(),
            "theMeteoraPool".to_string(),
            "inputVault".to_string(),
            "outputVault".to_string(),
            "userIn".to_string(),
            "userOut".to_string(),
            "tokenProgram".to_string(),
            "eventAuthority".to_string(),
        ]
    }

    const INSTRUCTION_ACCOUNTS: [u8; 8] = [0, 1, 2, 3, 4, 5, 6, 7];

    #[test]
    fn program_kind_covers_both_families() {
        assert_eq!(
            program_kind_for_id("LBUZKhRxPF3XUpBCjp4YzTKgLccjZhTSDM9YuVaPwxo"),
            Some(PoolKind::Dlmm)
        );
        for id in CPMM_PROGRAM_IDS {
            assert_eq!(program_kind_for_id(id), Some(PoolKind::Cpmm));
        }
        assert_eq!(program_kind_for_id("unknown"), None);
    }

    #[test]
    fn decodes_swap_with_reserves_and_fee_from_logs() {
        // SOL leaves the input vault, USDC enters the output vault.
        let balances: HashMap<u32, VaultBalance> = [
            vault(2, SOL_MINT, 5_000_000_000, 4_000_000_000, 9),
            vault(3, USDC_MINT, 1_000_000_000, 1_180_000_000, 6),
        ]
        .into_iter()
        .collect();
        let logs = vec![
            "Program log: Instruction: Swap".to_string(),
            "Program log: cpmm_reserves base=4000000000 quote=1180000000".to_string(),
            "Program log: fee_bps=25".to_string(),
        ];

        let event = build_swap(
            "sig",
            300,
            2,
            CPMM_PROGRAM_IDS[0],
            PoolKind::Cpmm,
            &INSTRUCTION_ACCOUNTS,
            &account_keys(),
            &balances,
            &logs,
            &PairResolver::new(),
        )
        .expect("event");

        assert_eq!(event.pool_id, "theMeteoraPool");
        assert_eq!(event.mint_base, SOL_MINT);
        assert_eq!(event.mint_quote, USDC_MINT);
        // Base left the pool: base sold.
        assert_eq!(event.base_out, 1_000_000_000);
        assert_eq!(event.quote_in, 180_000_000);
        assert_eq!(event.fee_bps, 25);
        assert_eq!(event.reserves_base, 4_000_000_000);
        assert_eq!(event.reserves_quote, 1_180_000_000);
    }

    #[test]
    fn quote_in_input_vault_orients_as_base_buy() {
        // USDC leaves the input vault, SOL enters the output vault: the
        // canonical base (SOL) was bought.
        let balances: HashMap<u32, VaultBalance> = [
            vault(2, USDC_MINT, 1_180_000_000, 1_000_000_000, 6),
            vault(3, SOL_MINT, 4_000_000_000, 5_000_000_000, 9),
        ]
        .into_iter()
        .collect();

        let event = build_swap(
            "sig",
            300,
            0,
            DLMM_PROGRAM_IDS[0],
            PoolKind::Dlmm,
            &INSTRUCTION_ACCOUNTS,
            &account_keys(),
            &balances,
            &[],
            &PairResolver::new(),
        )
        .expect("event");

        assert_eq!(event.base_in, 1_000_000_000);
        assert_eq!(event.quote_out, 180_000_000);
        assert_eq!(event.base_out, 0);
        assert_eq!(event.fee_bps, 0);
        assert_eq!(event.reserves_base, 0);
    }

    #[test]
    fn short_account_map_is_an_error() {
        let balances = HashMap::new();
        let err = build_swap(
            "sig",
            300,
            0,
            DLMM_PROGRAM_IDS[0],
            PoolKind::Dlmm,
            &[0, 1, 2],
            &account_keys(),
            &balances,
            &[],
            &PairResolver::new(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("accounts"));
    }

    #[test]
    fn missing_vault_balance_is_an_error() {
        let balances: HashMap<u32, VaultBalance> =
            [vault(2, SOL_MINT, 10, 5, 9)].into_iter().collect();
        let err = build_swap(
            "sig",
            300,
            0,
            CPMM_PROGRAM_IDS[1],
            PoolKind::Cpmm,
            &INSTRUCTION_ACCOUNTS,
            &account_keys(),
            &balances,
            &[],
            &PairResolver::new(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("output vault"));
    }

    #[test]
    fn reserves_log_parsing_ignores_malformed_lines() {
        assert_eq!(
            parse_reserves_from_logs(&["Program log: cpmm_reserves base=1 quote=2".to_string()]),
            Some((1, 2))
        );
        assert_eq!(
            parse_reserves_from_logs(&["Program log: cpmm_reserves base=x quote=2".to_string()]),
            None
        );
        assert_eq!(
            parse_reserves_from_logs(&["cpmm_reserves base=1 quote=2".to_string()]),
            None
        );
        assert_eq!(parse_fee_bps_from_logs(&["Program log: fee_bps=30".to_string()]), Some(30));
        assert_eq!(parse_fee_bps_from_logs(&["Program log: fee=30".to_string()]), None);
    }
}
