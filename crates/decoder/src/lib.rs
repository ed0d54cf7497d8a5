//! Swap decoding for the supported AMM programs.
//!
//! The decoder owns the account registry fed from the account update stream
//! and turns transaction updates into canonical [`SwapEvent`]s. A recognised
//! swap instruction that cannot be decoded aborts the whole transaction with
//! a [`DecodeError`] so no partial provisional set is ever published.

pub mod balances;
pub mod fixed_point;
pub mod meteora;
pub mod orca;
pub mod pair;
pub mod raydium;
pub mod registry;

use anyhow::anyhow;
use lpstream_proto::SwapEvent;
use thiserror::Error;
use yellowstone_grpc_proto::prelude::{SubscribeUpdateAccount, SubscribeUpdateTransaction};

use crate::balances::{balances_by_index, resolve_pool, vaults_by_owner};
use crate::pair::PairResolver;
use crate::registry::AccountRegistry;

/// Decode failure tagged with the program that produced it.
#[derive(Debug, Error)]
#[error("{program}: {source}")]
pub struct DecodeError {
    pub program: String,
    #[source]
    pub source: anyhow::Error,
}

impl DecodeError {
    fn new(program: impl Into<String>, source: anyhow::Error) -> Self {
        Self {
            program: program.into(),
            source,
        }
    }
}

/// Shared decoding state: the account registry plus the canonical pair
/// resolver.
#[derive(Debug, Default)]
pub struct SwapDecoder {
    registry: AccountRegistry,
    pairs: PairResolver,
}

impl SwapDecoder {
    pub fn new() -> Self {
        Self {
            registry: AccountRegistry::new(),
            pairs: PairResolver::new(),
        }
    }

    pub fn registry(&self) -> &AccountRegistry {
        &self.registry
    }

    /// Mutable access to the pair resolver, used to register token symbol
    /// and priority overrides.
    pub fn pairs_mut(&mut self) -> &mut PairResolver {
        &mut self.pairs
    }

    /// Indexes account data used to enrich swap decoding (pool
    /// configuration, fee rates, whirlpool metadata).
    pub fn handle_account(&mut self, update: &SubscribeUpdateAccount) {
        let Some(info) = update.account.as_ref() else {
            return;
        };
        let owner = bs58::encode(&info.owner).into_string();
        let pubkey = bs58::encode(&info.pubkey).into_string();
        self.registry
            .handle_account(&owner, &pubkey, &info.data, update.slot);
    }

    /// Decodes every swap in the transaction. Unknown programs and non-swap
    /// instructions are skipped silently; a malformed recognised swap aborts
    /// with a [`DecodeError`].
    pub fn decode_transaction(
        &self,
        tx: &SubscribeUpdateTransaction,
    ) -> Result<Vec<SwapEvent>, DecodeError> {
        let Some(info) = tx.transaction.as_ref() else {
            return Ok(Vec::new());
        };
        let Some(meta) = info.meta.as_ref() else {
            return Ok(Vec::new());
        };
        let Some(tx_msg) = info.transaction.as_ref() else {
            return Ok(Vec::new());
        };
        let Some(message) = tx_msg.message.as_ref() else {
            return Ok(Vec::new());
        };

        let mut account_keys: Vec<String> = message
            .account_keys
            .iter()
            .map(|raw| bs58::encode(raw).into_string())
            .collect();
        account_keys.extend(
            meta.loaded_writable_addresses
                .iter()
                .map(|raw| bs58::encode(raw).into_string()),
        );
        account_keys.extend(
            meta.loaded_readonly_addresses
                .iter()
                .map(|raw| bs58::encode(raw).into_string()),
        );

        let vaults = vaults_by_owner(meta);
        let by_index = balances_by_index(meta);
        let signature = encode_signature(info);
        let slot = tx.slot;
        let index = info.index as u32;

        let mut events = Vec::new();

        for instruction in &message.instructions {
            let Some(program_id) = account_keys.get(instruction.program_id_index as usize) else {
                continue;
            };

            match program_id.as_str() {
                raydium::PROGRAM_ID => {
                    if !raydium::is_swap_instruction(&instruction.data) {
                        continue;
                    }
                    // Layout check only; direction comes from vault deltas.
                    raydium::parse_swap_instruction(&instruction.data)
                        .map_err(|source| DecodeError::new(raydium::PROGRAM_ID, source))?;

                    let Some((pool, vault_a, vault_b)) =
                        resolve_pool(instruction, &account_keys, &vaults)
                    else {
                        return Err(DecodeError::new(
                            raydium::PROGRAM_ID,
                            anyhow!("token balances missing for swap instruction"),
                        ));
                    };
                    let event = raydium::build_swap(
                        &signature,
                        slot,
                        index,
                        &pool,
                        vault_a,
                        vault_b,
                        &self.registry,
                        &self.pairs,
                    )
                    .map_err(|source| DecodeError::new(raydium::PROGRAM_ID, source))?;
                    events.push(event);
                }
                orca::PROGRAM_ID => {
                    if !orca::is_swap_instruction(&instruction.data) {
                        continue;
                    }
                    orca::parse_swap_instruction(&instruction.data)
                        .map_err(|source| DecodeError::new(orca::PROGRAM_ID, source))?;

                    let Some(pool) = orca::pool_address(&instruction.accounts, &account_keys)
                    else {
                        return Err(DecodeError::new(
                            orca::PROGRAM_ID,
                            anyhow!("insufficient accounts for swap instruction"),
                        ));
                    };
                    // Pools we have not snapshotted yet cannot be decoded.
                    let Some(pool_info) = self.registry.whirlpool(pool) else {
                        continue;
                    };
                    let pool_balances: Vec<&balances::VaultBalance> = vaults
                        .get(pool)
                        .map(|vaults| vaults.iter().collect())
                        .unwrap_or_default();
                    let decoded = orca::build_swap(
                        &signature,
                        slot,
                        index,
                        pool,
                        pool_info,
                        &pool_balances,
                        &self.pairs,
                    )
                    .map_err(|source| DecodeError::new(orca::PROGRAM_ID, source))?;
                    if let Some(event) = decoded {
                        events.push(event);
                    }
                }
                other => {
                    let Some(kind) = meteora::program_kind_for_id(other) else {
                        continue;
                    };
                    if !meteora::is_swap_instruction(&instruction.data) {
                        continue;
                    }
                    let event = meteora::build_swap(
                        &signature,
                        slot,
                        index,
                        other,
                        kind,
                        &instruction.accounts,
                        &account_keys,
                        &by_index,
                        &meta.log_messages,
                        &self.pairs,
                    )
                    .map_err(|source| DecodeError::new(other, source))?;
                    events.push(event);
                }
            }
        }

        Ok(events)
    }
}

fn encode_signature(
    info: &yellowstone_grpc_proto::prelude::SubscribeUpdateTransactionInfo,
) -> String {
    if !info.signature.is_empty() {
        return bs58::encode(&info.signature).into_string();
    }
    info.transaction
        .as_ref()
        .and_then(|tx| tx.signatures.first())
        .map(|sig| bs58::encode(sig).into_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::fixtures::{pubkey, whirlpool_account};
    use yellowstone_grpc_proto::prelude::{
        CompiledInstruction, Message as SolMessage, SubscribeUpdateAccountInfo,
        SubscribeUpdateTransactionInfo, TokenBalance, Transaction, TransactionStatusMeta,
        UiTokenAmount,
    };

    const SOL: &str = "So11111111111111111111111111111111111111112";
    const USDC: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

    fn key_bytes(encoded: &str) -> Vec<u8> {
        bs58::decode(encoded).into_vec().expect("base58 key")
    }

    fn token_balance(index: u32, owner: &str, mint: &str, amount: u64, decimals: u32) -> TokenBalance {
        TokenBalance {
            account_index: index,
            mint: mint.to_string(),
            owner: owner.to_string(),
            ui_token_amount: Some(UiTokenAmount {
                ui_amount: 0.0,
                decimals,
                amount: amount.to_string(),
                ui_amount_string: String::new(),
            }),
            program_id: String::new(),
        }
    }

    fn transaction_update(
        slot: u64,
        account_keys: Vec<Vec<u8>>,
        instruction: CompiledInstruction,
        meta: TransactionStatusMeta,
    ) -> SubscribeUpdateTransaction {
        SubscribeUpdateTransaction {
            slot,
            transaction: Some(SubscribeUpdateTransactionInfo {
                signature: vec![7u8; 64],
                is_vote: false,
                transaction: Some(Transaction {
                    signatures: vec![vec![7u8; 64]],
                    message: Some(SolMessage {
                        account_keys,
                        instructions: vec![instruction],
                        ..SolMessage::default()
                    }),
                }),
                meta: Some(meta),
                index: 0,
            }),
        }
    }

    fn raydium_swap_data() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&[248, 198, 158, 145, 225, 117, 135, 200]);
        data.extend_from_slice(&1_000_000_000u64.to_le_bytes());
        data.extend_from_slice(&0u64.to_le_bytes());
        data.extend_from_slice(&0u128.to_le_bytes());
        data.push(1);
        data
    }

    fn raydium_transaction(slot: u64, with_balances: bool) -> SubscribeUpdateTransaction {
        let pool = pubkey(40);
        let account_keys = vec![
            key_bytes(&pubkey(1)),
            key_bytes(raydium::PROGRAM_ID),
            key_bytes(&pool),
            key_bytes(&pubkey(41)),
            key_bytes(&pubkey(42)),
        ];
        let instruction = CompiledInstruction {
            program_id_index: 1,
            accounts: vec![0, 2, 3, 4],
            data: raydium_swap_data(),
        };
        let meta = if with_balances {
            TransactionStatusMeta {
                pre_token_balances: vec![
                    token_balance(3, &pool, SOL, 10_000_000_000, 9),
                    token_balance(4, &pool, USDC, 1_180_000_000, 6),
                ],
                post_token_balances: vec![
                    token_balance(3, &pool, SOL, 11_000_000_000, 9),
                    token_balance(4, &pool, USDC, 1_000_000_000, 6),
                ],
                ..TransactionStatusMeta::default()
            }
        } else {
            TransactionStatusMeta::default()
        };
        transaction_update(slot, account_keys, instruction, meta)
    }

    #[test]
    fn decodes_raydium_swap_with_canonical_orientation() {
        let decoder = SwapDecoder::new();
        let events = decoder
            .decode_transaction(&raydium_transaction(123, true))
            .expect("decode");
        assert_eq!(events.len(), 1);

        let event = &events[0];
        assert_eq!(event.program_id, raydium::PROGRAM_ID);
        assert_eq!(event.mint_base, SOL);
        assert_eq!(event.mint_quote, USDC);
        // SOL vault grew: base bought with quote.
        assert_eq!(event.base_in, 1_000_000_000);
        assert_eq!(event.quote_out, 180_000_000);
        assert_eq!(event.slot, 123);
        assert!(event.provisional);
        assert!(!event.is_undo);
    }

    #[test]
    fn missing_balances_abort_raydium_transaction() {
        let decoder = SwapDecoder::new();
        let err = decoder
            .decode_transaction(&raydium_transaction(123, false))
            .unwrap_err();
        assert_eq!(err.program, raydium::PROGRAM_ID);
        assert!(err.to_string().contains("token balances missing"));
    }

    #[test]
    fn non_swap_raydium_instruction_is_skipped() {
        let mut tx = raydium_transaction(123, false);
        let info = tx.transaction.as_mut().unwrap();
        let message = info
            .transaction
            .as_mut()
            .unwrap()
            .message
            .as_mut()
            .unwrap();
        message.instructions[0].data = vec![1, 2, 3, 4, 5, 6, 7, 8, 9];

        let decoder = SwapDecoder::new();
        let events = decoder.decode_transaction(&tx).expect("decode");
        assert!(events.is_empty());
    }

    fn orca_swap_data() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&[248, 198, 158, 145, 225, 117, 135, 200]);
        data.extend_from_slice(&1_000_000_000u64.to_le_bytes());
        data.extend_from_slice(&0u64.to_le_bytes());
        data.extend_from_slice(&0u128.to_le_bytes());
        data.push(1);
        data.push(1);
        data
    }

    fn orca_transaction(slot: u64, pool: &str) -> SubscribeUpdateTransaction {
        let account_keys = vec![
            key_bytes(&pubkey(1)),
            key_bytes(orca::PROGRAM_ID),
            key_bytes(pool),
            key_bytes(&pubkey(51)),
            key_bytes(&pubkey(52)),
        ];
        let instruction = CompiledInstruction {
            program_id_index: 1,
            accounts: vec![0, 0, 2, 3, 4],
            data: orca_swap_data(),
        };
        let meta = TransactionStatusMeta {
            pre_token_balances: vec![
                token_balance(3, pool, SOL, 2_000_000_000, 9),
                token_balance(4, pool, USDC, 1_000_000_000, 6),
            ],
            post_token_balances: vec![
                token_balance(3, pool, SOL, 1_000_000_000, 9),
                token_balance(4, pool, USDC, 1_180_000_000, 6),
            ],
            ..TransactionStatusMeta::default()
        };
        transaction_update(slot, account_keys, instruction, meta)
    }

    fn primed_orca_decoder(pool: &str, observed_slot: u64) -> SwapDecoder {
        let mut decoder = SwapDecoder::new();
        let data = whirlpool_account(
            SOL,
            &pubkey(51),
            USDC,
            &pubkey(52),
            3_000,
            13u128 << 64,
            101,
        );
        decoder.handle_account(&SubscribeUpdateAccount {
            account: Some(SubscribeUpdateAccountInfo {
                pubkey: key_bytes(pool),
                lamports: 0,
                owner: key_bytes(orca::PROGRAM_ID),
                executable: false,
                rent_epoch: 0,
                data,
                write_version: 0,
                txn_signature: None,
            }),
            slot: observed_slot,
            is_startup: false,
        });
        decoder
    }

    #[test]
    fn decodes_orca_swap_using_registry_metadata() {
        let pool = pubkey(50);
        let decoder = primed_orca_decoder(&pool, 150);
        let events = decoder
            .decode_transaction(&orca_transaction(200, &pool))
            .expect("decode");
        assert_eq!(events.len(), 1);

        let event = &events[0];
        assert_eq!(event.program_id, orca::PROGRAM_ID);
        assert_eq!(event.pool_id, pool);
        // SOL vault shrank: base sold.
        assert_eq!(event.base_out, 1_000_000_000);
        assert_eq!(event.quote_in, 180_000_000);
        assert_eq!(event.fee_bps, 30);
        // Snapshot predates the swap slot, so it enriches the pre fields.
        assert_eq!(
            event.sqrt_price_q64_pre.map(|p| p.as_u128()),
            Some(13u128 << 64)
        );
        assert_eq!(event.tick_pre, 101);
    }

    #[test]
    fn orca_swap_without_pool_metadata_is_skipped() {
        let pool = pubkey(50);
        let decoder = SwapDecoder::new();
        let events = decoder
            .decode_transaction(&orca_transaction(200, &pool))
            .expect("decode");
        assert!(events.is_empty());
    }

    fn meteora_transaction(slot: u64, accounts: Vec<u8>) -> SubscribeUpdateTransaction {
        let pool = pubkey(60);
        let account_keys = vec![
            key_bytes(&pubkey(1)),
            key_bytes(&pool),
            key_bytes(&pubkey(61)),
            key_bytes(&pubkey(62)),
            key_bytes(&pubkey(63)),
            key_bytes(&pubkey(64)),
            key_bytes(&pubkey(65)),
            key_bytes(meteora::CPMM_PROGRAM_IDS[0]),
        ];
        let instruction = CompiledInstruction {
            program_id_index: 7,
            accounts,
            data: orca_swap_data(),
        };
        let meta = TransactionStatusMeta {
            pre_token_balances: vec![
                token_balance(2, "authority", SOL, 5_000_000_000, 9),
                token_balance(3, "authority", USDC, 1_000_000_000, 6),
            ],
            post_token_balances: vec![
                token_balance(2, "authority", SOL, 4_000_000_000, 9),
                token_balance(3, "authority", USDC, 1_180_000_000, 6),
            ],
            log_messages: vec![
                "Program log: cpmm_reserves base=4000000000 quote=1180000000".to_string(),
                "Program log: fee_bps=20".to_string(),
            ],
            ..TransactionStatusMeta::default()
        };
        transaction_update(slot, account_keys, instruction, meta)
    }

    #[test]
    fn decodes_meteora_cpmm_swap_with_log_enrichment() {
        let decoder = SwapDecoder::new();
        let events = decoder
            .decode_transaction(&meteora_transaction(300, vec![0, 1, 2, 3, 4, 5, 6, 7]))
            .expect("decode");
        assert_eq!(events.len(), 1);

        let event = &events[0];
        assert_eq!(event.program_id, meteora::CPMM_PROGRAM_IDS[0]);
        assert_eq!(event.pool_id, pubkey(60));
        assert_eq!(event.base_out, 1_000_000_000);
        assert_eq!(event.quote_in, 180_000_000);
        assert_eq!(event.fee_bps, 20);
        assert_eq!(event.reserves_base, 4_000_000_000);
        assert_eq!(event.reserves_quote, 1_180_000_000);
    }

    #[test]
    fn short_meteora_account_map_aborts_transaction() {
        let decoder = SwapDecoder::new();
        let err = decoder
            .decode_transaction(&meteora_transaction(300, vec![0, 1, 2]))
            .unwrap_err();
        assert_eq!(err.program, meteora::CPMM_PROGRAM_IDS[0]);
    }

    #[test]
    fn unknown_program_is_ignored() {
        let mut tx = meteora_transaction(300, vec![0, 1, 2, 3, 4, 5, 6, 7]);
        // Rewrite the program key to something unrecognised.
        let info = tx.transaction.as_mut().unwrap();
        let message = info
            .transaction
            .as_mut()
            .unwrap()
            .message
            .as_mut()
            .unwrap();
        message.account_keys[7] = key_bytes(&pubkey(99));

        let decoder = SwapDecoder::new();
        let events = decoder.decode_transaction(&tx).expect("decode");
        assert!(events.is_empty());
    }
}
