//! Token-balance delta reconstruction.
//!
//! Every token account touched by a transaction appears in the pre/post
//! token-balance lists. Grouping those records by owner recovers the vault
//! pairs of each pool; the sign of `post - pre` tells which side of a swap a
//! vault was on.

use std::collections::HashMap;
use yellowstone_grpc_proto::prelude::{CompiledInstruction, TransactionStatusMeta};

/// Balance record for one token account across the transaction.
#[derive(Debug, Clone, Default)]
pub struct VaultBalance {
    pub account_index: u32,
    pub mint: String,
    pub owner: String,
    pub pre: u64,
    pub post: u64,
    pub decimals: u8,
}

impl VaultBalance {
    pub fn delta(&self) -> i128 {
        self.post as i128 - self.pre as i128
    }

    /// Tokens that entered the account.
    pub fn incoming(&self) -> u64 {
        self.post.saturating_sub(self.pre)
    }

    /// Tokens that left the account.
    pub fn outgoing(&self) -> u64 {
        self.pre.saturating_sub(self.post)
    }
}

/// Collects per-account balance records keyed by account index. Records with
/// unparseable amounts are dropped.
pub fn balances_by_index(meta: &TransactionStatusMeta) -> HashMap<u32, VaultBalance> {
    let mut balances: HashMap<u32, VaultBalance> = HashMap::new();

    for bal in &meta.pre_token_balances {
        let Some(amount) = parse_raw_amount(bal.ui_token_amount.as_ref().map(|ui| ui.amount.as_str()))
        else {
            continue;
        };
        let decimals = bal
            .ui_token_amount
            .as_ref()
            .map(|ui| ui.decimals as u8)
            .unwrap_or(0);
        balances.insert(
            bal.account_index,
            VaultBalance {
                account_index: bal.account_index,
                mint: bal.mint.clone(),
                owner: bal.owner.clone(),
                pre: amount,
                post: 0,
                decimals,
            },
        );
    }

    for bal in &meta.post_token_balances {
        let Some(amount) = parse_raw_amount(bal.ui_token_amount.as_ref().map(|ui| ui.amount.as_str()))
        else {
            continue;
        };
        let entry = balances
            .entry(bal.account_index)
            .or_insert_with(|| VaultBalance {
                account_index: bal.account_index,
                mint: bal.mint.clone(),
                owner: bal.owner.clone(),
                decimals: bal
                    .ui_token_amount
                    .as_ref()
                    .map(|ui| ui.decimals as u8)
                    .unwrap_or(0),
                ..VaultBalance::default()
            });
        entry.post = amount;
    }

    balances
}

/// Groups balance records by owning address. A pool's two vaults share the
/// pool as owner and carry different mints.
pub fn vaults_by_owner(meta: &TransactionStatusMeta) -> HashMap<String, Vec<VaultBalance>> {
    let mut owners: HashMap<String, Vec<VaultBalance>> = HashMap::new();
    for balance in balances_by_index(meta).into_values() {
        if balance.owner.is_empty() {
            continue;
        }
        owners.entry(balance.owner.clone()).or_default().push(balance);
    }
    owners
}

/// Resolves the pool an instruction touches: the first instruction account
/// present in the vault map is the pool; its vaults are returned in
/// instruction-account order (registry order when fewer than two are
/// referenced directly).
pub fn resolve_pool<'a>(
    instruction: &CompiledInstruction,
    account_keys: &[String],
    vaults: &'a HashMap<String, Vec<VaultBalance>>,
) -> Option<(String, &'a VaultBalance, &'a VaultBalance)> {
    let mut pool: Option<&str> = None;
    for raw_index in &instruction.accounts {
        let Some(address) = account_keys.get(*raw_index as usize) else {
            continue;
        };
        if vaults.contains_key(address.as_str()) {
            pool = Some(address.as_str());
            break;
        }
    }
    let pool = pool?;
    let pool_vaults = vaults.get(pool)?;

    let mut ordered: Vec<&VaultBalance> = Vec::new();
    for raw_index in &instruction.accounts {
        for balance in pool_vaults {
            if balance.account_index == *raw_index as u32 {
                ordered.push(balance);
            }
        }
    }
    if ordered.len() < 2 {
        ordered = pool_vaults.iter().collect();
    }
    if ordered.len() < 2 {
        return None;
    }
    Some((pool.to_string(), ordered[0], ordered[1]))
}

fn parse_raw_amount(amount: Option<&str>) -> Option<u64> {
    amount.filter(|raw| !raw.is_empty())?.parse().ok()
}
