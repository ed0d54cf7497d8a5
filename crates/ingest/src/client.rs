//! Stream client contract shared by the primary and fallback sources.
//!
//! A client's lifecycle is `connect -> subscribe(start_slot) ->
//! (updates, errors) -> close`. The subscription task owns the gRPC stream
//! and forwards raw `SubscribeUpdate`s; any stream failure lands on the
//! error channel and ends the task.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::mpsc;
use yellowstone_grpc_proto::prelude::{
    subscribe_update, CommitmentLevel, SubscribeRequest, SubscribeRequestFilterAccounts,
    SubscribeRequestFilterBlocksMeta, SubscribeRequestFilterSlots,
    SubscribeRequestFilterTransactions, SubscribeUpdate,
};

pub(crate) const UPDATE_BUFFER: usize = 128;
pub(crate) const ERROR_BUFFER: usize = 1;
pub(crate) const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub(crate) const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);
pub(crate) const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(1);
pub(crate) const MAX_MESSAGE_SIZE: usize = 1024 * 1024 * 1024;

/// Channels handed out by [`StreamClient::subscribe`].
pub struct ClientStreams {
    pub updates: mpsc::Receiver<SubscribeUpdate>,
    pub errors: mpsc::Receiver<anyhow::Error>,
}

/// Upstream stream source. Exactly one client is active at a time; the
/// source manager drives the lifecycle and owns reconnect policy.
#[async_trait]
pub trait StreamClient: Send {
    fn name(&self) -> &'static str;

    /// Slots to rewind on (re)subscribe so reconnect gaps are covered.
    fn replay_window(&self) -> u64;

    /// How long the source manager should back off after this client fails.
    fn retry_delay(&self) -> Duration;

    /// Validates configuration and prepares the client for `subscribe`.
    async fn connect(&mut self) -> Result<()>;

    /// Starts the subscription task from `start_slot`.
    async fn subscribe(&mut self, start_slot: u64) -> Result<ClientStreams>;

    /// Tears down the subscription task and the underlying connection.
    async fn close(&mut self);
}

/// Builds the canonical subscribe request: account snapshots by program
/// owner, swap traffic by program mention, slot status, and block metadata,
/// all at confirmed commitment from `from_slot`.
pub(crate) fn build_subscribe_request(
    program_filters: &BTreeMap<String, String>,
    from_slot: u64,
) -> SubscribeRequest {
    let mut accounts = HashMap::new();
    for (name, program_id) in program_filters {
        accounts.insert(
            name.clone(),
            SubscribeRequestFilterAccounts {
                owner: vec![program_id.clone()],
                ..SubscribeRequestFilterAccounts::default()
            },
        );
    }

    let transactions = HashMap::from([(
        "programs".to_string(),
        SubscribeRequestFilterTransactions {
            vote: Some(false),
            failed: Some(false),
            account_include: program_filters.values().cloned().collect(),
            ..SubscribeRequestFilterTransactions::default()
        },
    )]);

    SubscribeRequest {
        accounts,
        slots: HashMap::from([(
            "client".to_string(),
            SubscribeRequestFilterSlots::default(),
        )]),
        transactions,
        blocks_meta: HashMap::from([(
            "client".to_string(),
            SubscribeRequestFilterBlocksMeta::default(),
        )]),
        commitment: Some(CommitmentLevel::Confirmed as i32),
        from_slot: Some(from_slot),
        ..SubscribeRequest::default()
    }
}

/// Slot number carried by an update, zero when the variant has none.
pub fn extract_slot(update: &SubscribeUpdate) -> u64 {
    match update.update_oneof.as_ref() {
        Some(subscribe_update::UpdateOneof::Slot(slot)) => slot.slot,
        Some(subscribe_update::UpdateOneof::Account(account)) => account.slot,
        Some(subscribe_update::UpdateOneof::Transaction(tx)) => tx.slot,
        Some(subscribe_update::UpdateOneof::Block(block)) => block.slot,
        Some(subscribe_update::UpdateOneof::BlockMeta(meta)) => meta.slot,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yellowstone_grpc_proto::prelude::{SubscribeUpdatePing, SubscribeUpdateSlot};

    fn filters() -> BTreeMap<String, String> {
        BTreeMap::from([
            (
                "orca_whirlpool".to_string(),
                "whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc".to_string(),
            ),
            (
                "raydium_clmm".to_string(),
                "CAMMCzo5YL8w4VFF8KVHrK22GGUsp5VTaW7grrKgrWqK".to_string(),
            ),
        ])
    }

    #[test]
    fn subscribe_request_covers_accounts_transactions_slots_and_blocks() {
        let request = build_subscribe_request(&filters(), 4_000);

        assert_eq!(request.accounts.len(), 2);
        let raydium = request.accounts.get("raydium_clmm").expect("account filter");
        assert_eq!(
            raydium.owner,
            vec!["CAMMCzo5YL8w4VFF8KVHrK22GGUsp5VTaW7grrKgrWqK".to_string()]
        );

        let transactions = request.transactions.get("programs").expect("tx filter");
        assert_eq!(transactions.vote, Some(false));
        assert_eq!(transactions.failed, Some(false));
        assert_eq!(transactions.account_include.len(), 2);

        assert!(request.slots.contains_key("client"));
        assert!(request.blocks_meta.contains_key("client"));
        assert_eq!(request.commitment, Some(CommitmentLevel::Confirmed as i32));
        assert_eq!(request.from_slot, Some(4_000));
    }

    #[test]
    fn extract_slot_reads_every_variant() {
        let slot_update = SubscribeUpdate {
            update_oneof: Some(subscribe_update::UpdateOneof::Slot(SubscribeUpdateSlot {
                slot: 42,
                ..SubscribeUpdateSlot::default()
            })),
            ..SubscribeUpdate::default()
        };
        assert_eq!(extract_slot(&slot_update), 42);

        let ping = SubscribeUpdate {
            update_oneof: Some(subscribe_update::UpdateOneof::Ping(SubscribeUpdatePing {})),
            ..SubscribeUpdate::default()
        };
        assert_eq!(extract_slot(&ping), 0);

        assert_eq!(extract_slot(&SubscribeUpdate::default()), 0);
    }
}
