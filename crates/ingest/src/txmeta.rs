//! Transaction metadata conversion.

use lpstream_proto::{TxMeta, CHAIN_ID_SOLANA};
use yellowstone_grpc_proto::prelude::SubscribeUpdateTransaction;

/// Builds a canonical [`TxMeta`] from a transaction update. Returns `None`
/// when the update carries no metadata.
pub fn convert_tx_meta(tx: &SubscribeUpdateTransaction) -> Option<TxMeta> {
    let info = tx.transaction.as_ref()?;
    let meta = info.meta.as_ref()?;

    let success = !meta.err.as_ref().is_some_and(|err| !err.err.is_empty());
    Some(TxMeta {
        chain_id: CHAIN_ID_SOLANA,
        slot: tx.slot,
        sig: bs58::encode(&info.signature).into_string(),
        success,
        cu_used: meta.compute_units_consumed.unwrap_or(0),
        cu_price: 0,
        log_msgs: meta.log_messages.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use yellowstone_grpc_proto::prelude::{
        SubscribeUpdateTransactionInfo, TransactionError, TransactionStatusMeta,
    };

    fn update(meta: Option<TransactionStatusMeta>) -> SubscribeUpdateTransaction {
        SubscribeUpdateTransaction {
            slot: 99,
            transaction: Some(SubscribeUpdateTransactionInfo {
                signature: vec![3u8; 64],
                is_vote: false,
                transaction: None,
                meta,
                index: 4,
            }),
        }
    }

    #[test]
    fn converts_successful_transaction() {
        let meta = TransactionStatusMeta {
            compute_units_consumed: Some(54_321),
            log_messages: vec!["Program log: hi".to_string()],
            ..TransactionStatusMeta::default()
        };
        let converted = convert_tx_meta(&update(Some(meta))).expect("tx meta");
        assert_eq!(converted.chain_id, CHAIN_ID_SOLANA);
        assert_eq!(converted.slot, 99);
        assert_eq!(converted.sig, bs58::encode([3u8; 64]).into_string());
        assert!(converted.success);
        assert_eq!(converted.cu_used, 54_321);
        assert_eq!(converted.log_msgs.len(), 1);
    }

    #[test]
    fn failed_transactions_are_marked_unsuccessful() {
        let meta = TransactionStatusMeta {
            err: Some(TransactionError {
                err: vec![1, 2, 3],
            }),
            ..TransactionStatusMeta::default()
        };
        let converted = convert_tx_meta(&update(Some(meta))).expect("tx meta");
        assert!(!converted.success);
    }

    #[test]
    fn missing_meta_yields_none() {
        assert!(convert_tx_meta(&update(None)).is_none());
        assert!(convert_tx_meta(&SubscribeUpdateTransaction::default()).is_none());
    }
}
