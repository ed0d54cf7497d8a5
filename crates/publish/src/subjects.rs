//! Subject derivation and broker message ids.
//!
//! Message ids are the broker-side dedup keys: replays from the reconnect
//! window carry the same id and are absorbed, while the finalize/undo
//! republishes differ in the phase suffix and pass through.

use lpstream_proto::{BlockHead, Candle, PoolSnapshot, SwapEvent, TxMeta};

const MAX_SEGMENT_LEN: usize = 16;

/// Known program-id -> subject alias pairs.
const PROGRAM_SUBJECT_ALIASES: [(&str, &str); 5] = [
    ("CAMMCzo5YL8w4VFF8KVHrK22GGUsp5VTaW7grrKgrWqK", "raydium"),
    ("whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc", "orca"),
    ("LBUZKhRxPF3XUpBCjp4YzTKgLccjZhTSDM9YuVaPwxo", "meteora"),
    ("Eo7WjKq67rjJQSZxS6z3YkapzY3eMj6Xy8X5EQVn5UaB", "meteora"),
    ("cpamdpZCGKUy5JxQXB4dcpGPiikHawvSWAd6mEn1sGG", "meteora"),
];

/// Subject segment for a program id: a short alias for the known AMMs, or a
/// sanitised lowercase prefix otherwise.
pub fn program_segment(program_id: &str) -> String {
    if program_id.is_empty() {
        return "unknown".to_string();
    }
    for (id, alias) in PROGRAM_SUBJECT_ALIASES {
        if id == program_id {
            return alias.to_string();
        }
    }
    let mut cleaned: String = program_id
        .chars()
        .filter(|c| !matches!(c, '.' | ' ' | '*' | '>'))
        .collect();
    cleaned.truncate(MAX_SEGMENT_LEN);
    cleaned.to_lowercase()
}

pub fn swap_subject(root: &str, program_id: &str) -> String {
    format!("{root}.{}.swap", program_segment(program_id))
}

pub fn block_head_subject(root: &str) -> String {
    format!("{root}.blocks.head")
}

pub fn tx_meta_subject(root: &str) -> String {
    format!("{root}.tx.meta")
}

pub fn pool_snapshot_subject(root: &str) -> String {
    format!("{root}.pool.snapshot")
}

pub fn candle_subject(root: &str, candle: &Candle) -> String {
    let scope = if candle.pool_id.is_empty() {
        "pair"
    } else {
        "pool"
    };
    format!("{root}.candle.{scope}.{}", candle.timeframe)
}

/// Identity plus phase: two publishes of the same swap in the same phase
/// dedup, the finalize/undo follow-ups do not.
pub fn swap_msg_id(event: &SwapEvent) -> String {
    format!(
        "{}:{}:{}:{}:{}:{}",
        event.chain_id, event.slot, event.sig, event.index, event.provisional, event.is_undo
    )
}

pub fn block_head_msg_id(head: &BlockHead) -> String {
    format!("{}:{}:{}", head.chain_id, head.slot, head.status)
}

pub fn tx_meta_msg_id(meta: &TxMeta) -> String {
    format!("{}:{}:{}", meta.chain_id, meta.slot, meta.sig)
}

pub fn pool_snapshot_msg_id(snap: &PoolSnapshot) -> String {
    format!("{}:{}:{}", snap.chain_id, snap.slot, snap.pool_id)
}

pub fn candle_msg_id(candle: &Candle) -> String {
    format!(
        "{}:{}:{}:{}:{}",
        candle.chain_id, candle.pair_id, candle.pool_id, candle.window_start, candle.provisional
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use lpstream_proto::CHAIN_ID_SOLANA;

    #[test]
    fn known_programs_use_aliases() {
        assert_eq!(
            program_segment("CAMMCzo5YL8w4VFF8KVHrK22GGUsp5VTaW7grrKgrWqK"),
            "raydium"
        );
        assert_eq!(
            program_segment("whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc"),
            "orca"
        );
        assert_eq!(
            program_segment("LBUZKhRxPF3XUpBCjp4YzTKgLccjZhTSDM9YuVaPwxo"),
            "meteora"
        );
        assert_eq!(
            program_segment("cpamdpZCGKUy5JxQXB4dcpGPiikHawvSWAd6mEn1sGG"),
            "meteora"
        );
    }

    #[test]
    fn unknown_programs_get_sanitised_lowercase_prefix() {
        assert_eq!(program_segment(""), "unknown");
        assert_eq!(program_segment("AbC. *>dEf"), "abcdef");
        assert_eq!(
            program_segment("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA"),
            "aaaaaaaaaaaaaaaa"
        );
        assert!(program_segment("Some Program>With.Wildcards*").len() <= MAX_SEGMENT_LEN);
    }

    #[test]
    fn swap_subject_combines_root_and_alias() {
        assert_eq!(
            swap_subject("dex.sol", "CAMMCzo5YL8w4VFF8KVHrK22GGUsp5VTaW7grrKgrWqK"),
            "dex.sol.raydium.swap"
        );
        assert_eq!(block_head_subject("dex.sol"), "dex.sol.blocks.head");
        assert_eq!(tx_meta_subject("dex.sol"), "dex.sol.tx.meta");
    }

    #[test]
    fn swap_msg_id_carries_identity_and_phase() {
        let mut event = SwapEvent {
            chain_id: CHAIN_ID_SOLANA,
            slot: 123,
            sig: "A".to_string(),
            index: 0,
            provisional: true,
            ..SwapEvent::default()
        };
        assert_eq!(swap_msg_id(&event), "501:123:A:0:true:false");

        // A replayed copy of the same provisional swap dedups to the same id.
        let replayed = event.clone();
        assert_eq!(swap_msg_id(&event), swap_msg_id(&replayed));

        // The finalize and undo phases produce distinct ids.
        event.provisional = false;
        assert_eq!(swap_msg_id(&event), "501:123:A:0:false:false");
        event.is_undo = true;
        assert_eq!(swap_msg_id(&event), "501:123:A:0:false:true");
    }

    #[test]
    fn candle_subject_scopes_by_pool_presence() {
        let mut candle = Candle {
            timeframe: "1m".to_string(),
            ..Candle::default()
        };
        assert_eq!(candle_subject("dex.sol", &candle), "dex.sol.candle.pair.1m");
        candle.pool_id = "pool".to_string();
        assert_eq!(candle_subject("dex.sol", &candle), "dex.sol.candle.pool.1m");
    }
}
