//! Shared types for the claim-ledger ingestion pipeline.

use serde::{Deserialize, Serialize};

// ─── RawChainEvent ───────────────────────────────────────────────────────────

/// A ledger event as delivered by the chain event source.
///
/// Stake, dispute, and reward events all arrive in this shape; `event_type`
/// carries the contract event name and `payload` the decoded fields.
/// Identity is `(tx_hash, log_index)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChainEvent {
    /// Transaction hash (`0x…`).
    pub tx_hash: String,
    /// Log index within the transaction's block.
    pub log_index: u32,
    /// Contract address that emitted the event.
    pub contract_address: String,
    /// Event name (e.g. `"Staked"`, `"DisputeOpened"`, `"RewardClaimed"`).
    pub event_type: String,
    /// Block number the event was included in.
    pub block_number: u64,
    /// Hash of that block (`0x…`).
    pub block_hash: String,
    /// Hash of that block's parent.
    pub parent_hash: String,
    /// Decoded event fields.
    pub payload: serde_json::Value,
    /// Unix timestamp of the block (seconds since epoch).
    pub timestamp: i64,
}

impl RawChainEvent {
    /// The `(tx_hash, log_index)` identity key.
    pub fn key(&self) -> (&str, u32) {
        (&self.tx_hash, self.log_index)
    }

    /// The header of the block this event was included in.
    pub fn header(&self) -> BlockHeader {
        BlockHeader {
            number: self.block_number,
            hash: self.block_hash.clone(),
            parent_hash: self.parent_hash.clone(),
            timestamp: self.timestamp,
        }
    }
}

// ─── BlockHeader ─────────────────────────────────────────────────────────────

/// A minimal block header — enough for reorg detection and checkpointing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block number.
    pub number: u64,
    /// Block hash (`0x…`).
    pub hash: String,
    /// Parent block hash (`0x…`).
    pub parent_hash: String,
    /// Unix timestamp of the block (seconds since epoch).
    pub timestamp: i64,
}

impl BlockHeader {
    /// Returns `true` if `parent` is the direct parent of `self`.
    pub fn extends(&self, parent: &BlockHeader) -> bool {
        self.number == parent.number + 1 && self.parent_hash == parent.hash
    }
}

// ─── ProcessedEvent ──────────────────────────────────────────────────────────

/// Whether an indexed event is on the canonical chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    /// Part of the canonical history.
    Active,
    /// Displaced by a reorg; retained for audit, never deleted.
    Orphaned,
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Orphaned => write!(f, "orphaned"),
        }
    }
}

/// An event that has been committed to the indexed log.
///
/// The store assigns `id` and stamps `indexed_at` at commit time. At most one
/// `Active` record exists per `(tx_hash, log_index)`; reconciliation flips
/// records to `Orphaned` rather than deleting them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedEvent {
    /// Store-assigned record id.
    pub id: u64,
    /// The event as delivered.
    pub event: RawChainEvent,
    /// Canonical-chain status.
    pub status: EventStatus,
    /// Unix timestamp of when the record was committed.
    pub indexed_at: i64,
}

// ─── Checkpoint ──────────────────────────────────────────────────────────────

/// The highest block fully reflected in the indexed log.
///
/// Singleton per pipeline instance. Moves forward only through the indexer's
/// commit path; moves backward only through the reconciler's rollback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Last fully indexed block number.
    pub block_number: u64,
    /// Hash of that block.
    pub block_hash: String,
    /// Unix timestamp of the last update.
    pub updated_at: i64,
}

impl Checkpoint {
    pub fn new(block_number: u64, block_hash: impl Into<String>) -> Self {
        Self {
            block_number,
            block_hash: block_hash.into(),
            updated_at: chrono::Utc::now().timestamp(),
        }
    }
}

// ─── ReconciliationReport ────────────────────────────────────────────────────

/// Summary of one completed reconciliation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// First height at which the indexed and canonical chains diverged.
    pub fork_height: u64,
    /// Number of events re-statused to `Orphaned`.
    pub orphaned: u64,
    /// Number of canonical events replayed.
    pub replayed: u64,
    /// Checkpoint after the replay completed.
    pub checkpoint: Checkpoint,
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn header(number: u64, hash: &str, parent: &str) -> BlockHeader {
        BlockHeader {
            number,
            hash: hash.into(),
            parent_hash: parent.into(),
            timestamp: (number * 12) as i64,
        }
    }

    #[test]
    fn header_extends_parent() {
        let parent = header(100, "0xaaa", "0x000");
        let child = header(101, "0xbbb", "0xaaa");
        assert!(child.extends(&parent));
        assert!(!parent.extends(&child));
    }

    #[test]
    fn header_extends_false_on_gap() {
        let a = header(100, "0xaaa", "0x000");
        let b = header(102, "0xccc", "0xaaa"); // gap
        assert!(!b.extends(&a));
    }

    #[test]
    fn event_header_matches_fields() {
        let event = RawChainEvent {
            tx_hash: "0xt1".into(),
            log_index: 3,
            contract_address: "0xstaking".into(),
            event_type: "Staked".into(),
            block_number: 500,
            block_hash: "0xb500".into(),
            parent_hash: "0xb499".into(),
            payload: serde_json::json!({ "claimId": "claim-1", "amount": "100" }),
            timestamp: 6000,
        };
        let h = event.header();
        assert_eq!(h.number, 500);
        assert_eq!(h.hash, "0xb500");
        assert_eq!(h.parent_hash, "0xb499");
        assert_eq!(event.key(), ("0xt1", 3));
    }
}
