//! Chain event source — the collaborator that delivers ledger data.
//!
//! The source supplies events ordered by `(block_number, log_index)`, supports
//! re-fetching a height range (replay after a reorg), and exposes the
//! canonical chain's hash at a given height (fork-point discovery).

use async_trait::async_trait;

use crate::error::IndexError;
use crate::types::RawChainEvent;

/// Read access to the canonical chain, implemented per chain/provider.
#[async_trait]
pub trait ChainEventSource: Send + Sync {
    /// Current canonical head block number.
    async fn head_number(&self) -> Result<u64, IndexError>;

    /// Canonical block hash at `height` (`None` above the head).
    async fn canonical_hash(&self, height: u64) -> Result<Option<String>, IndexError>;

    /// All events in `[from, to]`, ordered by `(block_number, log_index)`.
    async fn events_in_range(&self, from: u64, to: u64)
        -> Result<Vec<RawChainEvent>, IndexError>;
}
