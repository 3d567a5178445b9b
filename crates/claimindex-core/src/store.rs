//! State store — the durable, transactional home for the checkpoint and the
//! processed-event log.
//!
//! The checkpoint advance and its covering events always land in one
//! transaction, so a crash can never leave the checkpoint ahead of the events
//! actually persisted for that block. Only the indexer's commit path and the
//! reconciler's rollback/replay path write.

use async_trait::async_trait;

use crate::error::IndexError;
use crate::types::{Checkpoint, EventStatus, ProcessedEvent, RawChainEvent};

/// Transactional storage capability for one pipeline instance.
///
/// Implementations include [`MemoryStateStore`] and the SQLite backend in
/// `claimindex-storage`.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// The latest committed checkpoint (`None` before the first commit).
    async fn checkpoint(&self) -> Result<Option<Checkpoint>, IndexError>;

    /// Persist a block's events together with the checkpoint advance as one
    /// transaction. Assigns record ids and stamps `indexed_at`.
    async fn commit(
        &self,
        checkpoint: Checkpoint,
        events: Vec<RawChainEvent>,
    ) -> Result<(), IndexError>;

    /// Roll the checkpoint back and mark every `Active` event above it as
    /// `Orphaned`, atomically. Returns the number of events orphaned.
    ///
    /// Records are re-statused, never deleted — the log is an audit trail.
    async fn rollback(&self, checkpoint: Checkpoint) -> Result<u64, IndexError>;

    /// Returns `true` if an `Active` record exists for `(tx_hash, log_index)`.
    async fn is_active(&self, tx_hash: &str, log_index: u32) -> Result<bool, IndexError>;

    /// All `Active` events, ordered by `(block_number, log_index)`.
    async fn active_events(&self) -> Result<Vec<ProcessedEvent>, IndexError>;
}

// ─── In-memory store (tests / ephemeral pipelines) ───────────────────────────

use std::sync::Mutex;

#[derive(Default)]
struct MemoryState {
    checkpoint: Option<Checkpoint>,
    log: Vec<ProcessedEvent>,
    next_id: u64,
}

/// In-memory state store. All data is lost when the value is dropped.
#[derive(Default)]
pub struct MemoryStateStore {
    state: Mutex<MemoryState>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of records in the log, orphaned included.
    pub fn record_count(&self) -> usize {
        self.state.lock().unwrap().log.len()
    }

    /// Records with the given status (any block).
    pub fn records_with_status(&self, status: EventStatus) -> Vec<ProcessedEvent> {
        self.state
            .lock()
            .unwrap()
            .log
            .iter()
            .filter(|r| r.status == status)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn checkpoint(&self) -> Result<Option<Checkpoint>, IndexError> {
        Ok(self.state.lock().unwrap().checkpoint.clone())
    }

    async fn commit(
        &self,
        checkpoint: Checkpoint,
        events: Vec<RawChainEvent>,
    ) -> Result<(), IndexError> {
        let mut state = self.state.lock().unwrap();
        let indexed_at = chrono::Utc::now().timestamp();
        for event in events {
            let id = state.next_id;
            state.next_id += 1;
            state.log.push(ProcessedEvent {
                id,
                event,
                status: EventStatus::Active,
                indexed_at,
            });
        }
        state.checkpoint = Some(checkpoint);
        Ok(())
    }

    async fn rollback(&self, checkpoint: Checkpoint) -> Result<u64, IndexError> {
        let mut state = self.state.lock().unwrap();
        let cutoff = checkpoint.block_number;
        let mut orphaned = 0;
        for record in state.log.iter_mut() {
            if record.status == EventStatus::Active && record.event.block_number > cutoff {
                record.status = EventStatus::Orphaned;
                orphaned += 1;
            }
        }
        state.checkpoint = Some(checkpoint);
        Ok(orphaned)
    }

    async fn is_active(&self, tx_hash: &str, log_index: u32) -> Result<bool, IndexError> {
        Ok(self.state.lock().unwrap().log.iter().any(|r| {
            r.status == EventStatus::Active
                && r.event.tx_hash == tx_hash
                && r.event.log_index == log_index
        }))
    }

    async fn active_events(&self) -> Result<Vec<ProcessedEvent>, IndexError> {
        let mut active: Vec<_> = self
            .state
            .lock()
            .unwrap()
            .log
            .iter()
            .filter(|r| r.status == EventStatus::Active)
            .cloned()
            .collect();
        active.sort_by_key(|r| (r.event.block_number, r.event.log_index));
        Ok(active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(tx: &str, log_index: u32, block: u64) -> RawChainEvent {
        RawChainEvent {
            tx_hash: tx.into(),
            log_index,
            contract_address: "0xstaking".into(),
            event_type: "Staked".into(),
            block_number: block,
            block_hash: format!("0xb{block}"),
            parent_hash: format!("0xb{}", block - 1),
            payload: serde_json::Value::Null,
            timestamp: (block * 12) as i64,
        }
    }

    #[tokio::test]
    async fn commit_advances_checkpoint_with_events() {
        let store = MemoryStateStore::new();
        assert!(store.checkpoint().await.unwrap().is_none());

        store
            .commit(Checkpoint::new(100, "0xb100"), vec![ev("0xt1", 0, 100), ev("0xt1", 1, 100)])
            .await
            .unwrap();

        let cp = store.checkpoint().await.unwrap().unwrap();
        assert_eq!(cp.block_number, 100);
        assert_eq!(store.active_events().await.unwrap().len(), 2);
        assert!(store.is_active("0xt1", 0).await.unwrap());
        assert!(!store.is_active("0xt9", 0).await.unwrap());
    }

    #[tokio::test]
    async fn rollback_orphans_without_deleting() {
        let store = MemoryStateStore::new();
        store
            .commit(Checkpoint::new(100, "0xb100"), vec![ev("0xt1", 0, 100)])
            .await
            .unwrap();
        store
            .commit(Checkpoint::new(101, "0xb101"), vec![ev("0xt2", 0, 101), ev("0xt3", 0, 101)])
            .await
            .unwrap();

        let orphaned = store.rollback(Checkpoint::new(100, "0xb100")).await.unwrap();
        assert_eq!(orphaned, 2);

        // Audit trail intact: records re-statused, not removed.
        assert_eq!(store.record_count(), 3);
        assert_eq!(store.active_events().await.unwrap().len(), 1);
        assert_eq!(store.records_with_status(EventStatus::Orphaned).len(), 2);
        assert!(!store.is_active("0xt2", 0).await.unwrap());

        let cp = store.checkpoint().await.unwrap().unwrap();
        assert_eq!(cp.block_number, 100);
    }

    #[tokio::test]
    async fn active_events_sorted_by_block_then_log_index() {
        let store = MemoryStateStore::new();
        store
            .commit(
                Checkpoint::new(101, "0xb101"),
                vec![ev("0xt2", 1, 101), ev("0xt2", 0, 101), ev("0xt1", 0, 100)],
            )
            .await
            .unwrap();

        let active = store.active_events().await.unwrap();
        let order: Vec<_> = active.iter().map(|r| (r.event.block_number, r.event.log_index)).collect();
        assert_eq!(order, vec![(100, 0), (101, 0), (101, 1)]);
    }
}
