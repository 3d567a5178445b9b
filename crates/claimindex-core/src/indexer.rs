//! Event indexer — idempotent, order-preserving ingestion of ledger events
//! into the processed-event log.
//!
//! Events buffer per block and land in the store together with the checkpoint
//! advance as one transaction when the block is complete. A crash therefore
//! loses at most the uncommitted buffer — never half a block.

use std::sync::Arc;

use crate::error::IndexError;
use crate::store::StateStore;
use crate::types::{Checkpoint, RawChainEvent};

/// Configuration for an indexer instance.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Chain slug this indexer serves (used in logs and halt errors).
    pub chain: String,
    /// How many blocks behind the checkpoint a redelivered event is still
    /// tolerated as a benign duplicate instead of an ordering violation.
    pub redelivery_tolerance: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            chain: "ledger".into(),
            redelivery_tolerance: 6,
        }
    }
}

/// Events buffered for the block currently being assembled.
struct PendingBlock {
    number: u64,
    hash: String,
    events: Vec<RawChainEvent>,
}

/// Ingests ordered ledger events, committing one block batch at a time.
pub struct EventIndexer {
    store: Arc<dyn StateStore>,
    config: IndexerConfig,
    /// Last committed checkpoint, mirrored from the store.
    cursor: Option<Checkpoint>,
    pending: Option<PendingBlock>,
}

impl EventIndexer {
    /// Create an indexer resuming from the store's committed checkpoint.
    pub async fn resume(
        store: Arc<dyn StateStore>,
        config: IndexerConfig,
    ) -> Result<Self, IndexError> {
        let cursor = store.checkpoint().await?;
        if let Some(cp) = &cursor {
            tracing::info!(
                chain = %config.chain,
                block = cp.block_number,
                hash = %cp.block_hash,
                "resuming from checkpoint"
            );
        }
        Ok(Self {
            store,
            config,
            cursor,
            pending: None,
        })
    }

    /// Ingest one event on the normal, order-enforcing path.
    pub async fn ingest(&mut self, event: RawChainEvent) -> Result<(), IndexError> {
        self.admit(event, false).await
    }

    /// Ingest one event on the reconciler's replay path. Ordering against the
    /// rolled-back checkpoint still applies; the redelivery tolerance does not.
    pub async fn replay(&mut self, event: RawChainEvent) -> Result<(), IndexError> {
        self.admit(event, true).await
    }

    /// Commit the buffered block, if any. Returns the checkpoint it advanced to.
    pub async fn flush(&mut self) -> Result<Option<Checkpoint>, IndexError> {
        let Some(pending) = self.pending.take() else {
            return Ok(None);
        };
        let checkpoint = Checkpoint::new(pending.number, pending.hash.clone());
        match self
            .store
            .commit(checkpoint.clone(), pending.events.clone())
            .await
        {
            Ok(()) => {
                tracing::info!(
                    chain = %self.config.chain,
                    block = pending.number,
                    events = pending.events.len(),
                    "block batch committed"
                );
                self.cursor = Some(checkpoint.clone());
                Ok(Some(checkpoint))
            }
            Err(err) => {
                // Nothing landed; keep the buffer so the caller can retry.
                self.pending = Some(pending);
                Err(err)
            }
        }
    }

    /// Reset after a rollback: drop the buffer and adopt the rolled-back
    /// checkpoint as the cursor.
    pub fn rewind(&mut self, checkpoint: Checkpoint) {
        self.pending = None;
        self.cursor = Some(checkpoint);
    }

    /// The last committed checkpoint this indexer has seen.
    pub fn checkpoint(&self) -> Option<&Checkpoint> {
        self.cursor.as_ref()
    }

    async fn admit(&mut self, event: RawChainEvent, replay: bool) -> Result<(), IndexError> {
        if let Some(pending) = &self.pending {
            if pending.events.iter().any(|e| e.key() == event.key()) {
                return Err(self.duplicate(&event));
            }
        }
        if self.store.is_active(&event.tx_hash, event.log_index).await? {
            return Err(self.duplicate(&event));
        }

        if let Some(cp) = &self.cursor {
            if event.block_number <= cp.block_number {
                let behind = cp.block_number - event.block_number;
                if !replay && behind <= self.config.redelivery_tolerance {
                    // Redelivery of an already-committed block; not an
                    // ordering violation.
                    return Err(self.duplicate(&event));
                }
                return Err(IndexError::OutOfOrderEvent {
                    block_number: event.block_number,
                    log_index: event.log_index,
                    checkpoint: cp.block_number,
                });
            }
        }

        let committed = self.committed_block();
        match &mut self.pending {
            Some(pending) if event.block_number == pending.number => {
                let last = pending.events.last().map(|e| e.log_index).unwrap_or(0);
                if event.block_hash != pending.hash || event.log_index <= last {
                    return Err(IndexError::OutOfOrderEvent {
                        block_number: event.block_number,
                        log_index: event.log_index,
                        checkpoint: committed,
                    });
                }
                pending.events.push(event);
            }
            Some(pending) if event.block_number < pending.number => {
                return Err(IndexError::OutOfOrderEvent {
                    block_number: event.block_number,
                    log_index: event.log_index,
                    checkpoint: committed,
                });
            }
            _ => {
                // First event of a later block: seal the finished batch.
                self.flush().await?;
                tracing::debug!(
                    chain = %self.config.chain,
                    block = event.block_number,
                    "opening block batch"
                );
                self.pending = Some(PendingBlock {
                    number: event.block_number,
                    hash: event.block_hash.clone(),
                    events: vec![event],
                });
            }
        }
        Ok(())
    }

    fn duplicate(&self, event: &RawChainEvent) -> IndexError {
        tracing::debug!(
            chain = %self.config.chain,
            tx_hash = %event.tx_hash,
            log_index = event.log_index,
            "duplicate event ignored"
        );
        IndexError::DuplicateEvent {
            tx_hash: event.tx_hash.clone(),
            log_index: event.log_index,
        }
    }

    fn committed_block(&self) -> u64 {
        self.cursor.as_ref().map(|c| c.block_number).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::store::MemoryStateStore;
    use crate::types::ProcessedEvent;

    fn ev(tx: &str, log_index: u32, block: u64) -> RawChainEvent {
        RawChainEvent {
            tx_hash: tx.into(),
            log_index,
            contract_address: "0xdispute".into(),
            event_type: "DisputeOpened".into(),
            block_number: block,
            block_hash: format!("0xb{block}"),
            parent_hash: format!("0xb{}", block - 1),
            payload: serde_json::Value::Null,
            timestamp: (block * 12) as i64,
        }
    }

    async fn indexer_with_store() -> (EventIndexer, Arc<MemoryStateStore>) {
        let store = Arc::new(MemoryStateStore::new());
        let indexer = EventIndexer::resume(store.clone(), IndexerConfig::default())
            .await
            .unwrap();
        (indexer, store)
    }

    #[tokio::test]
    async fn ingest_is_idempotent() {
        let (mut indexer, store) = indexer_with_store().await;

        indexer.ingest(ev("0xt1", 0, 100)).await.unwrap();
        indexer.flush().await.unwrap();
        assert_eq!(store.active_events().await.unwrap().len(), 1);

        // Same (tx_hash, log_index) again — benign no-op.
        let err = indexer.ingest(ev("0xt1", 0, 100)).await.unwrap_err();
        assert!(err.is_benign());
        indexer.flush().await.unwrap();
        assert_eq!(store.active_events().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_within_buffer_is_benign() {
        let (mut indexer, _store) = indexer_with_store().await;
        indexer.ingest(ev("0xt1", 0, 100)).await.unwrap();
        let err = indexer.ingest(ev("0xt1", 0, 100)).await.unwrap_err();
        assert!(err.is_benign());
    }

    #[tokio::test]
    async fn block_batch_commits_on_boundary() {
        let (mut indexer, store) = indexer_with_store().await;

        indexer.ingest(ev("0xt1", 0, 100)).await.unwrap();
        indexer.ingest(ev("0xt2", 1, 100)).await.unwrap();
        // Nothing committed until the block is complete.
        assert!(store.checkpoint().await.unwrap().is_none());

        // First event of block 101 seals block 100.
        indexer.ingest(ev("0xt3", 0, 101)).await.unwrap();
        let cp = store.checkpoint().await.unwrap().unwrap();
        assert_eq!(cp.block_number, 100);
        assert_eq!(cp.block_hash, "0xb100");
        assert_eq!(store.active_events().await.unwrap().len(), 2);

        // Explicit flush seals the trailing block.
        let cp = indexer.flush().await.unwrap().unwrap();
        assert_eq!(cp.block_number, 101);
        assert_eq!(store.active_events().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn stale_event_rejected_beyond_tolerance() {
        let (mut indexer, _store) = indexer_with_store().await;
        indexer.ingest(ev("0xt1", 0, 100)).await.unwrap();
        indexer.flush().await.unwrap();

        // 10 blocks behind a tolerance of 6: ordering violation.
        let err = indexer.ingest(ev("0xt2", 0, 90)).await.unwrap_err();
        assert!(matches!(err, IndexError::OutOfOrderEvent { checkpoint: 100, .. }));

        // 3 blocks behind: tolerated as redelivery.
        let err = indexer.ingest(ev("0xt3", 0, 97)).await.unwrap_err();
        assert!(err.is_benign());
    }

    #[tokio::test]
    async fn log_index_must_ascend_within_block() {
        let (mut indexer, _store) = indexer_with_store().await;
        indexer.ingest(ev("0xt1", 2, 100)).await.unwrap();
        let err = indexer.ingest(ev("0xt2", 1, 100)).await.unwrap_err();
        assert!(matches!(err, IndexError::OutOfOrderEvent { log_index: 1, .. }));
    }

    #[tokio::test]
    async fn replay_bypasses_redelivery_tolerance() {
        let (mut indexer, store) = indexer_with_store().await;
        for block in 100..=105 {
            indexer.ingest(ev(&format!("0xt{block}"), 0, block)).await.unwrap();
        }
        indexer.flush().await.unwrap();

        // Roll back to 101 and replay the canonical branch.
        store.rollback(Checkpoint::new(101, "0xb101")).await.unwrap();
        indexer.rewind(Checkpoint::new(101, "0xb101"));
        indexer.replay(ev("0xt102b", 0, 102)).await.unwrap();
        indexer.flush().await.unwrap();

        let active = store.active_events().await.unwrap();
        assert_eq!(active.last().unwrap().event.tx_hash, "0xt102b");
    }

    // Store wrapper that fails commits on demand.
    struct FlakyStore {
        inner: MemoryStateStore,
        fail_commits: AtomicBool,
    }

    #[async_trait]
    impl StateStore for FlakyStore {
        async fn checkpoint(&self) -> Result<Option<Checkpoint>, IndexError> {
            self.inner.checkpoint().await
        }

        async fn commit(
            &self,
            checkpoint: Checkpoint,
            events: Vec<RawChainEvent>,
        ) -> Result<(), IndexError> {
            if self.fail_commits.load(Ordering::Relaxed) {
                return Err(IndexError::Storage("commit failed".into()));
            }
            self.inner.commit(checkpoint, events).await
        }

        async fn rollback(&self, checkpoint: Checkpoint) -> Result<u64, IndexError> {
            self.inner.rollback(checkpoint).await
        }

        async fn is_active(&self, tx_hash: &str, log_index: u32) -> Result<bool, IndexError> {
            self.inner.is_active(tx_hash, log_index).await
        }

        async fn active_events(&self) -> Result<Vec<ProcessedEvent>, IndexError> {
            self.inner.active_events().await
        }
    }

    #[tokio::test]
    async fn failed_commit_leaves_checkpoint_unmoved() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStateStore::new(),
            fail_commits: AtomicBool::new(false),
        });
        let mut indexer = EventIndexer::resume(store.clone(), IndexerConfig::default())
            .await
            .unwrap();

        indexer.ingest(ev("0xt1", 0, 100)).await.unwrap();
        indexer.flush().await.unwrap();

        store.fail_commits.store(true, Ordering::Relaxed);
        indexer.ingest(ev("0xt2", 0, 101)).await.unwrap();
        assert!(indexer.flush().await.is_err());

        // Checkpoint never runs ahead of the events actually persisted.
        let cp = store.checkpoint().await.unwrap().unwrap();
        assert_eq!(cp.block_number, 100);
        assert_eq!(store.active_events().await.unwrap().len(), 1);

        // The buffer survives the failure; a retry lands the block.
        store.fail_commits.store(false, Ordering::Relaxed);
        let cp = indexer.flush().await.unwrap().unwrap();
        assert_eq!(cp.block_number, 101);
        assert_eq!(store.active_events().await.unwrap().len(), 2);
    }
}
