//! Reconciliation — rolls the indexed log back to the fork point and replays
//! canonical history through the indexer's replay path.
//!
//! Each invocation is all-or-nothing: any mid-replay failure restores the
//! checkpoint to `fork_height - 1`, so retrying is simply calling
//! [`Reconciler::reconcile`] again.

use crate::error::IndexError;
use crate::indexer::EventIndexer;
use crate::reorg::ReorgDetector;
use crate::source::ChainEventSource;
use crate::store::StateStore;
use crate::types::{Checkpoint, ReconciliationReport};

/// Drives rollback and replay after a detected fork.
///
/// `&mut self` keeps one reconciliation in flight per pipeline; forks
/// detected while one is scheduled merge to the lower height.
#[derive(Default)]
pub struct Reconciler {
    pending: Option<u64>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request reconciliation from `fork_height`, merging with any pending
    /// request to the lower of the two heights.
    pub fn schedule(&mut self, fork_height: u64) {
        let merged = match self.pending {
            Some(pending) => pending.min(fork_height),
            None => fork_height,
        };
        if self.pending.is_some_and(|p| p != merged) {
            tracing::warn!(fork_height, merged, "fork requests merged");
        }
        self.pending = Some(merged);
    }

    /// Fork height awaiting reconciliation, if any.
    pub fn pending(&self) -> Option<u64> {
        self.pending
    }

    /// Run one reconciliation from `fork_height`, merged with any pending
    /// request to the lower of the two.
    ///
    /// On failure the fork height is retained, the checkpoint is left at
    /// `fork_height - 1`, and the call may simply be repeated.
    pub async fn reconcile<S>(
        &mut self,
        fork_height: u64,
        indexer: &mut EventIndexer,
        detector: &mut ReorgDetector,
        store: &dyn StateStore,
        source: &S,
    ) -> Result<ReconciliationReport, IndexError>
    where
        S: ChainEventSource + ?Sized,
    {
        self.schedule(fork_height);
        let fork = self.pending.take().expect("fork height just scheduled");

        match self.run(fork, indexer, detector, store, source).await {
            Ok(report) => Ok(report),
            Err(err) => {
                // Keep the request so a retry picks the same fork back up.
                self.schedule(fork);
                Err(err)
            }
        }
    }

    async fn run<S>(
        &mut self,
        fork: u64,
        indexer: &mut EventIndexer,
        detector: &mut ReorgDetector,
        store: &dyn StateStore,
        source: &S,
    ) -> Result<ReconciliationReport, IndexError>
    where
        S: ChainEventSource + ?Sized,
    {
        let ancestor = fork.saturating_sub(1);
        let ancestor_hash = source
            .canonical_hash(ancestor)
            .await
            .map_err(replay_unavailable)?
            .ok_or_else(|| IndexError::ReplaySourceUnavailable {
                reason: format!("no canonical hash at ancestor height {ancestor}"),
            })?;
        let safe = Checkpoint::new(ancestor, ancestor_hash);

        let orphaned = store.rollback(safe.clone()).await?;
        indexer.rewind(safe.clone());
        detector.rewind_to(ancestor);
        tracing::info!(fork, orphaned, "rolled back to fork ancestor");

        let head = source.head_number().await.map_err(replay_unavailable)?;
        let events = source
            .events_in_range(fork, head)
            .await
            .map_err(replay_unavailable)?;

        let mut replayed = 0u64;
        for event in events {
            detector.record(&event.header());
            match indexer.replay(event).await {
                Ok(()) => replayed += 1,
                Err(err) if err.is_benign() => {}
                Err(err) => {
                    self.restore_safe_point(&safe, indexer, detector, store).await?;
                    return Err(err);
                }
            }
        }
        if let Err(err) = indexer.flush().await {
            self.restore_safe_point(&safe, indexer, detector, store).await?;
            return Err(err);
        }

        let checkpoint = indexer.checkpoint().cloned().unwrap_or(safe);
        tracing::info!(
            fork,
            orphaned,
            replayed,
            head = checkpoint.block_number,
            "reconciliation complete"
        );
        Ok(ReconciliationReport {
            fork_height: fork,
            orphaned,
            replayed,
            checkpoint,
        })
    }

    /// Undo a partial replay so the invocation stays all-or-nothing.
    async fn restore_safe_point(
        &self,
        safe: &Checkpoint,
        indexer: &mut EventIndexer,
        detector: &mut ReorgDetector,
        store: &dyn StateStore,
    ) -> Result<(), IndexError> {
        store.rollback(safe.clone()).await?;
        indexer.rewind(safe.clone());
        detector.rewind_to(safe.block_number);
        Ok(())
    }
}

fn replay_unavailable(err: IndexError) -> IndexError {
    IndexError::ReplaySourceUnavailable {
        reason: err.to_string(),
    }
}
