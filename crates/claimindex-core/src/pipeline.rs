//! The per-chain ingestion pipeline — explicit wiring of indexer, detector,
//! and reconciler over one store and one event source.
//!
//! One pipeline per chain/contract stream; `submit` takes `&mut self`, so
//! processing is strictly sequential and replayed history can never
//! interleave with fresh deliveries.

use std::sync::Arc;

use crate::error::IndexError;
use crate::indexer::{EventIndexer, IndexerConfig};
use crate::reconcile::Reconciler;
use crate::reorg::{Observation, ReorgDetector};
use crate::source::ChainEventSource;
use crate::store::StateStore;
use crate::types::{Checkpoint, RawChainEvent, ReconciliationReport};

/// Runtime state of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Not yet fed any events.
    Idle,
    /// Processing the ordered event stream.
    Ingesting,
    /// Rolling back and replaying after a fork.
    Reconciling,
    /// Fork deeper than the header window; awaiting operator resync.
    Halted,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Ingesting => write!(f, "ingesting"),
            Self::Reconciling => write!(f, "reconciling"),
            Self::Halted => write!(f, "halted"),
        }
    }
}

/// Orders deliveries through divergence detection, ingestion, and recovery.
pub struct IngestPipeline<S> {
    store: Arc<dyn StateStore>,
    source: S,
    indexer: EventIndexer,
    detector: ReorgDetector,
    reconciler: Reconciler,
    state: PipelineState,
    chain: String,
}

impl<S: ChainEventSource> IngestPipeline<S> {
    /// Wire a pipeline over its collaborators, resuming from the store's
    /// committed checkpoint.
    pub async fn new(
        store: Arc<dyn StateStore>,
        source: S,
        config: IndexerConfig,
        header_window: usize,
    ) -> Result<Self, IndexError> {
        let chain = config.chain.clone();
        let indexer = EventIndexer::resume(store.clone(), config).await?;
        Ok(Self {
            store,
            source,
            indexer,
            detector: ReorgDetector::new(header_window),
            reconciler: Reconciler::new(),
            state: PipelineState::Idle,
            chain,
        })
    }

    /// Current pipeline state.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// The last committed checkpoint.
    pub fn checkpoint(&self) -> Option<&Checkpoint> {
        self.indexer.checkpoint()
    }

    /// Drive one delivered event through the pipeline.
    ///
    /// Benign duplicates are swallowed. A detected fork reconciles before
    /// this call returns; the triggering event is not indexed directly —
    /// replay re-fetches its height range from the canonical source.
    pub async fn submit(&mut self, event: RawChainEvent) -> Result<(), IndexError> {
        if self.state == PipelineState::Halted {
            return Err(IndexError::Halted {
                chain: self.chain.clone(),
            });
        }
        self.state = PipelineState::Ingesting;

        let header = event.header();
        match self.detector.observe(&header, &self.source).await {
            Ok(Observation::Continue) => match self.indexer.ingest(event).await {
                Ok(()) => Ok(()),
                Err(err) if err.is_benign() => Ok(()),
                Err(err) => Err(err),
            },
            Ok(Observation::ForkAt(fork)) => {
                self.reconcile(fork).await?;
                Ok(())
            }
            Err(err) => {
                if err.is_fatal() {
                    self.state = PipelineState::Halted;
                    tracing::error!(chain = %self.chain, %err, "pipeline halted");
                }
                Err(err)
            }
        }
    }

    /// Commit the trailing block batch (end of a delivery burst).
    pub async fn flush(&mut self) -> Result<Option<Checkpoint>, IndexError> {
        self.indexer.flush().await
    }

    /// Retry a reconciliation that failed with a retryable error.
    pub async fn retry_reconciliation(
        &mut self,
    ) -> Result<Option<ReconciliationReport>, IndexError> {
        match self.reconciler.pending() {
            Some(fork) => self.reconcile(fork).await.map(Some),
            None => Ok(None),
        }
    }

    /// Operator hook: after an out-of-band resync brought the store to
    /// `checkpoint`, drop all retained history and leave the halted state.
    pub fn resume_after_resync(&mut self, checkpoint: Checkpoint) {
        tracing::info!(
            chain = %self.chain,
            block = checkpoint.block_number,
            "resuming after operator resync"
        );
        self.indexer.rewind(checkpoint);
        self.detector.reset();
        self.state = PipelineState::Idle;
    }

    async fn reconcile(&mut self, fork: u64) -> Result<ReconciliationReport, IndexError> {
        self.state = PipelineState::Reconciling;
        let result = self
            .reconciler
            .reconcile(
                fork,
                &mut self.indexer,
                &mut self.detector,
                self.store.as_ref(),
                &self.source,
            )
            .await;
        match result {
            Ok(report) => {
                self.state = PipelineState::Ingesting;
                Ok(report)
            }
            Err(err) => {
                self.state = if err.is_fatal() {
                    PipelineState::Halted
                } else {
                    // Retryable: the reconciler kept the fork height.
                    PipelineState::Ingesting
                };
                Err(err)
            }
        }
    }
}
