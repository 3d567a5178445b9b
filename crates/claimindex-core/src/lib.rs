//! claimindex-core — reorg-safe ingestion of claim-ledger events.
//!
//! # Architecture
//!
//! ```text
//! ChainEventSource → IngestPipeline (one per chain)
//!                        ├── ReorgDetector   (header window, fork-point walk)
//!                        ├── EventIndexer    (per-block batch commits)
//!                        ├── Reconciler      (rollback + canonical replay)
//!                        └── StateStore      (checkpoint + processed-event log)
//! ```
//!
//! The pipeline consumes one ordered event stream, keeps the processed-event
//! log consistent with the canonical chain across reorgs, and never deletes
//! history — displaced events are re-statused, not removed. Vote resolution
//! lives in the sibling `claimindex-resolve` crate and has no dependency on
//! anything here.

pub mod error;
pub mod indexer;
pub mod pipeline;
pub mod reconcile;
pub mod reorg;
pub mod source;
pub mod store;
pub mod types;
pub mod window;

pub use error::IndexError;
pub use indexer::{EventIndexer, IndexerConfig};
pub use pipeline::{IngestPipeline, PipelineState};
pub use reconcile::Reconciler;
pub use reorg::{Observation, ReorgDetector};
pub use source::ChainEventSource;
pub use store::{MemoryStateStore, StateStore};
pub use types::{
    BlockHeader, Checkpoint, EventStatus, ProcessedEvent, RawChainEvent, ReconciliationReport,
};
pub use window::HeaderWindow;
