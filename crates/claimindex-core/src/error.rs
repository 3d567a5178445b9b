//! Error types for the claimindex pipeline.

use thiserror::Error;

/// Errors that can occur during ingestion and reconciliation.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("duplicate event ({tx_hash}, {log_index}) — already indexed")]
    DuplicateEvent { tx_hash: String, log_index: u32 },

    #[error(
        "out-of-order event at block {block_number} log {log_index} (checkpoint {checkpoint})"
    )]
    OutOfOrderEvent {
        block_number: u64,
        log_index: u32,
        checkpoint: u64,
    },

    #[error("fork at block {fork_detected_at} has no common ancestor within the last {window} headers")]
    ForkWindowExhausted { fork_detected_at: u64, window: usize },

    #[error("replay source unavailable: {reason}")]
    ReplaySourceUnavailable { reason: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("event source error: {0}")]
    Source(String),

    #[error("pipeline for chain '{chain}' is halted pending operator resync")]
    Halted { chain: String },
}

impl IndexError {
    /// Returns `true` if the error is a benign no-op (safe to log and drop).
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::DuplicateEvent { .. })
    }

    /// Returns `true` if the error halts automatic reconciliation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ForkWindowExhausted { .. })
    }
}
