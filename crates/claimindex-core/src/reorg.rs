//! Reorg detection — watches the incoming header stream for divergence from
//! the indexed history and locates the fork point against the canonical chain.

use crate::error::IndexError;
use crate::source::ChainEventSource;
use crate::types::BlockHeader;
use crate::window::HeaderWindow;

/// Outcome of observing one header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// The header extends the indexed history; ingestion may proceed.
    Continue,
    /// The chains diverge; the first non-canonical indexed height is given.
    ForkAt(u64),
}

/// Detects chain divergence against a rolling window of indexed headers.
///
/// On a parent-hash mismatch the detector walks backward, comparing each
/// stored hash against the canonical chain's hash at the same height, until a
/// common ancestor is found. Running out of window without a match is fatal:
/// the fork is deeper than the retained history and requires an operator
/// resync rather than a guess.
pub struct ReorgDetector {
    window: HeaderWindow,
}

impl ReorgDetector {
    /// Create a detector retaining at most `window_size` confirmed headers.
    /// 64 covers every reorg depth observed on the ledger chains we index.
    pub fn new(window_size: usize) -> Self {
        Self {
            window: HeaderWindow::new(window_size),
        }
    }

    /// Observe the header of a newly delivered block.
    pub async fn observe<S>(
        &mut self,
        header: &BlockHeader,
        source: &S,
    ) -> Result<Observation, IndexError>
    where
        S: ChainEventSource + ?Sized,
    {
        if self.window.is_empty() {
            self.window.push(header.clone());
            return Ok(Observation::Continue);
        }

        if let Some(stored) = self.window.get(header.number) {
            if stored.hash == header.hash {
                // Same block again (several events per block) — nothing new.
                return Ok(Observation::Continue);
            }
            // A competing block at an already-indexed height.
            let fork = self.locate_fork(header, source).await?;
            return Ok(Observation::ForkAt(fork));
        }

        if let Some(parent) = self.window.get(header.number.saturating_sub(1)) {
            if header.parent_hash == parent.hash {
                self.window.push(header.clone());
                return Ok(Observation::Continue);
            }
            let fork = self.locate_fork(header, source).await?;
            return Ok(Observation::ForkAt(fork));
        }

        // Neither the height nor its parent is retained: blocks without
        // events never enter the window, so this is either a jump past such
        // a gap or a stale delivery the indexer's order check will reject.
        let head = self.window.head().expect("window not empty");
        if header.number > head.number {
            self.window.push(header.clone());
        }
        Ok(Observation::Continue)
    }

    /// Record a replayed canonical header without a divergence check.
    pub fn record(&mut self, header: &BlockHeader) {
        if self
            .window
            .head()
            .is_some_and(|h| h.number == header.number && h.hash == header.hash)
        {
            return;
        }
        self.window.push(header.clone());
    }

    /// Drop every retained header above `number` (rollback support).
    pub fn rewind_to(&mut self, number: u64) {
        self.window.rewind_to(number);
    }

    /// Forget all retained history (operator resync).
    pub fn reset(&mut self) {
        self.window.clear();
    }

    /// Walk backward from the divergent header until the stored hash matches
    /// the canonical chain's hash at the same height. Heights absent from the
    /// window (blocks that carried no events) are skipped; the fork point is
    /// then conservative — never past the true divergence.
    async fn locate_fork<S>(
        &self,
        header: &BlockHeader,
        source: &S,
    ) -> Result<u64, IndexError>
    where
        S: ChainEventSource + ?Sized,
    {
        let oldest = self.window.oldest().unwrap_or(0);
        let mut height = header.number.saturating_sub(1);
        while height >= oldest {
            if let Some(stored) = self.window.get(height) {
                let canonical = source.canonical_hash(height).await?;
                if canonical.as_deref() == Some(stored.hash.as_str()) {
                    let fork = height + 1;
                    tracing::warn!(
                        detected_at = header.number,
                        fork_height = fork,
                        depth = header.number - fork + 1,
                        "chain divergence detected"
                    );
                    return Ok(fork);
                }
            }
            if height == 0 {
                break;
            }
            height -= 1;
        }
        tracing::error!(
            detected_at = header.number,
            window = self.window.len(),
            "no common ancestor within the header window"
        );
        Err(IndexError::ForkWindowExhausted {
            fork_detected_at: header.number,
            window: self.window.len(),
        })
    }
}
