//! Header window — a bounded sliding window of recently confirmed headers,
//! the raw material for fork-point discovery.

use std::collections::VecDeque;

use crate::types::BlockHeader;

/// Keeps the last N confirmed `(height, hash)` pairs, oldest first.
///
/// The window bounds how deep a fork can be located automatically: a
/// divergence older than the oldest retained header cannot be reconciled
/// without an operator resync.
pub struct HeaderWindow {
    window: VecDeque<BlockHeader>,
    capacity: usize,
}

impl HeaderWindow {
    /// Create a window retaining at most `capacity` headers.
    pub fn new(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a header, evicting the oldest once at capacity.
    pub fn push(&mut self, header: BlockHeader) {
        if self.window.len() >= self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(header);
    }

    /// The most recently pushed header.
    pub fn head(&self) -> Option<&BlockHeader> {
        self.window.back()
    }

    /// The header at `number`, if still retained.
    pub fn get(&self, number: u64) -> Option<&BlockHeader> {
        self.window.iter().rev().find(|h| h.number == number)
    }

    /// Oldest retained block number.
    pub fn oldest(&self) -> Option<u64> {
        self.window.front().map(|h| h.number)
    }

    /// Drop every header above `number`.
    pub fn rewind_to(&mut self, number: u64) {
        while let Some(back) = self.window.back() {
            if back.number > number {
                self.window.pop_back();
            } else {
                break;
            }
        }
    }

    /// Drop every retained header.
    pub fn clear(&mut self) {
        self.window.clear();
    }

    /// Number of retained headers.
    pub fn len(&self) -> usize {
        self.window.len()
    }

    /// Returns `true` if no headers are retained.
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}
