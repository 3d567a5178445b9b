//! claimindex-resolve — weighted, fraud-resistant claim verdict resolution.
//!
//! Callers assemble a claim's votes from the indexed stake/dispute events and
//! invoke [`resolve`]; the result is computed on demand and owned by the
//! caller. The resolver is a pure function — no I/O, no hidden state — and is
//! safe to call concurrently for the same or different claims.
//!
//! Fraud resistance comes from four fail-closed gates:
//! - a participation floor (`min_total_weight`),
//! - a whale-dominance cap (`max_voter_share`),
//! - exact-tie detection, and
//! - a confidence margin a winner must exceed.
//!
//! Stake contributes sub-linearly (`0.1 · √stake`) so capital cannot outvote
//! reputation, while many throwaway reputation-1 identities still cannot
//! outweigh one well-reputed voter.

pub mod resolver;
pub mod vote;

pub use resolver::resolve;
pub use vote::{
    ResolutionOptions, ResolutionResult, ResolvedVerdict, Verdict, Vote, WeightTally,
};
