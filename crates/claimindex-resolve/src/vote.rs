//! Vote and verdict types for claim resolution.

use serde::{Deserialize, Serialize};

/// Reputation bounds applied to every vote before weighting.
pub const REPUTATION_FLOOR: f64 = 1.0;
pub const REPUTATION_CEILING: f64 = 100.0;

/// Sub-linear stake contribution: weight gains `0.1 · √stake`.
pub const STAKE_WEIGHT_FACTOR: f64 = 0.1;

// ─── Verdicts ────────────────────────────────────────────────────────────────

/// A voter's position on a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    True,
    False,
    Unsure,
}

/// The outcome of resolving a claim's vote set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolvedVerdict {
    True,
    False,
    /// No verdict could be established; every gate fails closed to this.
    Unresolved,
}

impl std::fmt::Display for ResolvedVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "true"),
            Self::False => write!(f, "false"),
            Self::Unresolved => write!(f, "unresolved"),
        }
    }
}

// ─── Vote ────────────────────────────────────────────────────────────────────

/// One voter's weighted position on a claim.
///
/// `reputation` arrives as stored upstream and may be corrupt; it is clamped
/// to `[1, 100]` before weighting, which also caps any single voter's
/// reputation ceiling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    /// Claim this vote belongs to.
    pub claim_id: String,
    /// Voter identity.
    pub voter_id: String,
    /// The voter's position.
    pub verdict: Verdict,
    /// Raw reputation score as stored upstream.
    pub reputation: i64,
    /// Stake backing the vote; must be non-negative and finite.
    pub stake_amount: f64,
}

impl Vote {
    /// The vote's effective weight: clamped reputation plus the sub-linear
    /// stake term. Stake enters through a square root so capital alone
    /// cannot outvote reputation-based trust.
    pub fn weight(&self) -> f64 {
        let reputation = (self.reputation as f64).clamp(REPUTATION_FLOOR, REPUTATION_CEILING);
        reputation + STAKE_WEIGHT_FACTOR * self.stake_amount.max(0.0).sqrt()
    }

    /// Returns `true` if the vote may enter aggregation for `claim_id`.
    /// Invalid votes are excluded, never a reason to abort resolution.
    pub fn is_valid_for(&self, claim_id: &str) -> bool {
        self.claim_id == claim_id && self.stake_amount.is_finite() && self.stake_amount >= 0.0
    }
}

// ─── Options ─────────────────────────────────────────────────────────────────

/// Tuning knobs for [`crate::resolve`]. Every gate fails closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionOptions {
    /// Minimum combined weight required before any verdict is considered.
    pub min_total_weight: f64,
    /// If set, a single vote supplying at least this fraction of the total
    /// weight forces `Unresolved` regardless of the nominal winner.
    pub max_voter_share: Option<f64>,
    /// The winning margin, as a fraction of the margin basis, that must be
    /// exceeded for a verdict to stand.
    pub confidence_margin: f64,
    /// Whether `Unsure` weight counts toward the margin denominator.
    /// When `false`, abstentions cannot dilute a clear True/False split.
    pub unsure_in_margin_basis: bool,
}

impl Default for ResolutionOptions {
    fn default() -> Self {
        Self {
            min_total_weight: 10.0,
            max_voter_share: None,
            confidence_margin: 0.10,
            unsure_in_margin_basis: true,
        }
    }
}

// ─── Result ──────────────────────────────────────────────────────────────────

/// Weight accumulated per verdict bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightTally {
    pub true_weight: f64,
    pub false_weight: f64,
    pub unsure_weight: f64,
}

impl WeightTally {
    /// Combined weight across all buckets.
    pub fn total(&self) -> f64 {
        self.true_weight + self.false_weight + self.unsure_weight
    }
}

/// The resolver's verdict for one claim. Owned by the caller; nothing here
/// is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    /// Claim that was resolved.
    pub claim_id: String,
    /// The resolved verdict.
    pub verdict: ResolvedVerdict,
    /// Combined weight of all valid votes.
    pub total_weight: f64,
    /// Weight per verdict bucket.
    pub weights: WeightTally,
    /// Votes excluded by input validation.
    pub invalid_votes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote(reputation: i64, stake: f64) -> Vote {
        Vote {
            claim_id: "claim-1".into(),
            voter_id: "voter-1".into(),
            verdict: Verdict::True,
            reputation,
            stake_amount: stake,
        }
    }

    #[test]
    fn weight_is_reputation_plus_sqrt_stake() {
        let w = vote(50, 100.0).weight();
        assert!((w - 51.0).abs() < 1e-9); // 50 + 0.1·√100
    }

    #[test]
    fn reputation_clamped_to_bounds() {
        // Effective weight stays within [1 + 0.1√s, 100 + 0.1√s].
        assert_eq!(vote(-10, 0.0).weight(), 1.0);
        assert_eq!(vote(0, 0.0).weight(), 1.0);
        assert_eq!(vote(999, 0.0).weight(), 100.0);
        let w = vote(999, 400.0).weight();
        assert!((w - 102.0).abs() < 1e-9); // 100 + 0.1·√400
    }

    #[test]
    fn negative_stake_invalidates_vote() {
        assert!(!vote(50, -1.0).is_valid_for("claim-1"));
        assert!(!vote(50, f64::NAN).is_valid_for("claim-1"));
        assert!(vote(50, 0.0).is_valid_for("claim-1"));
        assert!(!vote(50, 0.0).is_valid_for("claim-2"));
    }
}
