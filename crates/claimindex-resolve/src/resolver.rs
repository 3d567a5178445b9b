//! The weighted-vote resolution algorithm.
//!
//! Pure and deterministic: identical inputs always produce identical results,
//! and no gate can be skipped to force a True/False outcome — insufficient
//! participation, whale dominance, a tie, and a narrow plurality all fail
//! closed to `Unresolved`.

use crate::vote::{
    ResolutionOptions, ResolutionResult, ResolvedVerdict, Verdict, Vote, WeightTally,
};

/// Resolve a claim's assembled vote set into a verdict.
///
/// Votes that fail validation (negative or non-finite stake, a different
/// `claim_id`) are excluded from aggregation rather than aborting the
/// resolution; with no valid votes left the result is `Unresolved`.
pub fn resolve(claim_id: &str, votes: &[Vote], options: &ResolutionOptions) -> ResolutionResult {
    let mut weights = WeightTally::default();
    let mut max_single_weight = 0.0f64;
    let mut invalid_votes = 0usize;

    for vote in votes {
        if !vote.is_valid_for(claim_id) {
            tracing::warn!(
                claim_id,
                voter_id = %vote.voter_id,
                stake = vote.stake_amount,
                "vote excluded from aggregation"
            );
            invalid_votes += 1;
            continue;
        }
        let weight = vote.weight();
        max_single_weight = max_single_weight.max(weight);
        match vote.verdict {
            Verdict::True => weights.true_weight += weight,
            Verdict::False => weights.false_weight += weight,
            Verdict::Unsure => weights.unsure_weight += weight,
        }
    }

    let total_weight = weights.total();
    let verdict = decide(&weights, total_weight, max_single_weight, options);

    ResolutionResult {
        claim_id: claim_id.to_string(),
        verdict,
        total_weight,
        weights,
        invalid_votes,
    }
}

/// Run the gate chain over the tallied weights.
fn decide(
    weights: &WeightTally,
    total_weight: f64,
    max_single_weight: f64,
    options: &ResolutionOptions,
) -> ResolvedVerdict {
    // Participation gate.
    if total_weight <= 0.0 || total_weight < options.min_total_weight {
        return ResolvedVerdict::Unresolved;
    }

    // Whale-dominance gate: one voter holding the configured share of the
    // total already controls the boundary, whichever way they voted.
    if let Some(max_share) = options.max_voter_share {
        if max_single_weight / total_weight >= max_share {
            return ResolvedVerdict::Unresolved;
        }
    }

    // Unsure never wins; the contest is True against False.
    let (winner, winner_weight, runner_up_weight) =
        if weights.true_weight > weights.false_weight {
            (ResolvedVerdict::True, weights.true_weight, weights.false_weight)
        } else if weights.false_weight > weights.true_weight {
            (ResolvedVerdict::False, weights.false_weight, weights.true_weight)
        } else {
            return ResolvedVerdict::Unresolved; // exact tie
        };

    // Confidence-margin gate: a narrow plurality is inconclusive.
    let basis = if options.unsure_in_margin_basis {
        total_weight
    } else {
        weights.true_weight + weights.false_weight
    };
    let margin = (winner_weight - runner_up_weight) / basis;
    if margin <= options.confidence_margin {
        return ResolvedVerdict::Unresolved;
    }

    winner
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote(voter_id: &str, verdict: Verdict, reputation: i64, stake: f64) -> Vote {
        Vote {
            claim_id: "claim-1".into(),
            voter_id: voter_id.into(),
            verdict,
            reputation,
            stake_amount: stake,
        }
    }

    fn open_options() -> ResolutionOptions {
        ResolutionOptions {
            min_total_weight: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn resolve_is_deterministic() {
        let votes = vec![
            vote("u1", Verdict::True, 60, 25.0),
            vote("u2", Verdict::False, 20, 0.0),
        ];
        let first = resolve("claim-1", &votes, &open_options());
        let second = resolve("claim-1", &votes, &open_options());
        assert_eq!(first, second);
    }

    #[test]
    fn total_weight_includes_stake_term() {
        let votes = vec![vote("u1", Verdict::True, 50, 100.0)];
        let result = resolve("claim-1", &votes, &open_options());
        assert!((result.total_weight - 51.0).abs() < 1e-9);
    }

    #[test]
    fn clear_majority_resolves_true() {
        let votes = vec![
            vote("u1", Verdict::True, 80, 0.0),
            vote("u2", Verdict::True, 70, 0.0),
            vote("u3", Verdict::False, 10, 0.0),
        ];
        let result = resolve("claim-1", &votes, &open_options());
        assert_eq!(result.verdict, ResolvedVerdict::True);
    }

    #[test]
    fn narrow_plurality_is_unresolved() {
        // 55 against 45 is a 10% margin — exactly at the threshold, so
        // the verdict does not stand.
        let votes = vec![
            vote("u1", Verdict::True, 55, 0.0),
            vote("u2", Verdict::False, 45, 0.0),
        ];
        let result = resolve("claim-1", &votes, &open_options());
        assert_eq!(result.verdict, ResolvedVerdict::Unresolved);
    }

    #[test]
    fn exact_tie_is_unresolved() {
        let votes = vec![
            vote("u1", Verdict::True, 50, 0.0),
            vote("u2", Verdict::False, 50, 0.0),
        ];
        let result = resolve("claim-1", &votes, &open_options());
        assert_eq!(result.verdict, ResolvedVerdict::Unresolved);
    }

    #[test]
    fn whale_dominance_forces_unresolved() {
        // The whale's verdict would win the margin gate comfortably, but a
        // single voter holding ≥ 40% of the weight fails closed.
        let votes = vec![
            vote("whale", Verdict::True, 100, 0.0),
            vote("small1", Verdict::False, 1, 0.0),
            vote("small2", Verdict::False, 1, 0.0),
        ];
        let options = ResolutionOptions {
            min_total_weight: 1.0,
            max_voter_share: Some(0.4),
            ..Default::default()
        };
        let result = resolve("claim-1", &votes, &options);
        assert_eq!(result.verdict, ResolvedVerdict::Unresolved);
    }

    #[test]
    fn whale_gate_ignored_when_unset() {
        let votes = vec![
            vote("whale", Verdict::True, 100, 0.0),
            vote("small1", Verdict::False, 1, 0.0),
            vote("small2", Verdict::False, 1, 0.0),
        ];
        let result = resolve("claim-1", &votes, &open_options());
        assert_eq!(result.verdict, ResolvedVerdict::True);
    }

    #[test]
    fn sybil_swarm_cannot_outweigh_reputation() {
        // Twenty reputation-1 identities (weight 20) against one
        // reputation-90 voter (weight 90).
        let mut votes: Vec<Vote> = (0..20)
            .map(|i| vote(&format!("sybil{i}"), Verdict::False, 1, 0.0))
            .collect();
        votes.push(vote("honest", Verdict::True, 90, 0.0));

        let result = resolve("claim-1", &votes, &open_options());
        assert_eq!(result.verdict, ResolvedVerdict::True);
    }

    #[test]
    fn insufficient_participation_is_unresolved() {
        // A lone reputation-1 voter under default options.
        let votes = vec![vote("u1", Verdict::True, 1, 0.0)];
        let result = resolve("claim-1", &votes, &ResolutionOptions::default());
        assert_eq!(result.verdict, ResolvedVerdict::Unresolved);
        assert!((result.total_weight - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unsure_never_wins_but_can_dilute() {
        // Unsure holds the largest bucket yet the contest stays True vs
        // False; with unsure in the basis the margin is too thin.
        let votes = vec![
            vote("u1", Verdict::Unsure, 80, 0.0),
            vote("u2", Verdict::True, 10, 0.0),
            vote("u3", Verdict::False, 5, 0.0),
        ];
        let result = resolve("claim-1", &votes, &open_options());
        assert_eq!(result.verdict, ResolvedVerdict::Unresolved);

        // Excluding abstentions from the basis lets the clear split stand.
        let options = ResolutionOptions {
            min_total_weight: 1.0,
            unsure_in_margin_basis: false,
            ..Default::default()
        };
        let result = resolve("claim-1", &votes, &options);
        assert_eq!(result.verdict, ResolvedVerdict::True);
    }

    #[test]
    fn invalid_votes_are_excluded_not_fatal() {
        let votes = vec![
            vote("u1", Verdict::True, 80, 0.0),
            vote("u2", Verdict::True, 70, 0.0),
            vote("u3", Verdict::False, 10, 0.0),
            vote("bad-stake", Verdict::False, 90, -5.0),
            Vote {
                claim_id: "other-claim".into(),
                ..vote("wrong-claim", Verdict::False, 90, 0.0)
            },
        ];
        let result = resolve("claim-1", &votes, &open_options());
        assert_eq!(result.verdict, ResolvedVerdict::True);
        assert_eq!(result.invalid_votes, 2);
        assert!((result.total_weight - 160.0).abs() < 1e-9);
    }

    #[test]
    fn no_valid_votes_is_unresolved() {
        let votes = vec![vote("u1", Verdict::True, 80, -1.0)];
        let result = resolve("claim-1", &votes, &open_options());
        assert_eq!(result.verdict, ResolvedVerdict::Unresolved);
        assert_eq!(result.total_weight, 0.0);
        assert_eq!(result.invalid_votes, 1);
    }
}
