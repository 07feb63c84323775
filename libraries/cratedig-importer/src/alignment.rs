//! Order-preserving track alignment
//!
//! Needleman-Wunsch over local tracks (rows) and candidate tracks (columns).
//! Every path through the table pairs indices in increasing order, so the
//! resulting alignment can never cross.

use cratedig_core::Alignment;

/// Fixed costs of the two gap moves
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GapCosts {
    /// Candidate track absent locally
    pub missing: f64,

    /// Local track without a counterpart
    pub unmatched: f64,
}

/// Alignment with its path cost
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentResult {
    pub alignment: Alignment,

    /// Sum of match costs and gap costs along the chosen path
    pub cost: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Match,
    SkipCandidate,
    SkipLocal,
}

/// Minimum-cost alignment of `n_local` against `n_candidate` tracks
///
/// `match_cost(i, j)` is the cost of pairing local `i` with candidate `j`.
/// Ties prefer a match, then skipping a candidate track, then skipping a
/// local track.
pub fn align<F>(n_local: usize, n_candidate: usize, gaps: GapCosts, match_cost: F) -> AlignmentResult
where
    F: Fn(usize, usize) -> f64,
{
    let cols = n_candidate + 1;
    let mut cost = vec![0.0_f64; (n_local + 1) * cols];
    let mut step = vec![Step::Match; (n_local + 1) * cols];
    let at = |i: usize, j: usize| i * cols + j;

    for j in 1..=n_candidate {
        cost[at(0, j)] = cost[at(0, j - 1)] + gaps.missing;
        step[at(0, j)] = Step::SkipCandidate;
    }
    for i in 1..=n_local {
        cost[at(i, 0)] = cost[at(i - 1, 0)] + gaps.unmatched;
        step[at(i, 0)] = Step::SkipLocal;

        for j in 1..=n_candidate {
            let mut best = cost[at(i - 1, j - 1)] + sanitize(match_cost(i - 1, j - 1));
            let mut chosen = Step::Match;

            let skip_candidate = cost[at(i, j - 1)] + gaps.missing;
            if skip_candidate < best {
                best = skip_candidate;
                chosen = Step::SkipCandidate;
            }
            let skip_local = cost[at(i - 1, j)] + gaps.unmatched;
            if skip_local < best {
                best = skip_local;
                chosen = Step::SkipLocal;
            }

            cost[at(i, j)] = best;
            step[at(i, j)] = chosen;
        }
    }

    let mut alignment = Alignment::default();
    let (mut i, mut j) = (n_local, n_candidate);
    while i > 0 || j > 0 {
        match step[at(i, j)] {
            Step::Match if i > 0 && j > 0 => {
                alignment.pairs.push((i - 1, j - 1));
                i -= 1;
                j -= 1;
            }
            Step::SkipCandidate if j > 0 => {
                alignment.missing_candidate.push(j - 1);
                j -= 1;
            }
            _ => {
                alignment.unmatched_local.push(i - 1);
                i -= 1;
            }
        }
    }
    alignment.pairs.reverse();
    alignment.missing_candidate.reverse();
    alignment.unmatched_local.reverse();

    AlignmentResult {
        alignment,
        cost: cost[at(n_local, n_candidate)],
    }
}

/// Match costs must be finite and non-negative
fn sanitize(cost: f64) -> f64 {
    if cost.is_finite() && cost > 0.0 {
        cost
    } else if cost.is_nan() || cost == f64::INFINITY {
        f64::MAX / 4.0
    } else {
        0.0
    }
}
