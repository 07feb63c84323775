/// Alignments and matches between local tracks and candidates
use crate::types::{Candidate, Distance};
use serde::{Deserialize, Serialize};

/// Order-preserving partial pairing of local indices to candidate indices
///
/// Pairs are strictly increasing in both coordinates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alignment {
    /// `(local_index, candidate_index)` pairs
    pub pairs: Vec<(usize, usize)>,

    /// Local indices without a counterpart
    pub unmatched_local: Vec<usize>,

    /// Candidate indices absent locally
    pub missing_candidate: Vec<usize>,
}

impl Alignment {
    /// Check the ordering invariant
    pub fn is_order_preserving(&self) -> bool {
        self.pairs
            .windows(2)
            .all(|w| w[0].0 < w[1].0 && w[0].1 < w[1].1)
    }

    /// Candidate index paired with `local`, if any
    pub fn candidate_for(&self, local: usize) -> Option<usize> {
        self.pairs
            .iter()
            .find(|(i, _)| *i == local)
            .map(|(_, j)| *j)
    }
}

/// A scored candidate
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub candidate: Candidate,
    pub alignment: Alignment,
    pub distance: Distance,

    /// Fewer pairs than local tracks
    pub partial: bool,
}

impl Match {
    /// Similarity in `[0, 1]`
    pub fn similarity(&self) -> f64 {
        self.distance.similarity()
    }

    /// Number of candidate tracks absent locally
    pub fn missing_tracks(&self) -> usize {
        self.alignment.missing_candidate.len()
    }

    /// Number of local tracks without a counterpart
    pub fn unmatched_tracks(&self) -> usize {
        self.alignment.unmatched_local.len()
    }
}

/// The outcome a task is applied with
#[derive(Debug, Clone, PartialEq)]
pub enum Chosen {
    /// Apply a candidate's metadata
    Match(Box<Match>),

    /// Keep the existing tags
    AsIs,
}
