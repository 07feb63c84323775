//! Scoring, ranking and auto-accept recommendation

use crate::config::MatchConfig;
use crate::distance::{album_distance, item_distance};
use cratedig_core::{Alignment, Candidate, ImportTask, Match};
use std::cmp::Ordering;
use std::fmt;
use tracing::debug;

/// Why a task needs a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewReason {
    NoCandidates,
    BelowThreshold,
    MissingTracks,
    UnmatchedTracks,
    SourcesDisagree,
}

impl fmt::Display for ReviewReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReviewReason::NoCandidates => "no candidates",
            ReviewReason::BelowThreshold => "best match below threshold",
            ReviewReason::MissingTracks => "best match has missing tracks",
            ReviewReason::UnmatchedTracks => "best match leaves tracks unmatched",
            ReviewReason::SourcesDisagree => "sources disagree",
        };
        f.write_str(s)
    }
}

/// Whether the best match may be applied without asking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recommendation {
    Strong,
    Review(ReviewReason),
}

impl Recommendation {
    pub fn is_strong(self) -> bool {
        self == Recommendation::Strong
    }
}

/// Score every candidate of the task's kind
///
/// Album tasks only consider album candidates and singleton tasks only
/// track candidates.
pub fn score(task: &ImportTask, candidates: Vec<Candidate>, config: &MatchConfig) -> Vec<Match> {
    let weights = &config.weights;
    candidates
        .into_iter()
        .filter_map(|candidate| match (&candidate, task.is_album) {
            (Candidate::Album(album), true) => {
                let (distance, alignment) = album_distance(&task.tracks, album, weights);
                let partial = alignment.pairs.len() < task.tracks.len();
                Some(Match {
                    candidate,
                    alignment,
                    distance,
                    partial,
                })
            }
            (Candidate::Track(track), false) => {
                let local = task.tracks.first()?;
                let distance = item_distance(local, track, weights);
                Some(Match {
                    candidate,
                    alignment: Alignment {
                        pairs: vec![(0, 0)],
                        ..Alignment::default()
                    },
                    distance,
                    partial: false,
                })
            }
            _ => None,
        })
        .collect()
}

/// Sort matches best first
///
/// Ascending normalized distance, then source priority, then newer year
/// (unknown last). The sort is stable so source order breaks what remains.
pub fn rank(matches: &mut [Match]) {
    matches.sort_by(|a, b| {
        a.distance
            .cmp_normalized(&b.distance)
            .then_with(|| {
                a.candidate
                    .source_priority()
                    .cmp(&b.candidate.source_priority())
            })
            .then_with(|| newer_first(a.candidate.year(), b.candidate.year()))
    });
}

fn newer_first(a: Option<i32>, b: Option<i32>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Score and rank in one go
pub fn score_and_rank(
    task: &ImportTask,
    candidates: Vec<Candidate>,
    config: &MatchConfig,
) -> Vec<Match> {
    let mut matches = score(task, candidates, config);
    rank(&mut matches);
    if let Some(best) = matches.first() {
        debug!(
            key = %task.key,
            candidates = matches.len(),
            best = best.candidate.id(),
            distance = %best.distance,
            "Ranked candidates"
        );
    }
    matches
}

/// Decide whether the best of `ranked` can be auto-accepted
pub fn recommend(ranked: &[Match], config: &MatchConfig) -> Recommendation {
    let Some(best) = ranked.first() else {
        return Recommendation::Review(ReviewReason::NoCandidates);
    };
    if best.similarity() < config.auto_accept_threshold {
        return Recommendation::Review(ReviewReason::BelowThreshold);
    }
    if config.missing_tracks_block_auto && best.missing_tracks() > 0 {
        return Recommendation::Review(ReviewReason::MissingTracks);
    }
    if config.unmatched_tracks_block_auto && best.partial {
        return Recommendation::Review(ReviewReason::UnmatchedTracks);
    }
    if let Some(runner_up) = ranked.get(1) {
        if sources_disagree(best, runner_up, config.disagreement_margin) {
            return Recommendation::Review(ReviewReason::SourcesDisagree);
        }
    }
    Recommendation::Strong
}

/// Top two from different sources, naming different releases, nearly tied
fn sources_disagree(best: &Match, runner_up: &Match, margin: f64) -> bool {
    let identity = |m: &Match| {
        let (artist, title) = m.candidate.identity_parts();
        (
            cratedig_core::normalize_text(&artist),
            cratedig_core::normalize_text(&title),
        )
    };
    best.candidate.source() != runner_up.candidate.source()
        && identity(best) != identity(runner_up)
        && (best.similarity() - runner_up.similarity()) < margin
}

#[cfg(test)]
mod tests {
    use super::*;
    use cratedig_core::{
        AlbumCandidate, CandidateTrack, GroupKey, TrackCandidate, TrackRecord,
    };
    use std::sync::Arc;

    fn tracks(n: u32) -> Vec<TrackRecord> {
        (1..=n)
            .map(|i| {
                let mut t = TrackRecord::new(format!("/in/{i:02}.flac"));
                t.title = Some(format!("Song {i}"));
                t.artist = Some("Artist".to_string());
                t.album = Some("Album".to_string());
                t.track_number = Some(i);
                t
            })
            .collect()
    }

    fn album(id: &str, source: &str, priority: usize, name: &str, n: u32, year: Option<i32>) -> Candidate {
        Candidate::Album(Arc::new(AlbumCandidate {
            id: id.to_string(),
            source: source.to_string(),
            source_priority: priority,
            artist: "Artist".to_string(),
            album: name.to_string(),
            year,
            tracks: (1..=n)
                .map(|i| CandidateTrack {
                    title: format!("Song {i}"),
                    track_number: Some(i),
                    ..CandidateTrack::default()
                })
                .collect(),
            ..AlbumCandidate::default()
        }))
    }

    fn task(n: u32) -> ImportTask {
        ImportTask::album(GroupKey::new("/in"), tracks(n))
    }

    fn ids(matches: &[Match]) -> Vec<&str> {
        matches.iter().map(|m| m.candidate.id()).collect()
    }

    #[test]
    fn exact_match_is_strong() {
        let config = MatchConfig::default();
        let ranked = score_and_rank(&task(10), vec![album("a", "s", 0, "Album", 10, None)], &config);
        assert_eq!(ranked[0].similarity(), 1.0);
        assert_eq!(recommend(&ranked, &config), Recommendation::Strong);
    }

    #[test]
    fn missing_track_needs_review() {
        let config = MatchConfig::default();
        let mut t = task(10);
        t.tracks.remove(4);
        let ranked = score_and_rank(&t, vec![album("a", "s", 0, "Album", 10, None)], &config);
        assert_eq!(ranked[0].missing_tracks(), 1);
        assert!(!recommend(&ranked, &config).is_strong());
    }

    #[test]
    fn extra_local_track_marks_partial() {
        let config = MatchConfig::default();
        let ranked = score_and_rank(&task(4), vec![album("a", "s", 0, "Album", 3, None)], &config);
        assert!(ranked[0].partial);
        assert_eq!(ranked[0].unmatched_tracks(), 1);
    }

    #[test]
    fn ties_break_on_priority_then_year_then_order() {
        let config = MatchConfig::default();
        let candidates = vec![
            album("old", "b", 1, "Album", 3, Some(1990)),
            album("new", "b", 1, "Album", 3, Some(2020)),
            album("first-src", "a", 0, "Album", 3, None),
            album("undated", "b", 1, "Album", 3, None),
            album("undated-2", "b", 1, "Album", 3, None),
        ];
        let ranked = score_and_rank(&task(3), candidates, &config);
        assert_eq!(ids(&ranked), vec!["first-src", "new", "old", "undated", "undated-2"]);
    }

    #[test]
    fn better_distance_ranks_first() {
        let config = MatchConfig::default();
        let candidates = vec![
            album("worse", "a", 0, "Something Else", 3, None),
            album("better", "b", 1, "Album", 3, None),
        ];
        let ranked = score_and_rank(&task(3), candidates, &config);
        assert_eq!(ids(&ranked), vec!["better", "worse"]);
    }

    #[test]
    fn disagreeing_sources_need_review() {
        let config = MatchConfig::default();
        let candidates = vec![
            album("a", "one", 0, "Album", 3, None),
            album("b", "two", 1, "Album.", 3, None),
            album("c", "two", 1, "Album (Deluxe)", 3, None),
        ];
        // "Album" and "Album." normalize identically: no disagreement
        let ranked = score_and_rank(&task(3), candidates[..2].to_vec(), &config);
        assert_eq!(recommend(&ranked, &config), Recommendation::Strong);

        let mut near = task(3);
        near.tracks[0].album = Some("Album (Deluxe)".to_string());
        near.tracks[1].album = Some("Album (Deluxe)".to_string());
        let mut config = MatchConfig::default();
        config.auto_accept_threshold = 0.5;
        config.disagreement_margin = 0.5;
        let ranked = score_and_rank(&near, vec![candidates[0].clone(), candidates[2].clone()], &config);
        assert_eq!(
            recommend(&ranked, &config),
            Recommendation::Review(ReviewReason::SourcesDisagree)
        );
    }

    #[test]
    fn no_candidates_needs_review() {
        assert_eq!(
            recommend(&[], &MatchConfig::default()),
            Recommendation::Review(ReviewReason::NoCandidates)
        );
    }

    #[test]
    fn singleton_scoring_ignores_album_candidates() {
        let config = MatchConfig::default();
        let single = ImportTask::singleton(GroupKey::new("/in/01.flac"), tracks(1).remove(0));
        let candidates = vec![
            album("a", "s", 0, "Album", 1, None),
            Candidate::Track(Arc::new(TrackCandidate {
                id: "t".to_string(),
                title: "Song 1".to_string(),
                artist: Some("Artist".to_string()),
                ..TrackCandidate::default()
            })),
        ];
        let ranked = score_and_rank(&single, candidates, &config);
        assert_eq!(ids(&ranked), vec!["t"]);
        assert_eq!(recommend(&ranked, &config), Recommendation::Strong);
    }
}
