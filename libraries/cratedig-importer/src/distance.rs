//! Distance between local tracks and candidates
//!
//! Every component is a fraction in `[0, 1]` scaled by its weight, and only
//! counts when both sides carry a value. Album distances include the aligned
//! track total whose bound is fixed by the two track counts.

use crate::alignment::{align, GapCosts};
use crate::config::DistanceWeights;
use cratedig_core::{
    normalize_text, AlbumCandidate, Alignment, CandidateTrack, Distance, DistanceField,
    TrackCandidate, TrackRecord,
};
use std::collections::HashSet;

/// Normalized edit distance in `[0, 1]`
///
/// Compares lowercased, punctuation-stripped, whitespace-collapsed text.
pub fn string_distance(a: &str, b: &str) -> f64 {
    let a = normalize_text(a);
    let b = normalize_text(b);
    if a == b {
        return 0.0;
    }
    1.0 - strsim::normalized_levenshtein(&a, &b)
}

/// Length mismatch: zero within the grace period, then linear up to the maximum
pub fn length_fraction(local_ms: u64, candidate_ms: u64, weights: &DistanceWeights) -> f64 {
    let delta = local_ms.abs_diff(candidate_ms) as f64 / 1000.0;
    if delta <= weights.track_length_grace_secs {
        return 0.0;
    }
    let span = weights.track_length_max_secs - weights.track_length_grace_secs;
    ((delta - weights.track_length_grace_secs) / span).min(1.0)
}

/// Weighted mean of per-field fractions
#[derive(Default)]
struct WeightedMean {
    total: f64,
    weight: f64,
}

impl WeightedMean {
    fn add(&mut self, weight: f64, fraction: f64) {
        self.total += weight * fraction.clamp(0.0, 1.0);
        self.weight += weight;
    }

    fn value(&self) -> f64 {
        if self.weight <= 0.0 {
            0.0
        } else {
            (self.total / self.weight).clamp(0.0, 1.0)
        }
    }
}

/// Distance in `[0, 1]` between a local track and a candidate track
pub fn track_distance(
    local: &TrackRecord,
    candidate: &CandidateTrack,
    various_artists: bool,
    weights: &DistanceWeights,
) -> f64 {
    let mut mean = WeightedMean::default();

    mean.add(
        weights.track_title,
        string_distance(&local.display_title(), &candidate.title),
    );

    if let (Some(local_no), Some(candidate_no)) = (local.track_number, candidate.track_number) {
        let other_disc = matches!(
            (local.disc_number, candidate.medium),
            (Some(a), Some(b)) if a != b
        );
        let fraction = if other_disc {
            1.0
        } else {
            f64::from(local_no.abs_diff(candidate_no)) / weights.track_index_span
        };
        mean.add(weights.track_index, fraction);
    }

    if let (Some(local_ms), Some(candidate_ms)) = (local.length_ms, candidate.length_ms) {
        mean.add(
            weights.track_length,
            length_fraction(local_ms, candidate_ms, weights),
        );
    }

    if various_artists {
        if let (Some(a), Some(b)) = (&local.artist, &candidate.artist) {
            mean.add(weights.track_artist, string_distance(a, b));
        }
    }

    mean.value()
}

/// Album-level fields summarized from the local tracks
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalAlbum {
    pub artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<i32>,
    pub label: Option<String>,
    pub catalog_number: Option<String>,
    pub album_id: Option<String>,
    pub mediums: Option<u32>,
}

impl LocalAlbum {
    /// Most common value of each field
    pub fn from_tracks(tracks: &[TrackRecord]) -> Self {
        let year = most_common(tracks.iter().filter_map(|t| t.year));
        let disc_total = tracks.iter().filter_map(|t| t.disc_total).max();
        let distinct_discs: HashSet<u32> = tracks.iter().filter_map(|t| t.disc_number).collect();
        let mediums = disc_total.or_else(|| {
            (!distinct_discs.is_empty()).then(|| distinct_discs.len() as u32)
        });

        Self {
            artist: most_common_str(tracks, |t| t.effective_album_artist()),
            album: most_common_str(tracks, |t| t.album.as_deref()),
            year,
            label: most_common_str(tracks, |t| t.label.as_deref()),
            catalog_number: most_common_str(tracks, |t| t.catalog_number.as_deref()),
            album_id: most_common_str(tracks, |t| t.album_id.as_deref()),
            mediums,
        }
    }
}

/// Upper bound of the aligned track total
///
/// The path cost is linear in the number of matched pairs `k`, so the bound
/// over `0..=min(n_local, n_candidate)` sits at one of the two ends.
pub fn tracks_max_penalty(n_local: usize, n_candidate: usize, weights: &DistanceWeights) -> f64 {
    let bound = |k: usize| {
        weights.tracks * k as f64
            + weights.missing_track * (n_candidate - k) as f64
            + weights.unmatched_track * (n_local - k) as f64
    };
    bound(0).max(bound(n_local.min(n_candidate)))
}

/// Distance and alignment of a local group against an album candidate
pub fn album_distance(
    tracks: &[TrackRecord],
    candidate: &AlbumCandidate,
    weights: &DistanceWeights,
) -> (Distance, Alignment) {
    let local = LocalAlbum::from_tracks(tracks);
    let mut dist = Distance::new();

    if let Some(artist) = &local.artist {
        dist.add_fraction(
            DistanceField::Artist,
            weights.artist,
            string_distance(artist, &candidate.artist),
        );
    }
    if let Some(album) = &local.album {
        dist.add_fraction(
            DistanceField::Album,
            weights.album,
            string_distance(album, &candidate.album),
        );
    }
    if let (Some(a), Some(b)) = (local.year, candidate.year) {
        dist.add_fraction(
            DistanceField::Year,
            weights.year,
            f64::from(a.abs_diff(b)) / weights.year_span,
        );
    }
    if let (Some(a), Some(b)) = (local.mediums, candidate.mediums) {
        dist.add_fraction(DistanceField::Mediums, weights.mediums, mismatch(a != b));
    }
    if let (Some(a), Some(b)) = (&local.label, &candidate.label) {
        dist.add_fraction(DistanceField::Label, weights.label, string_distance(a, b));
    }
    if let (Some(a), Some(b)) = (&local.catalog_number, &candidate.catalog_number) {
        dist.add_fraction(
            DistanceField::CatalogNumber,
            weights.catalog_number,
            mismatch(normalize_text(a) != normalize_text(b)),
        );
    }
    if let Some(id) = &local.album_id {
        if !candidate.id.is_empty() {
            dist.add_fraction(DistanceField::AlbumId, weights.album_id, mismatch(*id != candidate.id));
        }
    }

    let gaps = GapCosts {
        missing: weights.missing_track,
        unmatched: weights.unmatched_track,
    };
    let result = align(tracks.len(), candidate.tracks.len(), gaps, |i, j| {
        weights.tracks
            * track_distance(
                &tracks[i],
                &candidate.tracks[j],
                candidate.various_artists,
                weights,
            )
    });
    dist.add_penalty(
        DistanceField::Tracks,
        result.cost,
        tracks_max_penalty(tracks.len(), candidate.tracks.len(), weights),
    );

    (dist, result.alignment)
}

/// Distance of a single file against a track candidate
pub fn item_distance(
    track: &TrackRecord,
    candidate: &TrackCandidate,
    weights: &DistanceWeights,
) -> Distance {
    let mut dist = Distance::new();

    dist.add_fraction(
        DistanceField::Title,
        weights.track_title,
        string_distance(&track.display_title(), &candidate.title),
    );
    if let (Some(a), Some(b)) = (&track.artist, &candidate.artist) {
        dist.add_fraction(DistanceField::Artist, weights.track_artist, string_distance(a, b));
    }
    if let (Some(a), Some(b)) = (track.length_ms, candidate.length_ms) {
        dist.add_fraction(
            DistanceField::Length,
            weights.track_length,
            length_fraction(a, b, weights),
        );
    }
    if let Some(id) = &track.track_id {
        if !candidate.id.is_empty() {
            dist.add_fraction(DistanceField::TrackId, weights.track_id, mismatch(*id != candidate.id));
        }
    }

    dist
}

fn mismatch(differs: bool) -> f64 {
    if differs {
        1.0
    } else {
        0.0
    }
}

fn most_common<T: Eq + std::hash::Hash + Copy>(values: impl Iterator<Item = T>) -> Option<T> {
    let mut counts: Vec<(T, usize)> = Vec::new();
    for value in values {
        match counts.iter_mut().find(|(v, _)| *v == value) {
            Some((_, n)) => *n += 1,
            None => counts.push((value, 1)),
        }
    }
    // First seen wins ties
    counts
        .into_iter()
        .rev()
        .max_by_key(|(_, n)| *n)
        .map(|(v, _)| v)
}

fn most_common_str<F>(tracks: &[TrackRecord], field: F) -> Option<String>
where
    F: Fn(&TrackRecord) -> Option<&str>,
{
    most_common(
        tracks
            .iter()
            .filter_map(|t| field(t))
            .map(str::trim)
            .filter(|v| !v.is_empty()),
    )
    .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights() -> DistanceWeights {
        DistanceWeights::default()
    }

    fn local(n: u32, title: &str) -> TrackRecord {
        let mut t = TrackRecord::new(format!("/in/{n:02}.flac"));
        t.title = Some(title.to_string());
        t.artist = Some("Artist".to_string());
        t.album = Some("Album".to_string());
        t.track_number = Some(n);
        t.length_ms = Some(200_000);
        t.year = Some(2001);
        t
    }

    fn candidate_track(n: u32, title: &str) -> CandidateTrack {
        CandidateTrack {
            id: Some(format!("t{n}")),
            title: title.to_string(),
            track_number: Some(n),
            length_ms: Some(200_000),
            ..CandidateTrack::default()
        }
    }

    fn candidate(n: u32) -> AlbumCandidate {
        AlbumCandidate {
            id: "rel-1".to_string(),
            artist: "Artist".to_string(),
            album: "Album".to_string(),
            year: Some(2001),
            tracks: (1..=n).map(|i| candidate_track(i, &format!("Song {i}"))).collect(),
            ..AlbumCandidate::default()
        }
    }

    #[test]
    fn string_distance_ignores_case_and_punctuation() {
        assert_eq!(string_distance("Hello, World!", "hello world"), 0.0);
        assert_eq!(string_distance("", ""), 0.0);
        assert_eq!(string_distance("abc", ""), 1.0);
        let near = string_distance("Paranoid Android", "Paranoid Androids");
        let far = string_distance("Paranoid Android", "Karma Police");
        assert!(near > 0.0 && near < far);
    }

    #[test]
    fn length_grace_then_linear() {
        let w = weights();
        assert_eq!(length_fraction(200_000, 209_000, &w), 0.0);
        assert!((length_fraction(200_000, 220_000, &w) - 0.5).abs() < 1e-9);
        assert_eq!(length_fraction(200_000, 300_000, &w), 1.0);
    }

    #[test]
    fn identical_track_has_zero_distance() {
        let d = track_distance(&local(1, "Song 1"), &candidate_track(1, "Song 1"), false, &weights());
        assert_eq!(d, 0.0);
    }

    #[test]
    fn track_artist_only_counts_for_various_artists() {
        let mut cand = candidate_track(1, "Song 1");
        cand.artist = Some("Someone Else".to_string());
        let track = local(1, "Song 1");
        assert_eq!(track_distance(&track, &cand, false, &weights()), 0.0);
        assert!(track_distance(&track, &cand, true, &weights()) > 0.0);
    }

    #[test]
    fn exact_album_has_similarity_one() {
        let tracks: Vec<_> = (1..=10).map(|i| local(i, &format!("Song {i}"))).collect();
        let (dist, alignment) = album_distance(&tracks, &candidate(10), &weights());
        assert_eq!(dist.similarity(), 1.0);
        assert_eq!(alignment.pairs.len(), 10);
    }

    #[test]
    fn missing_track_costs_the_missing_penalty() {
        let tracks: Vec<_> = (1..=10)
            .filter(|i| *i != 4)
            .map(|i| local(i, &format!("Song {i}")))
            .collect();
        let w = weights();
        let (dist, alignment) = album_distance(&tracks, &candidate(10), &w);

        assert_eq!(alignment.missing_candidate, vec![3]);
        assert!((dist.penalty_for(DistanceField::Tracks) - w.missing_track).abs() < 1e-9);
        assert!(dist.similarity() < 1.0);
    }

    #[test]
    fn tracks_bound_uses_the_worse_end() {
        let w = weights();
        // k = 0: 0.9 * 10 + 0.6 * 9 = 14.4; k = 9: 9 + 0.9 = 9.9
        assert!((tracks_max_penalty(9, 10, &w) - 14.4).abs() < 1e-9);
        assert_eq!(tracks_max_penalty(0, 0, &w), 0.0);
    }

    #[test]
    fn album_id_mismatch_is_penalized() {
        let mut tracks: Vec<_> = (1..=3).map(|i| local(i, &format!("Song {i}"))).collect();
        for t in &mut tracks {
            t.album_id = Some("other".to_string());
        }
        let (dist, _) = album_distance(&tracks, &candidate(3), &weights());
        assert_eq!(dist.penalty_for(DistanceField::AlbumId), weights().album_id);
    }

    #[test]
    fn item_distance_compares_title_artist_length_and_id() {
        let track = local(1, "Song 1");
        let exact = TrackCandidate {
            id: "r1".to_string(),
            title: "Song 1".to_string(),
            artist: Some("Artist".to_string()),
            length_ms: Some(200_000),
            ..TrackCandidate::default()
        };
        assert_eq!(item_distance(&track, &exact, &weights()).similarity(), 1.0);

        let other = TrackCandidate {
            title: "Different".to_string(),
            ..exact
        };
        assert!(item_distance(&track, &other, &weights()).similarity() < 1.0);
    }

    #[test]
    fn local_album_summary() {
        let mut tracks: Vec<_> = (1..=3).map(|i| local(i, "x")).collect();
        tracks[0].disc_number = Some(1);
        tracks[2].disc_number = Some(2);
        tracks[2].year = Some(1999);
        let summary = LocalAlbum::from_tracks(&tracks);
        assert_eq!(summary.artist.as_deref(), Some("Artist"));
        assert_eq!(summary.year, Some(2001));
        assert_eq!(summary.mediums, Some(2));
    }
}
