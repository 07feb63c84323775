/// Penalty-based mismatch score between local data and a candidate
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Field a distance component was computed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceField {
    Artist,
    Album,
    Title,
    Year,
    Mediums,
    Label,
    CatalogNumber,
    AlbumId,
    Length,
    TrackId,
    /// Aligned track total (matched pairs plus missing and unmatched tracks)
    Tracks,
}

impl fmt::Display for DistanceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DistanceField::Artist => "artist",
            DistanceField::Album => "album",
            DistanceField::Title => "title",
            DistanceField::Year => "year",
            DistanceField::Mediums => "mediums",
            DistanceField::Label => "label",
            DistanceField::CatalogNumber => "catalog_number",
            DistanceField::AlbumId => "album_id",
            DistanceField::Length => "length",
            DistanceField::TrackId => "track_id",
            DistanceField::Tracks => "tracks",
        };
        f.write_str(name)
    }
}

/// One weighted contribution to a [`Distance`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceComponent {
    pub field: DistanceField,
    pub penalty: f64,
    pub max_penalty: f64,
}

/// `(penalty, max_penalty)` pair with its breakdown
///
/// Always `0 <= penalty <= max_penalty`; every contribution is clamped on the
/// way in so the bound cannot be broken by a misbehaving metric.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Distance {
    penalty: f64,
    max_penalty: f64,
    components: Vec<DistanceComponent>,
}

impl Distance {
    /// Empty distance (similarity 1.0)
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a component whose mismatch is expressed as a fraction in `[0, 1]`
    pub fn add_fraction(&mut self, field: DistanceField, weight: f64, fraction: f64) {
        let weight = sanitize(weight);
        self.add_penalty(field, weight * clamp_unit(fraction), weight);
    }

    /// Add a component with an explicit bound
    pub fn add_penalty(&mut self, field: DistanceField, penalty: f64, max_penalty: f64) {
        let max_penalty = sanitize(max_penalty);
        let penalty = sanitize(penalty).min(max_penalty);
        self.penalty += penalty;
        self.max_penalty += max_penalty;
        self.components.push(DistanceComponent {
            field,
            penalty,
            max_penalty,
        });
    }

    /// Total penalty
    pub fn penalty(&self) -> f64 {
        self.penalty
    }

    /// Upper bound of the penalty
    pub fn max_penalty(&self) -> f64 {
        self.max_penalty
    }

    /// `penalty / max_penalty`, or 0.0 when nothing was compared
    pub fn normalized(&self) -> f64 {
        if self.max_penalty <= 0.0 {
            0.0
        } else {
            clamp_unit(self.penalty / self.max_penalty)
        }
    }

    /// `1 - penalty / max_penalty`, in `[0, 1]`
    pub fn similarity(&self) -> f64 {
        1.0 - self.normalized()
    }

    /// Per-field breakdown in the order components were added
    pub fn components(&self) -> &[DistanceComponent] {
        &self.components
    }

    /// Penalty contributed by one field
    pub fn penalty_for(&self, field: DistanceField) -> f64 {
        self.components
            .iter()
            .filter(|c| c.field == field)
            .map(|c| c.penalty)
            .sum()
    }

    /// Total order on normalized distance
    pub fn cmp_normalized(&self, other: &Self) -> Ordering {
        self.normalized().total_cmp(&other.normalized())
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.1}% ({:.3}/{:.3})",
            self.similarity() * 100.0,
            self.penalty,
            self.max_penalty
        )
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        1.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}
