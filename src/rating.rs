//! Listener counts → 1..=10 ratings.
//!
//! The hybrid engine blends an absolute log scale (anchored at 1M listeners)
//! with an album-relative adjustment, so obscure albums keep internal
//! contrast without a weak single being rated 10. The linear engine is the
//! older album-only min/max mapping gated by `min_listener_cutoff`.

use serde::Deserialize;

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 10;

/// Rating every track gets when the album has no listener signal at all.
pub const NEUTRAL_RATING: u8 = 5;

/// log10 of the listener count that saturates the absolute scale (1,000,000).
pub const LOG_SCALE_MAX: f64 = 6.0;

/// Half-width of the album-relative adjustment.
pub const RELATIVE_WEIGHT: f64 = 3.0;

/// Fraction of the album range above which the linear engine saturates.
const LINEAR_RANGE_CAP: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineKind {
    #[default]
    Hybrid,
    Linear,
}

/// Pure rating computation; no I/O, no state beyond its parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingEngine {
    kind: EngineKind,
    min_listener_cutoff: u64,
}

impl RatingEngine {
    pub fn hybrid() -> Self {
        Self {
            kind: EngineKind::Hybrid,
            min_listener_cutoff: 0,
        }
    }

    pub fn linear(min_listener_cutoff: u64) -> Self {
        Self {
            kind: EngineKind::Linear,
            min_listener_cutoff,
        }
    }

    pub fn new(kind: EngineKind, min_listener_cutoff: u64) -> Self {
        Self {
            kind,
            min_listener_cutoff,
        }
    }

    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    /// One rating per input count, same order. Negative counts are treated as 0.
    pub fn ratings_for_album(&self, listeners: &[i64]) -> Vec<u8> {
        let clamped: Vec<u64> = listeners.iter().map(|&l| l.max(0) as u64).collect();
        if clamped.iter().all(|&l| l == 0) {
            return vec![NEUTRAL_RATING; clamped.len()];
        }
        match self.kind {
            EngineKind::Hybrid => hybrid_ratings(&clamped),
            EngineKind::Linear => linear_ratings(&clamped, self.min_listener_cutoff),
        }
    }
}

impl Default for RatingEngine {
    fn default() -> Self {
        Self::hybrid()
    }
}

// ============================================================================
// Hybrid Engine
// ============================================================================

/// Absolute popularity on [1, 10]: log10(listeners + 1) mapped from [0, 6].
pub fn base_rating(listeners: u64) -> f64 {
    let position = ((listeners as f64 + 1.0).log10() / LOG_SCALE_MAX).clamp(0.0, 1.0);
    1.0 + 9.0 * position
}

/// Album-relative shift in [-1.5, +1.5]; 0 for every track when min == max.
pub fn relative_adjustment(listeners: u64, min: u64, max: u64) -> f64 {
    let position = if max == min {
        0.5
    } else {
        (listeners - min) as f64 / (max - min) as f64
    };
    (position - 0.5) * RELATIVE_WEIGHT
}

/// Round half to even (4.5 → 4, 5.5 → 6), then clamp to 1..=10.
fn clamp_rating(value: f64) -> u8 {
    value.round_ties_even().clamp(MIN_RATING as f64, MAX_RATING as f64) as u8
}

fn hybrid_ratings(listeners: &[u64]) -> Vec<u8> {
    let (min, max) = min_max(listeners);
    listeners
        .iter()
        .map(|&l| clamp_rating(base_rating(l) + relative_adjustment(l, min, max)))
        .collect()
}

// ============================================================================
// Linear Engine
// ============================================================================

fn linear_ratings(listeners: &[u64], min_cutoff: u64) -> Vec<u8> {
    let (min, max) = min_max(listeners);
    listeners
        .iter()
        .map(|&l| linear_rating(l, min, max, min_cutoff))
        .collect()
}

/// Album-only mapping: ≤ cutoff → 1, flat album → 5, else linear up to 95% of the range.
/// Exact halves round to even.
pub fn linear_rating(listeners: u64, min: u64, max: u64, min_cutoff: u64) -> u8 {
    if listeners <= min_cutoff {
        return MIN_RATING;
    }
    if max == min {
        return NEUTRAL_RATING;
    }
    let span = (max - min) as f64;
    let cutoff = min as f64 + LINEAR_RANGE_CAP * span;
    let capped = (listeners as f64).min(cutoff);
    clamp_rating(1.0 + 9.0 * (capped - min as f64) / (cutoff - min as f64))
}

fn min_max(listeners: &[u64]) -> (u64, u64) {
    let min = listeners.iter().copied().min().unwrap_or(0);
    let max = listeners.iter().copied().max().unwrap_or(0);
    (min, max)
}

// ============================================================================
// Album Rating
// ============================================================================

/// Mean of the track ratings rounded to one decimal; 0.0 for an empty album.
pub fn album_rating(track_ratings: &[u8]) -> f64 {
    if track_ratings.is_empty() {
        return 0.0;
    }
    let sum: f64 = track_ratings.iter().map(|&r| r as f64).sum();
    let mean = sum / track_ratings.len() as f64;
    (mean * 10.0).round() / 10.0
}
