//! Scoring of Last.fm search candidates against the queried artist/title.
//!
//! This module contains:
//! - Artist similarity (token Jaccard over folded names)
//! - Title similarity (edit distance over title keys)
//! - Listener selection under a [`SearchPolicy`]

use rustc_hash::FxHashSet;
use serde::Deserialize;

use crate::normalize::{artist_key, same_title, title_key};

// ============================================================================
// Thresholds
// ============================================================================

/// Minimum artist similarity for a candidate to count under `MatchedOnly`.
pub const ARTIST_ACCEPT_THRESHOLD: f64 = 0.5;

// ============================================================================
// Candidates
// ============================================================================

/// One `track.search` hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCandidate {
    pub name: String,
    pub artist: String,
    pub listeners: u64,
}

/// How search hits become a single listener count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchPolicy {
    /// Largest count among all hits, whatever they are called. Can
    /// over-estimate when a generic query returns a more popular unrelated song.
    #[default]
    MaxListeners,
    /// Largest count among hits whose title and artist match the query.
    MatchedOnly,
}

/// How closely a candidate matches the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateScore {
    pub artist_similarity: f64,
    pub title_similarity: f64,
    pub title_match: bool,
}

impl CandidateScore {
    pub fn is_exact(&self) -> bool {
        self.title_match && self.artist_similarity >= 1.0
    }

    pub fn is_accepted(&self) -> bool {
        self.title_match && self.artist_similarity >= ARTIST_ACCEPT_THRESHOLD
    }

    /// Single ordering value for picking a "best" hit to log.
    pub fn combined(&self) -> f64 {
        self.artist_similarity + self.title_similarity + if self.title_match { 1.0 } else { 0.0 }
    }
}

// ============================================================================
// Similarity
// ============================================================================

/// Similarity between two artist names (0.0 to 1.0).
/// Uses Jaccard similarity on word tokens of the folded names.
pub fn compute_artist_similarity(a: &str, b: &str) -> f64 {
    let a = artist_key(a);
    let b = artist_key(b);
    if a == b {
        return 1.0;
    }

    let tokens_a: FxHashSet<&str> = a.split_whitespace().collect();
    let tokens_b: FxHashSet<&str> = b.split_whitespace().collect();

    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let intersection = tokens_a.intersection(&tokens_b).count();
    let union = tokens_a.union(&tokens_b).count();

    intersection as f64 / union as f64
}

/// Normalized Levenshtein similarity of the two title keys (0.0 to 1.0).
pub fn compute_title_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&title_key(a), &title_key(b))
}

pub fn score_candidate(artist: &str, title: &str, candidate: &SearchCandidate) -> CandidateScore {
    CandidateScore {
        artist_similarity: compute_artist_similarity(artist, &candidate.artist),
        title_similarity: compute_title_similarity(title, &candidate.name),
        title_match: same_title(title, &candidate.name),
    }
}

// ============================================================================
// Selection
// ============================================================================

/// Listener count for a search result set, or `None` when nothing qualifies.
pub fn select_listeners(
    policy: SearchPolicy,
    artist: &str,
    title: &str,
    candidates: &[SearchCandidate],
) -> Option<u64> {
    match policy {
        SearchPolicy::MaxListeners => candidates.iter().map(|c| c.listeners).max(),
        SearchPolicy::MatchedOnly => candidates
            .iter()
            .filter(|c| score_candidate(artist, title, c).is_accepted())
            .map(|c| c.listeners)
            .max(),
    }
}

/// Highest-scoring candidate, for diagnostics.
pub fn best_candidate<'a>(
    artist: &str,
    title: &str,
    candidates: &'a [SearchCandidate],
) -> Option<(&'a SearchCandidate, CandidateScore)> {
    candidates
        .iter()
        .map(|c| (c, score_candidate(artist, title, c)))
        .max_by(|a, b| a.1.combined().total_cmp(&b.1.combined()))
}
