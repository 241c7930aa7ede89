//! Core data models for the rating run.
//!
//! Tracks and albums are owned by the host collection; the run only reads
//! their identifying strings and writes back the rating fields.

use std::fmt;

use serde_json::{json, Value};

// ============================================================================
// Collection Models
// ============================================================================

/// One track as exposed by the host collection.
#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    pub id: i64,
    pub title: String,
    /// Track artist when it differs from the album artist (compilations).
    pub artist: Option<String>,
    /// Raw listener count; 0 until resolved (or when unresolvable).
    pub listeners: u64,
    /// Computed rating in 1..=10.
    pub rating: Option<u8>,
}

impl Track {
    pub fn new(id: i64, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            artist: None,
            listeners: 0,
            rating: None,
        }
    }

    /// Artist used for lookups: the track's own artist, else the album artist.
    pub fn lookup_artist<'a>(&'a self, album_artist: &'a str) -> &'a str {
        match self.artist.as_deref() {
            Some(artist) if !artist.trim().is_empty() => artist,
            _ => album_artist,
        }
    }
}

/// Album with its tracks in collection order (ratings are reported positionally).
#[derive(Clone, Debug, PartialEq)]
pub struct Album {
    pub id: i64,
    pub album_artist: String,
    pub title: String,
    pub tracks: Vec<Track>,
    pub rating: Option<f64>,
}

// ============================================================================
// Listener Lookup Models
// ============================================================================

/// Which resolver tier produced a listener count. Logged, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerSource {
    Exact,
    FeatStripped,
    SearchFuzzy,
    /// No API key configured; no request was made.
    NoApiKey,
    /// Every tier failed or returned nothing usable.
    Unresolved,
}

impl ListenerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListenerSource::Exact => "exact",
            ListenerSource::FeatStripped => "feat-stripped",
            ListenerSource::SearchFuzzy => "search-fuzzy",
            ListenerSource::NoApiKey => "no-api-key",
            ListenerSource::Unresolved => "unresolved",
        }
    }
}

impl fmt::Display for ListenerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Listener count plus the tier that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerQueryResult {
    pub listeners: u64,
    pub source: ListenerSource,
}

impl ListenerQueryResult {
    pub fn new(listeners: u64, source: ListenerSource) -> Self {
        Self { listeners, source }
    }

    pub fn unresolved() -> Self {
        Self::new(0, ListenerSource::Unresolved)
    }
}

// ============================================================================
// Remote Sync Models
// ============================================================================

/// Opaque media-center record ID, resolved fresh for every push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteRecordRef {
    Song(i64),
    Album(i64),
}

impl fmt::Display for RemoteRecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteRecordRef::Song(id) => write!(f, "songid={}", id),
            RemoteRecordRef::Album(id) => write!(f, "albumid={}", id),
        }
    }
}

/// A single "set rating" request for one remote record.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncPayload {
    pub target: RemoteRecordRef,
    pub rating: f64,
}

impl SyncPayload {
    pub fn new(target: RemoteRecordRef, rating: f64) -> Self {
        Self { target, rating }
    }

    /// JSON-RPC method that applies this payload.
    pub fn method(&self) -> &'static str {
        match self.target {
            RemoteRecordRef::Song(_) => "AudioLibrary.SetSongDetails",
            RemoteRecordRef::Album(_) => "AudioLibrary.SetAlbumDetails",
        }
    }

    /// JSON-RPC params object for this payload.
    pub fn params(&self) -> Value {
        match self.target {
            RemoteRecordRef::Song(id) => json!({ "songid": id, "rating": self.rating }),
            RemoteRecordRef::Album(id) => json!({ "albumid": id, "rating": self.rating }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_artist_prefers_track_artist() {
        let mut track = Track::new(1, "Song");
        assert_eq!(track.lookup_artist("Album Artist"), "Album Artist");
        track.artist = Some("Guest".to_string());
        assert_eq!(track.lookup_artist("Album Artist"), "Guest");
        track.artist = Some("  ".to_string());
        assert_eq!(track.lookup_artist("Album Artist"), "Album Artist");
    }

    #[test]
    fn test_sync_payload_shapes() {
        let song = SyncPayload::new(RemoteRecordRef::Song(42), 7.0);
        assert_eq!(song.method(), "AudioLibrary.SetSongDetails");
        assert_eq!(song.params(), json!({ "songid": 42, "rating": 7.0 }));

        let album = SyncPayload::new(RemoteRecordRef::Album(9), 6.5);
        assert_eq!(album.method(), "AudioLibrary.SetAlbumDetails");
        assert_eq!(album.params()["albumid"], 9);
    }
}
