//! Per-album rating run.
//!
//! Each album walks START → LISTENERS_FETCHED → RATINGS_COMPUTED →
//! PERSISTED → PUSHED → DONE. A dry run visits the same stages and logs the
//! same values, but PERSISTED and PUSHED change nothing.
//!
//! Only a failure to list albums ends the run; per-track lookup, store and
//! push problems are logged and the album carries on.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::{debug, error, info, log, warn, Level};

use crate::kodi::RatingSink;
use crate::lastfm::ListenerLookup;
use crate::library::Library;
use crate::models::{Album, ListenerSource};
use crate::progress::{create_progress_bar, format_duration, log_progress};
use crate::rating::{album_rating, RatingEngine};

/// Interval (in albums) between log-only progress lines.
const PROGRESS_LOG_INTERVAL: u64 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlbumStage {
    Start,
    ListenersFetched,
    RatingsComputed,
    Persisted,
    Pushed,
    Done,
}

/// What one album's run computed and did.
#[derive(Debug, Clone, PartialEq)]
pub struct AlbumReport {
    pub album_id: i64,
    pub listeners: Vec<u64>,
    pub sources: Vec<ListenerSource>,
    pub ratings: Vec<u8>,
    pub album_rating: f64,
    /// Remote records actually updated.
    pub pushes: usize,
    pub refreshed: bool,
    pub stages: Vec<AlbumStage>,
}

impl AlbumReport {
    fn new(album_id: i64) -> Self {
        Self {
            album_id,
            listeners: Vec::new(),
            sources: Vec::new(),
            ratings: Vec::new(),
            album_rating: 0.0,
            pushes: 0,
            refreshed: false,
            stages: vec![AlbumStage::Start],
        }
    }

    fn advance(&mut self, stage: AlbumStage) {
        debug!("Album {}: {:?}", self.album_id, stage);
        self.stages.push(stage);
    }
}

/// Totals for a whole run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub albums: usize,
    pub skipped_empty: usize,
    pub tracks: usize,
    pub pushes: usize,
    pub elapsed: Duration,
}

/// Drives lookups, rating and persistence/sync for albums, one at a time.
pub struct AlbumProcessor<'a> {
    lookup: &'a dyn ListenerLookup,
    sink: &'a dyn RatingSink,
    engine: RatingEngine,
    dry_run: bool,
}

impl<'a> AlbumProcessor<'a> {
    pub fn new(
        lookup: &'a dyn ListenerLookup,
        sink: &'a dyn RatingSink,
        engine: RatingEngine,
        dry_run: bool,
    ) -> Self {
        Self {
            lookup,
            sink,
            engine,
            dry_run,
        }
    }

    /// Pretend output is always visible; real-run details need -v.
    fn level(&self) -> Level {
        if self.dry_run {
            Level::Info
        } else {
            Level::Debug
        }
    }

    fn prefix(&self) -> &'static str {
        if self.dry_run {
            "[Pretend] "
        } else {
            ""
        }
    }

    /// Rate one album. Returns `None` for albums without tracks.
    pub fn process_album(&self, library: &dyn Library, album: &mut Album) -> Option<AlbumReport> {
        if album.tracks.is_empty() {
            debug!("Skipping '{} - {}': no tracks", album.album_artist, album.title);
            return None;
        }
        let mut report = AlbumReport::new(album.id);

        for track in &album.tracks {
            let result = self.lookup.lookup(track.lookup_artist(&album.album_artist), &track.title);
            report.listeners.push(result.listeners);
            report.sources.push(result.source);
        }
        report.advance(AlbumStage::ListenersFetched);

        let counts: Vec<i64> = report
            .listeners
            .iter()
            .map(|&l| i64::try_from(l).unwrap_or(i64::MAX))
            .collect();
        report.ratings = self.engine.ratings_for_album(&counts);
        report.album_rating = album_rating(&report.ratings);
        for (i, track) in album.tracks.iter().enumerate() {
            log!(
                self.level(),
                "{}Set Rating={} for track '{}' ({} listeners, {})",
                self.prefix(),
                report.ratings[i],
                track.title,
                report.listeners[i],
                report.sources[i]
            );
        }
        log!(
            self.level(),
            "{}Set AlbumRating={:.1} (mean of {} tracks) for album '{}'",
            self.prefix(),
            report.album_rating,
            report.ratings.len(),
            album.title
        );
        report.advance(AlbumStage::RatingsComputed);

        if !self.dry_run {
            self.persist(library, album, &report);
        }
        report.advance(AlbumStage::Persisted);

        self.push(album, &mut report);
        report.advance(AlbumStage::Pushed);

        report.advance(AlbumStage::Done);
        Some(report)
    }

    fn persist(&self, library: &dyn Library, album: &mut Album, report: &AlbumReport) {
        for (i, track) in album.tracks.iter_mut().enumerate() {
            track.listeners = report.listeners[i];
            track.rating = Some(report.ratings[i]);
            if let Err(err) = library.store_track(track) {
                error!("Could not store rating for '{}': {:#}", track.title, err);
            }
        }
        album.rating = Some(report.album_rating);
        if let Err(err) = library.store_album(album) {
            error!("Could not store rating for album '{}': {:#}", album.title, err);
        }
    }

    fn push(&self, album: &Album, report: &mut AlbumReport) {
        for (track, &rating) in album.tracks.iter().zip(&report.ratings) {
            let artist = track.lookup_artist(&album.album_artist);
            let outcome = self
                .sink
                .push_track_rating(artist, &track.title, &album.title, rating, self.dry_run);
            if outcome.is_update() {
                report.pushes += 1;
            }
        }
        let outcome = self.sink.push_album_rating(
            &album.album_artist,
            &album.title,
            report.album_rating,
            self.dry_run,
        );
        if outcome.is_update() {
            report.pushes += 1;
        }

        if report.pushes > 0 {
            match self.sink.refresh_client_view() {
                Ok(()) => report.refreshed = true,
                Err(err) => warn!("Could not refresh remote view: {}", err),
            }
        }
    }

    /// Rate every album matching `query`, in collection order.
    pub fn run(&self, library: &dyn Library, query: &[String]) -> Result<RunSummary> {
        let start = Instant::now();
        let mut albums = library.albums(query).context("Failed to list albums")?;
        info!(
            "{}Rating {} album(s){}",
            self.prefix(),
            albums.len(),
            if query.is_empty() { String::new() } else { format!(" matching '{}'", query.join(" ")) }
        );

        let total = albums.len() as u64;
        let pb = create_progress_bar(total, "Rating albums");
        let mut summary = RunSummary::default();

        for (done, album) in albums.iter_mut().enumerate() {
            pb.set_message(format!("{} - {}", album.album_artist, album.title));
            match self.process_album(library, album) {
                Some(report) => {
                    summary.albums += 1;
                    summary.tracks += report.ratings.len();
                    summary.pushes += report.pushes;
                }
                None => summary.skipped_empty += 1,
            }
            pb.inc(1);
            log_progress("rate", done as u64 + 1, total, PROGRESS_LOG_INTERVAL);
        }
        pb.finish_and_clear();

        summary.elapsed = start.elapsed();
        info!(
            "{}Rated {} album(s), {} track(s); {} remote update(s); {} empty album(s) skipped in {}",
            self.prefix(),
            summary.albums,
            summary.tracks,
            summary.pushes,
            summary.skipped_empty,
            format_duration(summary.elapsed)
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;

    use anyhow::bail;

    use super::*;
    use crate::error::{HttpError, SyncError};
    use crate::kodi::PushOutcome;
    use crate::library::SqliteLibrary;
    use crate::models::{ListenerQueryResult, RemoteRecordRef, Track};

    struct FakeLookup {
        counts: HashMap<String, u64>,
        calls: RefCell<Vec<(String, String)>>,
    }

    impl FakeLookup {
        fn new(counts: &[(&str, u64)]) -> Self {
            Self {
                counts: counts.iter().map(|(t, n)| (t.to_string(), *n)).collect(),
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl ListenerLookup for FakeLookup {
        fn lookup(&self, artist: &str, title: &str) -> ListenerQueryResult {
            self.calls.borrow_mut().push((artist.to_string(), title.to_string()));
            match self.counts.get(title) {
                Some(&n) => ListenerQueryResult::new(n, ListenerSource::Exact),
                None => ListenerQueryResult::unresolved(),
            }
        }
    }

    /// Answers pushes like a configured media center (or an unconfigured one).
    struct RecordingSink {
        configured: bool,
        tracks: RefCell<Vec<(String, u8, bool)>>,
        albums: RefCell<Vec<(String, f64, bool)>>,
        refreshes: Cell<usize>,
    }

    impl RecordingSink {
        fn new(configured: bool) -> Self {
            Self {
                configured,
                tracks: RefCell::new(Vec::new()),
                albums: RefCell::new(Vec::new()),
                refreshes: Cell::new(0),
            }
        }

        fn outcome(&self, dry_run: bool, target: RemoteRecordRef) -> PushOutcome {
            if dry_run {
                PushOutcome::DryRun
            } else if !self.configured {
                PushOutcome::NotConfigured
            } else {
                PushOutcome::Updated(target)
            }
        }
    }

    impl RatingSink for RecordingSink {
        fn push_track_rating(&self, _artist: &str, title: &str, _album: &str, rating: u8, dry_run: bool) -> PushOutcome {
            self.tracks.borrow_mut().push((title.to_string(), rating, dry_run));
            self.outcome(dry_run, RemoteRecordRef::Song(1))
        }

        fn push_album_rating(&self, _artist: &str, album: &str, rating: f64, dry_run: bool) -> PushOutcome {
            self.albums.borrow_mut().push((album.to_string(), rating, dry_run));
            self.outcome(dry_run, RemoteRecordRef::Album(1))
        }

        fn refresh_client_view(&self) -> Result<(), SyncError> {
            if !self.configured {
                return Err(HttpError::NotConfigured("Kodi host").into());
            }
            self.refreshes.set(self.refreshes.get() + 1);
            Ok(())
        }
    }

    fn greatest_hits() -> (SqliteLibrary, FakeLookup) {
        let library = SqliteLibrary::open_in_memory().unwrap();
        library.add_album("Artist X", "Greatest Hits", &["A", "B", "C"]).unwrap();
        let lookup = FakeLookup::new(&[("A", 50_000), ("B", 500), ("C", 500_000)]);
        (library, lookup)
    }

    fn full_stages() -> Vec<AlbumStage> {
        vec![
            AlbumStage::Start,
            AlbumStage::ListenersFetched,
            AlbumStage::RatingsComputed,
            AlbumStage::Persisted,
            AlbumStage::Pushed,
            AlbumStage::Done,
        ]
    }

    #[test]
    fn test_real_run_persists_and_pushes() {
        let (library, lookup) = greatest_hits();
        let sink = RecordingSink::new(true);
        let processor = AlbumProcessor::new(&lookup, &sink, RatingEngine::hybrid(), false);

        let mut album = library.albums(&[]).unwrap().remove(0);
        let report = processor.process_album(&library, &mut album).unwrap();

        assert_eq!(report.listeners, vec![50_000, 500, 500_000]);
        assert_eq!(report.ratings, vec![7, 4, 10]);
        assert_eq!(report.album_rating, 7.0);
        assert_eq!(report.stages, full_stages());
        assert_eq!(report.pushes, 4);
        assert!(report.refreshed);
        assert_eq!(sink.refreshes.get(), 1);

        let stored = library.albums(&[]).unwrap().remove(0);
        let ratings: Vec<Option<u8>> = stored.tracks.iter().map(|t| t.rating).collect();
        assert_eq!(ratings, vec![Some(7), Some(4), Some(10)]);
        assert_eq!(stored.tracks[1].listeners, 500);
        assert_eq!(stored.rating, Some(7.0));

        let pushed: Vec<(String, u8, bool)> = sink.tracks.borrow().clone();
        assert_eq!(
            pushed,
            vec![
                ("A".to_string(), 7, false),
                ("B".to_string(), 4, false),
                ("C".to_string(), 10, false)
            ]
        );
        assert_eq!(*sink.albums.borrow(), vec![("Greatest Hits".to_string(), 7.0, false)]);
    }

    #[test]
    fn test_dry_run_computes_same_values_without_mutation() {
        let (library, lookup) = greatest_hits();
        let sink = RecordingSink::new(true);
        let dry = AlbumProcessor::new(&lookup, &sink, RatingEngine::hybrid(), true);

        let mut album = library.albums(&[]).unwrap().remove(0);
        let before = album.clone();
        let report = dry.process_album(&library, &mut album).unwrap();

        assert_eq!(report.ratings, vec![7, 4, 10]);
        assert_eq!(report.album_rating, 7.0);
        assert_eq!(report.stages, full_stages());
        assert_eq!(report.pushes, 0);
        assert!(!report.refreshed);
        assert_eq!(sink.refreshes.get(), 0);
        assert!(sink.tracks.borrow().iter().all(|(_, _, dry_run)| *dry_run));

        assert_eq!(album, before);
        assert_eq!(library.albums(&[]).unwrap().remove(0), before);

        let (_, lookup) = greatest_hits();
        let real_sink = RecordingSink::new(true);
        let real = AlbumProcessor::new(&lookup, &real_sink, RatingEngine::hybrid(), false);
        let mut album = before.clone();
        let real_report = real.process_album(&library, &mut album).unwrap();
        assert_eq!(real_report.ratings, report.ratings);
        assert_eq!(real_report.listeners, report.listeners);
        assert_eq!(real_report.album_rating, report.album_rating);
    }

    #[test]
    fn test_unconfigured_remote_still_completes() {
        let (library, lookup) = greatest_hits();
        let sink = RecordingSink::new(false);
        let processor = AlbumProcessor::new(&lookup, &sink, RatingEngine::hybrid(), false);

        let summary = processor.run(&library, &[]).unwrap();

        assert_eq!(summary.albums, 1);
        assert_eq!(summary.tracks, 3);
        assert_eq!(summary.pushes, 0);
        assert_eq!(sink.tracks.borrow().len(), 3);
        assert_eq!(sink.refreshes.get(), 0);
        assert_eq!(library.albums(&[]).unwrap()[0].rating, Some(7.0));
    }

    #[test]
    fn test_unresolved_tracks_default_to_zero() {
        let library = SqliteLibrary::open_in_memory().unwrap();
        library.add_album("Nobody", "Obscure", &["x", "y"]).unwrap();
        let lookup = FakeLookup::new(&[]);
        let sink = RecordingSink::new(true);
        let processor = AlbumProcessor::new(&lookup, &sink, RatingEngine::hybrid(), false);

        let mut album = library.albums(&[]).unwrap().remove(0);
        let report = processor.process_album(&library, &mut album).unwrap();

        assert_eq!(report.listeners, vec![0, 0]);
        assert_eq!(report.sources, vec![ListenerSource::Unresolved; 2]);
        assert_eq!(report.ratings, vec![5, 5]);
        assert_eq!(report.album_rating, 5.0);
    }

    #[test]
    fn test_track_artist_overrides_album_artist() {
        let lookup = FakeLookup::new(&[("Song", 10)]);
        let sink = RecordingSink::new(true);
        let library = SqliteLibrary::open_in_memory().unwrap();
        let processor = AlbumProcessor::new(&lookup, &sink, RatingEngine::hybrid(), true);

        let mut track = Track::new(1, "Song");
        track.artist = Some("Guest".to_string());
        let mut album = Album {
            id: 1,
            album_artist: "Various Artists".to_string(),
            title: "Mix".to_string(),
            tracks: vec![track, Track::new(2, "Other")],
            rating: None,
        };
        processor.process_album(&library, &mut album).unwrap();

        let calls = lookup.calls.borrow();
        assert_eq!(calls[0], ("Guest".to_string(), "Song".to_string()));
        assert_eq!(calls[1], ("Various Artists".to_string(), "Other".to_string()));
    }

    #[test]
    fn test_run_filters_and_skips_empty_albums() {
        let library = SqliteLibrary::open_in_memory().unwrap();
        library.add_album("Artist X", "Greatest Hits", &["A", "B", "C"]).unwrap();
        library.add_album("Artist X", "Empty EP", &[]).unwrap();
        library.add_album("Someone", "Else", &["Z"]).unwrap();
        let lookup = FakeLookup::new(&[("A", 50_000), ("B", 500), ("C", 500_000)]);
        let sink = RecordingSink::new(true);
        let processor = AlbumProcessor::new(&lookup, &sink, RatingEngine::hybrid(), false);

        let summary = processor.run(&library, &["artist x".to_string()]).unwrap();

        assert_eq!(summary.albums, 1);
        assert_eq!(summary.skipped_empty, 1);
        assert_eq!(summary.tracks, 3);
        assert_eq!(summary.pushes, 4);
        assert!(lookup.calls.borrow().iter().all(|(_, title)| title != "Z"));
    }

    struct BrokenLibrary;

    impl Library for BrokenLibrary {
        fn albums(&self, _query: &[String]) -> Result<Vec<Album>> {
            bail!("database is locked")
        }

        fn store_track(&self, _track: &Track) -> Result<()> {
            Ok(())
        }

        fn store_album(&self, _album: &Album) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_listing_failure_is_fatal() {
        let lookup = FakeLookup::new(&[]);
        let sink = RecordingSink::new(true);
        let processor = AlbumProcessor::new(&lookup, &sink, RatingEngine::hybrid(), false);

        let err = processor.run(&BrokenLibrary, &[]).unwrap_err();
        assert!(format!("{:#}", err).contains("database is locked"));
    }
}
