//! Host collection: where albums come from and where ratings are written.
//!
//! [`Library`] is the seam the rating run depends on; [`SqliteLibrary`] is
//! the concrete store (`albums` + `items` tables).
//!
//! The database is filled by whatever manages the collection; this tool only
//! creates the tables when missing, reads albums and writes the
//! `lastfm_listeners`, `lastfm_track_rating` and `lastfm_album_rating` columns.

use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, params_from_iter, Connection};

use crate::models::{Album, Track};

/// Album source and rating sink for one run.
pub trait Library {
    /// Albums whose artist or title contains every query term (all albums when empty).
    fn albums(&self, query: &[String]) -> Result<Vec<Album>>;

    /// Persist a track's listener count and rating.
    fn store_track(&self, track: &Track) -> Result<()>;

    /// Persist an album's rating.
    fn store_album(&self, album: &Album) -> Result<()>;
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS albums (
        id INTEGER PRIMARY KEY,
        albumartist TEXT NOT NULL,
        album TEXT NOT NULL,
        lastfm_album_rating REAL
    );
    CREATE TABLE IF NOT EXISTS items (
        id INTEGER PRIMARY KEY,
        album_id INTEGER NOT NULL REFERENCES albums(id),
        track INTEGER NOT NULL DEFAULT 0,
        title TEXT NOT NULL,
        artist TEXT,
        lastfm_listeners INTEGER,
        lastfm_track_rating INTEGER
    );
    CREATE INDEX IF NOT EXISTS idx_items_album ON items(album_id, track);
";

pub struct SqliteLibrary {
    conn: Connection,
}

impl SqliteLibrary {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open library database {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("Failed to create library schema")?;
        Ok(Self { conn })
    }

    /// Add an album with its tracks in order; returns the album id.
    #[cfg(test)]
    pub fn add_album(&self, album_artist: &str, title: &str, tracks: &[&str]) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO albums (albumartist, album) VALUES (?1, ?2)",
            params![album_artist, title],
        )?;
        let album_id = self.conn.last_insert_rowid();
        for (index, track_title) in tracks.iter().enumerate() {
            self.conn.execute(
                "INSERT INTO items (album_id, track, title) VALUES (?1, ?2, ?3)",
                params![album_id, index as i64 + 1, track_title],
            )?;
        }
        Ok(album_id)
    }

    fn tracks_for(&self, album_id: i64) -> Result<Vec<Track>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, artist, lastfm_listeners, lastfm_track_rating
             FROM items WHERE album_id = ?1
             ORDER BY track, id",
        )?;
        let rows = stmt.query_map([album_id], |row| {
            let listeners: Option<i64> = row.get(3)?;
            let rating: Option<i64> = row.get(4)?;
            Ok(Track {
                id: row.get(0)?,
                title: row.get(1)?,
                artist: row.get(2)?,
                listeners: listeners.unwrap_or(0).max(0) as u64,
                rating: rating.map(|r| r.clamp(0, u8::MAX as i64) as u8),
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

impl Library for SqliteLibrary {
    fn albums(&self, query: &[String]) -> Result<Vec<Album>> {
        let terms: Vec<&str> = query
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect();

        let mut sql = String::from("SELECT id, albumartist, album, lastfm_album_rating FROM albums");
        for (i, _) in terms.iter().enumerate() {
            sql.push_str(if i == 0 { " WHERE " } else { " AND " });
            sql.push_str(&format!(
                "(albumartist LIKE ?{n} ESCAPE '\\' OR album LIKE ?{n} ESCAPE '\\')",
                n = i + 1
            ));
        }
        sql.push_str(" ORDER BY albumartist, album, id");

        let mut stmt = self.conn.prepare(&sql).context("Failed to query albums")?;
        let rows = stmt.query_map(params_from_iter(terms.iter().map(|t| like_pattern(t))), |row| {
            Ok(Album {
                id: row.get(0)?,
                album_artist: row.get(1)?,
                title: row.get(2)?,
                tracks: Vec::new(),
                rating: row.get(3)?,
            })
        })?;
        let mut albums = rows.collect::<rusqlite::Result<Vec<_>>>()?;

        for album in &mut albums {
            album.tracks = self.tracks_for(album.id)?;
        }
        Ok(albums)
    }

    fn store_track(&self, track: &Track) -> Result<()> {
        self.conn
            .execute(
                "UPDATE items SET lastfm_listeners = ?1, lastfm_track_rating = ?2 WHERE id = ?3",
                params![track.listeners as i64, track.rating.map(i64::from), track.id],
            )
            .with_context(|| format!("Failed to store track {}", track.id))?;
        Ok(())
    }

    fn store_album(&self, album: &Album) -> Result<()> {
        self.conn
            .execute(
                "UPDATE albums SET lastfm_album_rating = ?1 WHERE id = ?2",
                params![album.rating, album.id],
            )
            .with_context(|| format!("Failed to store album {}", album.id))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn library() -> SqliteLibrary {
        let library = SqliteLibrary::open_in_memory().unwrap();
        library.add_album("Artist X", "Greatest Hits", &["A", "B", "C"]).unwrap();
        library.add_album("Someone Else", "Debut", &["Only Song"]).unwrap();
        library.add_album("Artist X", "100% Live", &["Intro"]).unwrap();
        library
    }

    #[test]
    fn test_all_albums_with_ordered_tracks() {
        let albums = library().albums(&[]).unwrap();
        assert_eq!(albums.len(), 3);
        let hits = albums.iter().find(|a| a.title == "Greatest Hits").unwrap();
        let titles: Vec<&str> = hits.tracks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B", "C"]);
        assert!(hits.tracks.iter().all(|t| t.listeners == 0 && t.rating.is_none()));
        assert_eq!(hits.rating, None);
    }

    #[test]
    fn test_query_terms_must_all_match() {
        let library = library();
        let by_artist = library.albums(&["artist x".to_string()]).unwrap();
        assert_eq!(by_artist.len(), 2);

        let narrowed = library
            .albums(&["Artist".to_string(), "hits".to_string()])
            .unwrap();
        assert_eq!(narrowed.len(), 1);
        assert_eq!(narrowed[0].title, "Greatest Hits");

        assert!(library.albums(&["nothing".to_string()]).unwrap().is_empty());
    }

    #[test]
    fn test_query_escapes_wildcards() {
        let library = library();
        let live = library.albums(&["100%".to_string()]).unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].title, "100% Live");
        assert!(library.albums(&["_".to_string()]).unwrap().is_empty());
    }

    #[test]
    fn test_reads_database_filled_elsewhere() {
        let path = std::env::temp_dir().join(format!("listener-rating-{}.db", std::process::id()));
        let _ = std::fs::remove_file(&path);
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE albums (id INTEGER PRIMARY KEY, albumartist TEXT NOT NULL,
                     album TEXT NOT NULL, lastfm_album_rating REAL);
                 CREATE TABLE items (id INTEGER PRIMARY KEY, album_id INTEGER NOT NULL,
                     track INTEGER NOT NULL DEFAULT 0, title TEXT NOT NULL, artist TEXT,
                     lastfm_listeners INTEGER, lastfm_track_rating INTEGER);
                 INSERT INTO albums (id, albumartist, album) VALUES (7, 'Band', 'Record');
                 INSERT INTO items (album_id, track, title) VALUES (7, 2, 'Second');
                 INSERT INTO items (album_id, track, title, artist) VALUES (7, 1, 'First', 'Guest');",
            )
            .unwrap();
        }

        let library = SqliteLibrary::open(&path).unwrap();
        let mut album = library.albums(&[]).unwrap().remove(0);
        assert_eq!(album.id, 7);
        let titles: Vec<&str> = album.tracks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["First", "Second"]);
        assert_eq!(album.tracks[0].artist.as_deref(), Some("Guest"));

        album.tracks[1].rating = Some(3);
        library.store_track(&album.tracks[1]).unwrap();
        drop(library);

        let reopened = SqliteLibrary::open(&path).unwrap();
        assert_eq!(reopened.albums(&[]).unwrap()[0].tracks[1].rating, Some(3));
        drop(reopened);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_store_round_trip() {
        let library = library();
        let mut album = library.albums(&["Debut".to_string()]).unwrap().remove(0);
        album.tracks[0].listeners = 1234;
        album.tracks[0].rating = Some(6);
        album.rating = Some(6.0);
        library.store_track(&album.tracks[0]).unwrap();
        library.store_album(&album).unwrap();

        let reloaded = library.albums(&["Debut".to_string()]).unwrap().remove(0);
        assert_eq!(reloaded, album);
    }
}
