//! Kodi JSON-RPC client: resolve song/album IDs, then set their rating.
//!
//! IDs are looked up fresh for every push. Lookups return
//! `Ok(None)` for "no such record" and `Err` for "the query itself failed";
//! pushes never surface either, they report a [`PushOutcome`] and move on.

use std::cell::Cell;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use log::{debug, info, warn};
use serde_json::{json, Value};

use crate::config::KodiSettings;
use crate::error::{HttpError, SyncError};
use crate::http::JsonClient;
use crate::models::{RemoteRecordRef, SyncPayload};

const GET_SONGS: &str = "AudioLibrary.GetSongs";
const REFRESH_METHOD: &str = "Input.ExecuteAction";

/// What happened to one push request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// `push_to_kodi = false`
    Disabled,
    DryRun,
    /// No host configured; nothing was sent.
    NotConfigured,
    /// The lookup found no matching record.
    NotFound,
    /// Lookup or update call failed.
    Failed,
    Updated(RemoteRecordRef),
}

impl PushOutcome {
    pub fn is_update(&self) -> bool {
        matches!(self, PushOutcome::Updated(_))
    }
}

/// Receiver of computed ratings.
pub trait RatingSink {
    fn push_track_rating(&self, artist: &str, title: &str, album: &str, rating: u8, dry_run: bool) -> PushOutcome;

    fn push_album_rating(&self, artist: &str, album: &str, rating: f64, dry_run: bool) -> PushOutcome;

    /// Ask the remote UI to reload so new ratings show up.
    fn refresh_client_view(&self) -> Result<(), SyncError>;
}

/// JSON-RPC client for one Kodi instance.
pub struct KodiClient {
    settings: KodiSettings,
    client: JsonClient,
    next_id: Cell<u64>,
    warned_unconfigured: Cell<bool>,
}

impl KodiClient {
    pub fn new(settings: KodiSettings, client: JsonClient) -> Self {
        Self {
            settings,
            client,
            next_id: Cell::new(1),
            warned_unconfigured: Cell::new(false),
        }
    }

    fn endpoint(&self) -> Result<String, HttpError> {
        let host = self
            .settings
            .host
            .as_deref()
            .ok_or(HttpError::NotConfigured("Kodi host"))?;
        Ok(format!("http://{}:{}/jsonrpc", host, self.settings.port))
    }

    fn auth_headers(&self) -> Vec<(String, String)> {
        match (&self.settings.user, &self.settings.password) {
            (Some(user), Some(password)) if !user.is_empty() && !password.is_empty() => {
                let token = STANDARD.encode(format!("{}:{}", user, password));
                vec![("Authorization".to_string(), format!("Basic {}", token))]
            }
            _ => Vec::new(),
        }
    }

    /// One JSON-RPC call; returns the `result` member.
    pub fn rpc(&self, method: &str, params: Value) -> Result<Value, SyncError> {
        let url = self.endpoint()?;
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self.client.post_json(&url, &self.auth_headers(), &body)?;

        if let Some(error) = response.get("error") {
            return Err(SyncError::Rpc {
                code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            });
        }
        response
            .get("result")
            .cloned()
            .ok_or_else(|| SyncError::Malformed(format!("{} response has no result", method)))
    }

    // ------------------------------------------------------------------------
    // ID resolution
    // ------------------------------------------------------------------------

    fn first_song_field(&self, params: Value, field: &str) -> Result<Option<i64>, SyncError> {
        let result = self.rpc(GET_SONGS, params)?;
        // Kodi omits "songs" entirely when nothing matched
        let songs = match result.get("songs") {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::Array(songs)) => songs,
            Some(other) => return Err(SyncError::Malformed(format!("songs is not a list: {}", other))),
        };
        Ok(songs.first().and_then(|song| song.get(field)).and_then(Value::as_i64))
    }

    fn find_song(&self, artist: &str, title: &str, album: Option<&str>) -> Result<Option<i64>, SyncError> {
        let mut rules = vec![is_rule("artist", artist), is_rule("title", title)];
        if let Some(album) = album {
            rules.push(is_rule("album", album));
        }
        self.first_song_field(
            json!({
                "filter": { "and": rules },
                "properties": ["title", "rating", "albumid", "album"],
            }),
            "songid",
        )
    }

    pub fn resolve_track_record_id(
        &self,
        artist: &str,
        title: &str,
        album: Option<&str>,
    ) -> Result<Option<RemoteRecordRef>, SyncError> {
        let album = album.filter(|a| !a.is_empty());
        if let Some(id) = self.find_song(artist, title, album)? {
            return Ok(Some(RemoteRecordRef::Song(id)));
        }
        match album {
            Some(album) if !self.settings.strict_album_match => {
                warn!(
                    "No exact match for '{} - {}' in album '{}', retrying without album filter",
                    artist, title, album
                );
                Ok(self.find_song(artist, title, None)?.map(RemoteRecordRef::Song))
            }
            _ => Ok(None),
        }
    }

    /// Albums are reached through any one of their songs.
    pub fn resolve_album_record_id(&self, artist: &str, album: &str) -> Result<Option<RemoteRecordRef>, SyncError> {
        let id = self.first_song_field(
            json!({
                "filter": { "and": [is_rule("artist", artist), is_rule("album", album)] },
                "properties": ["albumid"],
                "limits": { "start": 0, "end": 1 },
            }),
            "albumid",
        )?;
        Ok(id.map(RemoteRecordRef::Album))
    }

    // ------------------------------------------------------------------------
    // Pushes
    // ------------------------------------------------------------------------

    /// Early exit for pushes that must not touch the network.
    fn gate(&self, dry_run: bool) -> Option<PushOutcome> {
        if !self.settings.push_enabled {
            return Some(PushOutcome::Disabled);
        }
        if dry_run {
            return Some(PushOutcome::DryRun);
        }
        if self.settings.host.is_none() {
            if !self.warned_unconfigured.replace(true) {
                warn!("Kodi host not configured; ratings will not be pushed");
            }
            return Some(PushOutcome::NotConfigured);
        }
        None
    }

    fn apply(&self, payload: SyncPayload) -> PushOutcome {
        match self.rpc(payload.method(), payload.params()) {
            Ok(_) => {
                debug!("Kodi {} rating set to {:.1}", payload.target, payload.rating);
                PushOutcome::Updated(payload.target)
            }
            Err(err) => {
                warn!("Kodi update for {} failed: {}", payload.target, err);
                PushOutcome::Failed
            }
        }
    }

    fn resolved(
        &self,
        lookup: Result<Option<RemoteRecordRef>, SyncError>,
        what: impl FnOnce() -> String,
    ) -> Result<RemoteRecordRef, PushOutcome> {
        match lookup {
            Ok(Some(target)) => Ok(target),
            Ok(None) => {
                debug!("No Kodi record for {}; skipping", what());
                Err(PushOutcome::NotFound)
            }
            Err(err) => {
                debug!("Kodi lookup for {} failed: {}; skipping", what(), err);
                Err(PushOutcome::Failed)
            }
        }
    }
}

impl RatingSink for KodiClient {
    fn push_track_rating(&self, artist: &str, title: &str, album: &str, rating: u8, dry_run: bool) -> PushOutcome {
        if let Some(outcome) = self.gate(dry_run) {
            return outcome;
        }
        let lookup = self.resolve_track_record_id(artist, title, Some(album));
        match self.resolved(lookup, || format!("track '{} - {}'", artist, title)) {
            Ok(target) => self.apply(SyncPayload::new(target, rating as f64)),
            Err(outcome) => outcome,
        }
    }

    fn push_album_rating(&self, artist: &str, album: &str, rating: f64, dry_run: bool) -> PushOutcome {
        if let Some(outcome) = self.gate(dry_run) {
            return outcome;
        }
        let lookup = self.resolve_album_record_id(artist, album);
        match self.resolved(lookup, || format!("album '{} - {}'", artist, album)) {
            Ok(target) => self.apply(SyncPayload::new(target, rating)),
            Err(outcome) => outcome,
        }
    }

    fn refresh_client_view(&self) -> Result<(), SyncError> {
        self.rpc(REFRESH_METHOD, json!({ "action": "refresh" }))?;
        info!("Kodi view refreshed");
        Ok(())
    }
}

fn is_rule(field: &str, value: &str) -> Value {
    json!({ "field": field, "operator": "is", "value": value })
}
