//! Last.fm listener lookup.
//!
//! Three tiers, first hit wins:
//! 1. `track.getInfo` with autocorrect on the normalized artist/title
//! 2. the same call with any "feat." clause stripped from the title
//! 3. `track.search` (10 hits) reduced to one count by the [`SearchPolicy`]
//!
//! Every failure degrades to 0 listeners; nothing here returns an error.

use log::{debug, warn};
use serde_json::Value;

use crate::config::LastfmSettings;
use crate::error::HttpError;
use crate::http::JsonClient;
use crate::models::{ListenerQueryResult, ListenerSource};
use crate::normalize::{normalize, strip_featuring};
use crate::scoring::{best_candidate, select_listeners, SearchCandidate, SearchPolicy};

/// Number of hits requested from `track.search`.
pub const SEARCH_LIMIT: usize = 10;

/// Anything that can turn an artist/title into a listener count.
pub trait ListenerLookup {
    fn lookup(&self, artist: &str, title: &str) -> ListenerQueryResult;
}

/// Listener resolver backed by the Last.fm web API.
pub struct LastfmResolver {
    settings: LastfmSettings,
    client: JsonClient,
}

impl LastfmResolver {
    pub fn new(settings: LastfmSettings, client: JsonClient) -> Self {
        Self { settings, client }
    }

    pub fn search_policy(&self) -> SearchPolicy {
        self.settings.search_policy
    }

    fn request_url(&self, api_key: &str, method: &str, params: &[(&str, &str)]) -> String {
        let mut query_parts = vec![
            format!("method={}", method),
            format!("api_key={}", urlencoding::encode(api_key)),
        ];
        query_parts.extend(
            params
                .iter()
                .map(|(key, value)| format!("{key}={}", urlencoding::encode(value))),
        );
        query_parts.push("format=json".to_string());
        format!("{}?{}", self.settings.base_url, query_parts.join("&"))
    }

    /// `Ok(None)` when the service answered but had no listener field.
    fn track_info(&self, api_key: &str, artist: &str, title: &str) -> Result<Option<u64>, HttpError> {
        let url = self.request_url(
            api_key,
            "track.getInfo",
            &[("artist", artist), ("track", title), ("autocorrect", "1")],
        );
        let value = self.client.get_json(&url)?;
        if let Some(message) = api_error(&value) {
            debug!("track.getInfo '{} - {}': {}", artist, title, message);
            return Ok(None);
        }
        Ok(value.get("track").and_then(|t| t.get("listeners")).and_then(as_count))
    }

    fn search(&self, api_key: &str, artist: &str, title: &str) -> Result<Vec<SearchCandidate>, HttpError> {
        let limit = SEARCH_LIMIT.to_string();
        let url = self.request_url(
            api_key,
            "track.search",
            &[("artist", artist), ("track", title), ("limit", &limit)],
        );
        let value = self.client.get_json(&url)?;
        if let Some(message) = api_error(&value) {
            debug!("track.search '{} - {}': {}", artist, title, message);
            return Ok(Vec::new());
        }
        let matches = value
            .get("results")
            .and_then(|r| r.get("trackmatches"))
            .and_then(|m| m.get("track"));
        Ok(array_or_single(matches)
            .into_iter()
            .filter_map(parse_candidate)
            .collect())
    }

    /// Tiers 1 and 2 share this: one getInfo call, logged, never failing.
    fn try_track_info(&self, api_key: &str, artist: &str, title: &str, tier: ListenerSource) -> Option<u64> {
        match self.track_info(api_key, artist, title) {
            Ok(Some(listeners)) => Some(listeners),
            Ok(None) => {
                debug!("No {} listener count for '{} - {}'", tier, artist, title);
                None
            }
            Err(err) => {
                warn!("Last.fm {} lookup failed for '{} - {}': {}", tier, artist, title, err);
                None
            }
        }
    }

    fn try_search(&self, api_key: &str, artist: &str, title: &str) -> Option<u64> {
        let candidates = match self.search(api_key, artist, title) {
            Ok(candidates) => candidates,
            Err(err) => {
                warn!("Last.fm search failed for '{} - {}': {}", artist, title, err);
                return None;
            }
        };
        if let Some((best, score)) = best_candidate(artist, title, &candidates) {
            debug!(
                "Search '{} - {}': {} hit(s), closest '{} - {}' (artist {:.2}, title {:.2})",
                artist,
                title,
                candidates.len(),
                best.artist,
                best.name,
                score.artist_similarity,
                score.title_similarity
            );
        }
        select_listeners(self.settings.search_policy, artist, title, &candidates)
    }

    pub fn resolve(&self, artist: &str, title: &str) -> ListenerQueryResult {
        let Some(api_key) = self.settings.api_key.as_deref().filter(|k| !k.is_empty()) else {
            debug!("No Last.fm API key; '{} - {}' gets 0 listeners", artist, title);
            return ListenerQueryResult::new(0, ListenerSource::NoApiKey);
        };

        let artist = normalize(artist);
        let title = normalize(title);

        let result = self
            .try_track_info(api_key, &artist, &title, ListenerSource::Exact)
            .map(|n| ListenerQueryResult::new(n, ListenerSource::Exact))
            .or_else(|| {
                let stripped = strip_featuring(&title);
                if stripped == title || stripped.is_empty() {
                    return None;
                }
                self.try_track_info(api_key, &artist, &stripped, ListenerSource::FeatStripped)
                    .map(|n| ListenerQueryResult::new(n, ListenerSource::FeatStripped))
            })
            .or_else(|| {
                self.try_search(api_key, &artist, &title)
                    .map(|n| ListenerQueryResult::new(n, ListenerSource::SearchFuzzy))
            })
            .unwrap_or_else(ListenerQueryResult::unresolved);

        debug!(
            "Listeners for '{} - {}': {} ({})",
            artist, title, result.listeners, result.source
        );
        result
    }
}

impl ListenerLookup for LastfmResolver {
    fn lookup(&self, artist: &str, title: &str) -> ListenerQueryResult {
        self.resolve(artist, title)
    }
}

// ============================================================================
// Response Parsing
// ============================================================================

/// Last.fm reports failures as `{"error": 6, "message": "Track not found"}`.
fn api_error(value: &Value) -> Option<String> {
    let code = value.get("error")?;
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    Some(format!("error {}: {}", code, message))
}

/// Listener counts arrive as strings ("12345") or numbers.
fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Single hits come back as an object instead of a one-element array.
fn array_or_single(value: Option<&Value>) -> Vec<&Value> {
    match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(item @ Value::Object(_)) => vec![item],
        _ => Vec::new(),
    }
}

fn parse_candidate(item: &Value) -> Option<SearchCandidate> {
    let listeners = item.get("listeners").and_then(as_count)?;
    let name = item.get("name").and_then(Value::as_str).unwrap_or_default();
    let artist = match item.get("artist") {
        Some(Value::String(s)) => s.as_str(),
        Some(obj @ Value::Object(_)) => obj.get("name").and_then(Value::as_str).unwrap_or_default(),
        _ => "",
    };
    Some(SearchCandidate {
        name: name.to_string(),
        artist: artist.to_string(),
        listeners,
    })
}
