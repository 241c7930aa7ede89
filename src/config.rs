//! Immutable run configuration loaded once from `config.toml`.
//!
//! Components never read the whole [`Config`]; `main` hands each one its
//! own settings slice at construction time.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::http::RetryPolicy;
use crate::rating::{EngineKind, RatingEngine};
use crate::scoring::SearchPolicy;

pub const DEFAULT_LASTFM_URL: &str = "http://ws.audioscrobbler.com/2.0/";
pub const API_KEY_ENV: &str = "LASTFM_API_KEY";
const CONFIG_DIR_NAME: &str = "listener-rating";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Last.fm API key; without it every track gets 0 listeners.
    pub apikey: Option<String>,
    /// Only consulted by the linear engine.
    pub min_listener_cutoff: u64,
    pub push_to_kodi: bool,
    /// Log raw request and response bodies.
    pub debug_api: bool,
    /// Never drop the album filter when resolving media-center song IDs.
    pub strict_album_match: bool,
    pub rating_engine: EngineKind,
    pub search_policy: SearchPolicy,
    pub lastfm_url: String,
    pub max_retries: u32,
    pub timeout_secs: u64,
    pub kodi: KodiConfig,
}

/// Media-center connection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct KodiConfig {
    pub host: Option<String>,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            apikey: None,
            min_listener_cutoff: 1000,
            push_to_kodi: true,
            debug_api: false,
            strict_album_match: false,
            rating_engine: EngineKind::Hybrid,
            search_policy: SearchPolicy::MaxListeners,
            lastfm_url: DEFAULT_LASTFM_URL.to_string(),
            max_retries: 3,
            timeout_secs: 10,
            kodi: KodiConfig::default(),
        }
    }
}

impl Default for KodiConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: 8080,
            user: None,
            password: None,
        }
    }
}

// ============================================================================
// Settings Slices
// ============================================================================

/// What the Last.fm resolver needs.
#[derive(Debug, Clone, PartialEq)]
pub struct LastfmSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub search_policy: SearchPolicy,
}

/// What the media-center client needs.
#[derive(Debug, Clone, PartialEq)]
pub struct KodiSettings {
    pub host: Option<String>,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub push_enabled: bool,
    pub strict_album_match: bool,
}

impl Config {
    /// `~/.config/listener-rating/config.toml` (platform equivalent).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load from `path`, or from the default location when `None`.
    /// A missing default file yields defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        Ok(config.with_env_overrides(|name| std::env::var(name).ok()))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `LASTFM_API_KEY` when it is set and non-empty.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(key) = lookup(API_KEY_ENV).filter(|k| !k.trim().is_empty()) {
            self.apikey = Some(key.trim().to_string());
        }
        self
    }

    pub fn lastfm_settings(&self) -> LastfmSettings {
        LastfmSettings {
            api_key: self.apikey.clone().filter(|k| !k.trim().is_empty()),
            base_url: self.lastfm_url.clone(),
            search_policy: self.search_policy,
        }
    }

    pub fn kodi_settings(&self) -> KodiSettings {
        KodiSettings {
            host: self.kodi.host.clone().filter(|h| !h.trim().is_empty()),
            port: self.kodi.port,
            user: self.kodi.user.clone(),
            password: self.kodi.password.clone(),
            push_enabled: self.push_to_kodi,
            strict_album_match: self.strict_album_match,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_max_attempts(self.max_retries)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn rating_engine(&self) -> RatingEngine {
        RatingEngine::new(self.rating_engine, self.min_listener_cutoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.kodi.port, 8080);
        assert_eq!(config.retry_policy().max_attempts, 3);
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(config.rating_engine(), RatingEngine::hybrid());
    }

    #[test]
    fn test_full_file() {
        let config = Config::from_toml_str(
            r#"
            apikey = "abc123"
            min_listener_cutoff = 500
            push_to_kodi = false
            debug_api = true
            strict_album_match = true
            rating_engine = "linear"
            search_policy = "matched-only"
            max_retries = 5

            [kodi]
            host = "10.0.0.5"
            port = 9090
            user = "kodi"
            password = "secret"
            "#,
        )
        .unwrap();

        assert_eq!(config.rating_engine(), RatingEngine::linear(500));
        assert_eq!(config.retry_policy().max_attempts, 5);

        let lastfm = config.lastfm_settings();
        assert_eq!(lastfm.api_key.as_deref(), Some("abc123"));
        assert_eq!(lastfm.search_policy, SearchPolicy::MatchedOnly);
        assert_eq!(lastfm.base_url, DEFAULT_LASTFM_URL);

        let kodi = config.kodi_settings();
        assert_eq!(kodi.host.as_deref(), Some("10.0.0.5"));
        assert_eq!(kodi.port, 9090);
        assert!(!kodi.push_enabled);
        assert!(kodi.strict_album_match);
    }

    #[test]
    fn test_blank_values_are_unset() {
        let config = Config::from_toml_str("apikey = \"  \"\n[kodi]\nhost = \"\"\n").unwrap();
        assert_eq!(config.lastfm_settings().api_key, None);
        assert_eq!(config.kodi_settings().host, None);
    }

    #[test]
    fn test_unknown_engine_is_rejected() {
        assert!(Config::from_toml_str("rating_engine = \"quantum\"").is_err());
    }

    #[test]
    fn test_env_override() {
        let config = Config::default().with_env_overrides(|name| {
            (name == API_KEY_ENV).then(|| "from-env".to_string())
        });
        assert_eq!(config.apikey.as_deref(), Some("from-env"));

        let config = Config::default().with_env_overrides(|_| Some(String::new()));
        assert_eq!(config.apikey, None);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let missing = Path::new("/nonexistent/listener-rating/config.toml");
        assert!(Config::load(Some(missing)).is_err());
    }
}
