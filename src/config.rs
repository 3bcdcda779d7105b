use serde::Deserialize;
use std::path::PathBuf;

/// Hard ceiling on URIs per append call imposed by the Spotify Web API.
pub const SPOTIFY_MAX_BATCH: usize = 100;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    // path to database file
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    // Spotify OAuth application
    #[serde(default)]
    pub spotify_client_id: String,
    #[serde(default)]
    pub spotify_client_secret: String,
    #[serde(default = "default_redirect_uri")]
    pub spotify_redirect_uri: String,
    #[serde(default = "default_spotify_auth_base")]
    pub spotify_auth_base: String,
    #[serde(default = "default_spotify_api_base")]
    pub spotify_api_base: String,
    #[serde(default = "default_spotify_scopes")]
    pub spotify_scopes: Vec<String>,

    // AI generation collaborator
    #[serde(default)]
    pub generator_url: String,
    #[serde(default)]
    pub generator_api_key: String,

    #[serde(default = "default_weather_api_base")]
    pub weather_api_base: String,

    /// Per-request timeout applied to every outbound HTTP call.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_sec: u64,
    /// How many track searches may be in flight at once while assembling.
    #[serde(default = "default_search_concurrency")]
    pub search_concurrency: usize,
    #[serde(default = "default_max_batch_spotify")]
    pub max_batch_size_spotify: usize,
    /// Treat a token as expired this many seconds before `expires_at`.
    #[serde(default)]
    pub token_refresh_margin_sec: i64,
    #[serde(default = "default_playlist_public")]
    pub playlist_public: bool,
    #[serde(default = "default_top_artists_limit")]
    pub top_artists_limit: u32,
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mood-playlist-sync")
        .join("mood-playlist.db")
}
fn default_log_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mood-playlist-sync")
        .join("logs")
}
fn default_redirect_uri() -> String { "http://127.0.0.1:8888/callback".into() }
fn default_spotify_auth_base() -> String { "https://accounts.spotify.com".into() }
fn default_spotify_api_base() -> String { "https://api.spotify.com/v1".into() }
fn default_weather_api_base() -> String { "https://api.open-meteo.com".into() }
fn default_request_timeout() -> u64 { 15 }
fn default_search_concurrency() -> usize { 4 }
fn default_max_batch_spotify() -> usize { SPOTIFY_MAX_BATCH }
fn default_playlist_public() -> bool { true }
fn default_top_artists_limit() -> u32 { 20 }

fn default_spotify_scopes() -> Vec<String> {
    vec![
        "user-read-email",
        "user-read-private",
        "user-top-read",
        "playlist-modify-public",
        "playlist-modify-private",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            log_dir: default_log_dir(),
            spotify_client_id: String::new(),
            spotify_client_secret: String::new(),
            spotify_redirect_uri: default_redirect_uri(),
            spotify_auth_base: default_spotify_auth_base(),
            spotify_api_base: default_spotify_api_base(),
            spotify_scopes: default_spotify_scopes(),
            generator_url: String::new(),
            generator_api_key: String::new(),
            weather_api_base: default_weather_api_base(),
            request_timeout_sec: default_request_timeout(),
            search_concurrency: default_search_concurrency(),
            max_batch_size_spotify: default_max_batch_spotify(),
            token_refresh_margin_sec: 0,
            playlist_public: default_playlist_public(),
            top_artists_limit: default_top_artists_limit(),
        }
    }
}

impl Config {
    pub fn from_path(path: &std::path::Path) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)?;
        let cfg: Config = toml::from_str(&s)?;
        Ok(cfg)
    }

    /// Fill secrets from the process environment. Called once at startup by
    /// the binary; library code only ever reads the resulting struct.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("SPOTIFY_CLIENT_ID") {
            self.spotify_client_id = v;
        }
        if let Ok(v) = std::env::var("SPOTIFY_CLIENT_SECRET") {
            self.spotify_client_secret = v;
        }
        if let Ok(v) = std::env::var("GENERATOR_API_KEY") {
            self.generator_api_key = v;
        }
        self
    }

    /// Effective append batch size, never above the provider ceiling.
    pub fn playlist_batch_size(&self) -> usize {
        self.max_batch_size_spotify.clamp(1, SPOTIFY_MAX_BATCH)
    }

    pub fn has_spotify_client(&self) -> bool {
        !self.spotify_client_id.is_empty() && !self.spotify_client_secret.is_empty()
    }
}
