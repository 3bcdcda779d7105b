use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored OAuth credential for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// True once `now + margin_secs` has reached `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>, margin_secs: i64) -> bool {
        now + chrono::Duration::seconds(margin_secs) >= self.expires_at
    }
}

/// Token endpoint grant (authorization code exchange or refresh).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

fn default_expires_in() -> i64 {
    3600
}

/// An AI-suggested (song, artist) pair awaiting catalog resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackRequest {
    pub song: String,
    pub artist: String,
}

impl TrackRequest {
    pub fn new(song: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            song: song.into(),
            artist: artist.into(),
        }
    }
}

/// A track as returned by catalog search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogTrack {
    pub uri: String,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<String>,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Provider-side playlist handle, immutable once returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedPlaylist {
    pub playlist_id: String,
    pub playlist_url: String,
}

/// Outcome of a non-empty assembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssembledPlaylist {
    #[serde(flatten)]
    pub playlist: CreatedPlaylist,
    pub requested: usize,
    /// URIs appended, in request order.
    pub track_uris: Vec<String>,
}

impl AssembledPlaylist {
    pub fn resolved(&self) -> usize {
        self.track_uris.len()
    }

    pub fn missed(&self) -> usize {
        self.requested - self.track_uris.len()
    }
}

/// Validated result of the AI generation collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedPlaylist {
    pub playlist_name: String,
    pub tracks: Vec<TrackRequest>,
    pub narrative: String,
    pub valence: f64,
    pub energy: f64,
}

/// A generated playlist plus the context it was generated from; handed to
/// the caller for confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistPreview {
    #[serde(flatten)]
    pub generated: GeneratedPlaylist,
    pub prompt: String,
    #[serde(default)]
    pub discovery_mode: bool,
    #[serde(default)]
    pub weather: Option<String>,
    #[serde(default)]
    pub time_of_day: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectionRecord {
    pub id: String,
    pub user_id: String,
    pub prompt: String,
    pub playlist_name: String,
    pub narrative: String,
    pub valence: f64,
    pub energy: f64,
    pub discovery_mode: bool,
    pub weather_condition: Option<String>,
    pub time_of_day: Option<String>,
    pub playlist_id: Option<String>,
    pub playlist_url: Option<String>,
    /// Every requested track, resolved or not.
    pub tracks: Vec<TrackRequest>,
    pub created_at: DateTime<Utc>,
}

impl ReflectionRecord {
    pub fn from_preview(
        user_id: &str,
        preview: &PlaylistPreview,
        playlist: Option<&CreatedPlaylist>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            prompt: preview.prompt.clone(),
            playlist_name: preview.generated.playlist_name.clone(),
            narrative: preview.generated.narrative.clone(),
            valence: preview.generated.valence,
            energy: preview.generated.energy,
            discovery_mode: preview.discovery_mode,
            weather_condition: preview.weather.clone(),
            time_of_day: preview.time_of_day.clone(),
            playlist_id: playlist.map(|p| p.playlist_id.clone()),
            playlist_url: playlist.map(|p| p.playlist_url.clone()),
            tracks: preview.generated.tracks.clone(),
            created_at: Utc::now(),
        }
    }
}

/// Listening-profile scores computed by the caller; the track list is
/// attached from the user's top tracks when the analysis is recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VibeProfile {
    pub personality_type: String,
    #[serde(default)]
    pub personality_traits: Vec<String>,
    #[serde(default)]
    pub personality_description: String,
    pub valence: f64,
    pub energy: f64,
    pub danceability: f64,
    pub acousticness: f64,
    pub instrumentalness: f64,
}

/// One listening-profile analysis. History rows are only ever appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VibeAnalysis {
    pub id: String,
    pub user_id: String,
    pub personality_type: String,
    pub personality_traits: Vec<String>,
    pub personality_description: String,
    pub valence: f64,
    pub energy: f64,
    pub danceability: f64,
    pub acousticness: f64,
    pub instrumentalness: f64,
    pub tracks: Vec<CatalogTrack>,
    pub analyzed_at: DateTime<Utc>,
}

impl VibeAnalysis {
    pub fn from_profile(user_id: &str, profile: VibeProfile, tracks: Vec<CatalogTrack>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            personality_type: profile.personality_type,
            personality_traits: profile.personality_traits,
            personality_description: profile.personality_description,
            valence: profile.valence,
            energy: profile.energy,
            danceability: profile.danceability,
            acousticness: profile.acousticness,
            instrumentalness: profile.instrumentalness,
            tracks,
            analyzed_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppUser {
    pub id: String,
    pub spotify_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}
