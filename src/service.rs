use crate::api::generator::{GenerationRequest, HttpPlaylistGenerator, PlaylistGenerator};
use crate::api::spotify::SpotifyClient;
use crate::api::spotify_auth::SpotifyAuth;
use crate::api::weather::WeatherClient;
use crate::api::{http_client, CatalogProvider};
use crate::config::Config;
use crate::credentials::{CredentialManager, SqliteTokenStore};
use crate::db;
use crate::error::PlaylistError;
use crate::models::{
    AppUser, AssembledPlaylist, CatalogTrack, PlaylistPreview, ReflectionRecord, TrackRequest, VibeAnalysis,
    VibeProfile,
};
use crate::playlist::PlaylistAssembler;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Spotify's ceiling for `/me/top/tracks`.
pub const TOP_TRACKS_LIMIT: u32 = 50;

/// Inputs of a generation request.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub prompt: String,
    pub discovery_mode: bool,
    /// Pre-resolved weather text; looked up from `coordinates` when absent.
    pub weather: Option<String>,
    pub coordinates: Option<(f64, f64)>,
    /// Defaults to the local clock.
    pub time_of_day: Option<String>,
}

/// Result of confirming a preview.
#[derive(Debug, Clone)]
pub struct ConfirmedPlaylist {
    pub assembled: AssembledPlaylist,
    /// `None` when the reflection could not be saved; the playlist stands.
    pub reflection_id: Option<String>,
}

/// Request-handler level operations: connect, generate, confirm, search,
/// history and logout. One instance serves any number of users.
pub struct PlaylistService {
    db_path: PathBuf,
    top_artists_limit: u32,
    credentials: Arc<CredentialManager>,
    catalog: Arc<dyn CatalogProvider>,
    assembler: PlaylistAssembler,
    generator: Arc<dyn PlaylistGenerator>,
    weather: WeatherClient,
}

impl PlaylistService {
    pub fn new(
        cfg: &Config,
        credentials: Arc<CredentialManager>,
        catalog: Arc<dyn CatalogProvider>,
        generator: Arc<dyn PlaylistGenerator>,
        weather: WeatherClient,
    ) -> Self {
        Self {
            db_path: cfg.db_path.clone(),
            top_artists_limit: cfg.top_artists_limit,
            assembler: PlaylistAssembler::new(cfg, catalog.clone()),
            credentials,
            catalog,
            generator,
            weather,
        }
    }

    /// Wire the Spotify, generator and weather clients from configuration
    /// and make sure the database schema exists.
    pub async fn from_config(cfg: &Config) -> Result<Self, PlaylistError> {
        let db_path = cfg.db_path.clone();
        tokio::task::spawn_blocking(move || db::open_or_create(&db_path).map(|_| ()))
            .await
            .map_err(crate::error::StoreError::from)??;

        let client = http_client(cfg)?;
        let store = Arc::new(SqliteTokenStore::new(cfg.db_path.clone()));
        let endpoint = Arc::new(SpotifyAuth::new(cfg, client.clone()));
        let credentials = Arc::new(CredentialManager::new(
            store,
            endpoint,
            cfg.token_refresh_margin_sec,
        ));
        Ok(Self::new(
            cfg,
            credentials,
            Arc::new(SpotifyClient::new(cfg, client.clone())),
            Arc::new(HttpPlaylistGenerator::new(cfg, client.clone())),
            WeatherClient::new(cfg, client),
        ))
    }

    /// Finish the OAuth consent: exchange `code`, identify the Spotify
    /// profile, upsert the matching user and store the token pair.
    pub async fn connect(&self, code: &str) -> Result<AppUser, PlaylistError> {
        let grant = self.credentials.endpoint().exchange_code(code).await?;
        let profile = self.catalog.current_user(&grant.access_token).await?;
        let user = db::with_connection(self.db_path.clone(), move |conn| {
            db::upsert_user_by_spotify_id(conn, &profile)
        })
        .await?;
        self.credentials.save_grant(&user.id, &grant).await?;
        info!("Connected Spotify account {} as user {}", user.spotify_id, user.id);
        Ok(user)
    }

    pub async fn ensure_fresh_access_token(&self, user_id: &str) -> Result<String, PlaylistError> {
        self.credentials.ensure_fresh_access_token(user_id).await
    }

    async fn top_artists(&self, user_id: &str) -> Vec<String> {
        let catalog = self.catalog.as_ref();
        let limit = self.top_artists_limit;
        let res = match self.credentials.session(user_id).await {
            Ok(session) => {
                session
                    .run(move |token| async move { catalog.top_artists(&token, limit).await })
                    .await
            }
            Err(e) => Err(e),
        };
        res.unwrap_or_else(|e| {
            warn!("Could not load top artists for user {}: {}", user_id, e);
            Vec::new()
        })
    }

    /// Ask the generator for a playlist matching the prompt. Nothing is
    /// created on the provider; the preview goes back to the caller.
    pub async fn generate(&self, user_id: &str, opts: GenerateOptions) -> Result<PlaylistPreview, PlaylistError> {
        if opts.prompt.trim().is_empty() {
            return Err(PlaylistError::InvalidInput("prompt is empty".into()));
        }
        let top_artists = if opts.discovery_mode {
            Vec::new()
        } else {
            self.top_artists(user_id).await
        };
        let weather = match (opts.weather, opts.coordinates) {
            (Some(w), _) => Some(w),
            (None, Some((lat, lon))) => match self.weather.current_conditions(lat, lon).await {
                Ok(w) => Some(w),
                Err(e) => {
                    warn!("Weather lookup failed: {}", e);
                    None
                }
            },
            (None, None) => None,
        };
        let time_of_day = opts
            .time_of_day
            .or_else(|| Some(crate::util::local_time_of_day().to_string()));

        let req = GenerationRequest {
            prompt: opts.prompt.clone(),
            discovery_mode: opts.discovery_mode,
            weather: weather.clone(),
            time_of_day: time_of_day.clone(),
            top_artists,
        };
        let generated = self.generator.generate(&req).await?;
        Ok(PlaylistPreview {
            generated,
            prompt: opts.prompt,
            discovery_mode: opts.discovery_mode,
            weather,
            time_of_day,
        })
    }

    pub async fn create_playlist_from_tracks(
        &self,
        user_id: &str,
        name: &str,
        tracks: &[TrackRequest],
        description: Option<&str>,
    ) -> Result<AssembledPlaylist, PlaylistError> {
        let session = self.credentials.session(user_id).await?;
        self.assembler.assemble(&session, name, tracks, description).await
    }

    async fn save_reflection(&self, rec: ReflectionRecord) -> Option<String> {
        let id = rec.id.clone();
        let user_id = rec.user_id.clone();
        match db::with_connection(self.db_path.clone(), move |conn| db::insert_reflection(conn, &rec)).await {
            Ok(()) => {
                info!("Reflection {} saved for user {}", id, user_id);
                Some(id)
            }
            Err(e) => {
                error!("Failed to save reflection for user {}: {}", user_id, e);
                None
            }
        }
    }

    /// Create the previewed playlist and record a reflection.
    ///
    /// The narrative doubles as the playlist description. A reflection is
    /// also recorded (without playlist id) when nothing resolved, before the
    /// `EmptyAssembly` error is returned.
    pub async fn confirm(&self, user_id: &str, preview: &PlaylistPreview) -> Result<ConfirmedPlaylist, PlaylistError> {
        let result = self
            .create_playlist_from_tracks(
                user_id,
                &preview.generated.playlist_name,
                &preview.generated.tracks,
                Some(&preview.generated.narrative),
            )
            .await;
        match result {
            Ok(assembled) => {
                let rec = ReflectionRecord::from_preview(user_id, preview, Some(&assembled.playlist));
                let reflection_id = self.save_reflection(rec).await;
                Ok(ConfirmedPlaylist {
                    assembled,
                    reflection_id,
                })
            }
            Err(e @ PlaylistError::EmptyAssembly { .. }) => {
                let rec = ReflectionRecord::from_preview(user_id, preview, None);
                self.save_reflection(rec).await;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Look up one suggested track for display.
    pub async fn search_track(
        &self,
        user_id: &str,
        song: &str,
        artist: &str,
    ) -> Result<Option<CatalogTrack>, PlaylistError> {
        if song.trim().is_empty() || artist.trim().is_empty() {
            return Err(PlaylistError::InvalidInput("song and artist are required".into()));
        }
        let session = self.credentials.session(user_id).await?;
        self.assembler.resolver().resolve_track(&session, song, artist).await
    }

    pub async fn reflections(&self, user_id: &str, limit: u32) -> Result<Vec<ReflectionRecord>, PlaylistError> {
        let user_id = user_id.to_string();
        Ok(db::with_connection(self.db_path.clone(), move |conn| {
            db::list_reflections(conn, &user_id, limit)
        })
        .await?)
    }

    /// The user's recent top tracks, at most `limit` (clamped to 1..=50).
    pub async fn top_tracks(&self, user_id: &str, limit: u32) -> Result<Vec<CatalogTrack>, PlaylistError> {
        let catalog = self.catalog.as_ref();
        let limit = limit.clamp(1, TOP_TRACKS_LIMIT);
        let session = self.credentials.session(user_id).await?;
        session
            .run(move |token| async move { catalog.top_tracks(&token, limit).await })
            .await
    }

    /// Record a vibe analysis for `profile`, attaching the user's current
    /// top tracks as its track list.
    pub async fn record_vibe(&self, user_id: &str, profile: VibeProfile) -> Result<VibeAnalysis, PlaylistError> {
        let tracks = self.top_tracks(user_id, TOP_TRACKS_LIMIT).await?;
        let analysis = VibeAnalysis::from_profile(user_id, profile, tracks);
        self.record_vibe_analysis(analysis.clone()).await?;
        info!(
            "Vibe analysis {} ({}) saved for user {} with {} tracks",
            analysis.id,
            analysis.personality_type,
            user_id,
            analysis.tracks.len()
        );
        Ok(analysis)
    }

    /// Append a new analysis to the user's history; earlier rows are kept.
    pub async fn record_vibe_analysis(&self, analysis: VibeAnalysis) -> Result<(), PlaylistError> {
        Ok(db::with_connection(self.db_path.clone(), move |conn| {
            db::insert_vibe_analysis(conn, &analysis)
        })
        .await?)
    }

    pub async fn vibe_history(&self, user_id: &str, limit: u32) -> Result<Vec<VibeAnalysis>, PlaylistError> {
        let user_id = user_id.to_string();
        Ok(db::with_connection(self.db_path.clone(), move |conn| {
            db::vibe_analysis_history(conn, &user_id, limit)
        })
        .await?)
    }

    pub async fn latest_vibe(&self, user_id: &str) -> Result<Option<VibeAnalysis>, PlaylistError> {
        let user_id = user_id.to_string();
        Ok(db::with_connection(self.db_path.clone(), move |conn| {
            db::latest_vibe_analysis(conn, &user_id)
        })
        .await?)
    }

    pub async fn logout(&self, user_id: &str) -> Result<(), PlaylistError> {
        self.credentials.disconnect(user_id).await
    }
}
