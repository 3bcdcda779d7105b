use super::CatalogProvider;
use crate::error::ProviderError;
use crate::models::{CatalogTrack, CreatedPlaylist, UserProfile};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tracing::info;

#[derive(Default)]
struct Recorded {
    searches: Vec<String>,
    created: Vec<(String, String)>,
    batches: Vec<(String, Vec<String>)>,
    tokens_seen: Vec<String>,
}

/// In-memory catalog used in tests and for offline dry runs.
/// It answers searches from a fixed query table, hands out deterministic
/// playlist ids and records every call.
pub struct MockCatalog {
    user_id: String,
    results: HashMap<String, Vec<CatalogTrack>>,
    top_tracks: Vec<CatalogTrack>,
    rejected_tokens: HashSet<String>,
    fail_create: bool,
    fail_batch: Option<usize>,
    recorded: Mutex<Recorded>,
}

impl Default for MockCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCatalog {
    pub fn new() -> Self {
        Self {
            user_id: "mock_user".into(),
            results: HashMap::new(),
            top_tracks: Vec::new(),
            rejected_tokens: HashSet::new(),
            fail_create: false,
            fail_batch: None,
            recorded: Mutex::new(Recorded::default()),
        }
    }

    /// Answer `query` with a single track `uri`.
    pub fn with_result(mut self, query: &str, uri: &str) -> Self {
        let track = CatalogTrack {
            uri: uri.to_string(),
            name: query.to_string(),
            artists: Vec::new(),
            album: String::new(),
            image: None,
        };
        self.results.entry(query.to_string()).or_default().push(track);
        self
    }

    /// Append a track to the user's top tracks.
    pub fn with_top_track(mut self, uri: &str, name: &str, artist: &str) -> Self {
        self.top_tracks.push(CatalogTrack {
            uri: uri.to_string(),
            name: name.to_string(),
            artists: vec![artist.to_string()],
            album: String::new(),
            image: None,
        });
        self
    }

    /// Calls made with `token` fail with 401.
    pub fn rejecting_token(mut self, token: &str) -> Self {
        self.rejected_tokens.insert(token.to_string());
        self
    }

    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    /// The append call with this zero-based index fails with a 500.
    pub fn failing_batch(mut self, index: usize) -> Self {
        self.fail_batch = Some(index);
        self
    }

    fn recorded(&self) -> std::sync::MutexGuard<'_, Recorded> {
        match self.recorded.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn check_token(&self, token: &str) -> Result<(), ProviderError> {
        self.recorded().tokens_seen.push(token.to_string());
        if self.rejected_tokens.contains(token) {
            return Err(ProviderError::Unauthorized { status: 401 });
        }
        Ok(())
    }

    pub fn searches(&self) -> Vec<String> {
        self.recorded().searches.clone()
    }

    /// (name, description) of each created playlist.
    pub fn created_playlists(&self) -> Vec<(String, String)> {
        self.recorded().created.clone()
    }

    /// Each append call in order: (playlist id, uris).
    pub fn batches(&self) -> Vec<(String, Vec<String>)> {
        self.recorded().batches.clone()
    }

    pub fn tokens_seen(&self) -> Vec<String> {
        self.recorded().tokens_seen.clone()
    }
}

#[async_trait]
impl CatalogProvider for MockCatalog {
    fn name(&self) -> &str {
        "mock"
    }

    async fn current_user(&self, token: &str) -> Result<UserProfile, ProviderError> {
        self.check_token(token)?;
        Ok(UserProfile {
            id: self.user_id.clone(),
            email: Some(format!("{}@example.com", self.user_id)),
            display_name: Some("Mock User".into()),
        })
    }

    async fn search_tracks(
        &self,
        token: &str,
        query: &str,
        limit: u32,
    ) -> Result<Vec<CatalogTrack>, ProviderError> {
        self.check_token(token)?;
        self.recorded().searches.push(query.to_string());
        let hits = self.results.get(query).cloned().unwrap_or_default();
        Ok(hits.into_iter().take(limit as usize).collect())
    }

    async fn create_playlist(
        &self,
        token: &str,
        _owner_id: &str,
        name: &str,
        description: &str,
        _public: bool,
    ) -> Result<CreatedPlaylist, ProviderError> {
        self.check_token(token)?;
        if self.fail_create {
            return Err(ProviderError::Status {
                status: 500,
                body: "create failed".into(),
            });
        }
        let mut rec = self.recorded();
        rec.created.push((name.to_string(), description.to_string()));
        let playlist_id = format!("mock-playlist-{}", rec.created.len());
        info!("MockCatalog: create_playlist {} -> {}", name, playlist_id);
        Ok(CreatedPlaylist {
            playlist_url: format!("https://open.spotify.com/playlist/{}", playlist_id),
            playlist_id,
        })
    }

    async fn add_tracks(&self, token: &str, playlist_id: &str, uris: &[String]) -> Result<(), ProviderError> {
        self.check_token(token)?;
        let mut rec = self.recorded();
        let index = rec.batches.len();
        rec.batches.push((playlist_id.to_string(), uris.to_vec()));
        if self.fail_batch == Some(index) {
            return Err(ProviderError::Status {
                status: 500,
                body: "add tracks failed".into(),
            });
        }
        info!("MockCatalog: add_tracks {} -> {} tracks", playlist_id, uris.len());
        Ok(())
    }

    async fn top_artists(&self, token: &str, limit: u32) -> Result<Vec<String>, ProviderError> {
        self.check_token(token)?;
        Ok(vec!["Mock Artist".to_string()]
            .into_iter()
            .take(limit as usize)
            .collect())
    }

    async fn top_tracks(&self, token: &str, limit: u32) -> Result<Vec<CatalogTrack>, ProviderError> {
        self.check_token(token)?;
        Ok(self.top_tracks.iter().take(limit as usize).cloned().collect())
    }
}
