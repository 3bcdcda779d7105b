use crate::config::Config;
use crate::error::PlaylistError;
use crate::models::GeneratedPlaylist;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info};

/// Payload of the AI generation collaborator.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub prompt: String,
    pub discovery_mode: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weather: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_of_day: Option<String>,
    pub top_artists: Vec<String>,
}

#[async_trait]
pub trait PlaylistGenerator: Send + Sync {
    async fn generate(&self, req: &GenerationRequest) -> Result<GeneratedPlaylist, PlaylistError>;
}

/// HTTP client of the hosted generation function. The function owns prompt
/// construction and JSON recovery; this side only checks the result shape.
pub struct HttpPlaylistGenerator {
    client: Client,
    url: String,
    api_key: String,
}

impl HttpPlaylistGenerator {
    pub fn new(cfg: &Config, client: Client) -> Self {
        Self {
            client,
            url: cfg.generator_url.clone(),
            api_key: cfg.generator_api_key.clone(),
        }
    }
}

/// Reject results the rest of the pipeline cannot use.
pub fn validate(generated: GeneratedPlaylist) -> Result<GeneratedPlaylist, PlaylistError> {
    if generated.playlist_name.trim().is_empty() {
        return Err(PlaylistError::Generation("missing playlist_name".into()));
    }
    if generated.tracks.is_empty() {
        return Err(PlaylistError::Generation("no tracks suggested".into()));
    }
    for (label, v) in [("valence", generated.valence), ("energy", generated.energy)] {
        if !(0.0..=1.0).contains(&v) {
            return Err(PlaylistError::Generation(format!("{} out of range: {}", label, v)));
        }
    }
    Ok(generated)
}

#[async_trait]
impl PlaylistGenerator for HttpPlaylistGenerator {
    async fn generate(&self, req: &GenerationRequest) -> Result<GeneratedPlaylist, PlaylistError> {
        if self.url.is_empty() {
            return Err(PlaylistError::InvalidInput("generator_url is not configured".into()));
        }
        debug!(
            "Calling generator: discovery={} top_artists={}",
            req.discovery_mode,
            req.top_artists.len()
        );
        let resp = self
            .client
            .post(&self.url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(CONTENT_TYPE, "application/json")
            .json(req)
            .send()
            .await
            .map_err(|e| PlaylistError::from(crate::error::ProviderError::from(e)))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PlaylistError::Generation(format!(
                "AI generation failed: {} - {}",
                status, body
            )));
        }
        let generated: GeneratedPlaylist = resp
            .json()
            .await
            .map_err(|e| PlaylistError::Generation(format!("malformed generator response: {}", e)))?;
        let generated = validate(generated)?;
        info!(
            "Generated {:?} with {} tracks",
            generated.playlist_name,
            generated.tracks.len()
        );
        Ok(generated)
    }
}
