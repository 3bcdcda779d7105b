use super::{check_status, CatalogProvider};
use crate::config::Config;
use crate::error::ProviderError;
use crate::models::{CatalogTrack, CreatedPlaylist, UserProfile};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde_json::json;
use tracing::debug;

/// Catalog provider backed by the Spotify Web API.
/// The API base comes from `Config::spotify_api_base` (tests point it at a mock server).
pub struct SpotifyClient {
    client: Client,
    api_base: String,
}

impl SpotifyClient {
    pub fn new(cfg: &Config, client: Client) -> Self {
        Self {
            client,
            api_base: cfg.spotify_api_base.trim_end_matches('/').to_string(),
        }
    }

    fn bearer(token: &str) -> String {
        format!("Bearer {}", token)
    }

    fn track_from_json(item: &serde_json::Value) -> Option<CatalogTrack> {
        let uri = item["uri"].as_str()?.to_string();
        let artists = item["artists"]
            .as_array()
            .map(|a| {
                a.iter()
                    .filter_map(|ar| ar["name"].as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default();
        Some(CatalogTrack {
            uri,
            name: item["name"].as_str().unwrap_or("").to_string(),
            artists,
            album: item["album"]["name"].as_str().unwrap_or("").to_string(),
            image: item["album"]["images"]
                .as_array()
                .and_then(|imgs| imgs.first())
                .and_then(|img| img["url"].as_str())
                .map(|s| s.to_string()),
        })
    }
}

#[async_trait]
impl CatalogProvider for SpotifyClient {
    fn name(&self) -> &str {
        "spotify"
    }

    async fn current_user(&self, token: &str) -> Result<UserProfile, ProviderError> {
        let url = format!("{}/me", self.api_base);
        let resp = self
            .client
            .get(&url)
            .header(AUTHORIZATION, Self::bearer(token))
            .send()
            .await?;
        let resp = check_status(resp).await?;
        let j: serde_json::Value = resp.json().await?;
        let id = j["id"]
            .as_str()
            .ok_or_else(|| ProviderError::Decode("no id in /me response".into()))?
            .to_string();
        Ok(UserProfile {
            id,
            email: j["email"].as_str().map(|s| s.to_string()),
            display_name: j["display_name"].as_str().map(|s| s.to_string()),
        })
    }

    async fn search_tracks(
        &self,
        token: &str,
        query: &str,
        limit: u32,
    ) -> Result<Vec<CatalogTrack>, ProviderError> {
        let url = format!(
            "{}/search?q={}&type=track&limit={}",
            self.api_base,
            urlencoding::encode(query),
            limit
        );
        let resp = self
            .client
            .get(&url)
            .header(AUTHORIZATION, Self::bearer(token))
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        let resp = check_status(resp).await?;
        let j: serde_json::Value = resp.json().await?;
        let tracks: Vec<CatalogTrack> = j["tracks"]["items"]
            .as_array()
            .map(|items| items.iter().filter_map(Self::track_from_json).collect())
            .unwrap_or_default();
        debug!("Spotify search {:?} -> {} result(s)", query, tracks.len());
        Ok(tracks)
    }

    async fn create_playlist(
        &self,
        token: &str,
        owner_id: &str,
        name: &str,
        description: &str,
        public: bool,
    ) -> Result<CreatedPlaylist, ProviderError> {
        let url = format!(
            "{}/users/{}/playlists",
            self.api_base,
            url::form_urlencoded::byte_serialize(owner_id.as_bytes()).collect::<String>()
        );
        let body = json!({
            "name": name,
            "description": description,
            "public": public
        });
        let resp = self
            .client
            .post(&url)
            .header(AUTHORIZATION, Self::bearer(token))
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await?;
        let resp = check_status(resp).await?;
        let j: serde_json::Value = resp.json().await?;
        let playlist_id = j["id"]
            .as_str()
            .ok_or_else(|| ProviderError::Decode("no id in create playlist response".into()))?
            .to_string();
        let playlist_url = j["external_urls"]["spotify"]
            .as_str()
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("https://open.spotify.com/playlist/{}", playlist_id));
        Ok(CreatedPlaylist {
            playlist_id,
            playlist_url,
        })
    }

    async fn add_tracks(&self, token: &str, playlist_id: &str, uris: &[String]) -> Result<(), ProviderError> {
        let url = format!(
            "{}/playlists/{}/tracks",
            self.api_base,
            url::form_urlencoded::byte_serialize(playlist_id.as_bytes()).collect::<String>()
        );
        let body = json!({ "uris": uris });
        let resp = self
            .client
            .post(&url)
            .header(AUTHORIZATION, Self::bearer(token))
            .json(&body)
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }

    async fn top_artists(&self, token: &str, limit: u32) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/me/top/artists?limit={}", self.api_base, limit);
        let resp = self
            .client
            .get(&url)
            .header(AUTHORIZATION, Self::bearer(token))
            .send()
            .await?;
        let resp = check_status(resp).await?;
        let j: serde_json::Value = resp.json().await?;
        Ok(j["items"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|a| a["name"].as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn top_tracks(&self, token: &str, limit: u32) -> Result<Vec<CatalogTrack>, ProviderError> {
        let url = format!(
            "{}/me/top/tracks?limit={}&time_range=short_term",
            self.api_base, limit
        );
        let resp = self
            .client
            .get(&url)
            .header(AUTHORIZATION, Self::bearer(token))
            .send()
            .await?;
        let resp = check_status(resp).await?;
        let j: serde_json::Value = resp.json().await?;
        Ok(j["items"]
            .as_array()
            .map(|items| items.iter().filter_map(Self::track_from_json).collect())
            .unwrap_or_default())
    }
}
