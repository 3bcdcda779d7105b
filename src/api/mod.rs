pub mod generator;
pub mod mock;
pub mod spotify;
pub mod spotify_auth;
pub mod weather;

use crate::config::Config;
use crate::error::ProviderError;
use crate::models::{CatalogTrack, CreatedPlaylist, UserProfile};
use std::time::Duration;

/// Catalog operations the resolver and assembler need.
/// Implementations: spotify::SpotifyClient and mock::MockCatalog.
///
/// Every call takes the bearer token explicitly; token lifetime is owned by
/// `credentials::CredentialedSession`, which retries on `Unauthorized`.
#[async_trait::async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Return the provider's name (for logging)
    fn name(&self) -> &str;

    async fn current_user(&self, token: &str) -> Result<UserProfile, ProviderError>;

    /// Ranked search results for a free-text or field-scoped query.
    async fn search_tracks(
        &self,
        token: &str,
        query: &str,
        limit: u32,
    ) -> Result<Vec<CatalogTrack>, ProviderError>;

    /// Create an empty playlist owned by `owner_id`.
    async fn create_playlist(
        &self,
        token: &str,
        owner_id: &str,
        name: &str,
        description: &str,
        public: bool,
    ) -> Result<CreatedPlaylist, ProviderError>;

    /// Append URIs to a playlist (batching done by caller)
    async fn add_tracks(&self, token: &str, playlist_id: &str, uris: &[String]) -> Result<(), ProviderError>;

    /// Names of the user's most listened artists.
    async fn top_artists(&self, token: &str, limit: u32) -> Result<Vec<String>, ProviderError>;

    /// The user's most played tracks over the recent (short term) window.
    async fn top_tracks(&self, token: &str, limit: u32) -> Result<Vec<CatalogTrack>, ProviderError>;
}

/// Shared HTTP client carrying the configured per-request timeout.
pub fn http_client(cfg: &Config) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(cfg.request_timeout_sec.max(1)))
        .build()
        .map_err(ProviderError::from)
}

/// Map a non-success response to its error kind; 401/403 are auth failures.
pub(crate) async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(ProviderError::Unauthorized {
            status: status.as_u16(),
        });
    }
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());
        return Err(ProviderError::RateLimited { retry_after });
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ProviderError::Status {
        status: status.as_u16(),
        body,
    })
}
