use crate::config::Config;
use crate::credentials::TokenEndpoint;
use crate::error::{PlaylistError, ProviderError, RefreshError};
use crate::models::TokenGrant;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use rand::{distributions::Alphanumeric, Rng};
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use tracing::debug;
use url::Url;

/// Client of the Spotify accounts service: builds the consent URL and talks
/// to `/api/token` for both the authorization-code exchange and refreshes.
///
/// Flow used by the CLI:
/// 1. `authorize_url` is printed; the user approves in a browser.
/// 2. The browser lands on the redirect URI; the user pastes that URL back.
/// 3. `code_from_redirect` extracts `code`, and `exchange_code` trades it
///    for an access token + refresh token.
pub struct SpotifyAuth {
    client: Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    auth_base: String,
    scopes: Vec<String>,
}

impl SpotifyAuth {
    pub fn new(cfg: &Config, client: Client) -> Self {
        Self {
            client,
            client_id: cfg.spotify_client_id.clone(),
            client_secret: cfg.spotify_client_secret.clone(),
            redirect_uri: cfg.spotify_redirect_uri.clone(),
            auth_base: cfg.spotify_auth_base.trim_end_matches('/').to_string(),
            scopes: cfg.spotify_scopes.clone(),
        }
    }

    /// Random value for the OAuth `state` parameter.
    pub fn generate_state() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect()
    }

    pub fn authorize_url(&self, state: &str) -> Result<Url, PlaylistError> {
        let mut url = Url::parse(&format!("{}/authorize", self.auth_base))
            .map_err(|e| PlaylistError::InvalidInput(format!("bad auth base: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("state", state)
            .append_pair("show_dialog", "true");
        Ok(url)
    }

    fn basic_auth_header(&self) -> String {
        format!(
            "Basic {}",
            general_purpose::STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret))
        )
    }

    async fn post_token(&self, params: &[(&str, &str)]) -> Result<TokenGrant, RefreshError> {
        let url = format!("{}/api/token", self.auth_base);
        let resp = self
            .client
            .post(&url)
            .header(AUTHORIZATION, self.basic_auth_header())
            .form(params)
            .send()
            .await
            .map_err(ProviderError::from)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RefreshError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        let grant: TokenGrant = resp.json().await.map_err(ProviderError::from)?;
        debug!("token endpoint granted access token valid for {}s", grant.expires_in);
        Ok(grant)
    }
}

/// Extract the authorization code from the URL the browser was redirected
/// to. An `error` parameter (e.g. `access_denied`) is reported as-is.
pub fn code_from_redirect(redirect_url: &str) -> Result<String, PlaylistError> {
    let parsed = Url::parse(redirect_url.trim())
        .map_err(|e| PlaylistError::InvalidInput(format!("invalid url pasted: {}", e)))?;
    if let Some((_, err)) = parsed.query_pairs().find(|(k, _)| k == "error") {
        return Err(PlaylistError::InvalidInput(format!("authorization denied: {}", err)));
    }
    parsed
        .query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.into_owned())
        .ok_or_else(|| PlaylistError::InvalidInput("no code in redirect URL".into()))
}

#[async_trait]
impl TokenEndpoint for SpotifyAuth {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, RefreshError> {
        self.post_token(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token)])
            .await
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, RefreshError> {
        self.post_token(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
        ])
        .await
    }
}
