//! OAuth credential lifecycle.
//!
//! [`TokenStore`] persists one credential per user, [`TokenEndpoint`] talks
//! to the identity provider, and [`CredentialManager`] combines them:
//! proactive refresh when the stored token is expired, and a single
//! reactive refresh when the provider rejects a token that looked fresh.
//! Refreshes for the same user are serialized, so concurrent callers that
//! all see an expired token cause one refresh, not one each.
//!
//! [`CredentialedSession`] scopes one logical operation: it holds the token
//! in use and allows at most one refresh for the whole operation.
use crate::db;
use crate::error::{PlaylistError, ProviderError, RefreshError, StoreError};
use crate::models::{Credential, TokenGrant};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// `Ok(None)` means no live credential; storage failures are `Err`.
    async fn get(&self, user_id: &str) -> Result<Option<Credential>, StoreError>;

    /// Upsert keyed by `user_id`, with `expires_at = now + expires_in_secs`.
    async fn put(
        &self,
        user_id: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_in_secs: i64,
    ) -> Result<Credential, StoreError>;

    async fn clear(&self, user_id: &str) -> Result<(), StoreError>;
}

/// Identity provider token endpoint.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Exchange a refresh token for a new access token. No internal retry.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, RefreshError>;

    /// Exchange an authorization code obtained from the consent redirect.
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, RefreshError>;
}

/// SQLite-backed token store; one connection per call on the blocking pool.
pub struct SqliteTokenStore {
    db_path: PathBuf,
}

impl SqliteTokenStore {
    pub fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl TokenStore for SqliteTokenStore {
    async fn get(&self, user_id: &str) -> Result<Option<Credential>, StoreError> {
        let user_id = user_id.to_string();
        db::with_connection(self.db_path.clone(), move |conn| db::load_credential(conn, &user_id)).await
    }

    async fn put(
        &self,
        user_id: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_in_secs: i64,
    ) -> Result<Credential, StoreError> {
        let user_id = user_id.to_string();
        let access_token = access_token.to_string();
        let refresh_token = refresh_token.map(|s| s.to_string());
        db::with_connection(self.db_path.clone(), move |conn| {
            db::save_credential(
                conn,
                &user_id,
                &access_token,
                refresh_token.as_deref(),
                expires_in_secs,
            )
        })
        .await
    }

    async fn clear(&self, user_id: &str) -> Result<(), StoreError> {
        let user_id = user_id.to_string();
        db::with_connection(self.db_path.clone(), move |conn| db::clear_credential(conn, &user_id)).await
    }
}

pub struct CredentialManager {
    store: Arc<dyn TokenStore>,
    endpoint: Arc<dyn TokenEndpoint>,
    margin_secs: i64,
    // per-user single-flight guards for refreshes
    refresh_guards: std::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl CredentialManager {
    pub fn new(store: Arc<dyn TokenStore>, endpoint: Arc<dyn TokenEndpoint>, margin_secs: i64) -> Self {
        Self {
            store,
            endpoint,
            margin_secs,
            refresh_guards: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn endpoint(&self) -> &Arc<dyn TokenEndpoint> {
        &self.endpoint
    }

    fn guard_for(&self, user_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut guards = match self.refresh_guards.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        guards
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    async fn load(&self, user_id: &str) -> Result<Credential, PlaylistError> {
        self.store
            .get(user_id)
            .await?
            .ok_or_else(|| PlaylistError::NoCredential {
                user_id: user_id.to_string(),
            })
    }

    /// Refresh `current` and persist the result before returning the new
    /// access token. A rotated refresh token replaces the stored one.
    async fn refresh_and_store(&self, current: &Credential) -> Result<String, PlaylistError> {
        let refresh_token = current
            .refresh_token
            .as_deref()
            .ok_or(PlaylistError::Refresh(RefreshError::MissingRefreshToken))?;
        let grant = self.endpoint.refresh(refresh_token).await?;
        let keep_refresh = grant.refresh_token.as_deref().or(Some(refresh_token));
        let saved = self
            .store
            .put(&current.user_id, &grant.access_token, keep_refresh, grant.expires_in)
            .await?;
        info!(
            "Refreshed Spotify token for user {} (expires at {})",
            current.user_id, saved.expires_at
        );
        Ok(saved.access_token)
    }

    /// Return a usable access token, refreshing first if the stored one is
    /// expired. The boolean reports whether a refresh happened.
    async fn fresh_token(&self, user_id: &str) -> Result<(String, bool), PlaylistError> {
        let cred = self.load(user_id).await?;
        if !cred.is_expired_at(Utc::now(), self.margin_secs) {
            return Ok((cred.access_token, false));
        }

        let guard = self.guard_for(user_id);
        let _single_flight = guard.lock().await;
        // Another caller may have refreshed while we waited.
        let cred = self.load(user_id).await?;
        if !cred.is_expired_at(Utc::now(), self.margin_secs) {
            debug!("token for user {} was refreshed concurrently", user_id);
            return Ok((cred.access_token, false));
        }
        debug!("Spotify token for user {} is expired, refreshing", user_id);
        Ok((self.refresh_and_store(&cred).await?, true))
    }

    /// Stored access token for `user_id`, refreshed and persisted first when
    /// expired.
    pub async fn ensure_fresh_access_token(&self, user_id: &str) -> Result<String, PlaylistError> {
        Ok(self.fresh_token(user_id).await?.0)
    }

    /// Called after the provider rejected `rejected`. Refreshes unless the
    /// stored token has already moved on, in which case that token is used.
    pub async fn refresh_after_rejection(&self, user_id: &str, rejected: &str) -> Result<String, PlaylistError> {
        let guard = self.guard_for(user_id);
        let _single_flight = guard.lock().await;
        let cred = self.load(user_id).await?;
        if cred.access_token != rejected {
            debug!("token for user {} already replaced; reusing it", user_id);
            return Ok(cred.access_token);
        }
        self.refresh_and_store(&cred).await
    }

    /// Persist a freshly granted token pair (initial connect).
    pub async fn save_grant(&self, user_id: &str, grant: &TokenGrant) -> Result<Credential, PlaylistError> {
        Ok(self
            .store
            .put(
                user_id,
                &grant.access_token,
                grant.refresh_token.as_deref(),
                grant.expires_in,
            )
            .await?)
    }

    pub async fn disconnect(&self, user_id: &str) -> Result<(), PlaylistError> {
        self.store.clear(user_id).await?;
        info!("Cleared Spotify credential for user {}", user_id);
        Ok(())
    }

    /// Start a logical operation for `user_id`.
    pub async fn session(&self, user_id: &str) -> Result<CredentialedSession<'_>, PlaylistError> {
        let (access_token, refreshed) = self.fresh_token(user_id).await?;
        Ok(CredentialedSession {
            manager: self,
            user_id: user_id.to_string(),
            state: tokio::sync::Mutex::new(SessionToken {
                access_token,
                refreshed,
            }),
        })
    }
}

struct SessionToken {
    access_token: String,
    refreshed: bool,
}

/// Token holder for one logical operation.
///
/// Every authenticated call goes through [`CredentialedSession::run`]: an
/// auth failure triggers one refresh-and-retry, and the refresh budget is
/// shared by all calls of the operation (a proactive refresh at session
/// start uses it up).
pub struct CredentialedSession<'a> {
    manager: &'a CredentialManager,
    user_id: String,
    state: tokio::sync::Mutex<SessionToken>,
}

impl<'a> CredentialedSession<'a> {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub async fn access_token(&self) -> String {
        self.state.lock().await.access_token.clone()
    }

    async fn recover(&self, rejected: &str, status: u16) -> Result<String, PlaylistError> {
        let mut state = self.state.lock().await;
        if state.access_token != rejected {
            // a concurrent call in this operation already refreshed
            return Ok(state.access_token.clone());
        }
        if state.refreshed {
            return Err(PlaylistError::Auth { status });
        }
        warn!(
            "Got {} for user {} with a token that looked fresh; refreshing once",
            status, self.user_id
        );
        // a failed attempt also spends the budget
        state.refreshed = true;
        let fresh = self.manager.refresh_after_rejection(&self.user_id, rejected).await?;
        state.access_token = fresh.clone();
        Ok(fresh)
    }

    /// Run `op` with the current token; on 401/403 refresh once and retry
    /// once. A second auth failure is returned as `PlaylistError::Auth`.
    pub async fn run<T, F, Fut>(&self, op: F) -> Result<T, PlaylistError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let token = self.access_token().await;
        match op(token.clone()).await {
            Err(ProviderError::Unauthorized { status }) => {
                let fresh = self.recover(&token, status).await?;
                op(fresh).await.map_err(PlaylistError::from)
            }
            other => other.map_err(PlaylistError::from),
        }
    }
}
