//! Error kinds surfaced by the library.
//!
//! Provider calls fail with [`ProviderError`], the token endpoint with
//! [`RefreshError`], storage with [`StoreError`]. Everything reaching a
//! caller of the service layer is folded into [`PlaylistError`], whose
//! variants stay distinct so the boundary can choose messaging per kind.
use thiserror::Error;

/// Failure of a single call against the catalog (or another HTTP collaborator).
#[derive(Error, Debug)]
pub enum ProviderError {
    /// 401 or 403: the bearer token was not accepted.
    #[error("provider rejected the access token ({status})")]
    Unauthorized { status: u16 },

    #[error("provider request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("rate_limited: retry_after={retry_after:?}")]
    RateLimited { retry_after: Option<u64> },

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected provider response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Failure to obtain a token from the identity provider.
#[derive(Error, Debug)]
pub enum RefreshError {
    #[error("Failed to refresh token: {status} - {body}")]
    Rejected { status: u16, body: String },

    #[error("no refresh token stored; reconnect required")]
    MissingRefreshToken,

    #[error(transparent)]
    Transport(#[from] ProviderError),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("stored record is malformed: {0}")]
    Corrupt(String),

    #[error("storage task failed: {0}")]
    Task(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Corrupt(err.to_string())
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

/// Error type of the service-level operations.
#[derive(Error, Debug)]
pub enum PlaylistError {
    #[error("no Spotify credential stored for user {user_id}")]
    NoCredential { user_id: String },

    #[error("token refresh failed, reconnect required: {0}")]
    Refresh(RefreshError),

    #[error("provider rejected credentials after refresh ({status})")]
    Auth { status: u16 },

    #[error("none of the {requested} requested tracks resolved (playlist {playlist_id} left empty)")]
    EmptyAssembly { playlist_id: String, requested: usize },

    #[error("provider request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error(transparent)]
    Provider(ProviderError),

    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),

    #[error("playlist generation failed: {0}")]
    Generation(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl PlaylistError {
    /// The user has to go through the OAuth consent again.
    pub fn requires_reauth(&self) -> bool {
        matches!(
            self,
            Self::NoCredential { .. } | Self::Refresh(_) | Self::Auth { .. }
        )
    }

    /// Safe to retry the whole operation later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Network(_) | Self::Provider(ProviderError::RateLimited { .. })
        )
    }
}

impl From<ProviderError> for PlaylistError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Unauthorized { status } => Self::Auth { status },
            ProviderError::Timeout => Self::Timeout,
            ProviderError::Network(msg) => Self::Network(msg),
            other => Self::Provider(other),
        }
    }
}

impl From<RefreshError> for PlaylistError {
    fn from(err: RefreshError) -> Self {
        match err {
            // The endpoint never answered; that is a transport problem, not
            // a verdict on the refresh token.
            RefreshError::Transport(ProviderError::Timeout) => Self::Timeout,
            RefreshError::Transport(ProviderError::Network(msg)) => Self::Network(msg),
            other => Self::Refresh(other),
        }
    }
}
