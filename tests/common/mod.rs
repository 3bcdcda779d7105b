#![allow(dead_code)]

use async_trait::async_trait;
use mood_playlist_sync as lib;
use lib::config::Config;
use lib::credentials::{CredentialManager, SqliteTokenStore, TokenEndpoint};
use lib::db;
use lib::error::RefreshError;
use lib::models::TokenGrant;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const USER: &str = "user-1";

/// Config pointing every outbound base URL at `base` and the database into `dir`.
pub fn test_config(dir: &Path, base: &str) -> Config {
    Config {
        db_path: dir.join("mood-playlist.db"),
        log_dir: dir.join("logs"),
        spotify_client_id: "test_id".into(),
        spotify_client_secret: "test_secret".into(),
        spotify_auth_base: base.to_string(),
        spotify_api_base: base.to_string(),
        generator_url: format!("{}/functions/v1/generate-playlist", base),
        generator_api_key: "gen-key".into(),
        weather_api_base: base.to_string(),
        request_timeout_sec: 5,
        ..Config::default()
    }
}

pub fn fresh_db(dir: &Path) -> PathBuf {
    let db_path = dir.join("mood-playlist.db");
    db::open_or_create(&db_path).expect("open db");
    db_path
}

/// Store a credential expiring `expires_in` seconds from now (negative = already expired).
pub fn seed_credential(db_path: &Path, user_id: &str, access: &str, refresh: Option<&str>, expires_in: i64) {
    let conn = db::open_or_create(db_path).expect("open db");
    db::save_credential(&conn, user_id, access, refresh, expires_in).expect("save credential");
}

/// Token endpoint stub handing out `new-access-1`, `new-access-2`, ... and
/// counting refreshes.
#[derive(Default)]
pub struct CountingEndpoint {
    refreshes: AtomicUsize,
    fail_with: Mutex<Option<(u16, String)>>,
    rotate_refresh: bool,
}

impl CountingEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rotating() -> Self {
        Self {
            rotate_refresh: true,
            ..Self::default()
        }
    }

    pub fn rejecting(status: u16, body: &str) -> Self {
        let ep = Self::default();
        *ep.fail_with.lock().unwrap() = Some((status, body.to_string()));
        ep
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenEndpoint for CountingEndpoint {
    async fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant, RefreshError> {
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((status, body)) = self.fail_with.lock().unwrap().clone() {
            return Err(RefreshError::Rejected { status, body });
        }
        // let concurrent callers pile up behind the single-flight guard
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        Ok(TokenGrant {
            access_token: format!("new-access-{}", n),
            token_type: Some("Bearer".into()),
            expires_in: 3600,
            refresh_token: if self.rotate_refresh {
                Some(format!("rotated-refresh-{}", n))
            } else {
                None
            },
            scope: None,
        })
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, RefreshError> {
        Ok(TokenGrant {
            access_token: format!("access-for-{}", code),
            token_type: Some("Bearer".into()),
            expires_in: 3600,
            refresh_token: Some(format!("refresh-for-{}", code)),
            scope: None,
        })
    }
}

pub fn manager(db_path: &Path, endpoint: Arc<dyn TokenEndpoint>) -> Arc<CredentialManager> {
    Arc::new(CredentialManager::new(
        Arc::new(SqliteTokenStore::new(db_path.to_path_buf())),
        endpoint,
        0,
    ))
}
