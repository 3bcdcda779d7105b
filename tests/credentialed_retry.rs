mod common;

use mockito::Server;
use mood_playlist_sync as lib;
use lib::api::mock::MockCatalog;
use lib::api::spotify::SpotifyClient;
use lib::api::spotify_auth::SpotifyAuth;
use lib::api::CatalogProvider;
use lib::credentials::{CredentialManager, SqliteTokenStore};
use lib::db;
use lib::error::{PlaylistError, ProviderError, RefreshError};
use serde_json::json;
use std::sync::Arc;

struct Harness {
    _td: tempfile::TempDir,
    db_path: std::path::PathBuf,
    manager: CredentialManager,
    catalog: SpotifyClient,
}

fn harness(base: &str, access: &str, expires_in: i64) -> Harness {
    let td = tempfile::tempdir().expect("tmpdir");
    let cfg = common::test_config(td.path(), base);
    let db_path = common::fresh_db(td.path());
    common::seed_credential(&db_path, common::USER, access, Some("refresh-1"), expires_in);
    let client = lib::api::http_client(&cfg).expect("client");
    Harness {
        manager: CredentialManager::new(
            Arc::new(SqliteTokenStore::new(db_path.clone())),
            Arc::new(SpotifyAuth::new(&cfg, client.clone())),
            0,
        ),
        catalog: SpotifyClient::new(&cfg, client),
        db_path,
        _td: td,
    }
}

fn token_ok(server: &mut Server, access: &str) -> mockito::Mock {
    server
        .mock("POST", "/api/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"access_token": access, "expires_in": 3600}).to_string())
        .expect(1)
        .create()
}

fn current_user(h: &Harness) -> Result<lib::models::UserProfile, PlaylistError> {
    let rt = tokio::runtime::Runtime::new().expect("rt");
    rt.block_on(async {
        let session = h.manager.session(common::USER).await?;
        let catalog = &h.catalog;
        session
            .run(move |token| async move { catalog.current_user(&token).await })
            .await
    })
}

#[test]
fn rejected_fresh_token_is_refreshed_and_call_retried() {
    let mut server = Server::new();
    let base = server.url();
    let rejected = server
        .mock("GET", "/me")
        .match_header("authorization", "Bearer revoked-early")
        .with_status(401)
        .expect(1)
        .create();
    let refresh = token_ok(&mut server, "new-access");
    let accepted = server
        .mock("GET", "/me")
        .match_header("authorization", "Bearer new-access")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"id": "spotify-user", "display_name": "Me"}).to_string())
        .expect(1)
        .create();

    let h = harness(&base, "revoked-early", 3600);
    let profile = current_user(&h).expect("retried call succeeds");
    assert_eq!(profile.id, "spotify-user");
    rejected.assert();
    refresh.assert();
    accepted.assert();

    let conn = db::open_or_create(&h.db_path).unwrap();
    let cred = db::load_credential(&conn, common::USER).unwrap().unwrap();
    assert_eq!(cred.access_token, "new-access");
}

#[test]
fn second_rejection_surfaces_as_auth_error() {
    let mut server = Server::new();
    let base = server.url();
    let me = server.mock("GET", "/me").with_status(401).expect(2).create();
    let refresh = token_ok(&mut server, "new-access");

    let h = harness(&base, "revoked-early", 3600);
    let err = current_user(&h).unwrap_err();
    assert!(matches!(err, PlaylistError::Auth { status: 401 }));
    assert!(err.requires_reauth());
    me.assert();
    refresh.assert();
}

#[test]
fn forbidden_is_handled_like_unauthorized() {
    let mut server = Server::new();
    let base = server.url();
    let me = server.mock("GET", "/me").with_status(403).expect(2).create();
    let refresh = token_ok(&mut server, "new-access");

    let h = harness(&base, "old-access", 3600);
    let err = current_user(&h).unwrap_err();
    assert!(matches!(err, PlaylistError::Auth { status: 403 }));
    me.assert();
    refresh.assert();
}

#[test]
fn server_errors_are_not_retried() {
    let mut server = Server::new();
    let base = server.url();
    let me = server
        .mock("GET", "/me")
        .with_status(500)
        .with_body("boom")
        .expect(1)
        .create();
    let refresh = server.mock("POST", "/api/token").expect(0).create();

    let h = harness(&base, "old-access", 3600);
    let err = current_user(&h).unwrap_err();
    match err {
        PlaylistError::Provider(ProviderError::Status { status, ref body }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("expected provider status error, got {:?}", other),
    }
    me.assert();
    refresh.assert();
}

#[test]
fn rate_limit_is_transient_and_keeps_retry_after() {
    let mut server = Server::new();
    let base = server.url();
    let _me = server
        .mock("GET", "/me")
        .with_status(429)
        .with_header("retry-after", "3")
        .with_body(r#"{"error":"rate_limited"}"#)
        .create();

    let h = harness(&base, "old-access", 3600);
    let err = current_user(&h).unwrap_err();
    assert!(matches!(
        err,
        PlaylistError::Provider(ProviderError::RateLimited { retry_after: Some(3) })
    ));
    assert!(err.is_transient());
    assert!(!err.requires_reauth());
}

#[test]
fn failed_reactive_refresh_requires_reauth() {
    let mut server = Server::new();
    let base = server.url();
    let _me = server.mock("GET", "/me").with_status(401).expect(1).create();
    let _refresh = server
        .mock("POST", "/api/token")
        .with_status(400)
        .with_body(json!({"error": "invalid_grant"}).to_string())
        .create();

    let h = harness(&base, "old-access", 3600);
    let err = current_user(&h).unwrap_err();
    assert!(matches!(err, PlaylistError::Refresh(RefreshError::Rejected { status: 400, .. })));
    assert!(err.requires_reauth());
}

#[tokio::test]
async fn proactive_refresh_uses_up_the_session_budget() {
    let td = tempfile::tempdir().expect("tmpdir");
    let db_path = common::fresh_db(td.path());
    common::seed_credential(&db_path, common::USER, "old-access", Some("refresh-1"), -60);

    let endpoint = Arc::new(common::CountingEndpoint::new());
    let manager = common::manager(&db_path, endpoint.clone());
    // the freshly refreshed token is rejected too
    let catalog = MockCatalog::new().rejecting_token("new-access-1");

    let session = manager.session(common::USER).await.expect("session");
    assert_eq!(endpoint.refreshes(), 1);
    let catalog_ref = &catalog;
    let err = session
        .run(move |token| async move { catalog_ref.current_user(&token).await })
        .await
        .unwrap_err();
    assert!(matches!(err, PlaylistError::Auth { status: 401 }));
    assert_eq!(endpoint.refreshes(), 1);
}

#[tokio::test]
async fn one_refresh_serves_every_call_in_the_session() {
    let td = tempfile::tempdir().expect("tmpdir");
    let db_path = common::fresh_db(td.path());
    common::seed_credential(&db_path, common::USER, "stale", Some("refresh-1"), 3600);

    let endpoint = Arc::new(common::CountingEndpoint::new());
    let manager = common::manager(&db_path, endpoint.clone());
    let catalog = MockCatalog::new().rejecting_token("stale");

    let session = manager.session(common::USER).await.expect("session");
    let catalog_ref = &catalog;
    for _ in 0..3 {
        session
            .run(move |token| async move { catalog_ref.top_artists(&token, 5).await })
            .await
            .expect("call succeeds after refresh");
    }
    assert_eq!(endpoint.refreshes(), 1);
    assert_eq!(session.access_token().await, "new-access-1");
    assert_eq!(
        catalog.tokens_seen(),
        vec!["stale", "new-access-1", "new-access-1", "new-access-1"]
    );
}
