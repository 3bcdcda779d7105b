mod common;

use mood_playlist_sync as lib;
use lib::api::mock::MockCatalog;
use lib::api::CatalogProvider;
use lib::config::Config;
use lib::credentials::{CredentialManager, SqliteTokenStore, TokenStore};
use lib::error::{PlaylistError, ProviderError, StoreError};
use lib::models::{CatalogTrack, CreatedPlaylist, Credential, TrackRequest, UserProfile};
use lib::playlist::{PlaylistAssembler, DEFAULT_DESCRIPTION};
use lib::resolver::{fallback_query, scoped_query};
use std::sync::Arc;

fn cfg() -> Config {
    Config {
        search_concurrency: 3,
        ..Config::default()
    }
}

/// Catalog that resolves `Song i` by `Artist i` to `spotify:track:i` for
/// every index in `hits`.
fn catalog_with(hits: impl IntoIterator<Item = usize>) -> MockCatalog {
    hits.into_iter().fold(MockCatalog::new(), |c, i| {
        c.with_result(
            &scoped_query(&format!("Song {}", i), &format!("Artist {}", i)),
            &format!("spotify:track:{}", i),
        )
    })
}

fn requests(n: usize) -> Vec<TrackRequest> {
    (0..n)
        .map(|i| TrackRequest::new(format!("Song {}", i), format!("Artist {}", i)))
        .collect()
}

fn setup() -> (tempfile::TempDir, Arc<lib::credentials::CredentialManager>) {
    let td = tempfile::tempdir().expect("tmpdir");
    let db_path = common::fresh_db(td.path());
    common::seed_credential(&db_path, common::USER, "access", Some("refresh"), 3600);
    let manager = common::manager(&db_path, Arc::new(common::CountingEndpoint::new()));
    (td, manager)
}

#[test]
fn queries_are_trimmed() {
    assert_eq!(scoped_query("  Hey Jude ", " The Beatles"), "track:Hey Jude artist:The Beatles");
    assert_eq!(fallback_query(" Hey Jude "), "Hey Jude");
}

#[tokio::test]
async fn resolver_falls_back_to_title_search() {
    let (_td, manager) = setup();
    let catalog = Arc::new(MockCatalog::new().with_result("Obscure Song", "spotify:track:loose"));
    let assembler = PlaylistAssembler::new(&cfg(), catalog.clone());
    let session = manager.session(common::USER).await.unwrap();

    let uri = assembler
        .resolver()
        .resolve(&session, "Obscure Song", "Wrong Artist")
        .await
        .unwrap();
    assert_eq!(uri.as_deref(), Some("spotify:track:loose"));
    assert_eq!(
        catalog.searches(),
        vec!["track:Obscure Song artist:Wrong Artist", "Obscure Song"]
    );
}

#[tokio::test]
async fn resolver_returns_none_when_nothing_matches() {
    let (_td, manager) = setup();
    let catalog = Arc::new(MockCatalog::new());
    let assembler = PlaylistAssembler::new(&cfg(), catalog.clone());
    let session = manager.session(common::USER).await.unwrap();

    let track = assembler
        .resolver()
        .resolve_track(&session, "Nothing", "Nobody")
        .await
        .unwrap();
    assert!(track.is_none());
    assert_eq!(catalog.searches().len(), 2);

    // blank title: no search at all
    assert!(assembler.resolver().resolve(&session, "  ", "Nobody").await.unwrap().is_none());
    assert_eq!(catalog.searches().len(), 2);
}

#[tokio::test]
async fn assembly_keeps_request_order_and_drops_misses() {
    let (_td, manager) = setup();
    // 17 requested, 2 and 9 unresolvable
    let catalog = Arc::new(catalog_with((0..17).filter(|i| *i != 2 && *i != 9)));
    let assembler = PlaylistAssembler::new(&cfg(), catalog.clone());
    let session = manager.session(common::USER).await.unwrap();

    let assembled = assembler
        .assemble(&session, "Evening Calm", &requests(17), Some("slow and warm"))
        .await
        .expect("assembled");

    let expected: Vec<String> = (0..17)
        .filter(|i| *i != 2 && *i != 9)
        .map(|i| format!("spotify:track:{}", i))
        .collect();
    assert_eq!(assembled.track_uris, expected);
    assert_eq!(assembled.requested, 17);
    assert_eq!(assembled.resolved(), 15);
    assert_eq!(assembled.missed(), 2);
    assert_eq!(assembled.playlist.playlist_id, "mock-playlist-1");
    assert_eq!(
        catalog.created_playlists(),
        vec![("Evening Calm".to_string(), "slow and warm".to_string())]
    );
    let batches = catalog.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].1, expected);
}

#[tokio::test]
async fn large_assembly_is_appended_in_ordered_batches() {
    let (_td, manager) = setup();
    let catalog = Arc::new(catalog_with(0..250));
    let assembler = PlaylistAssembler::new(&cfg(), catalog.clone());
    let session = manager.session(common::USER).await.unwrap();

    let assembled = assembler
        .assemble(&session, "Marathon", &requests(250), None)
        .await
        .expect("assembled");
    assert_eq!(assembled.resolved(), 250);

    let batches = catalog.batches();
    let sizes: Vec<usize> = batches.iter().map(|(_, uris)| uris.len()).collect();
    assert_eq!(sizes, vec![100, 100, 50]);
    let flattened: Vec<String> = batches.into_iter().flat_map(|(_, uris)| uris).collect();
    assert_eq!(flattened, assembled.track_uris);
    assert_eq!(flattened[100], "spotify:track:100");

    // missing description falls back to the default
    assert_eq!(catalog.created_playlists()[0].1, DEFAULT_DESCRIPTION);
}

#[tokio::test]
async fn configured_batch_size_is_honoured_below_the_ceiling() {
    let (_td, manager) = setup();
    let catalog = Arc::new(catalog_with(0..7));
    let cfg = Config {
        max_batch_size_spotify: 3,
        ..cfg()
    };
    let assembler = PlaylistAssembler::new(&cfg, catalog.clone());
    let session = manager.session(common::USER).await.unwrap();

    assembler
        .assemble(&session, "Small", &requests(7), None)
        .await
        .expect("assembled");
    let sizes: Vec<usize> = catalog.batches().iter().map(|(_, u)| u.len()).collect();
    assert_eq!(sizes, vec![3, 3, 1]);
}

#[tokio::test]
async fn nothing_resolved_is_an_empty_assembly_error() {
    let (_td, manager) = setup();
    let catalog = Arc::new(MockCatalog::new());
    let assembler = PlaylistAssembler::new(&cfg(), catalog.clone());
    let session = manager.session(common::USER).await.unwrap();

    let err = assembler
        .assemble(&session, "Nothing Here", &requests(4), None)
        .await
        .unwrap_err();
    match err {
        PlaylistError::EmptyAssembly { playlist_id, requested } => {
            assert_eq!(playlist_id, "mock-playlist-1");
            assert_eq!(requested, 4);
        }
        other => panic!("expected EmptyAssembly, got {:?}", other),
    }
    // the container exists but nothing was appended
    assert_eq!(catalog.created_playlists().len(), 1);
    assert!(catalog.batches().is_empty());
}

#[tokio::test]
async fn empty_request_list_is_an_empty_assembly() {
    let (_td, manager) = setup();
    let catalog = Arc::new(MockCatalog::new());
    let assembler = PlaylistAssembler::new(&cfg(), catalog.clone());
    let session = manager.session(common::USER).await.unwrap();

    let err = assembler.assemble(&session, "Empty", &[], None).await.unwrap_err();
    assert!(matches!(err, PlaylistError::EmptyAssembly { requested: 0, .. }));
    assert!(catalog.searches().is_empty());
}

#[tokio::test]
async fn failed_creation_stops_before_any_search() {
    let (_td, manager) = setup();
    let catalog = Arc::new(catalog_with(0..3).failing_create());
    let assembler = PlaylistAssembler::new(&cfg(), catalog.clone());
    let session = manager.session(common::USER).await.unwrap();

    let err = assembler
        .assemble(&session, "Doomed", &requests(3), None)
        .await
        .unwrap_err();
    assert!(matches!(err, PlaylistError::Provider(_)));
    assert!(catalog.searches().is_empty());
    assert!(catalog.batches().is_empty());
}

#[tokio::test]
async fn failed_batch_stops_later_batches() {
    let (_td, manager) = setup();
    let catalog = Arc::new(catalog_with(0..250).failing_batch(1));
    let assembler = PlaylistAssembler::new(&cfg(), catalog.clone());
    let session = manager.session(common::USER).await.unwrap();

    let err = assembler
        .assemble(&session, "Half Done", &requests(250), None)
        .await
        .unwrap_err();
    assert!(matches!(err, PlaylistError::Provider(_)));
    // first batch went through, second failed, third never attempted
    assert_eq!(catalog.batches().len(), 2);
}

#[tokio::test]
async fn blank_name_is_rejected_before_creating_anything() {
    let (_td, manager) = setup();
    let catalog = Arc::new(catalog_with(0..2));
    let assembler = PlaylistAssembler::new(&cfg(), catalog.clone());
    let session = manager.session(common::USER).await.unwrap();

    let err = assembler.assemble(&session, "   ", &requests(2), None).await.unwrap_err();
    assert!(matches!(err, PlaylistError::InvalidInput(_)));
    assert!(catalog.created_playlists().is_empty());
}

/// Accepts every call except searches, which always come back 401.
struct SearchLockedCatalog(MockCatalog);

#[async_trait::async_trait]
impl CatalogProvider for SearchLockedCatalog {
    fn name(&self) -> &str {
        "search-locked"
    }
    async fn current_user(&self, token: &str) -> Result<UserProfile, ProviderError> {
        self.0.current_user(token).await
    }
    async fn search_tracks(&self, _token: &str, _query: &str, _limit: u32) -> Result<Vec<CatalogTrack>, ProviderError> {
        Err(ProviderError::Unauthorized { status: 401 })
    }
    async fn create_playlist(
        &self,
        token: &str,
        owner_id: &str,
        name: &str,
        description: &str,
        public: bool,
    ) -> Result<CreatedPlaylist, ProviderError> {
        self.0.create_playlist(token, owner_id, name, description, public).await
    }
    async fn add_tracks(&self, token: &str, playlist_id: &str, uris: &[String]) -> Result<(), ProviderError> {
        self.0.add_tracks(token, playlist_id, uris).await
    }
    async fn top_artists(&self, token: &str, limit: u32) -> Result<Vec<String>, ProviderError> {
        self.0.top_artists(token, limit).await
    }
    async fn top_tracks(&self, token: &str, limit: u32) -> Result<Vec<CatalogTrack>, ProviderError> {
        self.0.top_tracks(token, limit).await
    }
}

#[tokio::test]
async fn auth_failure_during_resolution_aborts_assembly() {
    let (_td, manager) = setup();
    let catalog = Arc::new(SearchLockedCatalog(catalog_with(0..3)));
    let assembler = PlaylistAssembler::new(&cfg(), catalog.clone());
    let session = manager.session(common::USER).await.unwrap();

    let err = assembler
        .assemble(&session, "Locked Out", &requests(3), None)
        .await
        .unwrap_err();
    // the refresh succeeded but the retried search was rejected again
    assert!(matches!(err, PlaylistError::Auth { status: 401 }));
    assert!(catalog.0.batches().is_empty());
}

#[tokio::test]
async fn rejected_refresh_during_resolution_aborts_assembly() {
    let td = tempfile::tempdir().expect("tmpdir");
    let db_path = common::fresh_db(td.path());
    common::seed_credential(&db_path, common::USER, "access", Some("refresh"), 3600);
    let endpoint = Arc::new(common::CountingEndpoint::rejecting(400, "invalid_grant"));
    let manager = common::manager(&db_path, endpoint.clone());
    let catalog = Arc::new(SearchLockedCatalog(catalog_with(0..3)));
    let assembler = PlaylistAssembler::new(&cfg(), catalog.clone());
    let session = manager.session(common::USER).await.unwrap();

    let err = assembler
        .assemble(&session, "Locked Out", &requests(3), None)
        .await
        .unwrap_err();
    assert!(matches!(err, PlaylistError::Refresh(_)));
    assert!(err.requires_reauth());
    // the failed attempt spent the operation's refresh budget
    assert_eq!(endpoint.refreshes(), 1);
    assert!(catalog.0.batches().is_empty());
}

/// Reads from SQLite but refuses every write.
struct ReadOnlyStore(SqliteTokenStore);

#[async_trait::async_trait]
impl TokenStore for ReadOnlyStore {
    async fn get(&self, user_id: &str) -> Result<Option<Credential>, StoreError> {
        self.0.get(user_id).await
    }
    async fn put(
        &self,
        _user_id: &str,
        _access_token: &str,
        _refresh_token: Option<&str>,
        _expires_in_secs: i64,
    ) -> Result<Credential, StoreError> {
        Err(StoreError::Corrupt("disk full".into()))
    }
    async fn clear(&self, user_id: &str) -> Result<(), StoreError> {
        self.0.clear(user_id).await
    }
}

#[tokio::test]
async fn failed_credential_save_during_resolution_aborts_assembly() {
    let td = tempfile::tempdir().expect("tmpdir");
    let db_path = common::fresh_db(td.path());
    common::seed_credential(&db_path, common::USER, "stale", Some("refresh"), 3600);
    let endpoint = Arc::new(common::CountingEndpoint::new());
    let manager = CredentialManager::new(
        Arc::new(ReadOnlyStore(SqliteTokenStore::new(db_path.clone()))),
        endpoint.clone(),
        0,
    );
    let catalog = Arc::new(SearchLockedCatalog(catalog_with(0..1)));
    let assembler = PlaylistAssembler::new(&cfg(), catalog.clone());
    let session = manager.session(common::USER).await.unwrap();

    let err = assembler
        .assemble(&session, "Unsaved", &requests(1), None)
        .await
        .unwrap_err();
    assert!(matches!(err, PlaylistError::Persistence(StoreError::Corrupt(_))), "got {:?}", err);
    assert!(!err.requires_reauth());
    assert_eq!(endpoint.refreshes(), 1);
    assert!(catalog.0.batches().is_empty());
}
