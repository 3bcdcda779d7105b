use crate::api::CatalogProvider;
use crate::config::Config;
use crate::credentials::CredentialedSession;
use crate::error::PlaylistError;
use crate::models::{AssembledPlaylist, CreatedPlaylist, TrackRequest};
use crate::resolver::TrackResolver;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_DESCRIPTION: &str = "Created with ReflectM - AI-powered playlist generator";

/// Creates a playlist, resolves the requested tracks and appends the
/// resolved subset in request order.
pub struct PlaylistAssembler {
    catalog: Arc<dyn CatalogProvider>,
    resolver: TrackResolver,
    batch_size: usize,
    search_concurrency: usize,
    public: bool,
}

impl PlaylistAssembler {
    pub fn new(cfg: &Config, catalog: Arc<dyn CatalogProvider>) -> Self {
        Self {
            resolver: TrackResolver::new(catalog.clone()),
            catalog,
            batch_size: cfg.playlist_batch_size(),
            search_concurrency: cfg.search_concurrency.max(1),
            public: cfg.playlist_public,
        }
    }

    pub fn resolver(&self) -> &TrackResolver {
        &self.resolver
    }

    /// Resolve every request, keeping input order and dropping misses.
    ///
    /// Searches run concurrently up to `search_concurrency`, but results are
    /// collected index-stable. A miss, a timeout, a network error or a
    /// non-auth provider status drops that track. Anything else (auth that
    /// survived the session's retry, a failed refresh, a failed credential
    /// save) aborts the whole resolution.
    pub async fn resolve_all(
        &self,
        session: &CredentialedSession<'_>,
        tracks: &[TrackRequest],
    ) -> Result<Vec<String>, PlaylistError> {
        let resolver = &self.resolver;
        let results: Vec<_> = stream::iter(tracks.iter())
            .map(move |t| async move { (t, resolver.resolve(session, &t.song, &t.artist).await) })
            .buffered(self.search_concurrency)
            .collect()
            .await;

        let mut uris = Vec::with_capacity(results.len());
        for (t, res) in results {
            match res {
                Ok(Some(uri)) => uris.push(uri),
                Ok(None) => warn!("No catalog match for {:?} by {:?}", t.song, t.artist),
                Err(e @ (PlaylistError::Timeout | PlaylistError::Network(_) | PlaylistError::Provider(_))) => {
                    warn!("Search for {:?} by {:?} failed, dropping it: {}", t.song, t.artist, e)
                }
                Err(e) => return Err(e),
            }
        }
        Ok(uris)
    }

    async fn create_empty(
        &self,
        session: &CredentialedSession<'_>,
        name: &str,
        description: &str,
    ) -> Result<CreatedPlaylist, PlaylistError> {
        let catalog = self.catalog.as_ref();
        let public = self.public;
        let owner = session
            .run(move |token| async move { catalog.current_user(&token).await })
            .await?;
        let owner_id = owner.id.as_str();
        session
            .run(move |token| async move {
                catalog
                    .create_playlist(&token, owner_id, name, description, public)
                    .await
            })
            .await
    }

    /// Append `uris` in batches of at most `batch_size`, strictly in order.
    /// The first failing batch aborts; earlier batches stay on the playlist.
    pub async fn append_in_batches(
        &self,
        session: &CredentialedSession<'_>,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<(), PlaylistError> {
        let catalog = self.catalog.as_ref();
        for (i, batch) in uris.chunks(self.batch_size).enumerate() {
            session
                .run(move |token| async move { catalog.add_tracks(&token, playlist_id, batch).await })
                .await
                .map_err(|e| {
                    warn!(
                        "Appending batch {} ({} tracks) to playlist {} failed: {}",
                        i + 1,
                        batch.len(),
                        playlist_id,
                        e
                    );
                    e
                })?;
        }
        Ok(())
    }

    /// Create a playlist named `name` and fill it with whatever resolves
    /// out of `tracks`.
    ///
    /// Fails with `EmptyAssembly` when nothing resolves; the empty container
    /// is left on the provider for the caller to deal with.
    pub async fn assemble(
        &self,
        session: &CredentialedSession<'_>,
        name: &str,
        tracks: &[TrackRequest],
        description: Option<&str>,
    ) -> Result<AssembledPlaylist, PlaylistError> {
        if name.trim().is_empty() {
            return Err(PlaylistError::InvalidInput("playlist name is empty".into()));
        }
        let description = description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or(DEFAULT_DESCRIPTION);

        let playlist = self.create_empty(session, name, description).await?;
        info!(
            "Created {} playlist {} ({})",
            self.catalog.name(),
            name,
            playlist.playlist_id
        );

        let uris = self.resolve_all(session, tracks).await?;
        if uris.is_empty() {
            return Err(PlaylistError::EmptyAssembly {
                playlist_id: playlist.playlist_id,
                requested: tracks.len(),
            });
        }

        self.append_in_batches(session, &playlist.playlist_id, &uris).await?;
        info!(
            "Playlist {} filled with {}/{} tracks",
            playlist.playlist_id,
            uris.len(),
            tracks.len()
        );
        Ok(AssembledPlaylist {
            playlist,
            requested: tracks.len(),
            track_uris: uris,
        })
    }
}
