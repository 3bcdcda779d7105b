use crate::api::CatalogProvider;
use crate::credentials::CredentialedSession;
use crate::error::PlaylistError;
use crate::models::CatalogTrack;
use std::sync::Arc;
use tracing::debug;

/// Field-scoped catalog query for a (song, artist) pair.
pub fn scoped_query(song: &str, artist: &str) -> String {
    format!("track:{} artist:{}", song.trim(), artist.trim())
}

/// Loose query used when the scoped one finds nothing: the title alone.
pub fn fallback_query(song: &str) -> String {
    song.trim().to_string()
}

/// Maps AI-suggested (song, artist) pairs to catalog tracks.
///
/// The scoped search is tried first; when it comes back empty the title is
/// searched on its own and the top hit taken, accepting a looser match over
/// dropping the track.
pub struct TrackResolver {
    catalog: Arc<dyn CatalogProvider>,
}

impl TrackResolver {
    pub fn new(catalog: Arc<dyn CatalogProvider>) -> Self {
        Self { catalog }
    }

    async fn first_hit(
        &self,
        session: &CredentialedSession<'_>,
        query: &str,
    ) -> Result<Option<CatalogTrack>, PlaylistError> {
        let catalog = self.catalog.as_ref();
        let hits = session
            .run(move |token| async move { catalog.search_tracks(&token, query, 1).await })
            .await?;
        Ok(hits.into_iter().next())
    }

    /// Best catalog match, or `None` when neither query finds anything.
    pub async fn resolve_track(
        &self,
        session: &CredentialedSession<'_>,
        song: &str,
        artist: &str,
    ) -> Result<Option<CatalogTrack>, PlaylistError> {
        if song.trim().is_empty() {
            return Ok(None);
        }
        if !artist.trim().is_empty() {
            let scoped = scoped_query(song, artist);
            if let Some(track) = self.first_hit(session, &scoped).await? {
                return Ok(Some(track));
            }
            debug!("no scoped match for {:?} by {:?}; trying title only", song, artist);
        }
        self.first_hit(session, &fallback_query(song)).await
    }

    pub async fn resolve(
        &self,
        session: &CredentialedSession<'_>,
        song: &str,
        artist: &str,
    ) -> Result<Option<String>, PlaylistError> {
        Ok(self.resolve_track(session, song, artist).await?.map(|t| t.uri))
    }
}
