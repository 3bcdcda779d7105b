use crate::error::StoreError;
use crate::models::{AppUser, CatalogTrack, Credential, ReflectionRecord, TrackRequest, UserProfile, VibeAnalysis};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

pub type Result<T> = std::result::Result<T, StoreError>;

const SCHEMA: &str = include_str!("../db/schema.sql");

pub fn open_or_create(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Task(format!("creating {}: {}", parent.display(), e)))?;
        }
    }
    let conn = Connection::open(path)?;
    run_migrations(&conn)?;
    Ok(conn)
}

pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Run a blocking closure against a fresh connection on the blocking pool.
pub async fn with_connection<T, F>(db_path: PathBuf, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || -> Result<T> {
        let mut conn = Connection::open(&db_path)?;
        f(&mut conn)
    })
    .await?
}

fn from_epoch_secs(secs: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {}", secs)))
}

fn from_epoch_millis(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {}", ms)))
}

/// Upsert the credential for a user; `expires_at = now + expires_in_secs`.
pub fn save_credential(
    conn: &Connection,
    user_id: &str,
    access_token: &str,
    refresh_token: Option<&str>,
    expires_in_secs: i64,
) -> Result<Credential> {
    let now = Utc::now();
    let expires_at = now
        .timestamp()
        .checked_add(expires_in_secs)
        .ok_or_else(|| StoreError::Corrupt(format!("expires_in out of range: {}", expires_in_secs)))?;
    // validated before the write so a bad grant never replaces a good row
    let expires = from_epoch_secs(expires_at)?;
    conn.execute(
        "INSERT INTO credentials (user_id, access_token, refresh_token, expires_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5) ON CONFLICT(user_id) DO UPDATE SET access_token = excluded.access_token, refresh_token = excluded.refresh_token, expires_at = excluded.expires_at, updated_at = excluded.updated_at",
        params![user_id, access_token, refresh_token, expires_at, now.timestamp()],
    )?;
    Ok(Credential {
        user_id: user_id.to_string(),
        access_token: access_token.to_string(),
        refresh_token: refresh_token.map(|s| s.to_string()),
        expires_at: expires,
    })
}

/// Load the live credential for a user. A row whose fields were cleared
/// counts as absent.
pub fn load_credential(conn: &Connection, user_id: &str) -> Result<Option<Credential>> {
    let mut stmt = conn.prepare(
        "SELECT access_token, refresh_token, expires_at FROM credentials WHERE user_id = ?1 LIMIT 1",
    )?;
    let row = stmt
        .query_row(params![user_id], |r| {
            Ok((
                r.get::<_, Option<String>>(0)?,
                r.get::<_, Option<String>>(1)?,
                r.get::<_, Option<i64>>(2)?,
            ))
        })
        .optional()?;
    match row {
        Some((Some(access_token), refresh_token, Some(expires_at))) => Ok(Some(Credential {
            user_id: user_id.to_string(),
            access_token,
            refresh_token,
            expires_at: from_epoch_secs(expires_at)?,
        })),
        _ => Ok(None),
    }
}

/// Null out the token fields (logout / reconnect). Keeps the row.
pub fn clear_credential(conn: &Connection, user_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE credentials SET access_token = NULL, refresh_token = NULL, expires_at = NULL, updated_at = ?2 WHERE user_id = ?1",
        params![user_id, Utc::now().timestamp()],
    )?;
    Ok(())
}

/// Insert or update the internal user keyed by Spotify profile id and
/// return its internal id. Idempotent: repeated connects map to one user.
pub fn upsert_user_by_spotify_id(conn: &mut Connection, profile: &UserProfile) -> Result<AppUser> {
    let now = Utc::now().timestamp();
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO users (id, spotify_id, email, display_name, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?5) ON CONFLICT(spotify_id) DO UPDATE SET email = excluded.email, display_name = excluded.display_name, updated_at = excluded.updated_at",
        params![
            uuid::Uuid::new_v4().to_string(),
            profile.id,
            profile.email,
            profile.display_name,
            now
        ],
    )?;
    let user = tx.query_row(
        "SELECT id, spotify_id, email, display_name FROM users WHERE spotify_id = ?1",
        params![profile.id],
        |r| {
            Ok(AppUser {
                id: r.get(0)?,
                spotify_id: r.get(1)?,
                email: r.get(2)?,
                display_name: r.get(3)?,
            })
        },
    )?;
    tx.commit()?;
    Ok(user)
}

pub fn get_user(conn: &Connection, user_id: &str) -> Result<Option<AppUser>> {
    let mut stmt =
        conn.prepare("SELECT id, spotify_id, email, display_name FROM users WHERE id = ?1 LIMIT 1")?;
    let row = stmt
        .query_row(params![user_id], |r| {
            Ok(AppUser {
                id: r.get(0)?,
                spotify_id: r.get(1)?,
                email: r.get(2)?,
                display_name: r.get(3)?,
            })
        })
        .optional()?;
    Ok(row)
}

pub fn insert_reflection(conn: &Connection, rec: &ReflectionRecord) -> Result<()> {
    let tracks_json = serde_json::to_string(&rec.tracks)?;
    conn.execute(
        "INSERT INTO reflections (id, user_id, prompt, playlist_name, narrative, valence, energy, discovery_mode, weather_condition, time_of_day, spotify_playlist_id, spotify_playlist_url, tracks_json, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            rec.id,
            rec.user_id,
            rec.prompt,
            rec.playlist_name,
            rec.narrative,
            rec.valence,
            rec.energy,
            rec.discovery_mode,
            rec.weather_condition,
            rec.time_of_day,
            rec.playlist_id,
            rec.playlist_url,
            tracks_json,
            rec.created_at.timestamp_millis()
        ],
    )?;
    Ok(())
}

/// Most recent reflections first.
pub fn list_reflections(conn: &Connection, user_id: &str, limit: u32) -> Result<Vec<ReflectionRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, prompt, playlist_name, narrative, valence, energy, discovery_mode, weather_condition, time_of_day, spotify_playlist_id, spotify_playlist_url, tracks_json, created_at FROM reflections WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![user_id, limit], |r| {
        Ok((
            ReflectionRecord {
                id: r.get(0)?,
                user_id: r.get(1)?,
                prompt: r.get(2)?,
                playlist_name: r.get(3)?,
                narrative: r.get(4)?,
                valence: r.get(5)?,
                energy: r.get(6)?,
                discovery_mode: r.get::<_, i64>(7)? != 0,
                weather_condition: r.get(8)?,
                time_of_day: r.get(9)?,
                playlist_id: r.get(10)?,
                playlist_url: r.get(11)?,
                tracks: Vec::new(),
                created_at: Utc::now(),
            },
            r.get::<_, String>(12)?,
            r.get::<_, i64>(13)?,
        ))
    })?;
    let mut v = Vec::new();
    for row in rows {
        let (mut rec, tracks_json, created_ms) = row?;
        rec.tracks = serde_json::from_str::<Vec<TrackRequest>>(&tracks_json)?;
        rec.created_at = from_epoch_millis(created_ms)?;
        v.push(rec);
    }
    Ok(v)
}

/// Always appends a new history row.
pub fn insert_vibe_analysis(conn: &Connection, a: &VibeAnalysis) -> Result<()> {
    conn.execute(
        "INSERT INTO vibe_analysis (id, user_id, personality_type, personality_traits_json, personality_description, valence, energy, danceability, acousticness, instrumentalness, tracks_json, analyzed_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            a.id,
            a.user_id,
            a.personality_type,
            serde_json::to_string(&a.personality_traits)?,
            a.personality_description,
            a.valence,
            a.energy,
            a.danceability,
            a.acousticness,
            a.instrumentalness,
            serde_json::to_string(&a.tracks)?,
            a.analyzed_at.timestamp_millis()
        ],
    )?;
    Ok(())
}

/// Newest analyses first, at most `limit`.
pub fn vibe_analysis_history(conn: &Connection, user_id: &str, limit: u32) -> Result<Vec<VibeAnalysis>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, personality_type, personality_traits_json, personality_description, valence, energy, danceability, acousticness, instrumentalness, tracks_json, analyzed_at FROM vibe_analysis WHERE user_id = ?1 ORDER BY analyzed_at DESC, rowid DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![user_id, limit], |r| {
        Ok((
            VibeAnalysis {
                id: r.get(0)?,
                user_id: r.get(1)?,
                personality_type: r.get(2)?,
                personality_traits: Vec::new(),
                personality_description: r.get(4)?,
                valence: r.get(5)?,
                energy: r.get(6)?,
                danceability: r.get(7)?,
                acousticness: r.get(8)?,
                instrumentalness: r.get(9)?,
                tracks: Vec::new(),
                analyzed_at: Utc::now(),
            },
            r.get::<_, String>(3)?,
            r.get::<_, String>(10)?,
            r.get::<_, i64>(11)?,
        ))
    })?;
    let mut v = Vec::new();
    for row in rows {
        let (mut a, traits_json, tracks_json, analyzed_ms) = row?;
        a.personality_traits = serde_json::from_str::<Vec<String>>(&traits_json)?;
        a.tracks = serde_json::from_str::<Vec<CatalogTrack>>(&tracks_json)?;
        a.analyzed_at = from_epoch_millis(analyzed_ms)?;
        v.push(a);
    }
    Ok(v)
}

pub fn latest_vibe_analysis(conn: &Connection, user_id: &str) -> Result<Option<VibeAnalysis>> {
    Ok(vibe_analysis_history(conn, user_id, 1)?.into_iter().next())
}
