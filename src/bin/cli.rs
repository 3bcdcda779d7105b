use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lib::api::spotify_auth::{code_from_redirect, SpotifyAuth};
use lib::api::weather::WeatherClient;
use lib::config::Config;
use lib::models::{PlaylistPreview, VibeProfile};
use lib::service::{GenerateOptions, PlaylistService};
use mood_playlist_sync as lib;
use std::path::{Path, PathBuf};
use tracing::subscriber as tracing_subscriber_global;
use tracing_appender::rolling::RollingFileAppender;
use tracing_log::LogTracer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "mood-playlist-sync", version)]
struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the Spotify consent URL to open in a browser
    AuthUrl,
    /// Finish sign-in with the URL the browser was redirected to
    Connect {
        #[arg(long)]
        redirect_url: String,
    },
    /// Generate a playlist preview from a mood prompt (nothing is created yet)
    Generate {
        #[arg(long)]
        user: String,
        #[arg(long)]
        prompt: String,
        /// Ignore the listener's top artists
        #[arg(long)]
        discovery: bool,
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,
        /// Write the preview JSON here instead of stdout
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Create the playlist from a preview file and record a reflection
    Confirm {
        #[arg(long)]
        user: String,
        #[arg(long, value_name = "FILE")]
        preview: PathBuf,
    },
    /// Look up a single track
    Search {
        #[arg(long)]
        user: String,
        #[arg(long)]
        song: String,
        #[arg(long)]
        artist: String,
    },
    /// List saved reflections, newest first
    Reflections {
        #[arg(long)]
        user: String,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// List the user's most played tracks of the last weeks
    TopTracks {
        #[arg(long)]
        user: String,
        #[arg(long, default_value_t = 50, value_parser = clap::value_parser!(u32).range(1..=50))]
        limit: u32,
    },
    /// Record a vibe analysis from a profile JSON file; the user's top
    /// tracks are attached
    RecordVibe {
        #[arg(long)]
        user: String,
        #[arg(long, value_name = "FILE")]
        profile: PathBuf,
    },
    /// List vibe analyses, newest first
    VibeHistory {
        #[arg(long)]
        user: String,
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
    /// Forget the stored Spotify tokens for a user
    Logout {
        #[arg(long)]
        user: String,
    },
    /// Show current weather for coordinates
    Weather {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },
    /// Validate config file and exit
    ConfigValidate,
}

fn init_tracing(cfg: &Config) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let _ = LogTracer::init();
    std::fs::create_dir_all(&cfg.log_dir)
        .with_context(|| format!("creating log dir {}", cfg.log_dir.display()))?;
    let file_appender: RollingFileAppender =
        tracing_appender::rolling::daily(&cfg.log_dir, "mood-playlist-sync.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Honor RUST_LOG if set, otherwise default to info.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(non_blocking))
        .with(fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber_global::set_global_default(subscriber)
        .context("failed to set global tracing subscriber")?;
    Ok(guard)
}

fn resolve_config_path(explicit: &Option<PathBuf>) -> PathBuf {
    match explicit {
        Some(p) => p.clone(),
        None => {
            let etc_path = Path::new("/etc/mood-playlist-sync/config.toml");
            if etc_path.exists() {
                etc_path.to_path_buf()
            } else {
                PathBuf::from("config/example-config.toml")
            }
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = resolve_config_path(&cli.config);

    if let Commands::ConfigValidate = cli.command {
        match Config::from_path(&config_path) {
            Ok(_) => println!("OK"),
            Err(e) => {
                eprintln!("Config validation failed: {}", e);
                std::process::exit(2);
            }
        }
        return Ok(());
    }

    let cfg = Config::from_path(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?
        .with_env_overrides();
    let log_guard = init_tracing(&cfg)?;

    match cli.command {
        Commands::AuthUrl => {
            if !cfg.has_spotify_client() {
                anyhow::bail!("spotify_client_id / spotify_client_secret are not configured");
            }
            let auth = SpotifyAuth::new(&cfg, lib::api::http_client(&cfg)?);
            let state = SpotifyAuth::generate_state();
            println!("Open this URL in your browser, approve, then run `connect` with the URL you land on:");
            println!("{}", auth.authorize_url(&state)?);
        }
        Commands::Connect { redirect_url } => {
            let code = code_from_redirect(&redirect_url)?;
            let service = PlaylistService::from_config(&cfg).await?;
            let user = service.connect(&code).await.context("connecting Spotify account")?;
            println!("Connected as {} (user id {})", user.display_name.as_deref().unwrap_or(&user.spotify_id), user.id);
        }
        Commands::Generate {
            user,
            prompt,
            discovery,
            lat,
            lon,
            out,
        } => {
            let service = PlaylistService::from_config(&cfg).await?;
            let opts = GenerateOptions {
                prompt,
                discovery_mode: discovery,
                coordinates: lat.zip(lon),
                ..Default::default()
            };
            let preview = service.generate(&user, opts).await.context("generating playlist")?;
            match out {
                Some(path) => {
                    std::fs::write(&path, serde_json::to_string_pretty(&preview)?)
                        .with_context(|| format!("writing preview to {}", path.display()))?;
                    println!(
                        "Preview \"{}\" with {} tracks written to {}",
                        preview.generated.playlist_name,
                        preview.generated.tracks.len(),
                        path.display()
                    );
                }
                None => print_json(&preview)?,
            }
        }
        Commands::Confirm { user, preview } => {
            let raw = std::fs::read_to_string(&preview)
                .with_context(|| format!("reading preview {}", preview.display()))?;
            let preview: PlaylistPreview = serde_json::from_str(&raw).context("parsing preview JSON")?;
            let service = PlaylistService::from_config(&cfg).await?;
            let confirmed = service.confirm(&user, &preview).await.context("creating playlist")?;
            let a = &confirmed.assembled;
            println!(
                "Created {} ({} of {} tracks added)",
                a.playlist.playlist_url,
                a.resolved(),
                a.requested
            );
            if confirmed.reflection_id.is_none() {
                eprintln!("Warning: the reflection could not be saved");
            }
        }
        Commands::Search { user, song, artist } => {
            let service = PlaylistService::from_config(&cfg).await?;
            match service.search_track(&user, &song, &artist).await? {
                Some(track) => print_json(&track)?,
                None => {
                    eprintln!("No match for {} by {}", song, artist);
                    // exit() skips destructors; flush the file log first
                    drop(log_guard);
                    std::process::exit(1);
                }
            }
        }
        Commands::Reflections { user, limit } => {
            let service = PlaylistService::from_config(&cfg).await?;
            print_json(&service.reflections(&user, limit).await?)?;
        }
        Commands::TopTracks { user, limit } => {
            let service = PlaylistService::from_config(&cfg).await?;
            print_json(&service.top_tracks(&user, limit).await.context("loading top tracks")?)?;
        }
        Commands::RecordVibe { user, profile } => {
            let raw = std::fs::read_to_string(&profile)
                .with_context(|| format!("reading profile {}", profile.display()))?;
            let profile: VibeProfile = serde_json::from_str(&raw).context("parsing profile JSON")?;
            let service = PlaylistService::from_config(&cfg).await?;
            let analysis = service.record_vibe(&user, profile).await.context("recording vibe analysis")?;
            println!(
                "Recorded vibe analysis {} ({}, {} tracks)",
                analysis.id,
                analysis.personality_type,
                analysis.tracks.len()
            );
        }
        Commands::VibeHistory { user, limit } => {
            let service = PlaylistService::from_config(&cfg).await?;
            print_json(&service.vibe_history(&user, limit).await?)?;
        }
        Commands::Logout { user } => {
            let service = PlaylistService::from_config(&cfg).await?;
            service.logout(&user).await?;
            println!("Logged out {}", user);
        }
        Commands::Weather { lat, lon } => {
            let weather = WeatherClient::new(&cfg, lib::api::http_client(&cfg)?);
            println!("{}", weather.current_conditions(lat, lon).await?);
        }
        Commands::ConfigValidate => {}
    }

    Ok(())
}
