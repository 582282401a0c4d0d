mod config;
mod directory;
mod download;
mod error;
mod youtube;

use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use config::{Config, API_KEY_VAR};
use dotenv::dotenv;
use download::{ConsoleProgress, Downloader, ProgressObserver, Silent};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use youtube::{classify, enumerate_playlist, is_valid_url, video_url, PlaylistEntry, YouTube};

/// Download the audio of a YouTube video or playlist as mp3 files.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Video, playlist or short (youtu.be) link
    url: String,

    /// YouTube Data API key, needed for playlists
    #[arg(short, long = "key-api")]
    key_api: Option<String>,

    /// Directory to save the files in; asked for when missing
    #[arg(short, long)]
    output: Option<String>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Only print what would be downloaded
    #[arg(long)]
    list_only: bool,

    /// Don't print download progress
    #[arg(short, long)]
    quiet: bool,
}

/// Turns the url into the list of videos to fetch.
///
/// A video opened from inside a playlist falls back to that single video when
/// there is no API key to list the playlist with.
async fn resolve_entries(url: &str, api_key: Option<&str>, config: &Config) -> Result<Vec<PlaylistEntry>> {
    if !is_valid_url(url) {
        bail!("not a youtube url: {}", url);
    }

    let reference = classify(url);
    info!(?reference, "classified url");
    if reference.is_empty() {
        bail!("no video or playlist id in {}", url);
    }

    if let Some(playlist_id) = &reference.playlist_id {
        let api_key = match (api_key, &reference.video_id) {
            (Some(api_key), _) => api_key,
            (None, Some(video_id)) => {
                warn!(
                    playlist_id = %playlist_id,
                    "no API key (--key-api or {}), downloading only video {}",
                    API_KEY_VAR,
                    video_id
                );
                return Ok(vec![PlaylistEntry {
                    title: video_id.clone(),
                    video_id: video_id.clone(),
                }]);
            }
            (None, None) => bail!(
                "an API key is required for playlists (--key-api or {})",
                API_KEY_VAR
            ),
        };
        let youtube = YouTube::with_base(api_key, &config.api_base);

        return enumerate_playlist(&youtube, playlist_id)
            .await
            .with_context(|| format!("Failed to list playlist {}", playlist_id));
    }

    let video_id = reference.video_id.unwrap_or_default();
    Ok(vec![PlaylistEntry {
        title: video_id.clone(),
        video_id,
    }])
}

async fn run(args: Args) -> Result<bool> {
    let config = Config::load(args.config.as_deref())?;
    let api_key = args.key_api.or_else(|| config.api_key.clone());

    let entries = resolve_entries(&args.url, api_key.as_deref(), &config).await?;

    println!("{} {}", entries.len().to_string().bold(), "track(s):".bold());
    for (n, entry) in entries.iter().enumerate() {
        println!("{:>4}. {} {}", n + 1, entry.title, format!("({})", entry.video_id).dimmed());
    }

    if args.list_only {
        return Ok(true);
    }

    let home = dirs::home_dir().context("Could not determine the home directory")?;
    let dir = match args.output.or_else(|| {
        config
            .download_dir
            .as_ref()
            .map(|dir| dir.to_string_lossy().to_string())
    }) {
        Some(input) => directory::resolve_download_dir(&input, &home),
        None => directory::prompt_download_dir(&home)?,
    };
    println!("{} {}", "Saving to".bold(), dir.display());

    let downloader = Downloader::new(config.download.clone());
    let console = ConsoleProgress::stdout();
    let observer: &dyn ProgressObserver = if args.quiet { &Silent } else { &console };

    let mut failed = 0;
    for entry in &entries {
        let url = video_url(&entry.video_id);
        println!("{} {}", "↓".cyan(), entry.title);

        if let Err(e) = downloader.download(&url, &dir, observer).await {
            failed += 1;
            error!(video_id = %entry.video_id, "{}", e);
            eprintln!("{} {}: {}", "✗".red(), entry.title, e);
        }
    }

    if failed > 0 {
        eprintln!("{}", format!("{} of {} download(s) failed", failed, entries.len()).red());
    }
    Ok(failed == 0)
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ytmp3=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
