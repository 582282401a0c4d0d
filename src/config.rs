use crate::download::DownloadConfig;
use crate::youtube::client::DEFAULT_API_BASE;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const API_KEY_VAR: &str = "YOUTUBE_API_KEY";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub api_base: String,
    pub download_dir: Option<PathBuf>,
    pub download: DownloadConfig,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    api_key: Option<String>,
    api_base: Option<String>,
    download_dir: Option<String>,

    ytdlp_bin: Option<String>,
    format: Option<String>,
    audio_format: Option<String>,
    audio_quality: Option<String>,
    embed_thumbnail: Option<bool>,
    add_metadata: Option<bool>,
    verbose: Option<bool>,
}

fn non_blank(s: String) -> Option<String> {
    let s = s.trim().to_string();
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

impl Config {
    /// Reads the TOML file at `path`, or uses defaults when there is none.
    ///
    /// The API key from the environment wins over the one in the file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file: ConfigFile = match path {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                toml::from_str(&raw)
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))?
            }
            None => ConfigFile::default(),
        };

        Ok(Self::from_file(file, std::env::var(API_KEY_VAR).ok()))
    }

    fn from_file(file: ConfigFile, env_api_key: Option<String>) -> Self {
        let defaults = DownloadConfig::default();

        Self {
            api_key: env_api_key.and_then(non_blank).or(file.api_key.and_then(non_blank)),
            api_base: file
                .api_base
                .and_then(non_blank)
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            download_dir: file.download_dir.and_then(non_blank).map(PathBuf::from),
            download: DownloadConfig {
                ytdlp_bin: file
                    .ytdlp_bin
                    .and_then(non_blank)
                    .map(PathBuf::from)
                    .unwrap_or(defaults.ytdlp_bin),
                format: file.format.and_then(non_blank).unwrap_or(defaults.format),
                audio_format: file
                    .audio_format
                    .and_then(non_blank)
                    .unwrap_or(defaults.audio_format),
                audio_quality: file
                    .audio_quality
                    .and_then(non_blank)
                    .unwrap_or(defaults.audio_quality),
                embed_thumbnail: file.embed_thumbnail.unwrap_or(defaults.embed_thumbnail),
                add_metadata: file.add_metadata.unwrap_or(defaults.add_metadata),
                verbose: file.verbose.unwrap_or(defaults.verbose),
            },
        }
    }
}
