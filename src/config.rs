use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::bot::ranker::ScoringWeights;

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    telegram_bot_token: String,
    /// YouTube Data API key. Optional; search falls back to yt-dlp.
    youtube_api_key: Option<String>,
    /// Where downloaded audio lands before being sent. Defaults to the
    /// current directory.
    download_dir: Option<String>,
    /// Directory for state files (logs). Defaults to current directory.
    data_dir: Option<String>,
    /// yt-dlp binary name or path.
    ytdlp_bin: Option<String>,
    #[serde(default = "default_cleanup_interval_minutes")]
    cleanup_interval_minutes: u64,
    /// Bound on metadata probes and page fetches.
    #[serde(default = "default_fetch_timeout_secs")]
    fetch_timeout_secs: u64,
    #[serde(default = "default_download_timeout_secs")]
    download_timeout_secs: u64,
    #[serde(default = "default_max_playlist_tracks")]
    max_playlist_tracks: usize,
    /// Ranker constants; heuristic, so overridable.
    #[serde(default)]
    scoring: ScoringWeights,
}

fn default_cleanup_interval_minutes() -> u64 {
    30
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_download_timeout_secs() -> u64 {
    600
}

fn default_max_playlist_tracks() -> usize {
    20
}

pub struct Config {
    pub telegram_bot_token: String,
    pub youtube_api_key: Option<String>,
    pub download_dir: PathBuf,
    pub data_dir: PathBuf,
    pub ytdlp_bin: String,
    pub cleanup_interval: Duration,
    pub fetch_timeout: Duration,
    pub download_timeout: Duration,
    pub max_playlist_tracks: usize,
    pub scoring: ScoringWeights,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;

        if file.telegram_bot_token.is_empty() {
            return Err(ConfigError::Validation("telegram_bot_token is required".into()));
        }
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = file.telegram_bot_token.split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Validation(
                "telegram_bot_token appears invalid (expected format: 123456789:ABCdefGHI...)".into()
            ));
        }
        if file.cleanup_interval_minutes == 0 {
            return Err(ConfigError::Validation(
                "cleanup_interval_minutes must be at least 1".into(),
            ));
        }
        if file.max_playlist_tracks == 0 {
            return Err(ConfigError::Validation(
                "max_playlist_tracks must be at least 1".into(),
            ));
        }

        let youtube_api_key = file.youtube_api_key.filter(|k| !k.is_empty());

        Ok(Self {
            telegram_bot_token: file.telegram_bot_token,
            youtube_api_key,
            download_dir: file
                .download_dir
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            data_dir: file
                .data_dir
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            ytdlp_bin: file.ytdlp_bin.unwrap_or_else(|| "yt-dlp".to_string()),
            cleanup_interval: Duration::from_secs(file.cleanup_interval_minutes * 60),
            fetch_timeout: Duration::from_secs(file.fetch_timeout_secs),
            download_timeout: Duration::from_secs(file.download_timeout_secs),
            max_playlist_tracks: file.max_playlist_tracks,
            scoring: file.scoring,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn assert_err<T>(result: Result<T, ConfigError>) -> ConfigError {
        match result {
            Ok(_) => panic!("expected error, got Ok"),
            Err(e) => e,
        }
    }

    #[test]
    fn test_valid_config_with_defaults() {
        let file = write_config(r#"{
            "telegram_bot_token": "123456789:ABCdefGHIjklMNOpqrsTUVwxyz"
        }"#);
        let config = Config::load(file.path()).expect("should load valid config");
        assert_eq!(config.ytdlp_bin, "yt-dlp");
        assert_eq!(config.cleanup_interval, Duration::from_secs(30 * 60));
        assert_eq!(config.fetch_timeout, Duration::from_secs(10));
        assert_eq!(config.max_playlist_tracks, 20);
        assert!(config.youtube_api_key.is_none());
        assert_eq!(config.scoring.accept_threshold, 0.3);
    }

    #[test]
    fn test_scoring_overrides() {
        let file = write_config(r#"{
            "telegram_bot_token": "123456789:ABCdef",
            "scoring": { "accept_threshold": 0.5, "live_penalty": 0.4 }
        }"#);
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.scoring.accept_threshold, 0.5);
        assert_eq!(config.scoring.live_penalty, 0.4);
        // Untouched fields keep their defaults.
        assert_eq!(config.scoring.substring_bonus, 0.3);
    }

    #[test]
    fn test_empty_api_key_treated_as_absent() {
        let file = write_config(r#"{
            "telegram_bot_token": "123456789:ABCdef",
            "youtube_api_key": ""
        }"#);
        let config = Config::load(file.path()).unwrap();
        assert!(config.youtube_api_key.is_none());
    }

    #[test]
    fn test_empty_token() {
        let file = write_config(r#"{
            "telegram_bot_token": ""
        }"#);
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("telegram_bot_token"));
    }

    #[test]
    fn test_invalid_token_format_no_colon() {
        let file = write_config(r#"{
            "telegram_bot_token": "invalid_token_no_colon"
        }"#);
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("invalid"));
    }

    #[test]
    fn test_invalid_token_format_non_numeric_id() {
        let file = write_config(r#"{
            "telegram_bot_token": "notanumber:ABCdef"
        }"#);
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_zero_cleanup_interval_rejected() {
        let file = write_config(r#"{
            "telegram_bot_token": "123456789:ABCdef",
            "cleanup_interval_minutes": 0
        }"#);
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_file_not_found() {
        let err = assert_err(Config::load("/nonexistent/path/config.json"));
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_invalid_json() {
        let file = write_config("{ invalid json }");
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::ParseJson { .. }));
    }
}
