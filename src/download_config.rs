//! # Download Configuration Module
//!
//! This module defines configuration structures for media downloads,
//! including yt-dlp invocation settings, size limits and recovery behavior.

use std::path::PathBuf;

use crate::errors::{AppError, AppResult};

// Constants for download configuration
pub const DEFAULT_YTDLP_PATH: &str = "yt-dlp";
pub const MAX_FILE_SIZE: u64 = 50 * 1024 * 1024; // Bot API upload limit
pub const DEFAULT_AUDIO_FORMAT: &str = "bestaudio/best";
pub const DEFAULT_AUDIO_CODEC: &str = "mp3";
pub const DEFAULT_AUDIO_QUALITY: &str = "192";
pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 4;
pub const OUTPUT_TEMPLATE: &str = "%(title).100B.%(ext)s";

/// Format selectors tried in order for video downloads
pub const DEFAULT_VIDEO_FORMATS: &[&str] = &[
    "best[ext=mp4]",
    "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]",
    "best",
];

pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "webm", "avi", "mov"];
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "opus", "ogg"];

/// Recovery configuration for error handling
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Number of retries after the first attempt
    pub max_retries: u32,
    /// Base delay between retries in milliseconds
    pub base_retry_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_retry_delay_ms: u64,
    /// Timeout for a single yt-dlp run in seconds
    pub operation_timeout_secs: u64,
    /// Circuit breaker failure threshold
    pub circuit_breaker_threshold: u32,
    /// Circuit breaker reset timeout in seconds
    pub circuit_breaker_reset_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_retry_delay_ms: 1000,   // 1 second
            max_retry_delay_ms: 10000,   // 10 seconds
            operation_timeout_secs: 300, // 5 minutes
            circuit_breaker_threshold: 5,
            circuit_breaker_reset_secs: 60, // 1 minute
        }
    }
}

impl RecoveryConfig {
    /// Validate recovery configuration parameters
    pub fn validate(&self) -> AppResult<()> {
        if self.max_retries > 10 {
            return Err(AppError::Config(
                "max_retries cannot be greater than 10".to_string(),
            ));
        }
        if self.base_retry_delay_ms == 0 {
            return Err(AppError::Config(
                "base_retry_delay_ms must be greater than 0".to_string(),
            ));
        }
        if self.max_retry_delay_ms < self.base_retry_delay_ms {
            return Err(AppError::Config(format!(
                "max_retry_delay_ms ({}) cannot be lower than base_retry_delay_ms ({})",
                self.max_retry_delay_ms, self.base_retry_delay_ms
            )));
        }
        if self.operation_timeout_secs == 0 || self.operation_timeout_secs > 3600 {
            return Err(AppError::Config(
                "operation_timeout_secs must be between 1 and 3600".to_string(),
            ));
        }
        if self.circuit_breaker_threshold == 0 {
            return Err(AppError::Config(
                "circuit_breaker_threshold must be greater than 0".to_string(),
            ));
        }
        if self.circuit_breaker_reset_secs == 0 {
            return Err(AppError::Config(
                "circuit_breaker_reset_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration of the download pipeline
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// yt-dlp executable (name on PATH or absolute path)
    pub ytdlp_path: String,
    /// Largest file that will be relayed, in bytes
    pub max_file_size: u64,
    /// Format selectors for video, tried in order
    pub video_formats: Vec<String>,
    /// Format selector for audio extraction
    pub audio_format: String,
    /// Codec passed to `--audio-format`
    pub audio_codec: String,
    /// Quality passed to `--audio-quality`
    pub audio_quality: String,
    /// Netscape cookie file for sites requiring a session
    pub cookies_file: Option<PathBuf>,
    /// Proxy URL handed to yt-dlp and the direct fetcher
    pub proxy: Option<String>,
    /// Parent directory of the per-request temporary directories
    pub download_root: Option<PathBuf>,
    /// Global number of concurrent downloads
    pub max_concurrent_downloads: usize,
    /// Retry, timeout and circuit breaker settings
    pub recovery: RecoveryConfig,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: DEFAULT_YTDLP_PATH.to_string(),
            max_file_size: MAX_FILE_SIZE,
            video_formats: DEFAULT_VIDEO_FORMATS.iter().map(|f| f.to_string()).collect(),
            audio_format: DEFAULT_AUDIO_FORMAT.to_string(),
            audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
            audio_quality: DEFAULT_AUDIO_QUALITY.to_string(),
            cookies_file: None,
            proxy: None,
            download_root: None,
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            recovery: RecoveryConfig::default(),
        }
    }
}

impl DownloadConfig {
    /// Validate download configuration parameters
    pub fn validate(&self) -> AppResult<()> {
        if self.ytdlp_path.trim().is_empty() {
            return Err(AppError::Config("ytdlp_path cannot be empty".to_string()));
        }

        if self.max_file_size == 0 {
            return Err(AppError::Config(
                "max_file_size must be greater than 0".to_string(),
            ));
        }

        if self.video_formats.is_empty() || self.video_formats.iter().any(|f| f.trim().is_empty()) {
            return Err(AppError::Config(
                "video_formats must contain at least one non-empty format selector".to_string(),
            ));
        }

        if self.audio_format.trim().is_empty() || self.audio_codec.trim().is_empty() {
            return Err(AppError::Config(
                "audio_format and audio_codec cannot be empty".to_string(),
            ));
        }

        if self.max_concurrent_downloads == 0 {
            return Err(AppError::Config(
                "max_concurrent_downloads must be greater than 0".to_string(),
            ));
        }

        if let Some(cookies) = &self.cookies_file {
            if !cookies.is_file() {
                return Err(AppError::Config(format!(
                    "cookies file does not exist: {}",
                    cookies.display()
                )));
            }
        }

        if let Some(root) = &self.download_root {
            if !root.is_dir() {
                return Err(AppError::Config(format!(
                    "download root is not a directory: {}",
                    root.display()
                )));
            }
        }

        self.recovery.validate()?;

        Ok(())
    }

    /// Extensions accepted as output for the given media kind
    pub fn extensions_for(&self, kind: crate::downloader::MediaKind) -> &'static [&'static str] {
        match kind {
            crate::downloader::MediaKind::Video => VIDEO_EXTENSIONS,
            crate::downloader::MediaKind::Audio => AUDIO_EXTENSIONS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(unused_assignments)]
    fn test_recovery_config_validation() {
        let mut config = RecoveryConfig::default();
        assert!(config.validate().is_ok());

        config.max_retries = 11;
        assert!(config.validate().is_err());
        config.max_retries = 0;
        assert!(config.validate().is_ok());

        config.base_retry_delay_ms = 0;
        assert!(config.validate().is_err());
        config.base_retry_delay_ms = 1000;

        config.max_retry_delay_ms = 500;
        assert!(config.validate().is_err());
        config.max_retry_delay_ms = 10000;

        config.operation_timeout_secs = 0;
        assert!(config.validate().is_err());
        config.operation_timeout_secs = 300;

        config.circuit_breaker_threshold = 0;
        assert!(config.validate().is_err());
        config.circuit_breaker_threshold = 5;

        config.circuit_breaker_reset_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_download_config_defaults() {
        let config = DownloadConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_file_size, 50 * 1024 * 1024);
        assert_eq!(config.video_formats[0], "best[ext=mp4]");
        assert_eq!(config.audio_codec, "mp3");
        assert_eq!(config.audio_quality, "192");
    }

    #[test]
    fn test_download_config_rejects_bad_values() {
        let config = DownloadConfig {
            video_formats: Vec::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = DownloadConfig {
            max_concurrent_downloads: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = DownloadConfig {
            cookies_file: Some(PathBuf::from("/definitely/not/here/cookies.txt")),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
