//! Health check functionality module.
//!
//! This module provides:
//! - yt-dlp availability checks
//! - Bot token validation checks
//! - Download directory checks
//! - Comprehensive readiness checks

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::observability::metrics::record_health_check_metrics;

/// Dependencies checked by the readiness probe
#[derive(Debug, Clone)]
pub struct ReadinessProbe {
    pub ytdlp_path: String,
    pub bot_token: Option<String>,
    pub download_root: Option<PathBuf>,
}

impl ReadinessProbe {
    pub fn new(ytdlp_path: String, bot_token: Option<String>, download_root: Option<PathBuf>) -> Self {
        Self {
            ytdlp_path,
            bot_token,
            download_root,
        }
    }

    /// Perform comprehensive readiness checks
    pub async fn perform_readiness_checks(&self) -> Result<()> {
        check_ytdlp_health(&self.ytdlp_path).await?;

        if let Some(token) = &self.bot_token {
            check_bot_token_health(token)?;
        }

        check_download_root_health(self.download_root.as_deref()).await?;

        Ok(())
    }
}

/// Check that yt-dlp can be started
pub async fn check_ytdlp_health(ytdlp_path: &str) -> Result<()> {
    let version = crate::downloader::check_ytdlp_available(ytdlp_path)
        .await
        .map_err(|e| anyhow::anyhow!("yt-dlp health check failed: {}", e))?;

    tracing::debug!(version = %version, "yt-dlp health check passed");
    Ok(())
}

/// Check the bot token format; no API call is made
pub fn check_bot_token_health(token: &str) -> Result<()> {
    if !crate::config::is_valid_token_format(token) {
        return Err(anyhow::anyhow!("Bot token format is invalid"));
    }

    tracing::debug!("Bot token health check passed");
    Ok(())
}

/// Check that temporary download directories can be created
pub async fn check_download_root_health(download_root: Option<&Path>) -> Result<()> {
    let root = download_root
        .map(Path::to_path_buf)
        .unwrap_or_else(std::env::temp_dir);

    let probe = tokio::task::spawn_blocking(move || {
        tempfile::Builder::new()
            .prefix("media-relay-health-")
            .tempdir_in(&root)
            .map(|_| ())
            .map_err(|e| anyhow::anyhow!("Download directory {} is not writable: {}", root.display(), e))
    })
    .await
    .map_err(|e| anyhow::anyhow!("Download directory check panicked: {}", e))?;

    probe?;
    tracing::debug!("Download directory health check passed");
    Ok(())
}

/// Start a background task to periodically record health check metrics
pub fn start_health_metrics_recorder(probe: ReadinessProbe) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60)); // Every minute

        loop {
            interval.tick().await;

            let check_start = Instant::now();
            let ytdlp_healthy = check_ytdlp_health(&probe.ytdlp_path).await.is_ok();
            record_health_check_metrics("ytdlp", ytdlp_healthy, check_start.elapsed());

            if let Some(token) = &probe.bot_token {
                let check_start = Instant::now();
                let bot_healthy = check_bot_token_health(token).is_ok();
                record_health_check_metrics("telegram_bot", bot_healthy, check_start.elapsed());
            }

            let check_start = Instant::now();
            let storage_healthy = check_download_root_health(probe.download_root.as_deref())
                .await
                .is_ok();
            record_health_check_metrics("download_dir", storage_healthy, check_start.elapsed());
        }
    })
}
