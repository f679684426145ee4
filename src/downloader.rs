//! # Media Download Module
//!
//! This module drives `yt-dlp` to fetch a video or an audio track for a URL and hands
//! back a file that is ready to upload to Telegram.
//!
//! ## Features
//!
//! - Video downloads walking a chain of format selectors
//! - Audio extraction to MP3 through yt-dlp's post-processor
//! - Retries with exponential backoff for transient failures
//! - Circuit breaker shared across all requests
//! - Direct HTTP fallback for plain media links yt-dlp has no extractor for
//! - One temporary directory per request, removed when the result is dropped

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info, warn, Instrument};
use url::Url;

use crate::circuit_breaker::CircuitBreaker;
use crate::download_config::{DownloadConfig, RecoveryConfig, OUTPUT_TEMPLATE};
use crate::download_errors::{classify_ytdlp_failure, DownloadError};
use crate::errors::{error_logging, AppError, AppResult};
use crate::observability;

/// What the user asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }

    /// Single-letter code used in callback data
    pub fn code(&self) -> char {
        match self {
            MediaKind::Video => 'v',
            MediaKind::Audio => 'a',
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "v" => Some(MediaKind::Video),
            "a" => Some(MediaKind::Audio),
            _ => None,
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the file was obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadSource {
    /// yt-dlp with the format selector that worked
    YtDlp { format: String },
    /// Plain HTTP fetch of a media URL
    Direct,
}

/// A downloaded file living inside its own temporary directory
///
/// The directory and everything in it is deleted when this value is dropped, so keep
/// it alive until the upload has finished.
#[derive(Debug)]
pub struct DownloadedMedia {
    pub path: PathBuf,
    pub file_name: String,
    pub title: String,
    pub size_bytes: u64,
    pub kind: MediaKind,
    pub source: DownloadSource,
    pub attempts: u32,
    workspace: TempDir,
}

impl DownloadedMedia {
    /// Directory holding the file, removed on drop
    pub fn workspace_path(&self) -> &Path {
        self.workspace.path()
    }
}

/// Downloads media with retries, format fallback and a circuit breaker
#[derive(Debug)]
pub struct DownloadManager {
    config: DownloadConfig,
    circuit_breaker: CircuitBreaker,
    http: reqwest::Client,
}

impl DownloadManager {
    pub fn new(config: DownloadConfig) -> AppResult<Self> {
        config.validate()?;

        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.recovery.operation_timeout_secs))
            .user_agent(concat!("media-relay-bot/", env!("CARGO_PKG_VERSION")));

        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| AppError::Config(format!("Invalid proxy URL '{}': {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }

        let http = builder
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            circuit_breaker: CircuitBreaker::new(config.recovery.clone()),
            config,
            http,
        })
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    /// Download `url` as the requested kind of media
    ///
    /// The returned [`DownloadedMedia`] is guaranteed to be no larger than
    /// `max_file_size`.
    pub async fn download(&self, url: &Url, kind: MediaKind) -> Result<DownloadedMedia, DownloadError> {
        let span = observability::download_span("download", kind.as_str());
        self.download_inner(url, kind).instrument(span).await
    }

    async fn download_inner(&self, url: &Url, kind: MediaKind) -> Result<DownloadedMedia, DownloadError> {
        let start_time = Instant::now();

        if self.circuit_breaker.is_open() {
            warn!(url = %url, "Circuit breaker is open, rejecting download request");
            observability::update_circuit_breaker_state(true);
            return Err(DownloadError::ServiceUnavailable(
                "too many consecutive download failures".to_string(),
            ));
        }
        observability::update_circuit_breaker_state(false);

        let workspace = self.create_workspace()?;
        info!(url = %url, kind = %kind, "Starting download");

        let result = match self.download_with_retries(url, kind, workspace.path()).await {
            Err(DownloadError::Unsupported(detail)) => {
                info!(url = %url, "No extractor for URL, trying direct fetch");
                crate::direct_fetch::fetch_direct_media(
                    &self.http,
                    url,
                    kind,
                    workspace.path(),
                    self.config.max_file_size,
                )
                .await
                .map(|path| (path, DownloadSource::Direct, 1))
                .map_err(|e| match e {
                    // Report what yt-dlp said rather than the content type we saw
                    DownloadError::Unsupported(_) => DownloadError::Unsupported(detail),
                    other => other,
                })
            }
            other => other,
        };

        match &result {
            Ok(_) => self.circuit_breaker.record_success(),
            Err(e) if e.counts_as_service_failure() => self.circuit_breaker.record_failure(),
            Err(_) => {}
        }
        observability::update_circuit_breaker_state(self.circuit_breaker.is_open());

        let outcome = result.and_then(|(path, source, attempts)| {
            self.finish(workspace, path, kind, source, attempts)
        });

        let duration = start_time.elapsed();
        match &outcome {
            Ok(media) => {
                observability::record_download_metrics(observability::DownloadMetricsParams {
                    kind,
                    outcome: "success",
                    duration,
                    size_bytes: media.size_bytes,
                    attempt_count: media.attempts,
                });
                info!(
                    file_name = %media.file_name,
                    size_bytes = media.size_bytes,
                    attempts = media.attempts,
                    duration_ms = duration.as_millis(),
                    "Download completed"
                );
            }
            Err(err) => {
                observability::record_download_metrics(observability::DownloadMetricsParams {
                    kind,
                    outcome: err.metric_label(),
                    duration,
                    size_bytes: 0,
                    attempt_count: 0,
                });
                error_logging::log_download_error(
                    err,
                    "download",
                    None,
                    Some(url.as_str()),
                    None,
                    Some(duration),
                );
            }
        }

        outcome
    }

    fn create_workspace(&self) -> Result<TempDir, DownloadError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("media-relay-");
        let dir = match &self.config.download_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        };
        dir.map_err(|e| {
            error_logging::log_filesystem_error(&e, "create_workspace", None, None);
            DownloadError::FileSystem(format!("Failed to create temporary directory: {}", e))
        })
    }

    /// Check the final size and wrap the file into [`DownloadedMedia`]
    fn finish(
        &self,
        workspace: TempDir,
        path: PathBuf,
        kind: MediaKind,
        source: DownloadSource,
        attempts: u32,
    ) -> Result<DownloadedMedia, DownloadError> {
        let size_bytes = std::fs::metadata(&path)?.len();
        if size_bytes > self.config.max_file_size {
            return Err(DownloadError::FileTooLarge {
                size: Some(size_bytes),
                limit: self.config.max_file_size,
            });
        }
        if size_bytes == 0 {
            return Err(DownloadError::NoOutput("downloaded file is empty".to_string()));
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.bin", kind.as_str()));
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| file_name.clone());

        Ok(DownloadedMedia {
            path,
            file_name,
            title,
            size_bytes,
            kind,
            source,
            attempts,
            workspace,
        })
    }

    /// Run yt-dlp until it succeeds, walking the format chain on format errors and
    /// retrying transient failures with backoff
    async fn download_with_retries(
        &self,
        url: &Url,
        kind: MediaKind,
        dir: &Path,
    ) -> Result<(PathBuf, DownloadSource, u32), DownloadError> {
        let formats: Vec<&str> = match kind {
            MediaKind::Video => self.config.video_formats.iter().map(String::as_str).collect(),
            MediaKind::Audio => vec![self.config.audio_format.as_str()],
        };
        let max_attempts = self.config.recovery.max_retries + 1;

        let mut format_index = 0;
        let mut attempt = 0;
        let mut runs = 0;

        loop {
            attempt += 1;
            runs += 1;
            let format = formats[format_index];

            match self.run_ytdlp(url, kind, format, dir).await {
                Ok(path) => {
                    let source = DownloadSource::YtDlp {
                        format: format.to_string(),
                    };
                    return Ok((path, source, runs));
                }
                Err(DownloadError::FormatUnavailable(detail)) if format_index + 1 < formats.len() => {
                    warn!(format = %format, detail = %detail, "Format not available, trying next selector");
                    format_index += 1;
                    attempt = 0;
                    clear_directory(dir)?;
                }
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay_ms = calculate_retry_delay(attempt, &self.config.recovery);
                    warn!(
                        attempt = attempt,
                        max_attempts = max_attempts,
                        delay_ms = delay_ms,
                        error = %err,
                        "Download attempt failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                Err(err) => {
                    debug!(runs = runs, "Giving up on download");
                    return Err(err);
                }
            }
        }
    }

    /// One yt-dlp invocation
    async fn run_ytdlp(
        &self,
        url: &Url,
        kind: MediaKind,
        format: &str,
        dir: &Path,
    ) -> Result<PathBuf, DownloadError> {
        let args = build_ytdlp_args(&self.config, url.as_str(), kind, format, dir);
        let timeout_secs = self.config.recovery.operation_timeout_secs;
        let run_start = Instant::now();

        let mut command = Command::new(&self.config.ytdlp_path);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(format = %format, "Running yt-dlp");

        let output = match tokio::time::timeout(Duration::from_secs(timeout_secs), command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(DownloadError::ToolMissing(format!(
                    "{}: {}",
                    self.config.ytdlp_path, e
                )))
            }
            Err(_) => {
                warn!(
                    elapsed_ms = run_start.elapsed().as_millis(),
                    limit_secs = timeout_secs,
                    "yt-dlp timed out"
                );
                return Err(DownloadError::Timeout(format!(
                    "yt-dlp did not finish within {} seconds",
                    timeout_secs
                )));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            debug!(status = ?output.status.code(), stderr = %stderr, "yt-dlp exited with failure");
            return Err(classify_ytdlp_failure(&stderr, self.config.max_file_size));
        }

        if let Some(path) = printed_file_path(&stdout) {
            return Ok(path);
        }

        if let Some(path) = find_downloaded_file(dir, self.config.extensions_for(kind))? {
            debug!(path = %path.display(), "Located output by scanning the download directory");
            return Ok(path);
        }

        // yt-dlp exits 0 when --max-filesize skips the download
        if let Some(size) = printed_file_size(&stdout) {
            if size > self.config.max_file_size {
                return Err(DownloadError::FileTooLarge {
                    size: Some(size),
                    limit: self.config.max_file_size,
                });
            }
        }
        let combined = format!("{}\n{}", stdout, stderr);
        if combined.contains("max-filesize") {
            return Err(DownloadError::FileTooLarge {
                size: None,
                limit: self.config.max_file_size,
            });
        }

        Err(DownloadError::NoOutput(format!(
            "yt-dlp reported success but no {} file was written",
            kind
        )))
    }
}

/// Build the yt-dlp argument list for one run
pub fn build_ytdlp_args(
    config: &DownloadConfig,
    url: &str,
    kind: MediaKind,
    format: &str,
    dir: &Path,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "--no-playlist".into(),
        "--no-progress".into(),
        "--no-mtime".into(),
        "--max-filesize".into(),
        config.max_file_size.to_string(),
        "-P".into(),
        dir.to_string_lossy().into_owned(),
        "-o".into(),
        OUTPUT_TEMPLATE.into(),
        "--print".into(),
        "after_move:filepath".into(),
        "--print".into(),
        format!("before_dl:{}%(filesize,filesize_approx|)s", SIZE_MARKER),
        // --print implies --quiet, which hides the max-filesize skip notice
        "--no-quiet".into(),
        "-f".into(),
        format.into(),
    ];

    match kind {
        MediaKind::Video => {
            args.push("--merge-output-format".into());
            args.push("mp4".into());
        }
        MediaKind::Audio => {
            args.push("-x".into());
            args.push("--audio-format".into());
            args.push(config.audio_codec.clone());
            args.push("--audio-quality".into());
            args.push(config.audio_quality.clone());
        }
    }

    if let Some(cookies) = &config.cookies_file {
        args.push("--cookies".into());
        args.push(cookies.to_string_lossy().into_owned());
    }
    if let Some(proxy) = &config.proxy {
        args.push("--proxy".into());
        args.push(proxy.clone());
    }

    // Keep a URL starting with '-' from being read as an option
    args.push("--".into());
    args.push(url.to_string());
    args
}

/// Prefix of the line carrying the expected size of the selected format
pub const SIZE_MARKER: &str = "media-relay-size:";

/// Expected size printed before the download starts, when the site reports one
fn printed_file_size(stdout: &str) -> Option<u64> {
    stdout
        .lines()
        .filter_map(|line| line.trim().strip_prefix(SIZE_MARKER))
        .filter_map(|value| value.trim().parse::<f64>().ok())
        .map(|size| size as u64)
        .max()
}

/// Last line of yt-dlp stdout naming an existing file
fn printed_file_path(stdout: &str) -> Option<PathBuf> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .find(|path| path.is_file())
}

/// Find the output file in `dir` by extension, ignoring partial downloads
pub fn find_downloaded_file(dir: &Path, extensions: &[&str]) -> std::io::Result<Option<PathBuf>> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| extensions.contains(&ext.to_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();

    candidates.sort();
    Ok(candidates.into_iter().next())
}

fn clear_directory(dir: &Path) -> Result<(), DownloadError> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Calculate retry delay with exponential backoff
///
/// `base * 2^(attempt - 1)`, capped at `max_retry_delay_ms`, plus up to 25% random
/// jitter so that parallel requests do not retry in lockstep.
pub fn calculate_retry_delay(attempt: u32, recovery: &RecoveryConfig) -> u64 {
    let exponent = attempt.saturating_sub(1).min(32);
    let delay = recovery
        .base_retry_delay_ms
        .saturating_mul(1u64 << exponent)
        .min(recovery.max_retry_delay_ms);

    let jitter_range = delay / 4;
    let jitter = if jitter_range > 0 {
        rand::random_range(0..jitter_range)
    } else {
        0
    };
    delay + jitter
}

/// Check that yt-dlp can be started and return its version
pub async fn check_ytdlp_available(ytdlp_path: &str) -> Result<String, DownloadError> {
    let output = tokio::time::timeout(
        Duration::from_secs(10),
        Command::new(ytdlp_path)
            .arg("--version")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output(),
    )
    .await
    .map_err(|_| DownloadError::Timeout("yt-dlp --version did not answer".to_string()))?
    .map_err(|e| DownloadError::ToolMissing(format!("{}: {}", ytdlp_path, e)))?;

    if !output.status.success() {
        return Err(DownloadError::ToolMissing(format!(
            "{} --version exited with {}",
            ytdlp_path, output.status
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
