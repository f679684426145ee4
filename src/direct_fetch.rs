//! # Direct Media Fetch
//!
//! Fallback for links that point straight at a media file (`https://host/clip.mp4`)
//! on sites yt-dlp has no extractor for. The response is streamed to disk and aborted
//! as soon as it grows past the size limit.

use std::path::{Path, PathBuf};

use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;

use crate::download_config::{AUDIO_EXTENSIONS, VIDEO_EXTENSIONS};
use crate::download_errors::DownloadError;
use crate::downloader::MediaKind;

const MAX_FILE_NAME_CHARS: usize = 100;

/// Fetch `url` into `dir` when it serves media of the requested kind
pub async fn fetch_direct_media(
    client: &reqwest::Client,
    url: &Url,
    kind: MediaKind,
    dir: &Path,
    max_size: u64,
) -> Result<PathBuf, DownloadError> {
    let mut response = client.get(url.clone()).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(match status {
            StatusCode::NOT_FOUND | StatusCode::GONE | StatusCode::FORBIDDEN => {
                DownloadError::Unavailable(format!("server answered {}", status))
            }
            s if s.is_server_error() => DownloadError::Network(format!("server answered {}", s)),
            s => DownloadError::Unsupported(format!("server answered {}", s)),
        });
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(normalize_content_type)
        .unwrap_or_default();

    if !is_media_response(&content_type, url, kind) {
        return Err(DownloadError::Unsupported(format!(
            "no {} behind URL (content type '{}')",
            kind, content_type
        )));
    }

    if let Some(length) = response.content_length() {
        if length > max_size {
            return Err(DownloadError::FileTooLarge {
                size: Some(length),
                limit: max_size,
            });
        }
    }

    let file_name = derive_file_name(url, &content_type, kind);
    let path = dir.join(&file_name);
    info!(file_name = %file_name, content_type = %content_type, "Fetching media directly");

    let mut file = tokio::fs::File::create(&path).await?;
    let mut written: u64 = 0;

    while let Some(chunk) = response.chunk().await? {
        written += chunk.len() as u64;
        if written > max_size {
            drop(file);
            let _ = tokio::fs::remove_file(&path).await;
            return Err(DownloadError::FileTooLarge {
                size: Some(written),
                limit: max_size,
            });
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    debug!(bytes = written, "Direct fetch finished");
    Ok(path)
}

/// `"Video/MP4; charset=binary"` → `"video/mp4"`
fn normalize_content_type(raw: &str) -> String {
    raw.split(';').next().unwrap_or_default().trim().to_lowercase()
}

fn url_extension(url: &Url) -> Option<String> {
    let last = url.path_segments()?.next_back()?;
    let (_, ext) = last.rsplit_once('.')?;
    Some(ext.to_lowercase())
}

/// Whether the response carries media of the requested kind
///
/// Generic binary content types are accepted when the URL path has a matching
/// extension.
pub fn is_media_response(content_type: &str, url: &Url, kind: MediaKind) -> bool {
    let wanted_prefix = match kind {
        MediaKind::Video => "video/",
        MediaKind::Audio => "audio/",
    };
    if content_type.starts_with(wanted_prefix) {
        return true;
    }

    let generic = content_type.is_empty()
        || content_type == "application/octet-stream"
        || content_type == "binary/octet-stream";
    generic
        && url_extension(url)
            .map(|ext| extensions(kind).contains(&ext.as_str()))
            .unwrap_or(false)
}

fn extensions(kind: MediaKind) -> &'static [&'static str] {
    match kind {
        MediaKind::Video => VIDEO_EXTENSIONS,
        MediaKind::Audio => AUDIO_EXTENSIONS,
    }
}

fn extension_for_content_type(content_type: &str, kind: MediaKind) -> &'static str {
    match content_type {
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        "video/x-matroska" => "mkv",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/mp4" | "audio/x-m4a" => "m4a",
        "audio/ogg" => "ogg",
        "audio/opus" => "opus",
        _ => extensions(kind)[0],
    }
}

/// Build a safe local file name from the last URL path segment
pub fn derive_file_name(url: &Url, content_type: &str, kind: MediaKind) -> String {
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();

    let mut stem: String = segment
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(segment)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .take(MAX_FILE_NAME_CHARS)
        .collect();
    if stem.trim_matches('_').is_empty() {
        stem = kind.as_str().to_string();
    }

    let ext = match url_extension(url) {
        Some(ext) if extensions(kind).contains(&ext.as_str()) => ext,
        _ => extension_for_content_type(content_type, kind).to_string(),
    };

    format!("{}.{}", stem, ext)
}
