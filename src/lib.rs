//! # Media Relay Telegram Bot
//!
//! A Telegram bot that downloads videos and audio from the links users send, using
//! yt-dlp (or a plain HTTP fetch for direct media links), and relays the files back
//! through the Bot API.

pub mod bot;
pub mod circuit_breaker;
pub mod config;
pub mod deduplication;
pub mod direct_fetch;
pub mod download_config;
pub mod download_errors;
pub mod downloader;
pub mod errors;
pub mod limits;
pub mod localization;
pub mod observability;
pub mod observability_config;
pub mod pending;
pub mod url_validation;
pub mod webhook;

// Re-export types for easier access
pub use config::AppConfig;
pub use download_errors::DownloadError;
pub use downloader::{DownloadManager, DownloadedMedia, MediaKind};
pub use errors::{AppError, AppResult};
