//! Bot module for handling Telegram interactions
//!
//! This module is split into several submodules:
//! - `message_handler`: Routes incoming messages (commands, links, everything else)
//! - `command_handlers`: `/start`, `/help`, `/video` and `/audio`
//! - `callback_handler`: Handles the Video / Audio inline keyboard
//! - `download_handler`: Runs a download and uploads the result
//! - `ui_builder`: Creates keyboards and formats messages

pub mod callback_handler;
pub mod command_handlers;
pub mod download_handler;
pub mod message_handler;
pub mod ui_builder;

use std::sync::Arc;
use std::time::Duration;

use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;

use crate::config::AppConfig;
use crate::deduplication::{create_shared_deduplicator, SharedDeduplicator};
use crate::downloader::DownloadManager;
use crate::errors::AppResult;
use crate::limits::DownloadLimiter;
use crate::localization::SharedLocalization;
use crate::pending::PendingDownloads;

/// How many update ids the deduplicator remembers at most
const DEDUPLICATION_MAX_ENTRIES: usize = 10_000;
/// How long a Video / Audio choice stays valid
const PENDING_CHOICE_TTL: Duration = Duration::from_secs(3600);
const PENDING_MAX_ENTRIES: usize = 10_000;

/// Shared dependencies of all handlers
#[derive(Debug)]
pub struct BotDeps {
    pub downloader: DownloadManager,
    pub limiter: DownloadLimiter,
    pub deduplicator: SharedDeduplicator,
    pub pending: PendingDownloads,
    pub localization: SharedLocalization,
}

impl BotDeps {
    pub fn new(config: &AppConfig, localization: SharedLocalization) -> AppResult<Self> {
        Ok(Self {
            downloader: DownloadManager::new(config.download.clone())?,
            limiter: DownloadLimiter::new(
                config.download.max_concurrent_downloads,
                config.bot.max_concurrent_requests_per_user,
            ),
            deduplicator: create_shared_deduplicator(
                config.bot.deduplication_ttl_secs,
                DEDUPLICATION_MAX_ENTRIES,
            ),
            pending: PendingDownloads::new(PENDING_CHOICE_TTL, PENDING_MAX_ENTRIES),
            localization,
        })
    }

    /// Upload limit in whole megabytes, as shown to users
    pub fn max_file_size_mb(&self) -> u64 {
        self.downloader.config().max_file_size / (1024 * 1024)
    }
}

/// Dispatcher tree: messages and callback queries
pub fn schema(deps: Arc<BotDeps>) -> UpdateHandler<anyhow::Error> {
    dptree::entry()
        .branch(Update::filter_message().endpoint({
            let deps = Arc::clone(&deps);
            move |bot: Bot, msg: Message| {
                let deps = Arc::clone(&deps);
                async move { message_handler::message_handler(bot, msg, deps).await }
            }
        }))
        .branch(Update::filter_callback_query().endpoint({
            let deps = Arc::clone(&deps);
            move |bot: Bot, q: CallbackQuery| {
                let deps = Arc::clone(&deps);
                async move { callback_handler::callback_handler(bot, q, deps).await }
            }
        }))
}

pub use callback_handler::callback_handler;
pub use download_handler::{download_error_text, start_download, DownloadRequest, StartOutcome};
pub use message_handler::message_handler;
