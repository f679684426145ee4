use anyhow::Result;
use media_relay_bot::bot::{self, BotDeps};
use media_relay_bot::config::{AppConfig, BotMode};
use media_relay_bot::downloader::check_ytdlp_available;
use media_relay_bot::errors::error_logging;
use media_relay_bot::localization;
use media_relay_bot::observability::{self, ReadinessProbe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use teloxide::prelude::*;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let started_at = Instant::now();

    // Load environment variables from .env file first
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;

    // Logging first so that configuration problems end up in the log
    observability::init_logging(&config.observability)?;

    if let Err(e) = config.validate() {
        error_logging::log_config_error(&e, "app_config", "startup_validation");
        return Err(e.into());
    }
    info!(config = %config.summary(), "Configuration loaded");

    let readiness = ReadinessProbe::new(
        config.download.ytdlp_path.clone(),
        Some(config.bot.token.clone()),
        config.download.download_root.clone(),
    );
    let observability_guard =
        observability::init_observability(&config.observability, &config.server, readiness).await?;

    // Links to direct media still work without yt-dlp, so this only warns
    match check_ytdlp_available(&config.download.ytdlp_path).await {
        Ok(version) => info!(version = %version, "yt-dlp is available"),
        Err(e) => warn!(
            error = %e,
            ytdlp_path = %config.download.ytdlp_path,
            "yt-dlp is not available, only direct media links will work"
        ),
    }

    let localization_manager = localization::create_localization_manager()?;
    let deps = Arc::new(BotDeps::new(&config, localization_manager)?);

    // Uploads of large files take a while, so the Bot API client gets a generous timeout
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.bot.http_timeout_secs))
        .build()?;
    let bot = Bot::with_client(config.bot.token.clone(), client);

    observability::record_startup_metrics(started_at.elapsed());
    info!(
        mode = ?config.bot.mode,
        http_timeout_secs = config.bot.http_timeout_secs,
        "Bot initialized, starting dispatcher"
    );

    let handler = bot::schema(deps);
    let result = match config.bot.mode {
        BotMode::Polling => media_relay_bot::webhook::run_polling(bot, handler).await,
        BotMode::Webhook => media_relay_bot::webhook::run_webhook(bot, handler, &config.bot).await,
    };

    observability_guard.shutdown();
    result
}
