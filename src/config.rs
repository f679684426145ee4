//! # Unified Application Configuration
//!
//! This module provides a centralized configuration system that consolidates
//! all application settings into a single, structured configuration object.
//! It supports loading from environment variables, validation, and provides
//! a clean interface for accessing configuration throughout the application.

use crate::download_config::{DownloadConfig, MAX_FILE_SIZE};
use crate::errors::{AppError, AppResult};
use crate::observability_config::ObservabilityConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// How the bot receives updates from Telegram
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotMode {
    /// Long polling with `getUpdates`
    Polling,
    /// Telegram pushes updates to our HTTP endpoint
    Webhook,
}

impl FromStr for BotMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "polling" | "poll" => Ok(BotMode::Polling),
            "webhook" => Ok(BotMode::Webhook),
            other => Err(AppError::Config(format!(
                "BOT_MODE must be 'polling' or 'webhook', got '{}'",
                other
            ))),
        }
    }
}

/// Bot-specific configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Telegram bot token
    pub token: String,
    /// HTTP client timeout in seconds; uploads of large files need a generous value
    pub http_timeout_secs: u64,
    pub mode: BotMode,
    /// Public base URL Telegram posts updates to (webhook mode)
    pub webhook_base_url: Option<String>,
    /// Path of the webhook endpoint
    pub webhook_path: String,
    /// Local port of the webhook server
    pub webhook_port: u16,
    /// Secret Telegram sends back in `X-Telegram-Bot-Api-Secret-Token`
    pub webhook_secret_token: Option<String>,
    /// Request deduplication TTL in seconds
    pub deduplication_ttl_secs: u64,
    /// Maximum concurrent downloads per chat
    pub max_concurrent_requests_per_user: usize,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            http_timeout_secs: 120,
            mode: BotMode::Polling,
            webhook_base_url: None,
            webhook_path: "/webhook".to_string(),
            webhook_port: 8080,
            webhook_secret_token: None,
            deduplication_ttl_secs: 300, // 5 minutes
            max_concurrent_requests_per_user: 2,
        }
    }
}

impl BotConfig {
    /// Validate bot configuration
    pub fn validate(&self) -> AppResult<()> {
        validate_token(&self.token)?;

        if self.http_timeout_secs == 0 || self.http_timeout_secs > 3600 {
            return Err(AppError::Config(
                "HTTP timeout must be between 1 and 3600 seconds".to_string(),
            ));
        }

        if self.deduplication_ttl_secs == 0 {
            return Err(AppError::Config(
                "Deduplication TTL cannot be 0".to_string(),
            ));
        }

        if self.max_concurrent_requests_per_user == 0 {
            return Err(AppError::Config(
                "Max concurrent requests per user cannot be 0".to_string(),
            ));
        }

        if !self.webhook_path.starts_with('/') {
            return Err(AppError::Config(format!(
                "Webhook path must start with '/', got '{}'",
                self.webhook_path
            )));
        }

        // "/" serves the status page
        if self.webhook_path == "/" {
            return Err(AppError::Config(
                "Webhook path cannot be '/'".to_string(),
            ));
        }

        if let Some(secret) = &self.webhook_secret_token {
            let valid_chars = secret
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
            if secret.is_empty() || secret.len() > 256 || !valid_chars {
                return Err(AppError::Config(
                    "Webhook secret token must be 1-256 characters of A-Z, a-z, 0-9, _ and -"
                        .to_string(),
                ));
            }
        }

        if self.mode == BotMode::Webhook {
            let base = self.webhook_base_url.as_deref().ok_or_else(|| {
                AppError::Config("WEBHOOK_BASE_URL is required in webhook mode".to_string())
            })?;
            let parsed = url::Url::parse(base)
                .map_err(|e| AppError::Config(format!("WEBHOOK_BASE_URL is invalid: {}", e)))?;
            if parsed.scheme() != "https" {
                return Err(AppError::Config(
                    "WEBHOOK_BASE_URL must use https, Telegram refuses plain http webhooks"
                        .to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Full URL registered with Telegram
    pub fn webhook_url(&self) -> AppResult<url::Url> {
        let base = self.webhook_base_url.as_deref().ok_or_else(|| {
            AppError::Config("WEBHOOK_BASE_URL is required in webhook mode".to_string())
        })?;
        let joined = format!("{}{}", base.trim_end_matches('/'), self.webhook_path);
        url::Url::parse(&joined)
            .map_err(|e| AppError::Config(format!("Invalid webhook URL '{}': {}", joined, e)))
    }
}

fn validate_token(token: &str) -> AppResult<()> {
    if token.trim().is_empty() {
        return Err(AppError::Config("Bot token cannot be empty".to_string()));
    }

    let (bot_id, secret) = token.split_once(':').ok_or_else(|| {
        AppError::Config(
            "Bot token format is invalid. Expected format: 'bot_id:bot_token'".to_string(),
        )
    })?;

    if bot_id.is_empty() || !bot_id.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::Config(
            "Bot token bot ID must be numeric".to_string(),
        ));
    }

    if secret.len() < 20 || secret.contains(':') {
        return Err(AppError::Config(
            "Bot token appears to be malformed. Please verify it's a valid token".to_string(),
        ));
    }

    Ok(())
}

/// Whether `token` looks like a Telegram bot token
pub fn is_valid_token_format(token: &str) -> bool {
    validate_token(token).is_ok()
}

/// Server configuration for health checks and metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Metrics and health server port
    pub metrics_port: u16,
    /// Whether to allow privileged ports (< 1024)
    pub allow_privileged_ports: bool,
    /// Bind the metrics server on all interfaces instead of localhost only
    pub metrics_bind_all_interfaces: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            metrics_port: 9090,
            allow_privileged_ports: false,
            metrics_bind_all_interfaces: false,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration against the webhook port in use (if any)
    pub fn validate(&self, webhook_port: Option<u16>) -> AppResult<()> {
        let mut ports = vec![("Metrics", self.metrics_port)];
        if let Some(port) = webhook_port {
            ports.push(("Webhook", port));
        }

        for (name, port) in &ports {
            if *port == 0 {
                return Err(AppError::Config(format!("{} port cannot be 0", name)));
            }
            if !self.allow_privileged_ports && *port < 1024 {
                return Err(AppError::Config(format!(
                    "{} port {} is privileged. Set ALLOW_PRIVILEGED_PORTS=true or use port >= 1024",
                    name, port
                )));
            }
        }

        if webhook_port == Some(self.metrics_port) {
            return Err(AppError::Config(
                "Webhook port and metrics port cannot be the same".to_string(),
            ));
        }

        Ok(())
    }
}

/// Unified application configuration
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub bot: BotConfig,
    pub download: DownloadConfig,
    pub server: ServerConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        // Bot configuration
        config.bot.token = get("TELEGRAM_BOT_TOKEN").ok_or_else(|| {
            AppError::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
        })?;
        config.bot.http_timeout_secs =
            parse_or("HTTP_CLIENT_TIMEOUT_SECS", get("HTTP_CLIENT_TIMEOUT_SECS"), config.bot.http_timeout_secs)?;
        if let Some(mode) = get("BOT_MODE") {
            config.bot.mode = mode.parse()?;
        }
        config.bot.webhook_base_url = get("WEBHOOK_BASE_URL");
        if let Some(path) = get("WEBHOOK_PATH") {
            config.bot.webhook_path = path;
        }
        config.bot.webhook_port = parse_or(
            "WEBHOOK_PORT",
            get("WEBHOOK_PORT").or_else(|| get("PORT")),
            config.bot.webhook_port,
        )?;
        config.bot.webhook_secret_token = get("WEBHOOK_SECRET_TOKEN");
        config.bot.deduplication_ttl_secs = parse_or(
            "REQUEST_DEDUPLICATION_TTL_SECS",
            get("REQUEST_DEDUPLICATION_TTL_SECS"),
            config.bot.deduplication_ttl_secs,
        )?;
        config.bot.max_concurrent_requests_per_user = parse_or(
            "MAX_CONCURRENT_REQUESTS_PER_USER",
            get("MAX_CONCURRENT_REQUESTS_PER_USER"),
            config.bot.max_concurrent_requests_per_user,
        )?;

        // Download configuration
        if let Some(path) = get("YTDLP_PATH") {
            config.download.ytdlp_path = path;
        }
        let max_mb: u64 = parse_or("MAX_FILE_SIZE_MB", get("MAX_FILE_SIZE_MB"), MAX_FILE_SIZE / 1024 / 1024)?;
        config.download.max_file_size = max_mb.checked_mul(1024 * 1024).ok_or_else(|| {
            AppError::Config(format!("MAX_FILE_SIZE_MB is too large: {}", max_mb))
        })?;
        config.download.recovery.operation_timeout_secs = parse_or(
            "DOWNLOAD_TIMEOUT_SECS",
            get("DOWNLOAD_TIMEOUT_SECS"),
            config.download.recovery.operation_timeout_secs,
        )?;
        config.download.recovery.max_retries = parse_or(
            "DOWNLOAD_MAX_RETRIES",
            get("DOWNLOAD_MAX_RETRIES"),
            config.download.recovery.max_retries,
        )?;
        config.download.max_concurrent_downloads = parse_or(
            "MAX_CONCURRENT_DOWNLOADS",
            get("MAX_CONCURRENT_DOWNLOADS"),
            config.download.max_concurrent_downloads,
        )?;
        config.download.cookies_file = get("YTDLP_COOKIES_FILE").map(PathBuf::from);
        config.download.proxy = get("YTDLP_PROXY");
        config.download.download_root = get("DOWNLOAD_DIR").map(PathBuf::from);

        // Server configuration
        config.server.metrics_port =
            parse_or("METRICS_PORT", get("METRICS_PORT"), config.server.metrics_port)?;
        config.server.allow_privileged_ports = get("ALLOW_PRIVILEGED_PORTS")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(false);
        config.server.metrics_bind_all_interfaces = get("METRICS_BIND_ALL_INTERFACES")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(false);

        config.observability = ObservabilityConfig::from_lookup(&lookup);

        Ok(config)
    }

    /// Validate all configuration sections
    pub fn validate(&self) -> AppResult<()> {
        self.bot.validate()?;
        self.download.validate()?;

        let webhook_port = (self.bot.mode == BotMode::Webhook).then_some(self.bot.webhook_port);
        self.server.validate(webhook_port)?;

        self.observability.validate()?;
        Ok(())
    }

    /// Get a summary of the current configuration for logging
    pub fn summary(&self) -> String {
        format!(
            "Configuration: bot_token=[REDACTED], mode={:?}, webhook_url={}, webhook_secret={}, metrics_port={}, ytdlp={}, max_file_size_mb={}, timeout_secs={}, retries={}, max_downloads={}, max_per_user={}, cookies={}, proxy={}, environment={}",
            self.bot.mode,
            self.bot.webhook_base_url.as_deref().unwrap_or("-"),
            if self.bot.webhook_secret_token.is_some() { "[REDACTED]" } else { "-" },
            self.server.metrics_port,
            self.download.ytdlp_path,
            self.download.max_file_size / 1024 / 1024,
            self.download.recovery.operation_timeout_secs,
            self.download.recovery.max_retries,
            self.download.max_concurrent_downloads,
            self.bot.max_concurrent_requests_per_user,
            self.download.cookies_file.is_some(),
            if self.download.proxy.is_some() { "[REDACTED]" } else { "-" },
            self.observability.environment,
        )
    }
}

/// Parse an optional variable, keeping `default` when it is unset
fn parse_or<T: FromStr>(name: &str, value: Option<String>, default: T) -> AppResult<T> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| AppError::Config(format!("{} must be a valid number, got '{}'", name, raw))),
    }
}
