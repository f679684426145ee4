//! # Configuration Tests
//!
//! Loading the application configuration from a variable lookup and validating it as a
//! whole, the way `main` does at startup.

use media_relay_bot::config::{AppConfig, BotMode, ServerConfig};
use std::collections::HashMap;

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "123456789:AAFakeTokenForTestingPurposes1234567890";

    fn load(vars: &[(&str, &str)]) -> media_relay_bot::AppResult<AppConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(move |name: &str| map.get(name).cloned())
    }

    #[test]
    fn test_minimal_environment_uses_defaults() {
        let config = load(&[("TELEGRAM_BOT_TOKEN", TOKEN)]).expect("config loads");

        assert_eq!(config.bot.mode, BotMode::Polling);
        assert_eq!(config.bot.http_timeout_secs, 120);
        assert_eq!(config.bot.deduplication_ttl_secs, 300);
        assert_eq!(config.bot.max_concurrent_requests_per_user, 2);
        assert_eq!(config.download.ytdlp_path, "yt-dlp");
        assert_eq!(config.download.max_file_size, 50 * 1024 * 1024);
        assert_eq!(config.download.recovery.max_retries, 2);
        assert_eq!(config.download.recovery.operation_timeout_secs, 300);
        assert_eq!(config.server.metrics_port, 9090);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_token_is_an_error() {
        assert!(load(&[]).is_err());
        assert!(load(&[("TELEGRAM_BOT_TOKEN", "   ")]).is_err());
    }

    #[test]
    fn test_full_webhook_environment() {
        let config = load(&[
            ("TELEGRAM_BOT_TOKEN", TOKEN),
            ("BOT_MODE", "webhook"),
            ("WEBHOOK_BASE_URL", "https://relay.example.com"),
            ("WEBHOOK_PATH", "/tg"),
            ("PORT", "8443"),
            ("WEBHOOK_SECRET_TOKEN", "abc_DEF-123"),
            ("MAX_FILE_SIZE_MB", "20"),
            ("DOWNLOAD_TIMEOUT_SECS", "120"),
            ("DOWNLOAD_MAX_RETRIES", "1"),
            ("MAX_CONCURRENT_DOWNLOADS", "8"),
            ("YTDLP_PROXY", "socks5://proxy.example.com:1080"),
        ])
        .expect("config loads");

        assert_eq!(config.bot.mode, BotMode::Webhook);
        assert_eq!(config.bot.webhook_port, 8443);
        assert_eq!(
            config.bot.webhook_url().expect("webhook url").as_str(),
            "https://relay.example.com/tg"
        );
        assert_eq!(config.download.max_file_size, 20 * 1024 * 1024);
        assert_eq!(config.download.recovery.operation_timeout_secs, 120);
        assert_eq!(config.download.recovery.max_retries, 1);
        assert_eq!(config.download.max_concurrent_downloads, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_webhook_port_takes_precedence_over_port() {
        let config = load(&[
            ("TELEGRAM_BOT_TOKEN", TOKEN),
            ("WEBHOOK_PORT", "8081"),
            ("PORT", "3000"),
        ])
        .expect("config loads");
        assert_eq!(config.bot.webhook_port, 8081);
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        assert!(load(&[("TELEGRAM_BOT_TOKEN", TOKEN), ("METRICS_PORT", "lots")]).is_err());
        assert!(load(&[("TELEGRAM_BOT_TOKEN", TOKEN), ("MAX_FILE_SIZE_MB", "-1")]).is_err());
        assert!(load(&[("TELEGRAM_BOT_TOKEN", TOKEN), ("BOT_MODE", "push")]).is_err());
        // Would overflow when converted to bytes
        assert!(load(&[("TELEGRAM_BOT_TOKEN", TOKEN), ("MAX_FILE_SIZE_MB", "18446744073709551615")]).is_err());
    }

    #[test]
    fn test_validation_catches_inconsistent_settings() {
        // Webhook mode without a public URL
        let config = load(&[("TELEGRAM_BOT_TOKEN", TOKEN), ("BOT_MODE", "webhook")]).expect("loads");
        assert!(config.validate().is_err());

        // Plain http webhook
        let config = load(&[
            ("TELEGRAM_BOT_TOKEN", TOKEN),
            ("BOT_MODE", "webhook"),
            ("WEBHOOK_BASE_URL", "http://relay.example.com"),
        ])
        .expect("loads");
        assert!(config.validate().is_err());

        // Webhook and metrics on the same port
        let config = load(&[
            ("TELEGRAM_BOT_TOKEN", TOKEN),
            ("BOT_MODE", "webhook"),
            ("WEBHOOK_BASE_URL", "https://relay.example.com"),
            ("WEBHOOK_PORT", "9090"),
        ])
        .expect("loads");
        assert!(config.validate().is_err());

        // Zero global download slots
        let config = load(&[("TELEGRAM_BOT_TOKEN", TOKEN), ("MAX_CONCURRENT_DOWNLOADS", "0")]).expect("loads");
        assert!(config.validate().is_err());

        // Status page path is reserved
        let config = load(&[("TELEGRAM_BOT_TOKEN", TOKEN), ("WEBHOOK_PATH", "/")]).expect("loads");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_summary_redacts_secrets() {
        let config = load(&[
            ("TELEGRAM_BOT_TOKEN", TOKEN),
            ("WEBHOOK_SECRET_TOKEN", "very_secret_value"),
            ("YTDLP_PROXY", "http://user:pw@proxy.example.com:3128"),
        ])
        .expect("config loads");

        let summary = config.summary();
        assert!(!summary.contains(TOKEN));
        assert!(!summary.contains("very_secret_value"));
        assert!(!summary.contains("user:pw"));
        assert!(summary.contains("[REDACTED]"));
    }

    #[test]
    fn test_server_config_serialization() {
        let config = ServerConfig {
            metrics_port: 9191,
            allow_privileged_ports: false,
            metrics_bind_all_interfaces: true,
        };

        let json = serde_json::to_string(&config).expect("serialize");
        let restored: ServerConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(restored.metrics_port, 9191);
        assert!(restored.metrics_bind_all_interfaces);

        let mode: BotMode = serde_json::from_str("\"webhook\"").expect("deserialize mode");
        assert_eq!(mode, BotMode::Webhook);
    }
}
