//! Command Handlers module for processing bot commands

use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::ReplyParameters;
use tracing::debug;

use super::download_handler::{download_error_text, start_download, DownloadRequest};
use super::ui_builder::format_help_message;
use super::BotDeps;
use crate::downloader::MediaKind;
use crate::errors::error_logging;
use crate::localization::t_lang;
use crate::url_validation::{extract_url, validate_url};

/// Commands understood by the bot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Download(MediaKind),
}

/// Split `/command@BotName args` into a known command and its argument text
///
/// Returns `None` for plain text and for commands the bot does not know.
pub fn parse_command(text: &str) -> Option<(Command, &str)> {
    let text = text.trim_start();
    let rest = text.strip_prefix('/')?;

    let (head, args) = match rest.find(char::is_whitespace) {
        Some(pos) => (&rest[..pos], rest[pos..].trim()),
        None => (rest, ""),
    };
    // Commands in groups carry the bot's username
    let name = head.split('@').next().unwrap_or(head);

    let command = match name.to_lowercase().as_str() {
        "start" => Command::Start,
        "help" => Command::Help,
        "video" => Command::Download(MediaKind::Video),
        "audio" => Command::Download(MediaKind::Audio),
        _ => return None,
    };
    Some((command, args))
}

/// Handle the /start command
pub async fn handle_start_command(
    bot: &Bot,
    msg: &Message,
    deps: &BotDeps,
    language_code: Option<&str>,
) -> Result<()> {
    debug!(user_id = %msg.chat.id, "Handling /start command");
    bot.send_message(msg.chat.id, t_lang(&deps.localization, "welcome", language_code))
        .await?;
    Ok(())
}

/// Handle the /help command
pub async fn handle_help_command(
    bot: &Bot,
    msg: &Message,
    deps: &BotDeps,
    language_code: Option<&str>,
) -> Result<()> {
    debug!(user_id = %msg.chat.id, "Handling /help command");
    let help_message = format_help_message(&deps.localization, language_code, deps.max_file_size_mb());
    bot.send_message(msg.chat.id, help_message).await?;
    Ok(())
}

/// Handle /video and /audio: download the link in the arguments right away
pub async fn handle_download_command(
    bot: &Bot,
    msg: &Message,
    deps: &Arc<BotDeps>,
    kind: MediaKind,
    args: &str,
    language_code: Option<&str>,
) -> Result<()> {
    let Some(raw_url) = extract_url(args) else {
        let usage_key = match kind {
            MediaKind::Video => "video-usage",
            MediaKind::Audio => "audio-usage",
        };
        bot.send_message(msg.chat.id, t_lang(&deps.localization, usage_key, language_code))
            .reply_parameters(ReplyParameters::new(msg.id))
            .await?;
        return Ok(());
    };

    let url = match validate_url(&raw_url) {
        Ok(url) => url,
        Err(e) => {
            let user_id = msg.from.as_ref().map(|u| u.id.0 as i64);
            error_logging::log_validation_error(&e, "download_command", user_id, "url", Some(&raw_url));
            bot.send_message(msg.chat.id, download_error_text(deps, &e, language_code))
                .reply_parameters(ReplyParameters::new(msg.id))
                .await?;
            return Ok(());
        }
    };

    let request = DownloadRequest {
        chat_id: msg.chat.id,
        message_id: msg.id,
        user_id: msg.from.as_ref().map(|u| u.id.0 as i64),
        url,
        kind,
        language_code: language_code.map(str::to_string),
    };
    start_download(bot.clone(), Arc::clone(deps), request).await?;
    Ok(())
}

/// Handle non-text messages
pub async fn handle_unsupported_message(
    bot: &Bot,
    msg: &Message,
    deps: &BotDeps,
    language_code: Option<&str>,
) -> Result<()> {
    debug!(user_id = %msg.chat.id, "Received unsupported message type from user");
    bot.send_message(
        msg.chat.id,
        t_lang(&deps.localization, "unsupported-message", language_code),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_commands() {
        assert_eq!(parse_command("/start"), Some((Command::Start, "")));
        assert_eq!(parse_command("/help"), Some((Command::Help, "")));
        assert_eq!(parse_command("/HELP"), Some((Command::Help, "")));
    }

    #[test]
    fn test_parse_download_commands_with_args() {
        assert_eq!(
            parse_command("/video https://example.com/watch?v=1"),
            Some((Command::Download(MediaKind::Video), "https://example.com/watch?v=1"))
        );
        assert_eq!(
            parse_command("/audio   https://example.com/a  "),
            Some((Command::Download(MediaKind::Audio), "https://example.com/a"))
        );
    }

    #[test]
    fn test_parse_command_with_bot_username() {
        assert_eq!(
            parse_command("/video@media_relay_bot https://example.com/v"),
            Some((Command::Download(MediaKind::Video), "https://example.com/v"))
        );
        assert_eq!(parse_command("/start@media_relay_bot"), Some((Command::Start, "")));
    }

    #[test]
    fn test_parse_command_rejects_other_text() {
        assert_eq!(parse_command("hello"), None);
        assert_eq!(parse_command("https://example.com"), None);
        assert_eq!(parse_command("/settings"), None);
        assert_eq!(parse_command(""), None);
    }
}
