//! Message Handler module for processing incoming Telegram messages

use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;
use teloxide::prelude::*;
use teloxide::types::ReplyParameters;
use tracing::{debug, Instrument};

use super::command_handlers::{
    handle_download_command, handle_help_command, handle_start_command,
    handle_unsupported_message, parse_command, Command,
};
use super::download_handler::download_error_text;
use super::ui_builder::create_format_keyboard;
use super::BotDeps;
use crate::errors::error_logging;
use crate::localization::t_lang;
use crate::observability;
use crate::pending::PendingDownload;
use crate::url_validation::{extract_url, validate_url};

/// What a message asks the bot to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageCategory<'a> {
    Command(Command, &'a str),
    Url(String),
    Text,
    Unsupported,
}

impl MessageCategory<'_> {
    /// Label used for metrics
    pub fn label(&self) -> &'static str {
        match self {
            MessageCategory::Command(..) => "command",
            MessageCategory::Url(_) => "url",
            MessageCategory::Text => "text",
            MessageCategory::Unsupported => "unsupported",
        }
    }
}

/// Classify the text of a message (`None` for non-text messages)
pub fn classify_message(text: Option<&str>) -> MessageCategory<'_> {
    let Some(text) = text else {
        return MessageCategory::Unsupported;
    };

    if let Some((command, args)) = parse_command(text) {
        return MessageCategory::Command(command, args);
    }

    match extract_url(text) {
        Some(url) => MessageCategory::Url(url),
        None => MessageCategory::Text,
    }
}

/// Entry point for every message update
///
/// Errors are logged and answered with a generic message; they never reach the
/// dispatcher.
pub async fn message_handler(bot: Bot, msg: Message, deps: Arc<BotDeps>) -> Result<()> {
    let user_id = msg.from.as_ref().map(|u| u.id.0 as i64);
    let span = observability::telegram_span("message_handler", user_id);

    async move {
        let start_time = Instant::now();
        // Captions count as text so that a link shared with a photo still works
        let text = msg.text().or_else(|| msg.caption());
        let category = classify_message(text);
        let message_type = category.label();

        let language_code = msg
            .from
            .as_ref()
            .and_then(|user| user.language_code.as_deref());

        let result = route_message(&bot, &msg, &deps, category, language_code).await;

        if let Err(e) = result {
            error_logging::log_internal_error(&e, "message_handler", message_type, user_id);
            observability::record_error_metrics("handler_error", "telegram");
            if let Err(send_err) = bot
                .send_message(msg.chat.id, t_lang(&deps.localization, "error-internal", language_code))
                .await
            {
                error_logging::log_telegram_error(&send_err, "send_internal_error", msg.chat.id.0);
            }
        }

        observability::record_telegram_performance_metrics(message_type, start_time.elapsed());
        Ok(())
    }
    .instrument(span)
    .await
}

async fn route_message(
    bot: &Bot,
    msg: &Message,
    deps: &Arc<BotDeps>,
    category: MessageCategory<'_>,
    language_code: Option<&str>,
) -> Result<()> {
    match category {
        MessageCategory::Command(Command::Start, _) => {
            handle_start_command(bot, msg, deps, language_code).await
        }
        MessageCategory::Command(Command::Help, _) => {
            handle_help_command(bot, msg, deps, language_code).await
        }
        MessageCategory::Command(Command::Download(kind), args) => {
            handle_download_command(bot, msg, deps, kind, args, language_code).await
        }
        MessageCategory::Url(raw_url) => handle_url_message(bot, msg, deps, &raw_url, language_code).await,
        MessageCategory::Text => {
            debug!(user_id = %msg.chat.id, "Text message without a link");
            bot.send_message(msg.chat.id, t_lang(&deps.localization, "no-url-hint", language_code))
                .await?;
            Ok(())
        }
        MessageCategory::Unsupported => {
            handle_unsupported_message(bot, msg, deps, language_code).await
        }
    }
}

/// A bare link: remember it and ask whether the user wants video or audio
async fn handle_url_message(
    bot: &Bot,
    msg: &Message,
    deps: &BotDeps,
    raw_url: &str,
    language_code: Option<&str>,
) -> Result<()> {
    let url = match validate_url(raw_url) {
        Ok(url) => url,
        Err(e) => {
            let user_id = msg.from.as_ref().map(|u| u.id.0 as i64);
            error_logging::log_validation_error(&e, "url_message", user_id, "url", Some(raw_url));
            bot.send_message(msg.chat.id, download_error_text(deps, &e, language_code))
                .reply_parameters(ReplyParameters::new(msg.id))
                .await?;
            return Ok(());
        }
    };

    let pending_id = deps.pending.insert(PendingDownload {
        url: url.to_string(),
        chat_id: msg.chat.id,
        message_id: msg.id,
    });
    debug!(user_id = %msg.chat.id, pending_id = %pending_id, "Asking for download format");

    bot.send_message(msg.chat.id, t_lang(&deps.localization, "choose-format", language_code))
        .reply_parameters(ReplyParameters::new(msg.id))
        .reply_markup(create_format_keyboard(&pending_id, &deps.localization, language_code))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::MediaKind;

    #[test]
    fn test_classify_commands() {
        assert_eq!(
            classify_message(Some("/start")),
            MessageCategory::Command(Command::Start, "")
        );
        assert_eq!(
            classify_message(Some("/audio https://example.com/song")),
            MessageCategory::Command(Command::Download(MediaKind::Audio), "https://example.com/song")
        );
    }

    #[test]
    fn test_classify_url_inside_text() {
        assert_eq!(
            classify_message(Some("look at this https://example.com/clip!")),
            MessageCategory::Url("https://example.com/clip".to_string())
        );
    }

    #[test]
    fn test_classify_plain_text_and_other_messages() {
        assert_eq!(classify_message(Some("hello there")), MessageCategory::Text);
        assert_eq!(classify_message(Some("/unknown")), MessageCategory::Text);
        assert_eq!(classify_message(None), MessageCategory::Unsupported);
    }

    #[test]
    fn test_category_labels() {
        assert_eq!(classify_message(None).label(), "unsupported");
        assert_eq!(classify_message(Some("hi")).label(), "text");
        assert_eq!(classify_message(Some("https://example.com")).label(), "url");
        assert_eq!(classify_message(Some("/help")).label(), "command");
    }
}
