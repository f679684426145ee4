//! Callback Handler module for processing inline keyboard callback queries

use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;
use teloxide::prelude::*;
use teloxide::types::MaybeInaccessibleMessage;
use tracing::{debug, warn, Instrument};

use super::download_handler::{start_download, DownloadRequest, StartOutcome};
use super::ui_builder::parse_download_callback;
use super::BotDeps;
use crate::errors::error_logging;
use crate::localization::t_lang;
use crate::pending::PendingDownloads;
use crate::observability;
use crate::url_validation::validate_url;

/// Handle callback queries from inline keyboards
pub async fn callback_handler(bot: Bot, q: CallbackQuery, deps: Arc<BotDeps>) -> Result<()> {
    let user_id = q.from.id.0 as i64;
    let span = observability::telegram_span("callback_handler", Some(user_id));

    async move {
        let start_time = Instant::now();
        observability::record_telegram_message("callback");

        if let Err(e) = handle_download_choice(&bot, &q, &deps).await {
            error_logging::log_internal_error(&e, "callback_handler", "download_choice", Some(user_id));
            observability::record_error_metrics("handler_error", "telegram");
            let language_code = q.from.language_code.as_deref();
            if let Err(send_err) = bot
                .answer_callback_query(q.id.clone())
                .text(t_lang(&deps.localization, "error-internal", language_code))
                .await
            {
                debug!(error = %send_err, "Failed to answer callback query after error");
            }
        }

        observability::record_telegram_performance_metrics("callback", start_time.elapsed());
        Ok(())
    }
    .instrument(span)
    .await
}

async fn handle_download_choice(bot: &Bot, q: &CallbackQuery, deps: &Arc<BotDeps>) -> Result<()> {
    let language_code = q.from.language_code.as_deref();
    let data = q.data.as_deref().unwrap_or("");

    let Some((kind, pending_id)) = parse_download_callback(data) else {
        debug!(user_id = %q.from.id, data = %data, "Ignoring unknown callback data");
        bot.answer_callback_query(q.id.clone()).await?;
        return Ok(());
    };

    // Use the chat of the message that carried the keyboard
    let (chat_id, keyboard_message_id) = match &q.message {
        Some(MaybeInaccessibleMessage::Regular(msg)) => (msg.chat.id, Some(msg.id)),
        Some(MaybeInaccessibleMessage::Inaccessible(msg)) => (msg.chat.id, None),
        None => (ChatId::from(q.from.id), None),
    };

    // Peek only: a refused download keeps the keyboard usable
    let Some(pending) = deps.pending.get(pending_id, chat_id) else {
        bot.answer_callback_query(q.id.clone())
            .text(t_lang(&deps.localization, "error-expired-choice", language_code))
            .await?;
        return Ok(());
    };

    // Stored URLs were validated when the link arrived
    let url = validate_url(&pending.url)?;
    let request = DownloadRequest {
        chat_id,
        message_id: pending.message_id,
        user_id: Some(q.from.id.0 as i64),
        url,
        kind,
        language_code: language_code.map(str::to_string),
    };

    let outcome = start_download(bot.clone(), Arc::clone(deps), request).await?;

    if settle_choice(&deps.pending, pending_id, &outcome) {
        if let Some(keyboard_message_id) = keyboard_message_id {
            // One choice per link
            if let Err(e) = bot.edit_message_reply_markup(chat_id, keyboard_message_id).await {
                warn!(chat_id = %chat_id, error = %e, "Failed to remove format keyboard");
            }
        }
    }

    let answer = bot.answer_callback_query(q.id.clone());
    match outcome {
        StartOutcome::Duplicate => {
            answer
                .text(t_lang(&deps.localization, "duplicate", language_code))
                .await?;
        }
        StartOutcome::Started | StartOutcome::Rejected(_) => {
            answer.await?;
        }
    }
    Ok(())
}

/// Consume the pending choice once its download has started
///
/// Returns whether the choice is used up. Rejected requests leave it in place so
/// the same button works once a slot frees up.
pub fn settle_choice(pending: &PendingDownloads, pending_id: &str, outcome: &StartOutcome) -> bool {
    match outcome {
        StartOutcome::Started => {
            pending.remove(pending_id);
            true
        }
        StartOutcome::Duplicate | StartOutcome::Rejected(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::settle_choice;
    use crate::bot::download_handler::StartOutcome;
    use crate::bot::ui_builder::{download_callback_data, parse_download_callback};
    use crate::downloader::MediaKind;
    use crate::limits::LimitRejection;
    use crate::pending::{PendingDownload, PendingDownloads};
    use teloxide::types::{ChatId, MessageId};

    #[test]
    fn test_keyboard_choice_resolves_pending_link() {
        let pending = PendingDownloads::default();
        let id = pending.insert(PendingDownload {
            url: "https://example.com/v/1".to_string(),
            chat_id: ChatId(7),
            message_id: MessageId(3),
        });

        let data = download_callback_data(MediaKind::Video, &id);
        let (kind, parsed_id) = parse_download_callback(&data).unwrap();
        assert_eq!(kind, MediaKind::Video);

        let stored = pending.take(parsed_id, ChatId(7)).unwrap();
        assert_eq!(stored.url, "https://example.com/v/1");
        assert!(pending.take(parsed_id, ChatId(7)).is_none());
    }

    #[test]
    fn test_rejected_download_keeps_choice() {
        let pending = PendingDownloads::default();
        let id = pending.insert(PendingDownload {
            url: "https://example.com/v/2".to_string(),
            chat_id: ChatId(7),
            message_id: MessageId(4),
        });

        for rejection in [LimitRejection::ChatBusy, LimitRejection::GlobalBusy] {
            assert!(!settle_choice(&pending, &id, &StartOutcome::Rejected(rejection)));
            assert!(pending.get(&id, ChatId(7)).is_some());
        }

        assert!(settle_choice(&pending, &id, &StartOutcome::Started));
        assert!(pending.get(&id, ChatId(7)).is_none());
    }
}
