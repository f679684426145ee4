//! Download Handler module: runs one download request and relays the file
//!
//! The update handler only does the cheap checks and acknowledges the request; the
//! download and upload run on their own tokio task so that slow sites never hold up
//! the dispatcher.

use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, InputFile, MessageId, ReplyParameters};
use tracing::{debug, info, warn, Instrument};
use url::Url;

use super::ui_builder::format_caption;
use super::BotDeps;
use crate::deduplication::RequestId;
use crate::download_errors::{bytes_to_mb, DownloadError};
use crate::downloader::{DownloadedMedia, MediaKind};
use crate::errors::error_logging;
use crate::limits::LimitRejection;
use crate::localization::{t_args_lang, t_lang};
use crate::observability;

/// A validated request to download one URL for one chat
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub chat_id: ChatId,
    /// The user's message; used for deduplication and as reply target
    pub message_id: MessageId,
    pub user_id: Option<i64>,
    pub url: Url,
    pub kind: MediaKind,
    pub language_code: Option<String>,
}

/// What happened to a request handed to [`start_download`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The download task is running
    Started,
    /// The same request is already being handled
    Duplicate,
    /// No download slot was free; the user has been told
    Rejected(LimitRejection),
}

/// Localized message for a failed download
pub fn download_error_text(deps: &BotDeps, error: &DownloadError, language_code: Option<&str>) -> String {
    match error {
        DownloadError::FileTooLarge { limit, .. } => t_args_lang(
            &deps.localization,
            error.localization_key(),
            &[("limit", &format!("{:.0}", bytes_to_mb(*limit)))],
            language_code,
        ),
        _ => t_lang(&deps.localization, error.localization_key(), language_code),
    }
}

/// Check, acknowledge and spawn a download
pub async fn start_download(bot: Bot, deps: Arc<BotDeps>, request: DownloadRequest) -> Result<StartOutcome> {
    let language_code = request.language_code.as_deref();
    let request_id = RequestId::new(request.chat_id, request.message_id, request.kind);

    if deps.deduplicator.is_duplicate(&request_id) {
        observability::record_telegram_duplicate_message();
        debug!(
            chat_id = %request.chat_id,
            message_id = ?request.message_id,
            kind = %request.kind,
            "Ignoring duplicate download request"
        );
        return Ok(StartOutcome::Duplicate);
    }

    let permit = match deps.limiter.try_acquire(request.chat_id) {
        Ok(permit) => permit,
        Err(rejection) => {
            // Let the user try again once a slot frees up
            deps.deduplicator.forget(&request_id);
            info!(
                chat_id = %request.chat_id,
                rejection = ?rejection,
                active_downloads = deps.limiter.active_downloads(),
                "Download rejected by limiter"
            );
            bot.send_message(
                request.chat_id,
                t_lang(&deps.localization, rejection.localization_key(), language_code),
            )
            .reply_parameters(ReplyParameters::new(request.message_id))
            .await?;
            return Ok(StartOutcome::Rejected(rejection));
        }
    };

    let status = match bot
        .send_message(
            request.chat_id,
            t_lang(&deps.localization, "downloading", language_code),
        )
        .reply_parameters(ReplyParameters::new(request.message_id))
        .await
    {
        Ok(status) => status,
        Err(e) => {
            deps.deduplicator.forget(&request_id);
            return Err(e.into());
        }
    };

    observability::record_active_downloads(deps.limiter.active_downloads());
    let span = observability::telegram_span("download_request", request.user_id);

    tokio::spawn(
        async move {
            run_download(&bot, &deps, &request, status.id).await;
            drop(permit);
            observability::record_active_downloads(deps.limiter.active_downloads());
        }
        .instrument(span),
    );

    Ok(StartOutcome::Started)
}

/// Download, upload, and turn the status message into the result
async fn run_download(bot: &Bot, deps: &BotDeps, request: &DownloadRequest, status_id: MessageId) {
    let language_code = request.language_code.as_deref();
    let chat_id = request.chat_id;

    let media = match deps.downloader.download(&request.url, request.kind).await {
        Ok(media) => media,
        Err(e) => {
            let text = download_error_text(deps, &e, language_code);
            update_status(bot, chat_id, status_id, text).await;
            return;
        }
    };

    info!(
        chat_id = %chat_id,
        kind = %media.kind,
        size_bytes = media.size_bytes,
        attempts = media.attempts,
        source = ?media.source,
        "Download finished, uploading"
    );
    update_status(
        bot,
        chat_id,
        status_id,
        t_lang(&deps.localization, "uploading", language_code),
    )
    .await;

    match upload_media(bot, chat_id, &media).await {
        Ok(method) => {
            debug!(chat_id = %chat_id, method = method, "Upload finished");
            if let Err(e) = bot.delete_message(chat_id, status_id).await {
                // The file arrived; a leftover status message is harmless
                warn!(chat_id = %chat_id, error = %e, "Failed to delete status message");
            }
        }
        Err(e) => {
            error_logging::log_telegram_error(&e, "upload_media", chat_id.0);
            observability::record_error_metrics("upload_failed", "telegram");
            update_status(
                bot,
                chat_id,
                status_id,
                t_lang(&deps.localization, "error-upload-failed", language_code),
            )
            .await;
        }
    }

    // Removes the temporary directory
    drop(media);
}

async fn update_status(bot: &Bot, chat_id: ChatId, status_id: MessageId, text: String) {
    if let Err(e) = bot.edit_message_text(chat_id, status_id, text).await {
        error_logging::log_telegram_error(&e, "edit_status_message", chat_id.0);
    }
}

/// Send the file as video or audio, or as a plain document when Telegram refuses the
/// typed upload. Returns the API method that succeeded.
pub async fn upload_media(
    bot: &Bot,
    chat_id: ChatId,
    media: &DownloadedMedia,
) -> Result<&'static str, teloxide::RequestError> {
    let action = match media.kind {
        MediaKind::Video => ChatAction::UploadVideo,
        MediaKind::Audio => ChatAction::UploadVoice,
    };
    if let Err(e) = bot.send_chat_action(chat_id, action).await {
        debug!(chat_id = %chat_id, error = %e, "Failed to send chat action");
    }

    let caption = format_caption(&media.title);
    let started = Instant::now();

    let typed = match media.kind {
        MediaKind::Video => bot
            .send_video(chat_id, input_file(media))
            .caption(caption.clone())
            .supports_streaming(true)
            .await
            .map(|_| "send_video"),
        MediaKind::Audio => bot
            .send_audio(chat_id, input_file(media))
            .caption(caption.clone())
            .title(media.title.clone())
            .await
            .map(|_| "send_audio"),
    };

    match typed {
        Ok(method) => {
            observability::record_upload_metrics(media.kind, method, true, started.elapsed());
            Ok(method)
        }
        Err(e) => {
            observability::record_upload_metrics(media.kind, typed_method(media.kind), false, started.elapsed());
            warn!(
                chat_id = %chat_id,
                kind = %media.kind,
                error = %e,
                "Typed upload rejected, sending as document"
            );

            let started = Instant::now();
            let result = bot
                .send_document(chat_id, input_file(media))
                .caption(caption)
                .await;
            observability::record_upload_metrics(media.kind, "send_document", result.is_ok(), started.elapsed());
            result.map(|_| "send_document")
        }
    }
}

fn typed_method(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Video => "send_video",
        MediaKind::Audio => "send_audio",
    }
}

fn input_file(media: &DownloadedMedia) -> InputFile {
    InputFile::file(media.path.clone()).file_name(media.file_name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::localization::create_localization_manager;

    fn test_deps() -> BotDeps {
        let localization = create_localization_manager().unwrap();
        BotDeps::new(&AppConfig::default(), localization).unwrap()
    }

    #[test]
    fn test_file_too_large_text_shows_limit() {
        let deps = test_deps();
        let error = DownloadError::FileTooLarge {
            size: Some(80 * 1024 * 1024),
            limit: 50 * 1024 * 1024,
        };

        let text = download_error_text(&deps, &error, Some("en"));
        assert!(text.contains("50 MB"), "unexpected text: {}", text);
    }

    #[test]
    fn test_error_text_is_localized() {
        let deps = test_deps();
        let error = DownloadError::Timeout("300s".to_string());

        let english = download_error_text(&deps, &error, Some("en"));
        let spanish = download_error_text(&deps, &error, Some("es"));
        assert_ne!(english, spanish);
        assert!(!english.contains("Missing translation"));
        assert!(!spanish.contains("Missing translation"));
    }

    #[test]
    fn test_every_download_error_has_a_message() {
        let deps = test_deps();
        let errors = [
            DownloadError::InvalidUrl(String::new()),
            DownloadError::Unsupported(String::new()),
            DownloadError::Unavailable(String::new()),
            DownloadError::AuthRequired(String::new()),
            DownloadError::FormatUnavailable(String::new()),
            DownloadError::FileTooLarge { size: None, limit: 1 },
            DownloadError::Timeout(String::new()),
            DownloadError::Network(String::new()),
            DownloadError::ToolMissing(String::new()),
            DownloadError::NoOutput(String::new()),
            DownloadError::ServiceUnavailable(String::new()),
            DownloadError::FileSystem(String::new()),
            DownloadError::Extraction(String::new()),
        ];

        for error in &errors {
            let text = download_error_text(&deps, error, None);
            assert!(!text.contains("Missing"), "no message for {:?}", error);
        }
    }
}
