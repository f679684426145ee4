//! UI Builder module for creating keyboards and formatting messages

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::downloader::MediaKind;
use crate::localization::{t_args_lang, t_lang, LocalizationManager};

/// Prefix of the callback data of the Video / Audio keyboard
pub const DOWNLOAD_CALLBACK_PREFIX: &str = "dl";

/// Telegram's caption limit, in characters
pub const MAX_CAPTION_CHARS: usize = 1024;

/// Callback data for one button: `dl:<v|a>:<pending id>`
pub fn download_callback_data(kind: MediaKind, pending_id: &str) -> String {
    format!("{}:{}:{}", DOWNLOAD_CALLBACK_PREFIX, kind.code(), pending_id)
}

/// Parse `dl:<v|a>:<pending id>` back into its parts
pub fn parse_download_callback(data: &str) -> Option<(MediaKind, &str)> {
    let mut parts = data.splitn(3, ':');
    if parts.next()? != DOWNLOAD_CALLBACK_PREFIX {
        return None;
    }
    let kind = MediaKind::from_code(parts.next()?)?;
    let pending_id = parts.next().filter(|id| !id.is_empty())?;
    Some((kind, pending_id))
}

/// Create the inline keyboard asking for Video or Audio
pub fn create_format_keyboard(
    pending_id: &str,
    localization: &LocalizationManager,
    language_code: Option<&str>,
) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback(
            t_lang(localization, "button-video", language_code),
            download_callback_data(MediaKind::Video, pending_id),
        ),
        InlineKeyboardButton::callback(
            t_lang(localization, "button-audio", language_code),
            download_callback_data(MediaKind::Audio, pending_id),
        ),
    ]])
}

/// Format the /help message with the upload limit filled in
pub fn format_help_message(
    localization: &LocalizationManager,
    language_code: Option<&str>,
    limit_mb: u64,
) -> String {
    t_args_lang(
        localization,
        "help",
        &[("limit", &limit_mb.to_string())],
        language_code,
    )
}

/// Caption for an uploaded file, cut to Telegram's limit
pub fn format_caption(title: &str) -> String {
    let title = title.trim();
    if title.chars().count() <= MAX_CAPTION_CHARS {
        return title.to_string();
    }

    let mut caption: String = title.chars().take(MAX_CAPTION_CHARS - 3).collect();
    caption.push_str("...");
    caption
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_data_fits_telegram_limit() {
        let data = download_callback_data(MediaKind::Audio, "AbCdEfGhIj");
        assert_eq!(data, "dl:a:AbCdEfGhIj");
        assert!(data.len() <= 64);
    }

    #[test]
    fn test_parse_download_callback() {
        assert_eq!(
            parse_download_callback("dl:v:abc123"),
            Some((MediaKind::Video, "abc123"))
        );
        assert_eq!(
            parse_download_callback("dl:a:xyz"),
            Some((MediaKind::Audio, "xyz"))
        );
        assert_eq!(parse_download_callback("dl:x:abc"), None);
        assert_eq!(parse_download_callback("dl:v:"), None);
        assert_eq!(parse_download_callback("page:1"), None);
        assert_eq!(parse_download_callback(""), None);
    }

    #[test]
    fn test_format_caption_truncates_on_char_boundary() {
        assert_eq!(format_caption("  Short title "), "Short title");

        let long: String = "é".repeat(MAX_CAPTION_CHARS + 10);
        let caption = format_caption(&long);
        assert_eq!(caption.chars().count(), MAX_CAPTION_CHARS);
        assert!(caption.ends_with("..."));
    }

    #[test]
    fn test_format_keyboard_has_both_choices() {
        let localization = LocalizationManager::new().unwrap();
        let keyboard = create_format_keyboard("id42", &localization, Some("en"));

        assert_eq!(keyboard.inline_keyboard.len(), 1);
        let row = &keyboard.inline_keyboard[0];
        assert_eq!(row.len(), 2);
        assert!(row[0].text.contains("Video"));
        assert!(row[1].text.contains("Audio"));
    }

    #[test]
    fn test_help_message_mentions_limit() {
        let localization = LocalizationManager::new().unwrap();
        let help = format_help_message(&localization, None, 50);
        assert!(help.contains("50"));
    }
}
