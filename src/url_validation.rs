//! # URL Validation Module
//!
//! Finds the URL in a chat message and checks that it is something the bot is willing
//! to hand to yt-dlp or fetch directly.

use regex::Regex;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::LazyLock;
use url::{Host, Url};

use crate::download_errors::DownloadError;

/// Longest URL accepted from a message
pub const MAX_URL_LENGTH: usize = 2048;

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"https?://\S+").expect("URL pattern is a valid regex")
});

/// Return the first `http(s)://` URL found in `text`
///
/// Trailing punctuation that usually belongs to the sentence rather than the link
/// (`.`, `,`, `!`, `?`, closing brackets and quotes) is stripped.
pub fn extract_url(text: &str) -> Option<String> {
    let found = URL_PATTERN.find(text)?.as_str();
    let trimmed = found.trim_end_matches(['.', ',', '!', '?', ';', ':', ')', ']', '>', '"', '\'']);

    // A bare scheme is not a URL
    if trimmed.ends_with("://") {
        return None;
    }

    Some(trimmed.to_string())
}

/// Whether a message contains something that looks like a download request
pub fn contains_url(text: &str) -> bool {
    extract_url(text).is_some()
}

/// Parse and validate a URL before it reaches the downloader
pub fn validate_url(raw: &str) -> Result<Url, DownloadError> {
    let raw = raw.trim();

    if raw.is_empty() {
        return Err(DownloadError::InvalidUrl("URL is empty".to_string()));
    }

    if raw.len() > MAX_URL_LENGTH {
        return Err(DownloadError::InvalidUrl(format!(
            "URL is too long ({} characters, maximum {})",
            raw.len(),
            MAX_URL_LENGTH
        )));
    }

    let url = Url::parse(raw).map_err(|e| DownloadError::InvalidUrl(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(DownloadError::InvalidUrl(format!(
            "unsupported scheme '{}'",
            url.scheme()
        )));
    }

    if !url.username().is_empty() || url.password().is_some() {
        return Err(DownloadError::InvalidUrl(
            "URLs with embedded credentials are not accepted".to_string(),
        ));
    }

    match url.host() {
        None => return Err(DownloadError::InvalidUrl("URL has no host".to_string())),
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.').to_lowercase();
            if domain == "localhost" || domain.ends_with(".localhost") || domain.ends_with(".local") {
                return Err(DownloadError::InvalidUrl(format!(
                    "local host '{}' is not allowed",
                    domain
                )));
            }
        }
        Some(Host::Ipv4(ip)) => ensure_public_ip(IpAddr::V4(ip))?,
        Some(Host::Ipv6(ip)) => ensure_public_ip(IpAddr::V6(ip))?,
    }

    Ok(url)
}

fn is_internal_v4(v4: Ipv4Addr) -> bool {
    v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified() || v4.is_broadcast()
}

fn ensure_public_ip(ip: IpAddr) -> Result<(), DownloadError> {
    let internal = match ip {
        IpAddr::V4(v4) => is_internal_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            // ::ffff:a.b.c.d reaches the IPv4 host
            Some(v4) => is_internal_v4(v4),
            None => {
                v6.is_loopback()
                    || v6.is_unspecified()
                    // fc00::/7 unique local, fe80::/10 link local
                    || (v6.segments()[0] & 0xfe00) == 0xfc00
                    || (v6.segments()[0] & 0xffc0) == 0xfe80
            }
        },
    };

    if internal {
        return Err(DownloadError::InvalidUrl(format!(
            "address {} is not publicly routable",
            ip
        )));
    }
    Ok(())
}
