//! # Download Error Types Module
//!
//! This module defines the error type used throughout the download pipeline and the
//! classification of `yt-dlp` failures from its stderr output.

/// Custom error types for download operations
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadError {
    /// The URL is malformed or not allowed
    InvalidUrl(String),
    /// No extractor and no direct media behind the URL
    Unsupported(String),
    /// Media is private, removed or geo-blocked
    Unavailable(String),
    /// The site requires login, cookies or age verification
    AuthRequired(String),
    /// The requested format selector matched nothing
    FormatUnavailable(String),
    /// Resulting file exceeds the upload limit; `size` is unknown when yt-dlp refused
    /// the download up front
    FileTooLarge { size: Option<u64>, limit: u64 },
    /// An attempt ran longer than the configured timeout
    Timeout(String),
    /// Network failure while fetching media
    Network(String),
    /// The yt-dlp executable could not be started
    ToolMissing(String),
    /// yt-dlp succeeded but no output file was found
    NoOutput(String),
    /// The circuit breaker is open
    ServiceUnavailable(String),
    /// Temporary directory or file handling failed
    FileSystem(String),
    /// Any other extractor failure
    Extraction(String),
}

impl std::fmt::Display for DownloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DownloadError::InvalidUrl(msg) => write!(f, "[INVALID_URL] URL rejected: {}", msg),
            DownloadError::Unsupported(msg) => write!(f, "[UNSUPPORTED] No extractor for URL: {}", msg),
            DownloadError::Unavailable(msg) => write!(f, "[UNAVAILABLE] Media is not available: {}", msg),
            DownloadError::AuthRequired(msg) => write!(f, "[AUTH] Media requires authentication: {}", msg),
            DownloadError::FormatUnavailable(msg) => write!(f, "[FORMAT] Requested format not available: {}", msg),
            DownloadError::FileTooLarge { size: Some(size), limit } => write!(
                f,
                "[TOO_LARGE] File size ({:.2}MB) exceeds limit ({:.2}MB)",
                bytes_to_mb(*size),
                bytes_to_mb(*limit)
            ),
            DownloadError::FileTooLarge { size: None, limit } => write!(
                f,
                "[TOO_LARGE] File size exceeds limit ({:.2}MB)",
                bytes_to_mb(*limit)
            ),
            DownloadError::Timeout(msg) => write!(f, "[TIMEOUT] Download timed out: {}", msg),
            DownloadError::Network(msg) => write!(f, "[NETWORK] Network failure during download: {}", msg),
            DownloadError::ToolMissing(msg) => write!(f, "[TOOL] yt-dlp could not be started: {}", msg),
            DownloadError::NoOutput(msg) => write!(f, "[NO_OUTPUT] Failed to download file: {}", msg),
            DownloadError::ServiceUnavailable(msg) => write!(f, "[CIRCUIT_OPEN] Downloads temporarily disabled: {}", msg),
            DownloadError::FileSystem(msg) => write!(f, "[FILESYSTEM] {}", msg),
            DownloadError::Extraction(msg) => write!(f, "[EXTRACTION] yt-dlp failed: {}", msg),
        }
    }
}

impl std::error::Error for DownloadError {}

impl From<std::io::Error> for DownloadError {
    fn from(err: std::io::Error) -> Self {
        DownloadError::FileSystem(err.to_string())
    }
}

impl From<reqwest::Error> for DownloadError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DownloadError::Timeout(err.to_string())
        } else {
            DownloadError::Network(err.to_string())
        }
    }
}

impl DownloadError {
    /// Whether another attempt with the same parameters may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DownloadError::Network(_) | DownloadError::Timeout(_) | DownloadError::Extraction(_)
        )
    }

    /// Whether the failure points at the tool or upstream sites rather than at the
    /// user's request. Only these count against the circuit breaker.
    pub fn counts_as_service_failure(&self) -> bool {
        matches!(
            self,
            DownloadError::Network(_)
                | DownloadError::Timeout(_)
                | DownloadError::Extraction(_)
                | DownloadError::ToolMissing(_)
        )
    }

    /// Localization key of the message shown to the user
    pub fn localization_key(&self) -> &'static str {
        match self {
            DownloadError::InvalidUrl(_) => "error-invalid-url",
            DownloadError::Unsupported(_) => "error-unsupported-url",
            DownloadError::Unavailable(_) => "error-unavailable",
            DownloadError::AuthRequired(_) => "error-auth-required",
            DownloadError::FormatUnavailable(_) => "error-format-unavailable",
            DownloadError::FileTooLarge { .. } => "error-file-too-large",
            DownloadError::Timeout(_) => "error-timeout",
            DownloadError::Network(_) => "error-network",
            DownloadError::ServiceUnavailable(_) => "error-service-unavailable",
            DownloadError::ToolMissing(_)
            | DownloadError::NoOutput(_)
            | DownloadError::FileSystem(_)
            | DownloadError::Extraction(_) => "error-download-failed",
        }
    }

    /// Short label used for metrics
    pub fn metric_label(&self) -> &'static str {
        match self {
            DownloadError::InvalidUrl(_) => "invalid_url",
            DownloadError::Unsupported(_) => "unsupported",
            DownloadError::Unavailable(_) => "unavailable",
            DownloadError::AuthRequired(_) => "auth_required",
            DownloadError::FormatUnavailable(_) => "format_unavailable",
            DownloadError::FileTooLarge { .. } => "file_too_large",
            DownloadError::Timeout(_) => "timeout",
            DownloadError::Network(_) => "network",
            DownloadError::ToolMissing(_) => "tool_missing",
            DownloadError::NoOutput(_) => "no_output",
            DownloadError::ServiceUnavailable(_) => "service_unavailable",
            DownloadError::FileSystem(_) => "filesystem",
            DownloadError::Extraction(_) => "extraction",
        }
    }
}

/// Convert a byte count to megabytes for messages
pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / 1024.0 / 1024.0
}

/// Map yt-dlp stderr output to a [`DownloadError`]
///
/// `max_file_size` is only used to fill in the limit of a size rejection.
///
/// The checks run from the most specific to the most generic message so that e.g. an
/// "unable to download webpage: connection reset" ends up as a network error, while a
/// "Sign in to confirm your age" ends up as an authentication problem.
pub fn classify_ytdlp_failure(stderr: &str, max_file_size: u64) -> DownloadError {
    let detail = last_error_line(stderr);
    let lower = stderr.to_lowercase();

    if lower.contains("unsupported url") || lower.contains("no suitable extractor") {
        return DownloadError::Unsupported(detail);
    }

    if lower.contains("requested format is not available")
        || lower.contains("requested format not available")
    {
        return DownloadError::FormatUnavailable(detail);
    }

    if lower.contains("larger than max-filesize") || lower.contains("file is larger than") {
        return DownloadError::FileTooLarge {
            size: None,
            limit: max_file_size,
        };
    }

    if lower.contains("sign in to confirm")
        || lower.contains("please sign in")
        || lower.contains("login required")
        || lower.contains("requires authentication")
        || lower.contains("use --cookies")
        || lower.contains("cookies are no longer valid")
        || lower.contains("age-restricted")
        || lower.contains("inappropriate for some users")
    {
        return DownloadError::AuthRequired(detail);
    }

    if lower.contains("private video")
        || lower.contains("video unavailable")
        || lower.contains("video is private")
        || lower.contains("has been removed")
        || lower.contains("does not exist")
        || lower.contains("not available in your country")
        || lower.contains("this video is not available")
        || lower.contains("http error 404")
        || lower.contains("http error 410")
    {
        return DownloadError::Unavailable(detail);
    }

    if lower.contains("timed out")
        || lower.contains("timeout")
        || lower.contains("connection reset")
        || lower.contains("connection refused")
        || lower.contains("failed to resolve")
        || lower.contains("name or service not known")
        || lower.contains("temporary failure in name resolution")
        || lower.contains("network is unreachable")
        || lower.contains("http error 5")
    {
        return DownloadError::Network(detail);
    }

    DownloadError::Extraction(detail)
}

/// Pick the most informative line of yt-dlp stderr output
fn last_error_line(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().map(str::trim).filter(|l| !l.is_empty()).collect();

    lines
        .iter()
        .rev()
        .find(|line| line.starts_with("ERROR:"))
        .or_else(|| lines.last())
        .map(|line| line.trim_start_matches("ERROR:").trim().to_string())
        .unwrap_or_else(|| "no error output".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: u64 = 50 * 1024 * 1024;

    #[test]
    fn test_classify_unsupported_url() {
        let stderr = "WARNING: something\nERROR: Unsupported URL: https://example.com/page";
        let err = classify_ytdlp_failure(stderr, LIMIT);
        assert_eq!(
            err,
            DownloadError::Unsupported("Unsupported URL: https://example.com/page".to_string())
        );
    }

    #[test]
    fn test_classify_unavailable() {
        let err = classify_ytdlp_failure("ERROR: [youtube] abc: Private video. Sign in if you've been granted access", LIMIT);
        // "Sign in if" is not a login requirement, the video is simply private
        assert!(matches!(err, DownloadError::Unavailable(_)));

        let err = classify_ytdlp_failure("ERROR: [youtube] abc: Video unavailable", LIMIT);
        assert!(matches!(err, DownloadError::Unavailable(_)));
    }

    #[test]
    fn test_classify_auth_required() {
        let err = classify_ytdlp_failure(
            "ERROR: [youtube] abc: Sign in to confirm you're not a bot. Use --cookies-from-browser",
            LIMIT,
        );
        assert!(matches!(err, DownloadError::AuthRequired(_)));
    }

    #[test]
    fn test_classify_format_unavailable() {
        let err = classify_ytdlp_failure(
            "ERROR: [vimeo] 123: Requested format is not available. Use --list-formats",
            LIMIT,
        );
        assert!(matches!(err, DownloadError::FormatUnavailable(_)));
    }

    #[test]
    fn test_classify_network() {
        let err = classify_ytdlp_failure(
            "ERROR: Unable to download webpage: <urlopen error [Errno -3] Temporary failure in name resolution>",
            LIMIT,
        );
        assert!(matches!(err, DownloadError::Network(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_classify_fallback_is_extraction() {
        let err = classify_ytdlp_failure("ERROR: something nobody anticipated", LIMIT);
        assert_eq!(
            err,
            DownloadError::Extraction("something nobody anticipated".to_string())
        );

        let err = classify_ytdlp_failure("", LIMIT);
        assert_eq!(err, DownloadError::Extraction("no error output".to_string()));
    }

    #[test]
    fn test_retryable_and_service_failures() {
        assert!(!DownloadError::Unavailable("x".into()).is_retryable());
        assert!(!DownloadError::FileTooLarge { size: Some(2), limit: 1 }.is_retryable());
        assert!(DownloadError::Timeout("x".into()).is_retryable());

        assert!(!DownloadError::Unavailable("x".into()).counts_as_service_failure());
        assert!(DownloadError::ToolMissing("x".into()).counts_as_service_failure());
        // A silent skip says nothing about the health of yt-dlp
        assert!(!DownloadError::NoOutput("x".into()).counts_as_service_failure());
        assert!(!DownloadError::FileTooLarge { size: None, limit: 1 }.counts_as_service_failure());
    }

    #[test]
    fn test_file_too_large_display() {
        let err = DownloadError::FileTooLarge {
            size: Some(60 * 1024 * 1024),
            limit: LIMIT,
        };
        assert_eq!(
            err.to_string(),
            "[TOO_LARGE] File size (60.00MB) exceeds limit (50.00MB)"
        );
        assert_eq!(err.localization_key(), "error-file-too-large");
    }

    #[test]
    fn test_classify_max_filesize_rejection() {
        let err = classify_ytdlp_failure(
            "[download] File is larger than max-filesize (73400320 bytes > 52428800 bytes). Aborting.",
            LIMIT,
        );
        assert_eq!(
            err,
            DownloadError::FileTooLarge {
                size: None,
                limit: LIMIT
            }
        );
        assert_eq!(err.to_string(), "[TOO_LARGE] File size exceeds limit (50.00MB)");
    }
}
