// Upstream failure classification
//
// Analyzes yt-dlp stderr to decide what a failed attempt means for the
// candidate retry loop:
// - cheap, expected failures (format missing, static content) advance
// - authorization/blocking signals advance (retry-in-place will not help)
// - not-found/private is terminal for collection lookups

use serde::{Deserialize, Serialize};

/// Why an extraction attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// The requested format selector matched nothing
    FormatUnavailable,

    /// Upstream offers only static content (images), no playable stream
    StaticContentOnly,

    /// HTTP 403-class block or an anti-bot challenge token requirement
    AuthChallenge,

    /// Target deleted, private or never existed
    NotFoundOrPrivate,

    /// HTTP 429 or an explicit rate-limit message
    RateLimited,

    /// Reported size exceeds the per-file ceiling
    TooLarge,

    /// Operation hit a timeout
    Timeout,

    /// Anything else
    Unknown,
}

impl FailureKind {
    /// Whether the retry loop should advance to the next candidate strategy.
    /// Timeouts surface immediately; everything else is worth another try
    /// with a different selector.
    pub fn advances_candidate(&self) -> bool {
        !matches!(self, Self::Timeout)
    }

    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::FormatUnavailable => "Requested format is not available",
            Self::StaticContentOnly => "Only static content is available",
            Self::AuthChallenge => "Access blocked (403 / challenge token required)",
            Self::NotFoundOrPrivate => "Target not found or private",
            Self::RateLimited => "Rate limited by upstream",
            Self::TooLarge => "File exceeds the size ceiling",
            Self::Timeout => "Timed out",
            Self::Unknown => "Unknown failure",
        }
    }
}

/// Classify an error message from the extractor
pub fn classify_failure(error: &str) -> FailureKind {
    let lower = error.to_lowercase();

    // Check patterns in order of specificity

    if lower.contains("requested format is not available")
        || lower.contains("no suitable formats")
    {
        return FailureKind::FormatUnavailable;
    }

    if lower.contains("only images are available") {
        return FailureKind::StaticContentOnly;
    }

    if lower.contains("too large") {
        return FailureKind::TooLarge;
    }

    if lower.contains("timed out") || lower.contains("timeout") {
        return FailureKind::Timeout;
    }

    if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests")
    {
        return FailureKind::RateLimited;
    }

    if lower.contains("403")
        || lower.contains("forbidden")
        || lower.contains("po token")
        || lower.contains("proof of origin")
        || lower.contains("sign in to confirm")
        || lower.contains("captcha")
        || lower.contains("unusual traffic")
    {
        return FailureKind::AuthChallenge;
    }

    if lower.contains("does not exist")
        || lower.contains("not found")
        || lower.contains("private")
        || lower.contains("unavailable")
        || lower.contains("has been removed")
    {
        return FailureKind::NotFoundOrPrivate;
    }

    FailureKind::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_unavailable_detection() {
        let error = "ERROR: Requested format is not available";
        assert_eq!(classify_failure(error), FailureKind::FormatUnavailable);
    }

    #[test]
    fn test_static_content_detection() {
        let error = "ERROR: Only images are available for download";
        assert_eq!(classify_failure(error), FailureKind::StaticContentOnly);
    }

    #[test]
    fn test_403_detection() {
        let error = "ERROR: HTTP Error 403: Forbidden";
        assert_eq!(classify_failure(error), FailureKind::AuthChallenge);
    }

    #[test]
    fn test_po_token_detection() {
        let error = "web client https formats require a GVS PO Token";
        assert_eq!(classify_failure(error), FailureKind::AuthChallenge);
    }

    #[test]
    fn test_not_found_detection() {
        let error = "ERROR: This playlist does not exist";
        assert_eq!(classify_failure(error), FailureKind::NotFoundOrPrivate);
    }

    #[test]
    fn test_timeout_detection() {
        let error = "Timed out after 45s";
        assert_eq!(classify_failure(error), FailureKind::Timeout);
    }

    #[test]
    fn test_rate_limit_detection() {
        let error = "HTTP Error 429: Too Many Requests";
        assert_eq!(classify_failure(error), FailureKind::RateLimited);
    }

    #[test]
    fn test_timeout_does_not_advance() {
        assert!(!FailureKind::Timeout.advances_candidate());
        assert!(FailureKind::FormatUnavailable.advances_candidate());
        assert!(FailureKind::AuthChallenge.advances_candidate());
        assert!(FailureKind::Unknown.advances_candidate());
    }
}
