// Error types surfaced to the caller

use std::fmt;

use super::models::ListRejection;

/// Which rate-limiting rule denied a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitRule {
    /// Session lifetime download cap
    SessionCap { limit: usize },
    /// Per-client trailing-hour cap
    ClientHourly { limit: usize },
    /// Minimum spacing between fetches within one session
    MinInterval { remaining_secs: u64 },
    /// Global concurrent-active ceiling
    ConcurrencyCeiling { limit: usize },
}

impl fmt::Display for RateLimitRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionCap { limit } => {
                write!(f, "Session limit reached ({} downloads)", limit)
            }
            Self::ClientHourly { limit } => {
                write!(f, "Client limit reached ({} downloads/hour)", limit)
            }
            Self::MinInterval { remaining_secs } => {
                write!(f, "Please wait {} seconds", remaining_secs)
            }
            Self::ConcurrencyCeiling { limit } => {
                write!(f, "Too many concurrent downloads (max {}). Please wait.", limit)
            }
        }
    }
}

/// Collection/item resolution failures. Every variant carries the offending
/// id so the caller can render an actionable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// URL carried no recognizable playlist id
    NoIdFound,
    /// "LL…" liked-videos list (private)
    LikedVideosPrivate { list_id: String },
    /// "UL…"/"UU…" channel-uploads list
    UploadsUnsupported { list_id: String },
    /// "WL…" watch-later list (private)
    WatchLaterPrivate { list_id: String },
    /// Id too short or with illegal characters
    InvalidIdFormat { list_id: String },
    /// Upstream says the target does not exist or is not public
    NotFoundOrPrivate { list_id: String, detail: String },
    /// Lookup failed for any other reason
    ExtractionFailed { id: String, detail: String },
}

impl ResolveError {
    /// The id this error is about, for diagnostics
    pub fn offending_id(&self) -> &str {
        match self {
            Self::NoIdFound => "",
            Self::LikedVideosPrivate { list_id }
            | Self::UploadsUnsupported { list_id }
            | Self::WatchLaterPrivate { list_id }
            | Self::InvalidIdFormat { list_id }
            | Self::NotFoundOrPrivate { list_id, .. } => list_id,
            Self::ExtractionFailed { id, .. } => id,
        }
    }
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoIdFound => write!(f, "No valid playlist id found in the URL"),
            Self::LikedVideosPrivate { list_id } => {
                write!(f, "Liked Videos list '{}' is private", list_id)
            }
            Self::UploadsUnsupported { list_id } => {
                write!(f, "Uploads list '{}' is not supported", list_id)
            }
            Self::WatchLaterPrivate { list_id } => {
                write!(f, "Watch Later list '{}' is private", list_id)
            }
            Self::InvalidIdFormat { list_id } => {
                write!(f, "Playlist id '{}' has an invalid format", list_id)
            }
            Self::NotFoundOrPrivate { list_id, detail } => {
                write!(
                    f,
                    "Playlist '{}' does not exist or is not publicly accessible: {}",
                    list_id, detail
                )
            }
            Self::ExtractionFailed { id, detail } => {
                write!(f, "Could not load '{}': {}", id, detail)
            }
        }
    }
}

impl std::error::Error for ResolveError {}

/// Top-level error taxonomy for one conversion request
#[derive(Debug, Clone)]
pub enum ConvertError {
    /// Malformed or non-platform URL
    Validation(String),

    /// Recognized but unsupported list type (private lists etc.)
    Unsupported(ListRejection),

    /// Upstream lookup failed
    Resolve(ResolveError),

    /// A rate-limiting rule denied the request
    RateLimited(RateLimitRule),

    /// Duration or size ceiling exceeded
    ResourceExceeded(String),

    /// Per-item soft deadline breached
    Timeout(String),

    /// Every candidate strategy was exhausted
    FormatUnavailable(String),

    /// Raw-stream conversion failed
    Transcode(String),

    /// Archive construction failed; treat as total packaging failure
    Packaging(String),

    /// Any other upstream extraction failure
    Extraction(String),
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "Invalid URL: {}", msg),
            Self::Unsupported(rejection) => write!(f, "{}", rejection.message()),
            Self::Resolve(e) => write!(f, "{}", e),
            Self::RateLimited(rule) => write!(f, "{}", rule),
            Self::ResourceExceeded(msg) => write!(f, "Limit exceeded: {}", msg),
            Self::Timeout(msg) => write!(f, "Timed out: {}", msg),
            Self::FormatUnavailable(msg) => {
                write!(f, "No downloadable audio format found: {}", msg)
            }
            Self::Transcode(msg) => write!(f, "Audio conversion failed: {}", msg),
            Self::Packaging(msg) => write!(f, "Archive creation failed: {}", msg),
            Self::Extraction(msg) => write!(f, "Extraction failed: {}", msg),
        }
    }
}

impl std::error::Error for ConvertError {}

impl From<ResolveError> for ConvertError {
    fn from(e: ResolveError) -> Self {
        Self::Resolve(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_messages_carry_limit_values() {
        let msg = RateLimitRule::ClientHourly { limit: 10 }.to_string();
        assert!(msg.contains("10"));

        let msg = RateLimitRule::MinInterval { remaining_secs: 23 }.to_string();
        assert!(msg.contains("23"));
    }

    #[test]
    fn test_resolve_error_offending_id() {
        let e = ResolveError::NotFoundOrPrivate {
            list_id: "PLabc".to_string(),
            detail: "404".to_string(),
        };
        assert_eq!(e.offending_id(), "PLabc");
        assert!(e.to_string().contains("PLabc"));
    }
}
