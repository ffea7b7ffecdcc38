// Common data models for the conversion pipeline

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Special list types that cannot be resolved as collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectedListKind {
    /// "LL…" — the user's liked-videos list (private)
    LikedVideos,
    /// "UL…"/"UU…" — channel-uploads list
    ChannelUploads,
    /// "WL…" — watch-later list (private)
    WatchLater,
    /// Too short or malformed playlist id
    InvalidId,
}

impl RejectedListKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::LikedVideos => "Liked Videos",
            Self::ChannelUploads => "Channel Uploads",
            Self::WatchLater => "Watch Later",
            Self::InvalidId => "Invalid playlist id",
        }
    }
}

/// Why a list-style URL was rejected, with enough detail for the caller to
/// present alternatives instead of failing silently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRejection {
    pub kind: RejectedListKind,
    /// The offending `list` parameter value
    pub list_id: String,
}

impl ListRejection {
    pub fn message(&self) -> String {
        match self.kind {
            RejectedListKind::LikedVideos => {
                "Liked Videos lists are private and cannot be downloaded as a playlist. \
                 Open a single video from the list and use its URL instead."
                    .to_string()
            }
            RejectedListKind::ChannelUploads => {
                "Channel-uploads lists are not supported. \
                 Download individual videos or use a public playlist."
                    .to_string()
            }
            RejectedListKind::WatchLater => {
                "Watch Later lists are private and cannot be downloaded as a playlist. \
                 Open a single video from the list and use its URL instead."
                    .to_string()
            }
            RejectedListKind::InvalidId => {
                format!(
                    "Playlist id '{}' has an invalid format. Valid ids are at least 16 \
                     characters of letters, digits, '-' and '_'.",
                    self.list_id
                )
            }
        }
    }
}

/// What kind of target a URL points at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UrlKind {
    /// A single watchable video
    Video,
    /// An ordinary public playlist
    Playlist,
    /// An auto-generated mix/radio pseudo-playlist ("RD…")
    Mix,
    /// A recognized but unsupported list type with no usable video fallback
    UnsupportedList(ListRejection),
}

/// Typed intent derived once per raw input URL. Immutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlIntent {
    pub kind: UrlKind,
    /// Canonical form of the input URL (watch/playlist long form)
    pub normalized_url: String,
    /// 11-char video id, when one was present in the input
    pub video_id_hint: Option<String>,
}

/// Metadata for one resolvable item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub id: String,
    pub title: String,
    pub uploader_name: String,
    /// 0 means "unknown" — never absent
    pub duration_seconds: u64,
    pub source_url: String,
}

/// Collection flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollectionKind {
    Playlist,
    Mix,
}

/// An ordered listing of items resolved from one collection URL.
/// Item order matches the upstream listing and is preserved end-to-end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub title: String,
    pub uploader_name: String,
    pub items: Vec<MediaMetadata>,
    pub kind: CollectionKind,
    /// Caveat to show alongside the listing (e.g. only the mix seed video
    /// could be extracted)
    pub note: Option<String>,
}

/// Result of one pipeline fetch. Exactly one payload is populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success {
        /// Target-format file, owned by the caller from here on
        local_path: PathBuf,
        title: String,
    },
    Failure {
        reason: String,
    },
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// All named limits in one place. Defaults match the production deployment.
#[derive(Debug, Clone)]
pub struct Limits {
    /// Max downloads per client per trailing hour
    pub max_downloads_per_client_hour: usize,
    /// Max downloads over one session lifetime
    pub max_downloads_per_session: usize,
    /// Global ceiling on concurrently active fetches
    pub max_concurrent_fetches: usize,
    /// Max size of a single output file in MB
    pub max_file_size_mb: u64,
    /// Items longer than this are rejected at resolution time
    pub max_item_duration_secs: u64,
    pub max_playlist_items: usize,
    pub max_mix_items: usize,
    /// Minimum spacing between fetches within one session
    pub min_secs_between_fetches: u64,
    /// Archives above this are not eligible for auto-delivery
    pub max_auto_archive_mb: u64,
    /// Socket-level timeout handed to the extractor
    pub socket_timeout_secs: u64,
    /// Soft deadline for one whole item fetch
    pub item_deadline_secs: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_downloads_per_client_hour: 10,
            max_downloads_per_session: 500,
            max_concurrent_fetches: 3,
            max_file_size_mb: 100,
            max_item_duration_secs: 3600,
            max_playlist_items: 50,
            max_mix_items: 15,
            min_secs_between_fetches: 40,
            max_auto_archive_mb: 50,
            socket_timeout_secs: 45,
            item_deadline_secs: 300,
        }
    }
}

impl Limits {
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }

    pub fn max_auto_archive_bytes(&self) -> u64 {
        self.max_auto_archive_mb * 1024 * 1024
    }

    pub fn with_max_playlist_items(mut self, n: usize) -> Self {
        self.max_playlist_items = n;
        self
    }

    pub fn with_max_mix_items(mut self, n: usize) -> Self {
        self.max_mix_items = n;
        self
    }

    pub fn with_max_concurrent_fetches(mut self, n: usize) -> Self {
        self.max_concurrent_fetches = n;
        self
    }
}

/// Rendering boundary towards the host UI. Implementations must be cheap;
/// the pipeline calls these from the hot download loop.
pub trait ProgressSink: Send + Sync {
    /// 0–100, monotonic within one operation
    fn render_progress(&self, percent: u8);
    /// Human-readable status line
    fn render_message(&self, text: &str);
}

/// Sink that discards everything (tests, headless batch runs)
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn render_progress(&self, _percent: u8) {}
    fn render_message(&self, _text: &str) {}
}
