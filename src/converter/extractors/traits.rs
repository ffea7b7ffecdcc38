// MediaExtractor trait and common types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use super::diagnostics::{classify_failure, FailureKind};

/// Error from the extractor collaborator, carrying its retry classification
#[derive(Debug, Clone)]
pub struct ExtractError {
    pub kind: FailureKind,
    pub message: String,
}

impl ExtractError {
    /// Build from a raw error string, classifying it in the process
    pub fn from_output(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: classify_failure(&message),
            message,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Timeout,
            message: message.into(),
        }
    }

    pub fn tool_missing(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Unknown,
            message: message.into(),
        }
    }
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.description(), self.message)
    }
}

impl std::error::Error for ExtractError {}

/// Options for metadata resolution
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Socket-level timeout handed to the extractor process
    pub socket_timeout_secs: u64,
    /// Player client variants to offer upstream, in order
    pub player_clients: Vec<String>,
    /// Truncate collection listings at this many entries
    pub collection_limit: Option<usize>,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            socket_timeout_secs: 30,
            // Order from stable to "wide" — same list the production
            // deployment converged on
            player_clients: vec![
                "web".to_string(),
                "web_embedded".to_string(),
                "ios".to_string(),
                "tv".to_string(),
                "web_creator".to_string(),
                "android".to_string(),
            ],
            collection_limit: None,
        }
    }
}

impl ResolveOptions {
    pub fn with_collection_limit(mut self, limit: usize) -> Self {
        self.collection_limit = Some(limit);
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.socket_timeout_secs = seconds;
        self
    }

    pub fn with_player_clients(mut self, clients: Vec<String>) -> Self {
        self.player_clients = clients;
        self
    }
}

/// Fully resolved metadata for one item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemInfo {
    pub id: String,
    pub title: String,
    pub uploader: String,
    pub duration_seconds: u64,
    pub webpage_url: String,
    pub view_count: Option<u64>,
    pub thumbnail: String,
}

/// One entry from a flat collection listing. Duration data here is often
/// missing upstream; 0 means unknown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingEntry {
    pub id: String,
    pub title: String,
    pub uploader: String,
    pub duration_seconds: u64,
}

/// What a collection probe actually found
#[derive(Debug, Clone)]
pub enum ListingInfo {
    /// Upstream reported a playlist-like structure
    Collection {
        title: String,
        uploader: String,
        entries: Vec<ListingEntry>,
    },
    /// Upstream reported a bare single item instead of a collection
    SingleItem(ItemInfo),
}

/// One download attempt
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    /// Format selector string for this candidate strategy
    pub format_selector: String,
    pub player_clients: Vec<String>,
    pub socket_timeout_secs: u64,
    /// Remaining time budget for this attempt
    pub deadline_secs: u64,
    /// Abort as soon as the reported total exceeds this
    pub max_total_bytes: Option<u64>,
}

/// Progress callback payload. Field availability depends on what the
/// upstream feed reports: byte counts when known, otherwise a raw percent
/// string parsed from the progress line.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub downloaded_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
    pub percent_str: Option<String>,
    pub status: String,
}

pub type ProgressFn<'a> = &'a (dyn Fn(ProgressEvent) + Send + Sync);

/// Trait for media extractors
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Name of the extractor (for logging)
    fn name(&self) -> &'static str;

    /// Check if this extractor is usable on this host
    fn is_available(&self) -> bool;

    /// Resolve full metadata for a single item
    async fn probe(&self, url: &str, opts: &ResolveOptions) -> Result<ItemInfo, ExtractError>;

    /// Resolve a flat collection listing (lighter operation, no per-item
    /// stream resolution)
    async fn probe_collection(
        &self,
        url: &str,
        opts: &ResolveOptions,
    ) -> Result<ListingInfo, ExtractError>;

    /// Download into `workspace` with progress reporting. Produced files
    /// stay in the workspace; the caller scans for them afterwards.
    async fn download(
        &self,
        url: &str,
        request: &DownloadRequest,
        workspace: &Path,
        progress: ProgressFn<'_>,
    ) -> Result<(), ExtractError>;
}
