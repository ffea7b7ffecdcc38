// Session facade - one user interaction from raw URL to delivery
//
// The ambient state the original service kept in its UI framework's
// session store is explicit here: callers hold a Converter (process-wide
// collaborators + tracking state) and pass a SessionContext per request.

use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

use crate::converter::batch::BatchOrchestrator;
use crate::converter::classifier::classify;
use crate::converter::errors::ConvertError;
use crate::converter::extractors::{classify_failure, FailureKind, MediaExtractor, YtDlpExtractor};
use crate::converter::models::{
    CollectionKind, FetchOutcome, Limits, ProgressSink, UrlIntent, UrlKind,
};
use crate::converter::packager::Packager;
use crate::converter::pipeline::AudioFetchPipeline;
use crate::converter::ratelimit::RateLimiter;
use crate::converter::resolver::StreamResolver;
use crate::converter::transcode::{FfmpegTranscoder, Transcoder};
use crate::converter::utils::{clean_filename, format_size_mb};

/// Identifies who is asking, for rate limiting
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub client_id: String,
    pub session_id: String,
}

impl SessionContext {
    pub fn new(client_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            session_id: session_id.into(),
        }
    }
}

/// What one conversion produced. The caller owns the payload and is
/// responsible for cleanup.
#[derive(Debug)]
pub enum Delivery {
    /// One finished track on disk
    Track {
        path: PathBuf,
        suggested_filename: String,
        size_bytes: u64,
        /// Single tracks are always safe to hand to the auto-delivery path
        auto_deliverable: bool,
    },
    /// Several tracks bundled into one archive
    Archive {
        data: Vec<u8>,
        suggested_filename: String,
        /// Large archives must go through explicit user-initiated delivery
        auto_deliverable: bool,
        succeeded: usize,
        failed: Vec<String>,
    },
}

/// Map a pipeline failure string back onto the caller-facing taxonomy
fn map_fetch_failure(reason: String) -> ConvertError {
    if reason.contains("too long") {
        return ConvertError::ResourceExceeded(reason);
    }
    match classify_failure(&reason) {
        FailureKind::Timeout => ConvertError::Timeout(reason),
        FailureKind::TooLarge => ConvertError::ResourceExceeded(reason),
        FailureKind::FormatUnavailable | FailureKind::StaticContentOnly => {
            ConvertError::FormatUnavailable(reason)
        }
        _ => ConvertError::Extraction(reason),
    }
}

pub struct Converter {
    limits: Limits,
    rate: RateLimiter,
    extractor: Arc<dyn MediaExtractor>,
    transcoder: Arc<dyn Transcoder>,
    /// Owns every delivered track until the process ends or the caller
    /// moves them
    workspace: TempDir,
}

impl Converter {
    /// Production wiring: yt-dlp + ffmpeg with default limits
    pub fn with_defaults() -> Result<Self, ConvertError> {
        Self::new(
            Arc::new(YtDlpExtractor::new()),
            Arc::new(FfmpegTranscoder::new()),
            Limits::default(),
        )
    }

    pub fn new(
        extractor: Arc<dyn MediaExtractor>,
        transcoder: Arc<dyn Transcoder>,
        limits: Limits,
    ) -> Result<Self, ConvertError> {
        let workspace = tempfile::tempdir()
            .map_err(|e| ConvertError::Extraction(format!("Could not create workspace: {}", e)))?;
        Ok(Self {
            rate: RateLimiter::new(limits.clone()),
            limits,
            extractor,
            transcoder,
            workspace,
        })
    }

    fn pipeline(&self) -> AudioFetchPipeline {
        AudioFetchPipeline::new(
            Arc::clone(&self.extractor),
            Arc::clone(&self.transcoder),
            self.limits.clone(),
            self.rate.active_counter(),
            self.workspace.path().to_path_buf(),
        )
    }

    /// Classify without side effects; lets a caller show intent-specific
    /// messaging before committing to a download
    pub fn classify_url(&self, raw_url: &str) -> Result<UrlIntent, ConvertError> {
        classify(raw_url)
    }

    /// Drop tracking entries idle past the retention horizon
    pub fn sweep_tracking(&self) {
        self.rate.sweep();
    }

    /// Run one conversion: classify, rate-limit, fetch (or batch + package)
    pub async fn convert(
        &self,
        ctx: &SessionContext,
        raw_url: &str,
        sink: &dyn ProgressSink,
    ) -> Result<Delivery, ConvertError> {
        // Periodic hygiene rides along with regular traffic
        self.rate.sweep();

        let intent = classify(raw_url)?;

        match intent.kind.clone() {
            UrlKind::UnsupportedList(rejection) => Err(ConvertError::Unsupported(rejection)),
            UrlKind::Video => self.convert_single(ctx, &intent, sink).await,
            UrlKind::Playlist => {
                self.convert_collection(ctx, &intent, CollectionKind::Playlist, sink)
                    .await
            }
            UrlKind::Mix => {
                self.convert_collection(ctx, &intent, CollectionKind::Mix, sink)
                    .await
            }
        }
    }

    async fn convert_single(
        &self,
        ctx: &SessionContext,
        intent: &UrlIntent,
        sink: &dyn ProgressSink,
    ) -> Result<Delivery, ConvertError> {
        // Rate rules run before any resource is allocated
        self.rate
            .check(&ctx.client_id, &ctx.session_id)
            .map_err(ConvertError::RateLimited)?;
        self.rate.record(&ctx.client_id, &ctx.session_id);

        sink.render_message("Starting download...");

        match self.pipeline().fetch(&intent.normalized_url, sink).await {
            FetchOutcome::Success { local_path, title } => {
                let size_bytes = std::fs::metadata(&local_path).map(|m| m.len()).unwrap_or(0);
                sink.render_message(&format!(
                    "✅ Download complete! 📊 File size: {}",
                    format_size_mb(size_bytes)
                ));
                Ok(Delivery::Track {
                    suggested_filename: clean_filename(&format!("{}.mp3", title)),
                    path: local_path,
                    size_bytes,
                    auto_deliverable: true,
                })
            }
            FetchOutcome::Failure { reason } => Err(map_fetch_failure(reason)),
        }
    }

    async fn convert_collection(
        &self,
        ctx: &SessionContext,
        intent: &UrlIntent,
        kind: CollectionKind,
        sink: &dyn ProgressSink,
    ) -> Result<Delivery, ConvertError> {
        let label = match kind {
            CollectionKind::Playlist => "playlist",
            CollectionKind::Mix => "mix",
        };
        sink.render_message(&format!("Loading {}...", label));

        let resolver = StreamResolver::new(Arc::clone(&self.extractor), self.limits.clone());
        let collection = resolver
            .resolve_collection(&intent.normalized_url, kind)
            .await?;

        sink.render_message(&format!(
            "Loaded: {} ({} items)",
            collection.title,
            collection.items.len()
        ));
        if let Some(note) = &collection.note {
            sink.render_message(&format!("ℹ️ {}", note));
        }

        self.rate
            .check(&ctx.client_id, &ctx.session_id)
            .map_err(ConvertError::RateLimited)?;
        self.rate.record(&ctx.client_id, &ctx.session_id);

        let items: Vec<(String, String)> = collection
            .items
            .iter()
            .map(|m| (m.source_url.clone(), m.title.clone()))
            .collect();

        let batch = BatchOrchestrator::new(Arc::new(self.pipeline()));
        let report = batch.fetch_all(&items, sink).await;

        if report.succeeded.is_empty() {
            return Err(ConvertError::Extraction("All downloads failed".to_string()));
        }

        sink.render_message("Creating archive...");
        let succeeded = report.succeeded.len();
        let data = Packager::new(&self.limits).package(&report.succeeded)?;

        let mut base = clean_filename(&collection.title);
        if base.is_empty() {
            base = format!("{}_download", label);
        }

        let auto_deliverable = (data.len() as u64) <= self.limits.max_auto_archive_bytes();
        if !auto_deliverable {
            sink.render_message(&format!(
                "⚠️ Archive too large for automatic delivery ({}); use the explicit download",
                format_size_mb(data.len() as u64)
            ));
        }
        sink.render_message(&format!(
            "📦 Archive ready: {} | {} of {} items",
            format_size_mb(data.len() as u64),
            succeeded,
            items.len()
        ));

        Ok(Delivery::Archive {
            data,
            suggested_filename: format!("{}.zip", base),
            auto_deliverable,
            succeeded,
            failed: report.failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::errors::RateLimitRule;
    use crate::converter::extractors::{
        DownloadRequest, ExtractError, ItemInfo, ListingEntry, ListingInfo, ProgressFn,
        ResolveOptions,
    };
    use crate::converter::models::NullProgress;
    use crate::converter::transcode::TranscodeError;
    use async_trait::async_trait;
    use std::io::Cursor;
    use std::path::Path;

    /// End-to-end fake: every video URL downloads successfully; collection
    /// probes return a fixed three-entry playlist
    struct HappyExtractor;

    fn url_video_id(url: &str) -> String {
        url.split("v=")
            .nth(1)
            .map(|rest| rest.chars().take(11).collect())
            .unwrap_or_else(|| "unknown-vid".to_string())
    }

    #[async_trait]
    impl MediaExtractor for HappyExtractor {
        fn name(&self) -> &'static str {
            "happy"
        }

        fn is_available(&self) -> bool {
            true
        }

        async fn probe(&self, url: &str, _opts: &ResolveOptions) -> Result<ItemInfo, ExtractError> {
            let id = url_video_id(url);
            Ok(ItemInfo {
                title: format!("Track {}", id),
                id,
                uploader: "Channel".to_string(),
                duration_seconds: 200,
                webpage_url: url.to_string(),
                view_count: Some(42),
                thumbnail: String::new(),
            })
        }

        async fn probe_collection(
            &self,
            _url: &str,
            _opts: &ResolveOptions,
        ) -> Result<ListingInfo, ExtractError> {
            Ok(ListingInfo::Collection {
                title: "Road Trip Songs".to_string(),
                uploader: "Someone".to_string(),
                entries: vec![
                    ListingEntry {
                        id: "aaaaaaaaaaa".to_string(),
                        title: "One".to_string(),
                        uploader: "Ch".to_string(),
                        duration_seconds: 100,
                    },
                    ListingEntry {
                        id: "bbbbbbbbbbb".to_string(),
                        title: "Two".to_string(),
                        uploader: "Ch".to_string(),
                        duration_seconds: 100,
                    },
                    ListingEntry {
                        id: "ccccccccccc".to_string(),
                        title: "Three".to_string(),
                        uploader: "Ch".to_string(),
                        duration_seconds: 100,
                    },
                ],
            })
        }

        async fn download(
            &self,
            url: &str,
            _request: &DownloadRequest,
            workspace: &Path,
            _progress: ProgressFn<'_>,
        ) -> Result<(), ExtractError> {
            let id = url_video_id(url);
            std::fs::write(workspace.join(format!("Track {}.mp3", id)), b"audio").unwrap();
            Ok(())
        }
    }

    struct NoopTranscoder;

    #[async_trait]
    impl Transcoder for NoopTranscoder {
        fn name(&self) -> &'static str {
            "noop"
        }
        fn is_available(&self) -> bool {
            true
        }
        async fn transcode(
            &self,
            _input: &Path,
            _codec: &str,
            _bitrate: &str,
        ) -> Result<PathBuf, TranscodeError> {
            Err(TranscodeError("noop".to_string()))
        }
    }

    fn converter() -> Converter {
        Converter::new(
            Arc::new(HappyExtractor),
            Arc::new(NoopTranscoder),
            Limits::default(),
        )
        .unwrap()
    }

    fn ctx(session: &str) -> SessionContext {
        SessionContext::new("1.2.3.4", session)
    }

    #[tokio::test]
    async fn test_single_video_end_to_end() {
        let c = converter();

        let delivery = c
            .convert(&ctx("s1"), "https://youtu.be/dQw4w9WgXcQ", &NullProgress)
            .await
            .expect("converts");

        match delivery {
            Delivery::Track {
                path,
                suggested_filename,
                size_bytes,
                auto_deliverable,
            } => {
                assert!(path.exists());
                assert!(size_bytes > 0);
                assert_eq!(suggested_filename, "Track dQw4w9WgXcQ.mp3");
                assert!(auto_deliverable);
            }
            other => panic!("expected track, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_second_request_hits_spacing_rule() {
        let c = converter();

        c.convert(&ctx("s1"), "https://youtu.be/dQw4w9WgXcQ", &NullProgress)
            .await
            .expect("first converts");

        let err = c
            .convert(&ctx("s1"), "https://youtu.be/aaaaaaaaaaa", &NullProgress)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConvertError::RateLimited(RateLimitRule::MinInterval { .. })
        ));
    }

    #[tokio::test]
    async fn test_unsupported_list_is_surfaced_before_any_work() {
        let c = converter();

        let err = c
            .convert(
                &ctx("s1"),
                "https://www.youtube.com/playlist?list=WL",
                &NullProgress,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_invalid_url_is_surfaced() {
        let c = converter();
        let err = c
            .convert(&ctx("s1"), "https://example.com/watch?v=x", &NullProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::Validation(_)));
    }

    #[tokio::test]
    async fn test_playlist_end_to_end_builds_ordered_archive() {
        let c = converter();

        let delivery = c
            .convert(
                &ctx("s1"),
                "https://www.youtube.com/playlist?list=PLxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx",
                &NullProgress,
            )
            .await
            .expect("converts");

        match delivery {
            Delivery::Archive {
                data,
                suggested_filename,
                auto_deliverable,
                succeeded,
                failed,
            } => {
                assert_eq!(suggested_filename, "Road Trip Songs.zip");
                assert!(auto_deliverable);
                assert_eq!(succeeded, 3);
                assert!(failed.is_empty());

                let mut archive = zip::ZipArchive::new(Cursor::new(data)).unwrap();
                let names: Vec<String> = (0..archive.len())
                    .map(|i| archive.by_index(i).unwrap().name().to_string())
                    .collect();
                assert_eq!(
                    names,
                    vec![
                        "01_Track aaaaaaaaaaa.mp3",
                        "02_Track bbbbbbbbbbb.mp3",
                        "03_Track ccccccccccc.mp3"
                    ]
                );
            }
            other => panic!("expected archive, got {:?}", other),
        }
    }

    #[test]
    fn test_map_fetch_failure() {
        assert!(matches!(
            map_fetch_failure("Timed out after 300s".to_string()),
            ConvertError::Timeout(_)
        ));
        assert!(matches!(
            map_fetch_failure("Video too long (7200s, max 3600s)".to_string()),
            ConvertError::ResourceExceeded(_)
        ));
        assert!(matches!(
            map_fetch_failure("File too large (120.0MB). Maximum: 100MB".to_string()),
            ConvertError::ResourceExceeded(_)
        ));
        assert!(matches!(
            map_fetch_failure("Requested format is not available".to_string()),
            ConvertError::FormatUnavailable(_)
        ));
        assert!(matches!(
            map_fetch_failure("something odd".to_string()),
            ConvertError::Extraction(_)
        ));
    }
}
