// Conversion pipeline - core abstraction layer

pub mod batch;
pub mod classifier;
pub mod errors;
pub mod extractors;
pub mod models;
pub mod packager;
pub mod pipeline;
pub mod ratelimit;
pub mod resolver;
pub mod tools;
pub mod transcode;
pub mod utils;

pub use batch::{BatchOrchestrator, BatchReport};
pub use classifier::classify;
pub use errors::{ConvertError, RateLimitRule, ResolveError};
pub use extractors::{MediaExtractor, YtDlpExtractor};
pub use models::{
    CollectionInfo, CollectionKind, FetchOutcome, Limits, ListRejection, MediaMetadata,
    NullProgress, ProgressSink, RejectedListKind, UrlIntent, UrlKind,
};
pub use packager::Packager;
pub use pipeline::{AudioFetchPipeline, FormatCandidate, FORMAT_CANDIDATES};
pub use ratelimit::{Clock, RateLimiter, SystemClock};
pub use resolver::StreamResolver;
pub use tools::{diagnose_environment, ToolInfo, ToolManager, ToolType};
pub use transcode::{FfmpegTranscoder, Transcoder};
