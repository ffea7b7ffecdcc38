// Extractor collaborators - resolve URLs to metadata and downloadable streams

pub mod cli;
pub mod diagnostics;
pub mod traits;

pub use cli::YtDlpExtractor;
pub use diagnostics::{classify_failure, FailureKind};
pub use traits::{
    DownloadRequest, ExtractError, ItemInfo, ListingEntry, ListingInfo, MediaExtractor,
    ProgressEvent, ProgressFn, ResolveOptions,
};
