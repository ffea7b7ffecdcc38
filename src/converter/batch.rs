// Batch orchestration - sequential fetches over one collection
//
// Strictly one item at a time; parallel fan-out would blow the global
// concurrency ceiling and amplify upstream rate limiting. A failed item
// never aborts the batch.

use std::path::PathBuf;
use std::sync::Arc;

use super::models::{FetchOutcome, NullProgress, ProgressSink};
use super::pipeline::AudioFetchPipeline;

/// Aggregated result of one batch run. `succeeded` keeps the input order
/// minus failures.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<(PathBuf, String)>,
    pub failed: Vec<String>,
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

pub struct BatchOrchestrator {
    pipeline: Arc<AudioFetchPipeline>,
}

impl BatchOrchestrator {
    pub fn new(pipeline: Arc<AudioFetchPipeline>) -> Self {
        Self { pipeline }
    }

    /// Fetch every (url, title) pair in order, accumulating successes and
    /// failure reasons
    pub async fn fetch_all(
        &self,
        items: &[(String, String)],
        sink: &dyn ProgressSink,
    ) -> BatchReport {
        let total = items.len();
        let mut report = BatchReport::default();

        for (index, (url, title)) in items.iter().enumerate() {
            sink.render_message(&format!(
                "Video {}/{}: {}...",
                index + 1,
                total,
                truncate(title, 40)
            ));

            // Per-item byte progress stays internal; the batch reports
            // completed/total
            let outcome = self.pipeline.fetch(url, &NullProgress).await;

            match outcome {
                FetchOutcome::Success { local_path, title: resolved } => {
                    sink.render_message(&format!("✅ Done: {}...", truncate(&resolved, 40)));
                    report.succeeded.push((local_path, resolved));
                }
                FetchOutcome::Failure { reason } => {
                    eprintln!("[Batch] ✗ '{}' failed: {}", title, reason);
                    sink.render_message(&format!("❌ Failed: {}...", truncate(title, 40)));
                    report.failed.push(format!("{}: {}", title, reason));
                }
            }

            let completed = index + 1;
            sink.render_progress(((completed * 100) / total.max(1)) as u8);
        }

        eprintln!(
            "[Batch] Finished: {} succeeded, {} failed of {}",
            report.succeeded.len(),
            report.failed.len(),
            total
        );
        report
    }
}
