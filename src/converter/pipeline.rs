// Audio fetch pipeline - the candidate retry loop
//
// One fetch() call drives an ordered list of stream-selection strategies
// against the extractor until one yields a usable target-format file.
// Expected failure classes advance to the next candidate; a rescue
// conversion of whatever container file survived runs at most once per
// call; the shared active-fetch counter is released exactly once on every
// exit path.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::extractors::{
    DownloadRequest, FailureKind, MediaExtractor, ProgressEvent, ResolveOptions,
};
use super::models::{FetchOutcome, Limits, ProgressSink};
use super::transcode::Transcoder;

/// One named stream-selection policy
#[derive(Debug, Clone, Copy)]
pub struct FormatCandidate {
    pub name: &'static str,
    pub selector: &'static str,
}

/// Fallback order: strict audio-only first, generic "anything" last.
/// The selectors are the ones the production deployment converged on.
pub const FORMAT_CANDIDATES: [FormatCandidate; 6] = [
    FormatCandidate {
        name: "audio-only-strict",
        selector: "bestaudio[vcodec=none][acodec!=none]/bestaudio",
    },
    FormatCandidate {
        name: "m4a-preferred",
        selector: "bestaudio[ext=m4a]/bestaudio",
    },
    FormatCandidate {
        name: "webm-preferred",
        selector: "bestaudio[ext=webm]/bestaudio",
    },
    FormatCandidate {
        name: "hls-audio",
        selector: "bestaudio[proto*=m3u8]/bestaudio",
    },
    FormatCandidate {
        name: "best-audio",
        selector: "bestaudio/best",
    },
    FormatCandidate {
        name: "best-anything",
        selector: "best",
    },
];

/// Container extensions worth rescuing when no target-format output exists
const RESCUE_EXTENSIONS: &[&str] = &["mp4", "mkv", "ts", "m4a", "webm", "ogg", "aac", "wav", "m4b"];

/// Releases one slot of the shared active-fetch counter on drop, so the
/// release happens exactly once whatever path leaves fetch().
struct ActiveFetchGuard {
    counter: Arc<AtomicUsize>,
}

impl Drop for ActiveFetchGuard {
    fn drop(&mut self) {
        let _ = self
            .counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                Some(v.saturating_sub(1))
            });
    }
}

pub struct AudioFetchPipeline {
    extractor: Arc<dyn MediaExtractor>,
    transcoder: Arc<dyn Transcoder>,
    limits: Limits,
    active: Arc<AtomicUsize>,
    /// Caller-owned directory that takes ownership of successful outputs
    output_dir: PathBuf,
}

impl AudioFetchPipeline {
    pub fn new(
        extractor: Arc<dyn MediaExtractor>,
        transcoder: Arc<dyn Transcoder>,
        limits: Limits,
        active: Arc<AtomicUsize>,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            extractor,
            transcoder,
            limits,
            active,
            output_dir,
        }
    }

    /// Fetch one item as MP3. Never returns Success without a file.
    pub async fn fetch(&self, url: &str, sink: &dyn ProgressSink) -> FetchOutcome {
        let _guard = ActiveFetchGuard {
            counter: Arc::clone(&self.active),
        };

        let workspace = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                return FetchOutcome::Failure {
                    reason: format!("Could not create workspace: {}", e),
                }
            }
        };

        let started = Instant::now();
        let deadline = Duration::from_secs(self.limits.item_deadline_secs);
        let last_percent = AtomicU8::new(0);

        let mut resolved_title: Option<String> = None;
        let mut last_error: Option<String> = None;
        let mut rescue_attempted = false;

        for (idx, candidate) in FORMAT_CANDIDATES.iter().enumerate() {
            if started.elapsed() >= deadline {
                return FetchOutcome::Failure {
                    reason: format!(
                        "Timed out after {}s",
                        self.limits.item_deadline_secs
                    ),
                };
            }

            sink.render_message(&format!(
                "🎛️ Strategy {}/{}: {}",
                idx + 1,
                FORMAT_CANDIDATES.len(),
                candidate.name
            ));
            eprintln!(
                "[Pipeline] Candidate {}/{}: {} ({})",
                idx + 1,
                FORMAT_CANDIDATES.len(),
                candidate.name,
                candidate.selector
            );

            // Metadata resolution is part of the candidate unit; the first
            // successful probe is reused by later candidates
            if resolved_title.is_none() {
                let opts = ResolveOptions::default().with_timeout(30);
                match self.extractor.probe(url, &opts).await {
                    Ok(item) => {
                        if item.duration_seconds > self.limits.max_item_duration_secs {
                            return FetchOutcome::Failure {
                                reason: format!(
                                    "Video too long ({}s, max {}s)",
                                    item.duration_seconds, self.limits.max_item_duration_secs
                                ),
                            };
                        }
                        resolved_title = Some(item.title);
                    }
                    Err(e) => {
                        eprintln!("[Pipeline] Probe failed: {}", e);
                        last_error = Some(e.to_string());
                        if e.kind == FailureKind::Timeout {
                            return FetchOutcome::Failure {
                                reason: e.to_string(),
                            };
                        }
                        continue;
                    }
                }
            }

            let remaining = deadline.saturating_sub(started.elapsed());
            let request = DownloadRequest {
                format_selector: candidate.selector.to_string(),
                player_clients: ResolveOptions::default().player_clients,
                socket_timeout_secs: self.limits.socket_timeout_secs,
                deadline_secs: remaining.as_secs().max(1),
                max_total_bytes: Some(self.limits.max_file_size_bytes()),
            };

            let progress = |event: ProgressEvent| {
                if let Some(percent) = percent_from_event(&event) {
                    // Never emit decreasing values within one fetch
                    let prev = last_percent.load(Ordering::SeqCst);
                    if percent > prev {
                        last_percent.store(percent, Ordering::SeqCst);
                        sink.render_progress(percent);
                    }
                }
                sink.render_message(&event.status);
            };

            match self
                .extractor
                .download(url, &request, workspace.path(), &progress)
                .await
            {
                Ok(()) => match self.collect_output(workspace.path(), &mut rescue_attempted).await
                {
                    Ok(path) => {
                        let title = resolved_title.clone().unwrap_or_else(|| {
                            path.file_stem()
                                .map(|s| s.to_string_lossy().to_string())
                                .unwrap_or_else(|| "audio".to_string())
                        });
                        match self.take_ownership(&path) {
                            Ok(final_path) => {
                                sink.render_progress(100);
                                eprintln!(
                                    "[Pipeline] ✓ Success with '{}': {}",
                                    candidate.name,
                                    final_path.display()
                                );
                                return FetchOutcome::Success {
                                    local_path: final_path,
                                    title,
                                };
                            }
                            Err(reason) => {
                                last_error = Some(reason);
                                continue;
                            }
                        }
                    }
                    Err(reason) => {
                        eprintln!("[Pipeline] No usable output: {}", reason);
                        last_error = Some(reason);
                        continue;
                    }
                },
                Err(e) => {
                    eprintln!("[Pipeline] ✗ '{}' failed: {}", candidate.name, e);
                    sink.render_message(&format!("⚠️ {}", e.kind.description()));
                    if e.kind == FailureKind::Timeout {
                        return FetchOutcome::Failure {
                            reason: e.to_string(),
                        };
                    }
                    // Format-missing, static-only, 403/challenge and
                    // everything else: the next selector may still work
                    last_error = Some(e.to_string());
                    continue;
                }
            }
        }

        FetchOutcome::Failure {
            reason: last_error
                .unwrap_or_else(|| "Audio download failed (no suitable formats)".to_string()),
        }
    }

    /// Scan the workspace for target-format output; run the rescue
    /// conversion at most once per call when only container files exist.
    async fn collect_output(
        &self,
        workspace: &Path,
        rescue_attempted: &mut bool,
    ) -> Result<PathBuf, String> {
        let mut mp3s = scan_files(workspace, &["mp3"])?;

        if mp3s.is_empty() && !*rescue_attempted {
            *rescue_attempted = true;
            let mut containers = scan_files(workspace, RESCUE_EXTENSIONS)?;
            if !containers.is_empty() {
                // Largest file wins; name ordering breaks size ties so the
                // choice is deterministic
                containers.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
                let (source, size) = &containers[0];
                eprintln!(
                    "[Pipeline] Rescue conversion of {} ({} bytes)",
                    source.display(),
                    size
                );
                match self.transcoder.transcode(source, "mp3", "320k").await {
                    Ok(output) => {
                        let _ = std::fs::remove_file(source);
                        mp3s.push((output.clone(), file_size(&output)));
                    }
                    Err(e) => {
                        eprintln!("[Pipeline] Rescue conversion failed: {}", e);
                    }
                }
            }
        }

        if mp3s.is_empty() {
            return Err("No MP3 output found after download".to_string());
        }

        // Oversized output is deleted, never returned
        let cap = self.limits.max_file_size_bytes();
        for (path, size) in &mp3s {
            if *size > cap {
                let _ = std::fs::remove_file(path);
                return Err(format!(
                    "File too large ({:.1}MB). Maximum: {}MB",
                    *size as f64 / 1_048_576.0,
                    self.limits.max_file_size_mb
                ));
            }
        }

        // Postprocessors may leave several outputs; the shortest file name
        // is the principal one
        mp3s.sort_by_key(|(path, _)| {
            path.file_name()
                .map(|n| n.to_string_lossy().len())
                .unwrap_or(usize::MAX)
        });
        Ok(mp3s[0].0.clone())
    }

    /// Move the finished file out of the per-fetch workspace into the
    /// caller-owned output directory
    fn take_ownership(&self, path: &Path) -> Result<PathBuf, String> {
        let file_name = path
            .file_name()
            .ok_or_else(|| "Output file has no name".to_string())?;
        let destination = unique_destination(&self.output_dir, Path::new(file_name));

        if std::fs::rename(path, &destination).is_err() {
            // Workspace and output dir may sit on different filesystems
            std::fs::copy(path, &destination)
                .map_err(|e| format!("Could not move output file: {}", e))?;
            let _ = std::fs::remove_file(path);
        }
        Ok(destination)
    }
}

fn percent_from_event(event: &ProgressEvent) -> Option<u8> {
    if let (Some(downloaded), Some(total)) = (event.downloaded_bytes, event.total_bytes) {
        if total > 0 {
            // 100 is reserved for post-processing completion
            return Some(((downloaded * 100 / total) as u8).min(99));
        }
    }
    event
        .percent_str
        .as_deref()
        .and_then(|s| s.trim().trim_end_matches('%').parse::<f64>().ok())
        .map(|p| (p as u8).min(99))
}

fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

fn scan_files(dir: &Path, extensions: &[&str]) -> Result<Vec<(PathBuf, u64)>, String> {
    let entries =
        std::fs::read_dir(dir).map_err(|e| format!("Could not scan workspace: {}", e))?;

    let mut found = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if extensions.contains(&ext.as_str()) {
            found.push((path.clone(), file_size(&path)));
        }
    }
    Ok(found)
}

/// Pick a destination that does not clobber an earlier item with the same
/// title
fn unique_destination(dir: &Path, file_name: &Path) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }

    let stem = file_name
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "audio".to_string());
    let ext = file_name
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_default();

    for n in 1.. {
        let next = if ext.is_empty() {
            dir.join(format!("{} ({})", stem, n))
        } else {
            dir.join(format!("{} ({}).{}", stem, n, ext))
        };
        if !next.exists() {
            return next;
        }
    }
    unreachable!()
}
