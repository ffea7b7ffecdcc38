// yt-dlp MediaExtractor
//
// Drives yt-dlp either as the Python module (preferred when installed —
// tracks upstream faster) or as the native binary found in common install
// locations. Metadata goes through --dump-json / --dump-single-json;
// downloads stream progress lines over stdout.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::path::Path;
use std::process::Stdio;
use std::process::Command as StdCommand;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command as TokioCommand;
use tokio::time::{timeout, Duration as TokioDuration};

use super::diagnostics::FailureKind;
use super::traits::{
    DownloadRequest, ExtractError, ItemInfo, ListingEntry, ListingInfo, MediaExtractor,
    ProgressEvent, ProgressFn, ResolveOptions,
};
use crate::converter::utils::parse_size;

/// How yt-dlp is invoked on this host
#[derive(Debug, Clone)]
enum Launcher {
    /// `python3 -m yt_dlp`
    PythonModule(String),
    /// Native binary
    Binary(String),
}

impl Launcher {
    fn command(&self) -> (String, Vec<String>) {
        match self {
            Self::PythonModule(python) => {
                (python.clone(), vec!["-m".to_string(), "yt_dlp".to_string()])
            }
            Self::Binary(path) => (path.clone(), Vec::new()),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::PythonModule(python) => format!("{} -m yt_dlp", python),
            Self::Binary(path) => path.clone(),
        }
    }
}

pub(crate) fn python_cmd() -> String {
    // Allow overriding python interpreter (e.g. venv) to avoid Homebrew PEP 668 limitations.
    // Example: export YTDLP_PYTHON="/path/to/venv/bin/python"
    std::env::var("YTDLP_PYTHON").unwrap_or_else(|_| "python3".to_string())
}

pub(crate) fn python_has_module(module: &str) -> bool {
    let code = format!("import {}", module);
    let py = python_cmd();
    match StdCommand::new(&py).args(["-c", &code]).output() {
        Ok(out) => out.status.success(),
        Err(_) => false,
    }
}

/// Find yt-dlp binary in common paths
fn find_ytdlp() -> String {
    let common_paths = vec![
        "/opt/homebrew/bin/yt-dlp", // Homebrew on Apple Silicon
        "/usr/local/bin/yt-dlp",    // Homebrew on Intel Mac
        "/usr/bin/yt-dlp",          // System installation
        "yt-dlp",                   // In PATH
    ];

    for path in common_paths {
        if std::path::Path::new(path).exists() {
            return path.to_string();
        }
    }

    // Try to find via `which`
    if let Ok(output) = StdCommand::new("which").arg("yt-dlp").output() {
        if output.status.success() {
            if let Ok(path) = String::from_utf8(output.stdout) {
                let trimmed = path.trim();
                if !trimmed.is_empty() {
                    return trimmed.to_string();
                }
            }
        }
    }

    "yt-dlp".to_string()
}

/// Parse a yt-dlp progress line like:
/// [download]   6.2% of ~ 343.72MiB at  420.30KiB/s ETA 12:32 (frag 29/454)
pub fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    lazy_static! {
        static ref PROGRESS_RE: Regex = Regex::new(
            r"\[download\]\s+(\d+\.?\d*)%\s+of\s+(~?\s*[\d.]+\s*\w+)(?:\s+at\s+([\d.]+\s*\w+/s))?(?:\s+ETA\s+(\S+))?"
        ).unwrap();
        static ref DEST_RE: Regex = Regex::new(r"\[download\]\s+Destination:\s+(.+)").unwrap();
        static ref EXTRACT_RE: Regex = Regex::new(r"\[ExtractAudio\]\s+Destination").unwrap();
        static ref ALREADY_RE: Regex = Regex::new(r"has already been downloaded").unwrap();
    }

    if let Some(caps) = PROGRESS_RE.captures(line) {
        let percent_str = caps.get(1)?.as_str().to_string();
        let size = caps.get(2).map(|m| m.as_str()).unwrap_or("?");
        let speed = caps.get(3).map(|m| m.as_str()).unwrap_or("?");
        let eta = caps.get(4).map(|m| m.as_str()).unwrap_or("");

        let total_bytes = parse_size(size);
        let downloaded_bytes = match (total_bytes, percent_str.parse::<f64>().ok()) {
            (Some(total), Some(p)) => Some((total as f64 * p / 100.0) as u64),
            _ => None,
        };

        let status = if eta.is_empty() {
            format!("⬇️ {}% of {} @ {}", percent_str, size.trim(), speed)
        } else {
            format!("⬇️ {}% of {} @ {} ETA {}", percent_str, size.trim(), speed, eta)
        };

        return Some(ProgressEvent {
            downloaded_bytes,
            total_bytes,
            percent_str: Some(percent_str),
            status,
        });
    }

    if let Some(caps) = DEST_RE.captures(line) {
        let filename = caps.get(1).map(|m| m.as_str()).unwrap_or("file");
        let short_name: String = filename
            .split('/')
            .next_back()
            .unwrap_or(filename)
            .chars()
            .take(50)
            .collect();
        return Some(ProgressEvent {
            downloaded_bytes: None,
            total_bytes: None,
            percent_str: Some("0".to_string()),
            status: format!("📥 Starting: {}...", short_name),
        });
    }

    if EXTRACT_RE.is_match(line) {
        return Some(ProgressEvent {
            downloaded_bytes: None,
            total_bytes: None,
            percent_str: Some("99".to_string()),
            status: "🔄 Extracting audio...".to_string(),
        });
    }

    if ALREADY_RE.is_match(line) {
        return Some(ProgressEvent {
            downloaded_bytes: None,
            total_bytes: None,
            percent_str: Some("99".to_string()),
            status: "✅ File already downloaded".to_string(),
        });
    }

    None
}

/// yt-dlp based extractor
pub struct YtDlpExtractor {
    launcher: Launcher,
}

impl YtDlpExtractor {
    pub fn new() -> Self {
        // Python module preferred when installed; binary otherwise
        let launcher = if python_has_module("yt_dlp") {
            Launcher::PythonModule(python_cmd())
        } else {
            Launcher::Binary(find_ytdlp())
        };
        eprintln!("[YtDlp] Using launcher: {}", launcher.describe());
        Self { launcher }
    }

    fn is_youtube(url: &str) -> bool {
        let lower = url.to_lowercase();
        lower.contains("youtube.com") || lower.contains("youtu.be")
    }

    fn client_args(url: &str, clients: &[String], extra: &str) -> Vec<String> {
        if !Self::is_youtube(url) || clients.is_empty() {
            return Vec::new();
        }
        let mut value = format!("youtube:player_client={}", clients.join(","));
        if !extra.is_empty() {
            value.push(';');
            value.push_str(extra);
        }
        vec!["--extractor-args".to_string(), value]
    }

    fn build_probe_args(&self, url: &str, opts: &ResolveOptions) -> Vec<String> {
        let mut args = vec![
            "--dump-json".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--socket-timeout".to_string(),
            opts.socket_timeout_secs.to_string(),
            "--retries".to_string(),
            "2".to_string(),
        ];
        args.extend(Self::client_args(url, &opts.player_clients, ""));
        args.push(url.to_string());
        args
    }

    fn build_listing_args(&self, url: &str, opts: &ResolveOptions) -> Vec<String> {
        let mut args = vec![
            "--dump-single-json".to_string(),
            "--flat-playlist".to_string(),
            "--no-warnings".to_string(),
            "--ignore-errors".to_string(),
            "--socket-timeout".to_string(),
            opts.socket_timeout_secs.to_string(),
        ];
        if let Some(limit) = opts.collection_limit {
            args.push("--playlist-end".to_string());
            args.push(limit.to_string());
        }
        // Listing never needs stream manifests
        args.extend(Self::client_args(url, &opts.player_clients, "skip=dash,hls"));
        args.push(url.to_string());
        args
    }

    fn build_download_args(
        &self,
        url: &str,
        request: &DownloadRequest,
        workspace: &Path,
    ) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            request.format_selector.clone(),
            "--extract-audio".to_string(),
            "--audio-format".to_string(),
            "mp3".to_string(),
            "--audio-quality".to_string(),
            "0".to_string(),
            "--no-playlist".to_string(),
            "--newline".to_string(),
            "--socket-timeout".to_string(),
            request.socket_timeout_secs.to_string(),
            "--retries".to_string(),
            "5".to_string(),
            "--fragment-retries".to_string(),
            "5".to_string(),
            "--http-chunk-size".to_string(),
            "10485760".to_string(),
            "-P".to_string(),
            workspace.to_string_lossy().to_string(),
            "-o".to_string(),
            "%(title)s.%(ext)s".to_string(),
        ];
        // missing_pot keeps formats visible that would otherwise be hidden
        // behind a challenge token
        args.extend(Self::client_args(url, &request.player_clients, "formats=missing_pot"));
        args.push(url.to_string());
        args
    }

    async fn run_json(
        &self,
        args: Vec<String>,
        timeout_secs: u64,
    ) -> Result<serde_json::Value, ExtractError> {
        let (program, mut full_args) = self.launcher.command();
        full_args.extend(args);

        let output = crate::converter::utils::run_output_with_timeout(
            &program, full_args, timeout_secs,
        )
        .await
        .map_err(|e| {
            if e.contains("Timed out") {
                ExtractError::timeout(e)
            } else {
                ExtractError::tool_missing(e)
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::from_output(stderr.to_string()));
        }

        let json_str = String::from_utf8_lossy(&output.stdout);
        serde_json::from_str(&json_str)
            .map_err(|e| ExtractError::from_output(format!("Invalid JSON: {}", e)))
    }

    fn parse_item(json: &serde_json::Value) -> ItemInfo {
        ItemInfo {
            id: json["id"].as_str().unwrap_or("unknown").to_string(),
            title: json["title"].as_str().unwrap_or("Unknown").to_string(),
            uploader: json["uploader"]
                .as_str()
                .or_else(|| json["channel"].as_str())
                .unwrap_or("Unknown")
                .to_string(),
            duration_seconds: json["duration"].as_f64().unwrap_or(0.0) as u64,
            webpage_url: json["webpage_url"].as_str().unwrap_or("").to_string(),
            view_count: json["view_count"].as_u64(),
            thumbnail: json["thumbnail"].as_str().unwrap_or("").to_string(),
        }
    }

    fn parse_listing(json: &serde_json::Value) -> ListingInfo {
        let is_playlist = json["_type"].as_str() == Some("playlist");

        if is_playlist {
            let entries = json["entries"]
                .as_array()
                .map(|arr| {
                    arr.iter()
                        .enumerate()
                        // Dead entries (deleted/region-locked videos) come
                        // back as null or without an id
                        .filter(|(_, e)| e.is_object() && e["id"].as_str().is_some())
                        .map(|(i, e)| ListingEntry {
                            id: e["id"].as_str().unwrap_or("").to_string(),
                            title: e["title"]
                                .as_str()
                                .map(|t| t.to_string())
                                .unwrap_or_else(|| format!("Item {}", i + 1)),
                            uploader: e["uploader"]
                                .as_str()
                                .or_else(|| e["channel"].as_str())
                                .unwrap_or("Unknown")
                                .to_string(),
                            duration_seconds: e["duration"].as_f64().unwrap_or(0.0) as u64,
                        })
                        .collect()
                })
                .unwrap_or_default();

            ListingInfo::Collection {
                title: json["title"]
                    .as_str()
                    .or_else(|| json["playlist_title"].as_str())
                    .unwrap_or("Unknown")
                    .to_string(),
                uploader: json["uploader"]
                    .as_str()
                    .or_else(|| json["channel"].as_str())
                    .or_else(|| json["uploader_id"].as_str())
                    .unwrap_or("Unknown")
                    .to_string(),
                entries,
            }
        } else {
            ListingInfo::SingleItem(Self::parse_item(json))
        }
    }
}

impl Default for YtDlpExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaExtractor for YtDlpExtractor {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    fn is_available(&self) -> bool {
        match &self.launcher {
            Launcher::PythonModule(_) => python_has_module("yt_dlp"),
            Launcher::Binary(path) => match StdCommand::new(path).arg("--version").output() {
                Ok(out) => out.status.success(),
                Err(_) => false,
            },
        }
    }

    async fn probe(&self, url: &str, opts: &ResolveOptions) -> Result<ItemInfo, ExtractError> {
        let args = self.build_probe_args(url, opts);
        // Leave head-room over the socket timeout for process startup
        let json = self.run_json(args, opts.socket_timeout_secs + 15).await?;
        Ok(Self::parse_item(&json))
    }

    async fn probe_collection(
        &self,
        url: &str,
        opts: &ResolveOptions,
    ) -> Result<ListingInfo, ExtractError> {
        let args = self.build_listing_args(url, opts);
        let json = self.run_json(args, opts.socket_timeout_secs + 15).await?;
        Ok(Self::parse_listing(&json))
    }

    async fn download(
        &self,
        url: &str,
        request: &DownloadRequest,
        workspace: &Path,
        progress: ProgressFn<'_>,
    ) -> Result<(), ExtractError> {
        let (program, mut args) = self.launcher.command();
        args.extend(self.build_download_args(url, request, workspace));

        eprintln!(
            "[YtDlp] Download attempt: format='{}' deadline={}s",
            request.format_selector, request.deadline_secs
        );

        let mut child = TokioCommand::new(&program)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ExtractError::tool_missing(format!("Failed to start {}: {}", program, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExtractError::tool_missing("Failed to capture stdout".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExtractError::tool_missing("Failed to capture stderr".to_string()))?;

        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            String::from_utf8_lossy(&buf).to_string()
        });

        let max_total = request.max_total_bytes;
        let streamed = timeout(TokioDuration::from_secs(request.deadline_secs), async {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(event) = parse_progress_line(&line) {
                    if let (Some(total), Some(cap)) = (event.total_bytes, max_total) {
                        if total > cap {
                            return Err(ExtractError {
                                kind: FailureKind::TooLarge,
                                message: format!(
                                    "File too large ({:.1}MB). Maximum: {:.0}MB",
                                    total as f64 / 1_048_576.0,
                                    cap as f64 / 1_048_576.0
                                ),
                            });
                        }
                    }
                    progress(event);
                }
            }
            child
                .wait()
                .await
                .map_err(|e| ExtractError::tool_missing(format!("Process error: {}", e)))
        })
        .await;

        match streamed {
            Err(_) => {
                let _ = child.kill().await;
                stderr_task.abort();
                Err(ExtractError::timeout(format!(
                    "Download timed out after {}s",
                    request.deadline_secs
                )))
            }
            Ok(Err(e)) => {
                // Size abort: stop the transfer, nothing to keep
                let _ = child.kill().await;
                stderr_task.abort();
                Err(e)
            }
            Ok(Ok(status)) => {
                let stderr_output = stderr_task.await.unwrap_or_default();
                if status.success() {
                    Ok(())
                } else {
                    Err(ExtractError::from_output(stderr_output))
                }
            }
        }
    }
}
