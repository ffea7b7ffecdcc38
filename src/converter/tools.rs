// External tool detection and environment diagnostics

use serde::{Deserialize, Serialize};
use std::process::Command;

use super::extractors::cli::{python_cmd, python_has_module};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ToolType {
    YtDlp,
    Ffmpeg,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "yt-dlp",
            ToolType::Ffmpeg => "ffmpeg",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub tool_type: ToolType,
    pub version: Option<String>,
    pub path: Option<String>,
    pub is_available: bool,
}

pub struct ToolManager;

impl ToolManager {
    pub fn new() -> Self {
        Self
    }

    pub fn get_tool_info(&self, tool_type: ToolType) -> ToolInfo {
        let name = tool_type.as_str().to_string();
        let (path, version) = self.detect_tool(&tool_type);

        ToolInfo {
            name,
            tool_type,
            version: version.clone(),
            path: path.clone(),
            is_available: path.is_some(),
        }
    }

    pub fn get_all_tools(&self) -> Vec<ToolInfo> {
        vec![
            self.get_tool_info(ToolType::YtDlp),
            self.get_tool_info(ToolType::Ffmpeg),
        ]
    }

    fn detect_tool(&self, tool_type: &ToolType) -> (Option<String>, Option<String>) {
        let binary_name = tool_type.as_str();

        // 1. Try common paths first
        let common_paths = [
            format!("/opt/homebrew/bin/{}", binary_name),
            format!("/usr/local/bin/{}", binary_name),
            format!("/usr/bin/{}", binary_name),
        ];

        for path in common_paths {
            if std::path::Path::new(&path).exists() {
                let version = self.get_version(&path);
                return (Some(path), version);
            }
        }

        // 2. Try PATH
        if let Ok(output) = Command::new("which").arg(binary_name).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    let version = self.get_version(&path);
                    return (Some(path), version);
                }
            }
        }

        (None, None)
    }

    fn get_version(&self, path: &str) -> Option<String> {
        match Command::new(path).arg("--version").output() {
            Ok(output) if output.status.success() => {
                let out = String::from_utf8_lossy(&output.stdout);
                // ffmpeg prints a banner; the first line is enough
                out.lines().next().map(|l| l.trim().to_string())
            }
            _ => None,
        }
    }
}

impl Default for ToolManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Check the pieces a download actually needs and report what is broken.
/// An empty result means the host looks healthy.
pub fn diagnose_environment() -> Vec<String> {
    let mut issues = Vec::new();
    let manager = ToolManager::new();

    let ytdlp = manager.get_tool_info(ToolType::YtDlp);
    let has_python_module = python_has_module("yt_dlp");
    if !ytdlp.is_available && !has_python_module {
        issues.push(format!(
            "yt-dlp problem: neither the '{}' Python module nor a yt-dlp binary was found",
            python_cmd()
        ));
    }

    let ffmpeg = manager.get_tool_info(ToolType::Ffmpeg);
    if !ffmpeg.is_available {
        issues.push("FFmpeg problem: ffmpeg not installed".to_string());
    }

    // A broken temp mount fails every fetch before the network is touched
    match tempfile::tempdir() {
        Ok(dir) => {
            let probe = dir.path().join("probe.txt");
            if let Err(e) = std::fs::write(&probe, b"probe") {
                issues.push(format!("Temp directory problem: {}", e));
            } else {
                let _ = std::fs::remove_file(&probe);
            }
        }
        Err(e) => issues.push(format!("Temp directory problem: {}", e)),
    }

    issues
}
