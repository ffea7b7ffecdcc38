// Helper functions shared by the pipeline and extractor implementations

use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::time::{timeout, Duration as TokioDuration};

/// Run command with timeout (shared utility)
pub async fn run_output_with_timeout(
    program: &str,
    args: Vec<String>,
    timeout_secs: u64,
) -> Result<std::process::Output, String> {
    let mut child = TokioCommand::new(program)
        .args(&args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| format!("Failed to start {}: {}", program, e))?;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| format!("Failed to capture stdout from {}", program))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| format!("Failed to capture stderr from {}", program))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe
            .read_to_end(&mut buf)
            .await
            .map_err(|e| format!("Failed to read stdout: {}", e))?;
        Ok::<Vec<u8>, String>(buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe
            .read_to_end(&mut buf)
            .await
            .map_err(|e| format!("Failed to read stderr: {}", e))?;
        Ok::<Vec<u8>, String>(buf)
    });

    let waited = timeout(TokioDuration::from_secs(timeout_secs), child.wait()).await;
    match waited {
        Ok(status_res) => {
            let status = status_res.map_err(|e| format!("Failed to wait for {}: {}", program, e))?;
            let stdout = stdout_task
                .await
                .map_err(|e| format!("stdout task failed: {}", e))??;
            let stderr = stderr_task
                .await
                .map_err(|e| format!("stderr task failed: {}", e))??;
            Ok(std::process::Output { status, stdout, stderr })
        }
        Err(_) => {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            Err(format!("Timed out after {}s", timeout_secs))
        }
    }
}

/// Strip characters that are illegal in filenames, collapse repeated
/// separators and bound the length.
pub fn clean_filename(filename: &str) -> String {
    lazy_static::lazy_static! {
        static ref UNDERSCORE_RUN: regex::Regex = regex::Regex::new(r"_+").unwrap();
    }

    const INVALID: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

    let replaced: String = filename
        .chars()
        .map(|c| if INVALID.contains(&c) { '_' } else { c })
        .collect();

    let collapsed = UNDERSCORE_RUN.replace_all(&replaced, "_");
    let trimmed = collapsed.trim_matches('_');

    trimmed.chars().take(200).collect()
}

/// Format a duration in seconds as MM:SS
pub fn format_duration(seconds: u64) -> String {
    let minutes = seconds / 60;
    let secs = seconds % 60;
    format!("{:02}:{:02}", minutes, secs)
}

/// Parse a human size string from yt-dlp progress output ("343.72MiB",
/// "980.12KiB", "1.20GiB") into bytes. Returns None for anything it does
/// not recognize.
pub fn parse_size(text: &str) -> Option<u64> {
    let trimmed = text.trim().trim_start_matches('~').trim();

    let unit_start = trimmed.find(|c: char| c.is_ascii_alphabetic())?;
    let (number, unit) = trimmed.split_at(unit_start);
    let value: f64 = number.trim().parse().ok()?;

    let multiplier: f64 = match unit.trim() {
        "B" => 1.0,
        "KiB" | "KB" => 1024.0,
        "MiB" | "MB" => 1024.0 * 1024.0,
        "GiB" | "GB" => 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };

    Some((value * multiplier) as u64)
}

/// Format a byte count as "NN.NN MB" for status lines.
pub fn format_size_mb(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_filename_strips_invalid_chars() {
        assert_eq!(clean_filename("a<b>c:d\"e/f\\g|h?i*j"), "a_b_c_d_e_f_g_h_i_j");
    }

    #[test]
    fn test_clean_filename_collapses_runs() {
        assert_eq!(clean_filename("__My___Song__"), "My_Song");
    }

    #[test]
    fn test_clean_filename_bounds_length() {
        let long = "x".repeat(500);
        assert_eq!(clean_filename(&long).len(), 200);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "00:00");
        assert_eq!(format_duration(59), "00:59");
        assert_eq!(format_duration(3599), "59:59");
        assert_eq!(format_duration(3600), "60:00");
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("343.72MiB"), Some((343.72 * 1048576.0) as u64));
        assert_eq!(parse_size("~ 1.20GiB"), Some((1.20 * 1073741824.0) as u64));
        assert_eq!(parse_size("512KiB"), Some(512 * 1024));
        assert_eq!(parse_size("garbage"), None);
    }
}
