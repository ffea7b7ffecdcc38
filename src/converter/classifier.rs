// URL classification and normalization
//
// Pure, no I/O. Every raw input string is resolved exactly once into a
// typed UrlIntent; everything downstream trusts the normalized form.

use lazy_static::lazy_static;
use regex::Regex;
use url::Url;

use super::errors::ConvertError;
use super::models::{ListRejection, RejectedListKind, UrlIntent, UrlKind};

const KNOWN_HOSTS: &[&str] = &["youtube.com", "www.youtube.com", "m.youtube.com", "youtu.be"];

// Characters that must never reach a display or exec context downstream
const FORBIDDEN_CHARS: &[char] = &['<', '>', '"', '\''];

lazy_static! {
    static ref VIDEO_ID_RE: Regex = Regex::new(r"^[A-Za-z0-9_-]{11}$").unwrap();
    static ref LIST_ID_RE: Regex = Regex::new(r"^[A-Za-z0-9_-]+$").unwrap();
}

fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

fn is_valid_video_id(id: &str) -> bool {
    VIDEO_ID_RE.is_match(id)
}

/// Derive the typed intent for one raw input URL
pub fn classify(raw_url: &str) -> Result<UrlIntent, ConvertError> {
    let trimmed = raw_url.trim();

    if trimmed.len() < 10 {
        return Err(ConvertError::Validation("URL is too short".to_string()));
    }

    if trimmed.chars().any(|c| FORBIDDEN_CHARS.contains(&c)) {
        return Err(ConvertError::Validation(
            "URL contains forbidden characters".to_string(),
        ));
    }

    let lower = trimmed.to_lowercase();
    if !lower.contains("youtube.com") && !lower.contains("youtu.be") {
        return Err(ConvertError::Validation(
            "Only YouTube URLs are supported".to_string(),
        ));
    }

    let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let parsed = Url::parse(&with_scheme)
        .map_err(|_| ConvertError::Validation(format!("Unparseable URL: {}", trimmed)))?;

    let host = parsed
        .host_str()
        .map(|h| h.to_lowercase())
        .unwrap_or_default();
    if !KNOWN_HOSTS.contains(&host.as_str()) {
        return Err(ConvertError::Validation(format!(
            "Host '{}' is not a YouTube domain",
            host
        )));
    }

    // Short-link form: the trailing path segment is the video id
    if host == "youtu.be" {
        let video_id = parsed.path().trim_start_matches('/');
        if is_valid_video_id(video_id) {
            return Ok(UrlIntent {
                kind: UrlKind::Video,
                normalized_url: watch_url(video_id),
                video_id_hint: Some(video_id.to_string()),
            });
        }
        return Err(ConvertError::Validation(
            "Short link carries no valid video id".to_string(),
        ));
    }

    let mut video_id: Option<String> = None;
    let mut list_id: Option<String> = None;
    for (key, value) in parsed.query_pairs() {
        match key.as_ref() {
            "v" if video_id.is_none() => video_id = Some(value.to_string()),
            "list" if list_id.is_none() => list_id = Some(value.to_string()),
            _ => {}
        }
    }

    let valid_video_id = video_id.as_deref().filter(|id| is_valid_video_id(id));

    if let Some(list) = list_id {
        // Special list families first; each falls back to the adjacent
        // video when one is present, since the list itself is unusable
        let special = if list.starts_with("LL") {
            Some(RejectedListKind::LikedVideos)
        } else if list.starts_with("UL") || list.starts_with("UU") {
            Some(RejectedListKind::ChannelUploads)
        } else if list.starts_with("WL") {
            Some(RejectedListKind::WatchLater)
        } else {
            None
        };

        if let Some(kind) = special {
            if let Some(id) = valid_video_id {
                return Ok(UrlIntent {
                    kind: UrlKind::Video,
                    normalized_url: watch_url(id),
                    video_id_hint: Some(id.to_string()),
                });
            }
            return Ok(UrlIntent {
                kind: UrlKind::UnsupportedList(ListRejection { kind, list_id: list }),
                normalized_url: with_scheme,
                video_id_hint: None,
            });
        }

        if list.starts_with("RD") {
            // Mix/radio lists are session-generated; keep the original URL
            // so the resolver can replay it with variant shapes
            return Ok(UrlIntent {
                kind: UrlKind::Mix,
                normalized_url: with_scheme,
                video_id_hint: valid_video_id.map(|id| id.to_string()),
            });
        }

        if list.len() < 16 || !LIST_ID_RE.is_match(&list) {
            return Ok(UrlIntent {
                kind: UrlKind::UnsupportedList(ListRejection {
                    kind: RejectedListKind::InvalidId,
                    list_id: list,
                }),
                normalized_url: with_scheme,
                video_id_hint: valid_video_id.map(|id| id.to_string()),
            });
        }

        // Ordinary playlist; a video context inside it is retained
        let normalized = match valid_video_id {
            Some(id) => format!("https://www.youtube.com/watch?v={}&list={}", id, list),
            None => format!("https://www.youtube.com/playlist?list={}", list),
        };
        return Ok(UrlIntent {
            kind: UrlKind::Playlist,
            normalized_url: normalized,
            video_id_hint: valid_video_id.map(|id| id.to_string()),
        });
    }

    if let Some(id) = valid_video_id {
        return Ok(UrlIntent {
            kind: UrlKind::Video,
            normalized_url: watch_url(id),
            video_id_hint: Some(id.to_string()),
        });
    }

    Err(ConvertError::Validation(
        "URL carries no video or playlist id".to_string(),
    ))
}
