// Collection and item resolution on top of the extractor collaborator
//
// Playlist listings are deterministic; mix/radio listings are generated
// per-session upstream and need several request shapes before giving up.

use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use url::Url;

use super::errors::ResolveError;
use super::extractors::{
    FailureKind, ItemInfo, ListingEntry, ListingInfo, MediaExtractor, ResolveOptions,
};
use super::models::{CollectionInfo, CollectionKind, Limits, MediaMetadata};
use super::utils::format_duration;

lazy_static! {
    static ref LIST_ID_RE: Regex = Regex::new(r"[?&]list=([A-Za-z0-9_-]+)").unwrap();
    static ref VIDEO_ID_RE: Regex = Regex::new(r"[?&]v=([A-Za-z0-9_-]{11})").unwrap();
}

fn watch_url(id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", id)
}

fn entry_to_metadata(entry: &ListingEntry) -> MediaMetadata {
    MediaMetadata {
        id: entry.id.clone(),
        title: entry.title.clone(),
        uploader_name: entry.uploader.clone(),
        duration_seconds: entry.duration_seconds,
        source_url: watch_url(&entry.id),
    }
}

fn item_to_metadata(item: &ItemInfo) -> MediaMetadata {
    let source_url = if item.webpage_url.is_empty() {
        watch_url(&item.id)
    } else {
        item.webpage_url.clone()
    };
    MediaMetadata {
        id: item.id.clone(),
        title: item.title.clone(),
        uploader_name: item.uploader.clone(),
        duration_seconds: item.duration_seconds,
        source_url,
    }
}

/// Mixes come in a few upstream flavors; the label ends up in the
/// collection title
fn mix_flavor(title: &str) -> &'static str {
    if title.contains("Radio") {
        "Radio"
    } else if title.contains("Mix") {
        "Mix"
    } else {
        "Auto playlist"
    }
}

/// Remove the session-start marker from a mix URL; some mixes only list
/// without it
fn strip_start_radio(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    if !parsed.query_pairs().any(|(k, _)| k == "start_radio") {
        return None;
    }
    let mut stripped = parsed.clone();
    stripped.set_query(None);
    {
        let mut serializer = stripped.query_pairs_mut();
        for (k, v) in parsed.query_pairs().filter(|(k, _)| k != "start_radio") {
            serializer.append_pair(&k, &v);
        }
    }
    Some(stripped.to_string())
}

pub struct StreamResolver {
    extractor: Arc<dyn MediaExtractor>,
    limits: Limits,
}

impl StreamResolver {
    pub fn new(extractor: Arc<dyn MediaExtractor>, limits: Limits) -> Self {
        Self { extractor, limits }
    }

    /// Fully resolve one item. Returns Ok(None) when the item is rejected
    /// by the duration ceiling — that check applies here only, never to
    /// flat collection listings, whose duration data is unreliable.
    pub async fn resolve_item(&self, url: &str) -> Result<Option<MediaMetadata>, ResolveError> {
        let opts = ResolveOptions::default().with_timeout(30);

        let item = self.extractor.probe(url, &opts).await.map_err(|e| {
            let id = VIDEO_ID_RE
                .captures(url)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| url.to_string());
            match e.kind {
                FailureKind::NotFoundOrPrivate => ResolveError::NotFoundOrPrivate {
                    list_id: id,
                    detail: e.message.lines().next().unwrap_or("").to_string(),
                },
                _ => ResolveError::ExtractionFailed {
                    id,
                    detail: e.message.lines().next().unwrap_or("").to_string(),
                },
            }
        })?;

        if item.duration_seconds > self.limits.max_item_duration_secs {
            eprintln!(
                "[Resolver] '{}' rejected: {} exceeds the {}s ceiling",
                item.title,
                format_duration(item.duration_seconds),
                self.limits.max_item_duration_secs
            );
            return Ok(None);
        }

        Ok(Some(item_to_metadata(&item)))
    }

    /// Resolve a collection URL into an ordered, capped listing
    pub async fn resolve_collection(
        &self,
        url: &str,
        kind: CollectionKind,
    ) -> Result<CollectionInfo, ResolveError> {
        let list_id = LIST_ID_RE
            .captures(url)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or(ResolveError::NoIdFound)?;

        // Defense in depth: the classifier filters these, but a caller may
        // hand the resolver a raw URL
        if list_id.starts_with("RD") {
            return self.resolve_mix(url, &list_id).await;
        }
        if list_id.starts_with("LL") {
            return Err(ResolveError::LikedVideosPrivate { list_id });
        }
        if list_id.starts_with("UL") || list_id.starts_with("UU") {
            return Err(ResolveError::UploadsUnsupported { list_id });
        }
        if list_id.starts_with("WL") {
            return Err(ResolveError::WatchLaterPrivate { list_id });
        }
        if list_id.len() < 16 {
            return Err(ResolveError::InvalidIdFormat { list_id });
        }

        match kind {
            CollectionKind::Mix => self.resolve_mix(url, &list_id).await,
            CollectionKind::Playlist => self.resolve_playlist(&list_id).await,
        }
    }

    async fn resolve_playlist(&self, list_id: &str) -> Result<CollectionInfo, ResolveError> {
        let cap = self.limits.max_playlist_items;
        let opts = ResolveOptions::default()
            .with_timeout(30)
            .with_collection_limit(cap)
            .with_player_clients(vec!["web".to_string(), "android".to_string()]);

        let candidate_urls = [
            format!("https://www.youtube.com/playlist?list={}", list_id),
            format!("https://youtube.com/playlist?list={}", list_id),
        ];

        let mut last_detail = String::new();
        for (attempt, candidate) in candidate_urls.iter().enumerate() {
            eprintln!("[Resolver] Playlist attempt {}: {}", attempt + 1, candidate);

            match self.extractor.probe_collection(candidate, &opts).await {
                Ok(ListingInfo::Collection { title, uploader, entries }) if !entries.is_empty() => {
                    let items: Vec<MediaMetadata> =
                        entries.iter().take(cap).map(entry_to_metadata).collect();
                    eprintln!("[Resolver] Playlist '{}' loaded with {} items", title, items.len());
                    return Ok(CollectionInfo {
                        title,
                        uploader_name: uploader,
                        items,
                        kind: CollectionKind::Playlist,
                        note: None,
                    });
                }
                Ok(_) => {
                    last_detail = "upstream returned no usable entries".to_string();
                }
                Err(e) => {
                    eprintln!("[Resolver] Playlist attempt failed: {}", e);
                    if e.kind == FailureKind::NotFoundOrPrivate {
                        return Err(ResolveError::NotFoundOrPrivate {
                            list_id: list_id.to_string(),
                            detail: e.message.lines().next().unwrap_or("").to_string(),
                        });
                    }
                    last_detail = e.message.lines().next().unwrap_or("").to_string();
                }
            }
        }

        Err(ResolveError::ExtractionFailed {
            id: list_id.to_string(),
            detail: last_detail,
        })
    }

    async fn resolve_mix(&self, url: &str, list_id: &str) -> Result<CollectionInfo, ResolveError> {
        let cap = self.limits.max_mix_items;
        let opts = ResolveOptions::default()
            .with_timeout(45)
            .with_collection_limit(cap)
            .with_player_clients(vec!["web".to_string(), "android".to_string()]);

        let mut variants = vec![url.to_string()];
        if let Some(stripped) = strip_start_radio(url) {
            variants.push(stripped);
        }

        let mut last_detail = String::new();
        for (attempt, variant) in variants.iter().enumerate() {
            eprintln!("[Resolver] Mix attempt {}: {}", attempt + 1, variant);

            match self.extractor.probe_collection(variant, &opts).await {
                Ok(ListingInfo::Collection { title, entries, .. }) if !entries.is_empty() => {
                    return Ok(self.build_mix(&title, &entries));
                }
                Ok(ListingInfo::SingleItem(item)) => {
                    // Upstream answered with the bare seed video; replay
                    // through explicit mix URL shapes before settling
                    eprintln!("[Resolver] Mix reported as single video, trying mix URL variants");
                    return Ok(self.resolve_mix_from_seed(url, &item).await);
                }
                Ok(_) => {
                    last_detail = "mix listing came back empty".to_string();
                }
                Err(e) => {
                    eprintln!("[Resolver] Mix attempt failed: {}", e);
                    last_detail = e.message.lines().next().unwrap_or("").to_string();
                }
            }
        }

        Err(ResolveError::ExtractionFailed {
            id: list_id.to_string(),
            detail: last_detail,
        })
    }

    /// Mix lookup answered with a bare video. Try the canonical mix URL
    /// shapes seeded from that video; fall back to a one-item mix built
    /// from the seed's own metadata rather than failing outright.
    async fn resolve_mix_from_seed(&self, original_url: &str, seed: &ItemInfo) -> CollectionInfo {
        let cap = self.limits.max_mix_items;
        let opts = ResolveOptions::default()
            .with_timeout(30)
            .with_collection_limit(cap)
            .with_player_clients(vec!["web".to_string()]);

        let variants = [
            format!("https://www.youtube.com/watch?v={}&list=RD{}", seed.id, seed.id),
            format!("https://www.youtube.com/playlist?list=RD{}", seed.id),
            original_url.to_string(),
        ];

        for variant in &variants {
            match self.extractor.probe_collection(variant, &opts).await {
                Ok(ListingInfo::Collection { title, entries, .. }) if !entries.is_empty() => {
                    eprintln!("[Resolver] Mix variant succeeded: {} entries", entries.len());
                    return self.build_mix(&title, &entries);
                }
                Ok(_) => continue,
                Err(e) => {
                    eprintln!("[Resolver] Mix variant failed: {}", e);
                    continue;
                }
            }
        }

        CollectionInfo {
            title: format!("Mix: {}", seed.title),
            uploader_name: "YouTube Mix (single video)".to_string(),
            items: vec![item_to_metadata(seed)],
            kind: CollectionKind::Mix,
            note: Some("Only the seed video could be extracted".to_string()),
        }
    }

    fn build_mix(&self, title: &str, entries: &[ListingEntry]) -> CollectionInfo {
        let flavor = mix_flavor(title);
        let items: Vec<MediaMetadata> = entries
            .iter()
            .take(self.limits.max_mix_items)
            .map(entry_to_metadata)
            .collect();
        eprintln!("[Resolver] {} '{}' loaded with {} items", flavor, title, items.len());
        CollectionInfo {
            title: format!("{}: {}", flavor, title),
            uploader_name: "YouTube Mix".to_string(),
            items,
            kind: CollectionKind::Mix,
            note: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::extractors::{
        DownloadRequest, ExtractError, ProgressFn,
    };
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::Mutex;

    /// Extractor whose collection probes replay a scripted sequence
    struct ScriptedExtractor {
        listings: Mutex<VecDeque<Result<ListingInfo, ExtractError>>>,
        probed_urls: Mutex<Vec<String>>,
        item: Option<ItemInfo>,
    }

    impl ScriptedExtractor {
        fn new(listings: Vec<Result<ListingInfo, ExtractError>>) -> Self {
            Self {
                listings: Mutex::new(listings.into()),
                probed_urls: Mutex::new(Vec::new()),
                item: None,
            }
        }

        fn with_item(mut self, item: ItemInfo) -> Self {
            self.item = Some(item);
            self
        }
    }

    #[async_trait]
    impl MediaExtractor for ScriptedExtractor {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn is_available(&self) -> bool {
            true
        }

        async fn probe(&self, _url: &str, _opts: &ResolveOptions) -> Result<ItemInfo, ExtractError> {
            self.item
                .clone()
                .ok_or_else(|| ExtractError::from_output("no item scripted".to_string()))
        }

        async fn probe_collection(
            &self,
            url: &str,
            _opts: &ResolveOptions,
        ) -> Result<ListingInfo, ExtractError> {
            self.probed_urls.lock().unwrap().push(url.to_string());
            self.listings
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ExtractError::from_output("script exhausted".to_string())))
        }

        async fn download(
            &self,
            _url: &str,
            _request: &DownloadRequest,
            _workspace: &Path,
            _progress: ProgressFn<'_>,
        ) -> Result<(), ExtractError> {
            unimplemented!("not used in resolver tests")
        }
    }

    fn entry(n: usize) -> ListingEntry {
        ListingEntry {
            id: format!("{:011}", n),
            title: format!("Track {}", n),
            uploader: "Channel".to_string(),
            duration_seconds: 180,
        }
    }

    fn item(id: &str, duration: u64) -> ItemInfo {
        ItemInfo {
            id: id.to_string(),
            title: "Seed Video".to_string(),
            uploader: "Channel".to_string(),
            duration_seconds: duration,
            webpage_url: format!("https://www.youtube.com/watch?v={}", id),
            view_count: Some(1000),
            thumbnail: String::new(),
        }
    }

    fn resolver(extractor: ScriptedExtractor) -> StreamResolver {
        StreamResolver::new(Arc::new(extractor), Limits::default())
    }

    #[tokio::test]
    async fn test_playlist_cap_is_enforced() {
        let entries: Vec<ListingEntry> = (0..60).map(entry).collect();
        let r = resolver(ScriptedExtractor::new(vec![Ok(ListingInfo::Collection {
            title: "Big List".to_string(),
            uploader: "Someone".to_string(),
            entries,
        })]));

        let info = r
            .resolve_collection(
                "https://www.youtube.com/playlist?list=PLxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx",
                CollectionKind::Playlist,
            )
            .await
            .expect("resolves");

        assert_eq!(info.items.len(), 50);
        // Upstream order preserved
        assert_eq!(info.items[0].title, "Track 0");
        assert_eq!(info.items[49].title, "Track 49");
        assert_eq!(info.items[7].source_url, watch_url(&info.items[7].id));
    }

    #[tokio::test]
    async fn test_special_list_ids_map_to_taxonomy() {
        let r = resolver(ScriptedExtractor::new(vec![]));

        let e = r
            .resolve_collection(
                "https://www.youtube.com/playlist?list=LL",
                CollectionKind::Playlist,
            )
            .await
            .unwrap_err();
        assert!(matches!(e, ResolveError::LikedVideosPrivate { .. }));

        let e = r
            .resolve_collection(
                "https://www.youtube.com/playlist?list=UUchannelstuff",
                CollectionKind::Playlist,
            )
            .await
            .unwrap_err();
        assert!(matches!(e, ResolveError::UploadsUnsupported { .. }));

        let e = r
            .resolve_collection(
                "https://www.youtube.com/playlist?list=WL",
                CollectionKind::Playlist,
            )
            .await
            .unwrap_err();
        assert!(matches!(e, ResolveError::WatchLaterPrivate { .. }));

        let e = r
            .resolve_collection(
                "https://www.youtube.com/playlist?list=PLshort",
                CollectionKind::Playlist,
            )
            .await
            .unwrap_err();
        assert!(matches!(e, ResolveError::InvalidIdFormat { .. }));

        let e = r
            .resolve_collection("https://www.youtube.com/feed/library", CollectionKind::Playlist)
            .await
            .unwrap_err();
        assert!(matches!(e, ResolveError::NoIdFound));
    }

    #[tokio::test]
    async fn test_playlist_not_found_is_terminal() {
        let r = resolver(ScriptedExtractor::new(vec![Err(ExtractError::from_output(
            "ERROR: This playlist does not exist".to_string(),
        ))]));

        let e = r
            .resolve_collection(
                "https://www.youtube.com/playlist?list=PLxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx",
                CollectionKind::Playlist,
            )
            .await
            .unwrap_err();
        match e {
            ResolveError::NotFoundOrPrivate { list_id, .. } => {
                assert_eq!(list_id, "PLxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx");
            }
            other => panic!("expected not-found, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mix_second_variant_succeeds() {
        let entries: Vec<ListingEntry> = (0..20).map(entry).collect();
        let extractor = ScriptedExtractor::new(vec![
            Err(ExtractError::from_output("transient".to_string())),
            Ok(ListingInfo::Collection {
                title: "My Mix - Rainy Days".to_string(),
                uploader: "YouTube".to_string(),
                entries,
            }),
        ]);
        let r = resolver(extractor);

        let info = r
            .resolve_collection(
                "https://www.youtube.com/watch?v=dQw4w9WgXcQ&list=RDdQw4w9WgXcQ&start_radio=1",
                CollectionKind::Mix,
            )
            .await
            .expect("resolves");

        assert_eq!(info.kind, CollectionKind::Mix);
        // Mix cap, not the playlist cap
        assert_eq!(info.items.len(), 15);
        assert!(info.title.starts_with("Mix: "));
    }

    #[tokio::test]
    async fn test_mix_falls_back_to_single_item_collection() {
        // First probe: single video. All three seeded variants fail after,
        // so the resolver must synthesize a one-item mix.
        let extractor = ScriptedExtractor::new(vec![
            Ok(ListingInfo::SingleItem(item("dQw4w9WgXcQ", 213))),
            Err(ExtractError::from_output("nope".to_string())),
            Err(ExtractError::from_output("nope".to_string())),
            Err(ExtractError::from_output("nope".to_string())),
        ]);
        let r = resolver(extractor);

        let info = r
            .resolve_collection(
                "https://www.youtube.com/watch?v=dQw4w9WgXcQ&list=RDdQw4w9WgXcQ",
                CollectionKind::Mix,
            )
            .await
            .expect("synthesizes");

        assert_eq!(info.items.len(), 1);
        assert_eq!(info.items[0].id, "dQw4w9WgXcQ");
        assert_eq!(info.title, "Mix: Seed Video");
        assert!(info.note.is_some());
    }

    #[tokio::test]
    async fn test_resolve_item_duration_filter() {
        let extractor = ScriptedExtractor::new(vec![]).with_item(item("dQw4w9WgXcQ", 7200));
        let r = resolver(extractor);

        let resolved = r
            .resolve_item("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
            .await
            .expect("no error");
        assert!(resolved.is_none());

        let extractor = ScriptedExtractor::new(vec![]).with_item(item("dQw4w9WgXcQ", 213));
        let r = resolver(extractor);
        let resolved = r
            .resolve_item("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
            .await
            .expect("no error");
        assert_eq!(resolved.unwrap().duration_seconds, 213);
    }

    #[test]
    fn test_strip_start_radio() {
        let url = "https://www.youtube.com/watch?v=dQw4w9WgXcQ&list=RDdQw4w9WgXcQ&start_radio=1";
        let stripped = strip_start_radio(url).expect("has param");
        assert!(!stripped.contains("start_radio"));
        assert!(stripped.contains("list=RDdQw4w9WgXcQ"));

        assert!(strip_start_radio("https://www.youtube.com/watch?v=dQw4w9WgXcQ").is_none());
    }

    #[test]
    fn test_mix_flavor() {
        assert_eq!(mix_flavor("My Radio Station"), "Radio");
        assert_eq!(mix_flavor("My Mix - Hits"), "Mix");
        assert_eq!(mix_flavor("Generated for you"), "Auto playlist");
    }
}
