use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use crawler_core::{current_unix_timestamp_ms, CancellationToken, ExitClass, RunSummary};
use crawler_http::{FetchFault, ProtocolFetcher};
use crawler_store::{Store, Video, VideoCrawlWorkItem, WalkStatus};
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

use crate::config::VideosConfig;

/// Discovers videos for every eligible channel (eligibility comes from
/// `list_channels_with_videos`), with bounded channel concurrency per host
/// and early-stop on repeated already-known pages.
#[instrument(skip(cfg, store, http))]
pub async fn run(
    cfg: VideosConfig,
    store: Arc<Store>,
    http: Arc<ProtocolFetcher>,
    cancel: CancellationToken,
) -> Result<RunSummary> {
    let started_at_ms = current_unix_timestamp_ms();
    match run_inner(&cfg, Arc::clone(&store), http, cancel, started_at_ms).await {
        Ok(summary) => Ok(summary),
        Err(error) => match error.downcast::<crawler_store::StoreError>() {
            Ok(store_error) => {
                warn!(error = %store_error, "video discovery aborted by a fatal store error");
                Ok(RunSummary {
                    stage: "videos".to_string(),
                    started_at_ms,
                    finished_at_ms: current_unix_timestamp_ms(),
                    exit_class: ExitClass::StoreFatal.into(),
                    ..Default::default()
                })
            }
            Err(other) => Err(other),
        },
    }
}

async fn run_inner(
    cfg: &VideosConfig,
    store: Arc<Store>,
    http: Arc<ProtocolFetcher>,
    cancel: CancellationToken,
    started_at_ms: i64,
) -> Result<RunSummary> {
    let mut hosts = store.list_channel_instances()?;
    if let Some(max_instances) = cfg.max_instances {
        hosts.truncate(max_instances);
    }

    let mut channels = store.list_channels_with_videos(1, &hosts)?;
    if let Some(max_channels) = cfg.max_channels {
        channels.truncate(max_channels);
    }
    store.prepare_video_progress(&channels, cfg.resume)?;

    let statuses = if cfg.errors_only {
        vec![WalkStatus::Error]
    } else {
        vec![WalkStatus::Pending, WalkStatus::InProgress]
    };
    let work_items = store.list_video_work_items(&statuses)?;

    let mut by_host: HashMap<String, Vec<VideoCrawlWorkItem>> = HashMap::new();
    for item in work_items {
        by_host.entry(item.host.clone()).or_default().push(item);
    }

    let network_down = Arc::new(AtomicBool::new(false));
    let host_semaphore = Arc::new(Semaphore::new(cfg.concurrency.max(1)));
    let mut workers = JoinSet::new();
    for (host, items) in by_host {
        let store = Arc::clone(&store);
        let http = Arc::clone(&http);
        let cfg = cfg.clone();
        let cancel = cancel.clone();
        let permit_src = Arc::clone(&host_semaphore);
        let network_down = Arc::clone(&network_down);
        workers.spawn(async move {
            let _permit = permit_src.acquire_owned().await.expect("semaphore not closed");
            walk_host_channels(cfg, store, http, cancel, host, items, network_down).await
        });
    }
    while let Some(result) = workers.join_next().await {
        result??;
    }

    let videos_new_total = store
        .get_state("videos_new_total")?
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let exit_class = if network_down.load(Ordering::SeqCst) { ExitClass::NoNetwork } else { ExitClass::Success };

    Ok(RunSummary {
        stage: "videos".to_string(),
        hosts_done: 0,
        hosts_error: 0,
        channels_upserted: 0,
        videos_new_total,
        started_at_ms,
        finished_at_ms: current_unix_timestamp_ms(),
        exit_class: exit_class.into(),
    })
}

#[allow(clippy::too_many_arguments)]
async fn walk_host_channels(
    cfg: VideosConfig,
    store: Arc<Store>,
    http: Arc<ProtocolFetcher>,
    cancel: CancellationToken,
    host: String,
    items: Vec<VideoCrawlWorkItem>,
    network_down: Arc<AtomicBool>,
) -> Result<()> {
    let channel_semaphore = Arc::new(Semaphore::new(cfg.channel_concurrency.max(1)));
    let mut channel_workers = JoinSet::new();
    for item in items {
        if cancel.is_cancelled() || network_down.load(Ordering::SeqCst) {
            break;
        }
        let store = Arc::clone(&store);
        let http = Arc::clone(&http);
        let cfg = cfg.clone();
        let host = host.clone();
        let permit_src = Arc::clone(&channel_semaphore);
        let network_down = Arc::clone(&network_down);
        channel_workers.spawn(async move {
            let _permit = permit_src.acquire_owned().await.expect("semaphore not closed");
            walk_channel(&cfg, &store, &http, &host, &item, &network_down).await
        });
    }
    while let Some(result) = channel_workers.join_next().await {
        result??;
    }
    Ok(())
}

async fn walk_channel(
    cfg: &VideosConfig,
    store: &Store,
    http: &ProtocolFetcher,
    host: &str,
    item: &VideoCrawlWorkItem,
    network_down: &AtomicBool,
) -> Result<()> {
    if network_down.load(Ordering::SeqCst) {
        return Ok(());
    }
    let mut start = 0u32;
    let mut pages_seen = 0u32;
    let mut full_pages_seen = 0u32;
    let result: Result<()> = async {
        loop {
            if let Some(max_pages) = cfg.max_videos_pages {
                if pages_seen >= max_pages {
                    break;
                }
            }
            let query = format!(
                "/api/v1/video-channels/{}/videos?start={start}&count={}&sort={}",
                item.channel_name, cfg.page_size, cfg.sort
            );
            let page: Value = http
                .fetch_json(host, &query, cfg.request_timeout_ms, cfg.max_retries)
                .await?;
            let entries = page.get("data").and_then(Value::as_array).cloned().unwrap_or_default();
            pages_seen += 1;
            if entries.is_empty() {
                break;
            }

            let protocol = http.protocol_for(host);
            let mut videos: Vec<Video> = entries
                .iter()
                .filter_map(|entry| to_video(entry, host, &item.channel_id, &item.channel_name, protocol))
                .collect();

            let page_entry_count = videos.len();
            if cfg.new_only && !videos.is_empty() {
                let ids: Vec<String> = videos.iter().map(|v| v.video_id.clone()).collect();
                let existing = store.list_existing_video_ids(host, &ids)?;
                videos.retain(|video| !existing.contains(&video.video_id));
            }

            let new_count = videos.len();
            if new_count > 0 {
                store.upsert_videos(&videos)?;
                store.increment_state("videos_new_total", new_count as i64)?;
                full_pages_seen = 0;
            } else if page_entry_count > 0 {
                full_pages_seen += 1;
            }

            store.update_video_progress(host, &item.channel_id, WalkStatus::InProgress, start, None)?;

            if let Some(limit) = cfg.stop_after_full_pages {
                if full_pages_seen >= limit {
                    break;
                }
            }
            let total = page.get("total").and_then(Value::as_u64);
            start += cfg.page_size;
            match total {
                Some(total) if u64::from(start) >= total => break,
                Some(_) => {}
                None if (entries.len() as u32) < cfg.page_size => break,
                None => {}
            }
        }
        Ok(())
    }
    .await;

    match result {
        Ok(()) => {
            store.update_video_progress(host, &item.channel_id, WalkStatus::Done, 0, None)?;
            info!(host, channel = %item.channel_id, "video discovery finished");
            Ok(())
        }
        Err(error) => {
            if error.downcast_ref::<FetchFault>().is_some_and(FetchFault::is_no_network) {
                network_down.store(true, Ordering::SeqCst);
                warn!(host, channel = %item.channel_id, "no-network fault aborts video discovery");
                return Ok(());
            }
            warn!(host, channel = %item.channel_id, error = %error, "video discovery failed");
            store.update_video_progress(host, &item.channel_id, WalkStatus::Error, start, Some(&error.to_string()))?;
            Ok(())
        }
    }
}

fn to_video(entry: &Value, host: &str, channel_id: &str, channel_name: &str, protocol: &str) -> Option<Video> {
    let video_id = entry.get("uuid").and_then(Value::as_str).map(ToOwned::to_owned)
        .or_else(|| entry.get("id").and_then(Value::as_i64).map(|id| id.to_string()))?;
    let title = crawler_http::first_str(entry, &["name"]).unwrap_or_default().to_owned();
    Some(Video {
        video_id,
        host: host.to_string(),
        channel_id: Some(channel_id.to_string()),
        channel_name: Some(channel_name.to_string()),
        account_name: crawler_http::first_str_nested(entry, &[], &[("account", "name")]).map(ToOwned::to_owned),
        title,
        description: crawler_http::first_str(entry, &["description"]).map(ToOwned::to_owned),
        category: entry
            .get("category")
            .and_then(|category| category.get("label"))
            .and_then(Value::as_str)
            .map(ToOwned::to_owned),
        published_at: entry
            .get("publishedAt")
            .and_then(Value::as_str)
            .and_then(|raw| chrono::DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.timestamp_millis()),
        thumbnail_url: entry
            .get("thumbnailPath")
            .and_then(Value::as_str)
            .map(|path| resolve_url(path, host, protocol)),
        preview_url: entry
            .get("previewPath")
            .and_then(Value::as_str)
            .map(|path| resolve_url(path, host, protocol)),
        embed_url: entry
            .get("embedPath")
            .and_then(Value::as_str)
            .map(|path| resolve_url(path, host, protocol)),
        views: crawler_http::first_i64(entry, &["views"]),
        likes: crawler_http::first_i64(entry, &["likes"]),
        dislikes: crawler_http::first_i64(entry, &["dislikes"]),
        nsfw: entry.get("nsfw").and_then(Value::as_bool).unwrap_or(false),
        ..Video::default()
    })
}

/// Resolves a relative path returned by the API against the protocol that
/// last succeeded for this host.
fn resolve_url(path: &str, host: &str, protocol: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!("{protocol}://{host}{path}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unit_resolve_url_leaves_absolute_urls_untouched() {
        assert_eq!(resolve_url("https://cdn.example/x.jpg", "a.example", "https"), "https://cdn.example/x.jpg");
        assert_eq!(resolve_url("/static/x.jpg", "a.example", "http"), "http://a.example/static/x.jpg");
    }

    #[test]
    fn unit_to_video_prefers_uuid_over_numeric_id() {
        let entry = json!({"uuid": "abc", "id": 1, "name": "title"});
        let video = to_video(&entry, "a.example", "c1", "chan", "https").unwrap();
        assert_eq!(video.video_id, "abc");
        assert_eq!(video.title, "title");
    }

    #[test]
    fn unit_to_video_rejects_entry_without_identifier() {
        let entry = json!({"name": "title"});
        assert!(to_video(&entry, "a.example", "c1", "chan", "https").is_none());
    }
}
