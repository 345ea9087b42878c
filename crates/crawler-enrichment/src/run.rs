use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use crawler_core::{current_unix_timestamp_ms, CancellationToken, ExitClass, RunSummary};
use crawler_http::{FetchFault, ProtocolFetcher};
use crawler_store::{InvalidReason, Store, TagsFilterMode, Video};
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

use crate::config::{EnrichmentConfig, EnrichmentMode};

/// Fetches per-video detail (tags or comment counts) for every video
/// selected by `cfg.mode`.
#[instrument(skip(cfg, store, http))]
pub async fn run(
    cfg: EnrichmentConfig,
    store: Arc<Store>,
    http: Arc<ProtocolFetcher>,
    cancel: CancellationToken,
) -> Result<RunSummary> {
    let started_at_ms = current_unix_timestamp_ms();
    match run_inner(&cfg, Arc::clone(&store), http, cancel, started_at_ms).await {
        Ok(summary) => Ok(summary),
        Err(error) => match error.downcast::<crawler_store::StoreError>() {
            Ok(store_error) => {
                warn!(error = %store_error, "enrichment aborted by a fatal store error");
                Ok(RunSummary {
                    stage: match cfg.mode {
                        EnrichmentMode::Tags | EnrichmentMode::UpdateTags => "enrichment:tags".to_string(),
                        EnrichmentMode::Comments => "enrichment:comments".to_string(),
                    },
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
    cfg: &EnrichmentConfig,
    store: Arc<Store>,
    http: Arc<ProtocolFetcher>,
    cancel: CancellationToken,
    started_at_ms: i64,
) -> Result<RunSummary> {
    let videos = match cfg.mode {
        EnrichmentMode::Tags => store.list_videos_for_tags(TagsFilterMode::Missing)?,
        EnrichmentMode::UpdateTags => store.list_videos_for_tags(TagsFilterMode::Present)?,
        EnrichmentMode::Comments => store.list_videos_for_comments(cfg.resume)?,
    };

    let network_down = Arc::new(AtomicBool::new(false));
    let semaphore = Arc::new(Semaphore::new(cfg.concurrency.max(1)));
    let mut workers = JoinSet::new();
    for video in videos {
        let store = Arc::clone(&store);
        let http = Arc::clone(&http);
        let cfg = cfg.clone();
        let cancel = cancel.clone();
        let network_down = Arc::clone(&network_down);
        let permit_src = Arc::clone(&semaphore);
        workers.spawn(async move {
            let _permit = permit_src.acquire_owned().await.expect("semaphore not closed");
            if cancel.is_cancelled() || network_down.load(Ordering::SeqCst) {
                return;
            }
            if cfg.host_delay_ms > 0 {
                cancel.sleep_or_cancelled(std::time::Duration::from_millis(cfg.host_delay_ms)).await;
            }
            enrich_one(&cfg, &store, &http, &video, &network_down).await;
        });
    }
    while workers.join_next().await.is_some() {}

    let exit_class = if network_down.load(Ordering::SeqCst) {
        ExitClass::NoNetwork
    } else {
        ExitClass::Success
    };

    Ok(RunSummary {
        stage: match cfg.mode {
            EnrichmentMode::Tags | EnrichmentMode::UpdateTags => "enrichment:tags".to_string(),
            EnrichmentMode::Comments => "enrichment:comments".to_string(),
        },
        hosts_done: 0,
        hosts_error: 0,
        channels_upserted: 0,
        videos_new_total: 0,
        started_at_ms,
        finished_at_ms: current_unix_timestamp_ms(),
        exit_class: exit_class.into(),
    })
}

async fn enrich_one(
    cfg: &EnrichmentConfig,
    store: &Store,
    http: &ProtocolFetcher,
    video: &Video,
    network_down: &AtomicBool,
) {
    let query = format!("/api/v1/videos/{}", video.video_id);
    let result: Result<Value, FetchFault> = http
        .fetch_json(&video.host, &query, cfg.request_timeout_ms, cfg.max_retries)
        .await;

    match result {
        Ok(payload) => {
            let write_result = match cfg.mode {
                EnrichmentMode::Tags | EnrichmentMode::UpdateTags => {
                    let tags = payload
                        .get("tags")
                        .and_then(Value::as_array)
                        .map(|tags| tags.iter().filter_map(Value::as_str).collect::<Vec<_>>())
                        .unwrap_or_default();
                    let tags_json = serde_json::to_string(&tags).unwrap_or_else(|_| "[]".to_string());
                    store.update_video_tags(&video.video_id, &video.host, &tags_json)
                }
                EnrichmentMode::Comments => {
                    let count = crawler_http::extract_comments_count(&payload).unwrap_or(0);
                    store.update_video_comments(&video.video_id, &video.host, count)
                }
            };
            if let Err(error) = write_result {
                warn!(video_id = %video.video_id, host = %video.host, error = %error, "store write failed after successful fetch");
            } else {
                info!(video_id = %video.video_id, host = %video.host, mode = ?cfg.mode, "video enriched");
            }
        }
        Err(fault) => handle_fault(store, video, fault, network_down),
    }
}

fn handle_fault(store: &Store, video: &Video, fault: FetchFault, network_down: &AtomicBool) {
    if fault.is_no_network() {
        network_down.store(true, Ordering::SeqCst);
        warn!(video_id = %video.video_id, host = %video.host, "no-network fault aborts enrichment");
        return;
    }
    let invalid_reason = match &fault {
        FetchFault::Http { status: 404, .. } => Some(InvalidReason::NotFound),
        FetchFault::TlsExpired(_) => Some(InvalidReason::CertExpired),
        FetchFault::TlsOther(_) => Some(InvalidReason::TlsError),
        FetchFault::Timeout(_) => Some(InvalidReason::Timeout),
        _ => None,
    };
    if let Some(reason) = invalid_reason {
        if let Err(error) = store.update_video_invalid(&video.video_id, &video.host, reason) {
            warn!(video_id = %video.video_id, error = %error, "failed to record invalid video");
        }
        return;
    }
    if let Err(error) = store.update_video_error(&video.video_id, &video.host, &fault.to_string()) {
        warn!(video_id = %video.video_id, error = %error, "failed to record video error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_terminal_faults_map_to_expected_invalid_reasons() {
        let network_down = AtomicBool::new(false);
        let store_dir = tempfile::tempdir().unwrap();
        let store = Store::open(store_dir.path().join("crawler.sqlite"), false).unwrap();
        let video = Video {
            video_id: "v1".into(),
            host: "a.example".into(),
            title: "t".into(),
            ..Default::default()
        };
        store.upsert_videos(&[video.clone()]).unwrap();

        handle_fault(&store, &video, FetchFault::Http { status: 404, body_snippet: String::new() }, &network_down);
        let videos = store.list_videos_for_comments(false).unwrap();
        assert!(videos.is_empty(), "invalidated video should drop out of comments scope");
        assert!(!network_down.load(Ordering::SeqCst));
    }

    #[test]
    fn unit_no_network_fault_sets_flag_without_invalidating() {
        let network_down = AtomicBool::new(false);
        let store_dir = tempfile::tempdir().unwrap();
        let store = Store::open(store_dir.path().join("crawler.sqlite"), false).unwrap();
        let video = Video {
            video_id: "v1".into(),
            host: "a.example".into(),
            title: "t".into(),
            ..Default::default()
        };
        store.upsert_videos(&[video.clone()]).unwrap();
        handle_fault(&store, &video, FetchFault::NoNetwork("down".into()), &network_down);
        assert!(network_down.load(Ordering::SeqCst));
        let videos = store.list_videos_for_comments(false).unwrap();
        assert_eq!(videos.len(), 1, "no-network fault must not invalidate the video");
    }
}
