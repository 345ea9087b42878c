use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use crawler_core::{current_unix_timestamp_ms, CancellationToken, ExitClass, RunSummary};
use crawler_http::{FetchFault, ProtocolFetcher};
use crawler_store::{Channel, ChannelCrawlWorkItem, LastErrorSource, Store, WalkStatus};
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

use crate::config::ChannelsConfig;

const CHANNELS_PATH: &str = "/api/v1/video-channels";

/// Discovers channels per host, enforcing the host-origin filter and an
/// optional global channel budget.
#[instrument(skip(cfg, store, http))]
pub async fn run(
    cfg: ChannelsConfig,
    store: Arc<Store>,
    http: Arc<ProtocolFetcher>,
    cancel: CancellationToken,
) -> Result<RunSummary> {
    let started_at_ms = current_unix_timestamp_ms();
    match run_inner(&cfg, Arc::clone(&store), http, cancel, started_at_ms).await {
        Ok(summary) => Ok(summary),
        Err(error) => match error.downcast::<crawler_store::StoreError>() {
            Ok(store_error) => {
                warn!(error = %store_error, "channel discovery aborted by a fatal store error");
                Ok(RunSummary {
                    stage: "channels".to_string(),
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
    cfg: &ChannelsConfig,
    store: Arc<Store>,
    http: Arc<ProtocolFetcher>,
    cancel: CancellationToken,
    started_at_ms: i64,
) -> Result<RunSummary> {
    let mut hosts = crawler_hostfilter::load_hosts(&cfg.whitelist_source).await?;
    hosts = crawler_hostfilter::filter_hosts(hosts, &cfg.excluded_hosts);
    if hosts.is_empty() {
        bail!("channels walker: whitelist is empty after loading and exclusion");
    }
    if let Some(max_instances) = cfg.max_instances {
        hosts.truncate(max_instances);
    }
    for entry in &hosts {
        if let Some(scheme) = entry.scheme {
            http.seed_protocol(&entry.host, scheme);
        }
    }
    let hosts: Vec<String> = hosts.into_iter().map(|entry| entry.host).collect();

    store.prepare_channel_progress(&hosts, cfg.resume)?;
    if let Some(budget) = cfg.global_channel_budget {
        store.set_state("channel_budget_remaining", &budget.to_string())?;
    }

    let work_items = store.list_channel_work_items()?;
    let queue = Arc::new(AsyncMutex::new(work_items));
    let network_down = Arc::new(AtomicBool::new(false));

    let mut workers = JoinSet::new();
    for worker_id in 0..cfg.concurrency.max(1) {
        let store = Arc::clone(&store);
        let http = Arc::clone(&http);
        let cfg = cfg.clone();
        let cancel = cancel.clone();
        let queue = Arc::clone(&queue);
        let network_down = Arc::clone(&network_down);
        workers.spawn(async move { worker_loop(worker_id, cfg, store, http, cancel, queue, network_down).await });
    }
    while let Some(result) = workers.join_next().await {
        result??;
    }

    let channels_upserted = store
        .get_state("channels_upserted")?
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let exit_class = if network_down.load(Ordering::SeqCst) { ExitClass::NoNetwork } else { ExitClass::Success };

    Ok(RunSummary {
        stage: "channels".to_string(),
        hosts_done: 0,
        hosts_error: 0,
        channels_upserted,
        videos_new_total: 0,
        started_at_ms,
        finished_at_ms: current_unix_timestamp_ms(),
        exit_class: exit_class.into(),
    })
}

async fn worker_loop(
    worker_id: usize,
    cfg: ChannelsConfig,
    store: Arc<Store>,
    http: Arc<ProtocolFetcher>,
    cancel: CancellationToken,
    queue: Arc<AsyncMutex<Vec<ChannelCrawlWorkItem>>>,
    network_down: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if cancel.is_cancelled() || network_down.load(Ordering::SeqCst) {
            return Ok(());
        }
        let Some(item) = queue.lock().await.pop() else {
            return Ok(());
        };

        store.update_channel_progress(&item.host, WalkStatus::Processing, item.last_start)?;
        match walk_channels(&cfg, &store, &http, &item.host, item.last_start).await {
            Ok(_last_start) => {
                store.update_channel_progress(&item.host, WalkStatus::Done, 0)?;
                store.clear_host_last_error(&item.host)?;
                info!(worker_id, host = %item.host, "channel discovery finished");
            }
            Err(error) => {
                if error.downcast_ref::<FetchFault>().is_some_and(FetchFault::is_no_network) {
                    network_down.store(true, Ordering::SeqCst);
                    warn!(worker_id, host = %item.host, "no-network fault aborts channel discovery");
                    return Ok(());
                }
                warn!(worker_id, host = %item.host, error = %error, "channel discovery failed");
                store.mark_channel_host_error(&item.host, &error.to_string(), LastErrorSource::Channels)?;
                store.update_channel_progress(&item.host, WalkStatus::Error, item.last_start)?;
            }
        }
    }
}

/// Pages `video-channels`, applying the host-origin filter and
/// the global channel budget, returning the offset reached.
async fn walk_channels(
    cfg: &ChannelsConfig,
    store: &Store,
    http: &ProtocolFetcher,
    host: &str,
    resume_start: u32,
) -> Result<u32> {
    let mut start = resume_start;
    loop {
        let query = format!("{CHANNELS_PATH}?start={start}&count={}", cfg.page_size);
        let page: Value = http
            .fetch_json(host, &query, cfg.request_timeout_ms, cfg.max_retries)
            .await?;
        let entries = page.get("data").and_then(Value::as_array).cloned().unwrap_or_default();
        if entries.is_empty() {
            break;
        }

        let mut channels: Vec<Channel> = Vec::new();
        for entry in &entries {
            if entry_host(entry).as_deref() != Some(host) {
                continue;
            }
            if let Some(channel) = to_channel(entry, host) {
                channels.push(channel);
            }
        }

        if cfg.new_only && !channels.is_empty() {
            let ids: Vec<String> = channels.iter().map(|c| c.channel_id.clone()).collect();
            let existing = store.list_existing_channel_ids(host, &ids)?;
            channels.retain(|channel| !existing.contains(&channel.channel_id));
        }

        update_budget_and_upsert(store, cfg, channels)?;
        store.update_channel_progress(host, WalkStatus::Processing, start)?;

        let total = page.get("total").and_then(Value::as_u64);
        start += cfg.page_size;
        match total {
            Some(total) if u64::from(start) >= total => break,
            Some(_) => {}
            None if (entries.len() as u32) < cfg.page_size => break,
            None => {}
        }
    }
    Ok(start)
}

fn update_budget_and_upsert(store: &Store, cfg: &ChannelsConfig, mut channels: Vec<Channel>) -> Result<()> {
    if channels.is_empty() {
        return Ok(());
    }
    if cfg.global_channel_budget.is_some() {
        let requested = channels.len() as i64;
        let remaining_after = store.increment_state("channel_budget_remaining", -requested)?;
        if remaining_after < 0 {
            let allowed = (requested + remaining_after).max(0);
            if allowed < requested {
                store.increment_state("channel_budget_remaining", requested - allowed)?;
            }
            channels.truncate(allowed as usize);
        }
    }
    if channels.is_empty() {
        return Ok(());
    }
    store.upsert_channels(&channels)?;
    store.increment_state("channels_upserted", channels.len() as i64)?;
    Ok(())
}

fn entry_host(entry: &Value) -> Option<String> {
    crawler_http::extract_entry_host(entry)
}

fn to_channel(entry: &Value, host: &str) -> Option<Channel> {
    let channel_id = entry.get("id").and_then(Value::as_i64).map(|id| id.to_string())
        .or_else(|| crawler_http::first_str(entry, &["id", "uuid"]).map(ToOwned::to_owned))?;
    let channel_name = crawler_http::first_str(entry, &["name"])?.to_owned();
    Some(Channel {
        channel_id,
        host: host.to_string(),
        channel_name,
        display_name: crawler_http::extract_display_name(entry),
        channel_url: crawler_http::first_str(entry, &["url"]).map(ToOwned::to_owned),
        videos_count: crawler_http::extract_videos_count(entry),
        followers_count: crawler_http::extract_followers_count(entry),
        avatar_url: entry
            .get("avatar")
            .and_then(|avatar| avatar.get("path"))
            .and_then(Value::as_str)
            .map(ToOwned::to_owned),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crawler_store::Store;
    use httpmock::{Method::GET, MockServer};
    use serde_json::json;

    fn small_page_cfg() -> ChannelsConfig {
        ChannelsConfig { page_size: 2, ..ChannelsConfig::default() }
    }

    #[tokio::test]
    async fn scenario_two_page_walk_keeps_only_same_origin_channels() {
        let server = MockServer::start();
        let host = server.address().to_string();
        server.mock(|when, then| {
            when.method(GET).path(CHANNELS_PATH).query_param("start", "0");
            then.status(200).json_body(json!({"data": [
                {"id": 1, "name": "c1", "host": host, "videos_count": 0},
                {"id": 2, "name": "c2", "host": "other.example.org", "videos_count": 0},
            ]}));
        });
        server.mock(|when, then| {
            when.method(GET).path(CHANNELS_PATH).query_param("start", "2");
            then.status(200).json_body(json!({"data": [
                {"id": 3, "name": "c3", "host": host, "videos_count": 0},
            ]}));
        });

        let store_dir = tempfile::tempdir().unwrap();
        let store = Store::open(store_dir.path().join("crawler.sqlite"), false).unwrap();
        let http = ProtocolFetcher::new();
        http.seed_protocol(&host, "http");
        let cfg = small_page_cfg();

        let last_start = walk_channels(&cfg, &store, &http, &host, 0).await.expect("walk should succeed");
        assert_eq!(last_start, 2);

        let channels = store.list_channels_with_videos(0, &[host.clone()]).unwrap();
        assert_eq!(channels.len(), 2, "the foreign-origin entry must be dropped");
        let ids: Vec<&str> = channels.iter().map(|c| c.channel_id.as_str()).collect();
        assert!(ids.contains(&"1"));
        assert!(ids.contains(&"3"));
        assert!(!ids.contains(&"2"));
    }

    #[tokio::test]
    async fn scenario_resume_from_last_start_is_idempotent_with_a_fresh_run() {
        let server = MockServer::start();
        let host = server.address().to_string();
        server.mock(|when, then| {
            when.method(GET).path(CHANNELS_PATH).query_param("start", "0");
            then.status(200).json_body(json!({"data": [
                {"id": 1, "name": "c1", "host": host, "videos_count": 0},
                {"id": 2, "name": "c2", "host": host, "videos_count": 0},
            ]}));
        });
        server.mock(|when, then| {
            when.method(GET).path(CHANNELS_PATH).query_param("start", "2");
            then.status(200).json_body(json!({"data": [
                {"id": 3, "name": "c3", "host": host, "videos_count": 0},
            ]}));
        });

        let store_dir = tempfile::tempdir().unwrap();
        let fresh_store = Store::open(store_dir.path().join("fresh.sqlite"), false).unwrap();
        let http = ProtocolFetcher::new();
        http.seed_protocol(&host, "http");
        let cfg = small_page_cfg();
        walk_channels(&cfg, &fresh_store, &http, &host, 0).await.unwrap();
        let fresh_count = fresh_store.list_channels_with_videos(0, &[host.clone()]).unwrap().len();

        let resumed_store = Store::open(store_dir.path().join("resumed.sqlite"), false).unwrap();
        // Simulate a crash after page 0 was already upserted, then resume at its offset.
        walk_channels(&cfg, &resumed_store, &http, &host, 0).await.unwrap();
        walk_channels(&cfg, &resumed_store, &http, &host, 2).await.unwrap();
        let resumed_count = resumed_store.list_channels_with_videos(0, &[host.clone()]).unwrap().len();

        assert_eq!(resumed_count, fresh_count, "re-walking from the resumed offset must not duplicate rows");
    }

    #[test]
    fn unit_to_channel_requires_name_and_host_origin_match_is_external() {
        let entry = json!({"id": 5, "name": "chan", "host": "a.example.org", "videos_count": 3});
        let channel = to_channel(&entry, "a.example.org").expect("channel should parse");
        assert_eq!(channel.channel_id, "5");
        assert_eq!(channel.channel_name, "chan");
        assert_eq!(channel.videos_count, Some(3));
    }

    #[test]
    fn invariant_host_origin_filter_rejects_foreign_entries() {
        let entry = json!({"id": 5, "name": "chan", "host": "other.example.org"});
        assert_ne!(entry_host(&entry).as_deref(), Some("a.example.org"));
    }
}
