use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use crawler_core::{current_unix_timestamp_ms, CancellationToken, ExitClass, RunSummary};
use crawler_http::{FetchFault, ProtocolFetcher};
use crawler_store::Store;
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

use crate::config::FederationConfig;

const PAGINATED_PATHS: [&str; 2] = [
    "/api/v1/server/following",
    "/api/v1/server/followers",
];

/// Walks the federation graph starting from a whitelist.
#[instrument(skip(cfg, store, http))]
pub async fn run(
    cfg: FederationConfig,
    store: Arc<Store>,
    http: Arc<ProtocolFetcher>,
    cancel: CancellationToken,
) -> Result<RunSummary> {
    let started_at_ms = current_unix_timestamp_ms();
    match run_inner(&cfg, Arc::clone(&store), http, cancel, started_at_ms).await {
        Ok(summary) => Ok(summary),
        Err(error) => match error.downcast::<crawler_store::StoreError>() {
            Ok(store_error) => {
                warn!(error = %store_error, "federation walk aborted by a fatal store error");
                Ok(RunSummary {
                    stage: "federation".to_string(),
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
    cfg: &FederationConfig,
    store: Arc<Store>,
    http: Arc<ProtocolFetcher>,
    cancel: CancellationToken,
    started_at_ms: i64,
) -> Result<RunSummary> {
    let mut hosts = crawler_hostfilter::load_hosts(&cfg.whitelist_source).await?;
    hosts = crawler_hostfilter::filter_hosts(hosts, &cfg.excluded_hosts);
    if hosts.is_empty() {
        bail!("federation walker: whitelist is empty after loading and exclusion");
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

    let whitelist: BTreeSet<String> = hosts.iter().cloned().collect();
    let excluded: BTreeSet<String> = cfg
        .excluded_hosts
        .iter()
        .filter_map(|host| crawler_http::normalize_host_fragment(host))
        .collect();
    let should_enqueue_whitelist = cfg.collect_graph || cfg.expand_beyond_whitelist;
    for host in &hosts {
        store.ensure_host(host)?;
        if should_enqueue_whitelist {
            store.enqueue_host(host, 0)?;
        }
    }
    if !(cfg.resume && !should_enqueue_whitelist) {
        let recovery_scope = if cfg.expand_beyond_whitelist { None } else { Some(&whitelist) };
        store.recover_queue(recovery_scope)?;
    }

    let network_down = Arc::new(AtomicBool::new(false));
    let worker_count = cfg.concurrency.max(1);
    let mut workers = JoinSet::new();
    for worker_id in 0..worker_count {
        let store = Arc::clone(&store);
        let http = Arc::clone(&http);
        let cfg = cfg.clone();
        let cancel = cancel.clone();
        let whitelist = whitelist.clone();
        let excluded = excluded.clone();
        let network_down = Arc::clone(&network_down);
        workers.spawn(async move {
            worker_loop(worker_id, cfg, store, http, cancel, whitelist, excluded, network_down).await
        });
    }
    while let Some(result) = workers.join_next().await {
        result??;
    }

    let hosts_done = store.get_state("hosts_done")?.and_then(|v| v.parse().ok()).unwrap_or(0);
    let hosts_error = store.get_state("hosts_error")?.and_then(|v| v.parse().ok()).unwrap_or(0);
    let exit_class = if network_down.load(Ordering::SeqCst) { ExitClass::NoNetwork } else { ExitClass::Success };

    Ok(RunSummary {
        stage: "federation".to_string(),
        hosts_done,
        hosts_error,
        channels_upserted: 0,
        videos_new_total: 0,
        started_at_ms,
        finished_at_ms: current_unix_timestamp_ms(),
        exit_class: exit_class.into(),
    })
}

#[allow(clippy::too_many_arguments)]
async fn worker_loop(
    worker_id: usize,
    cfg: FederationConfig,
    store: Arc<Store>,
    http: Arc<ProtocolFetcher>,
    cancel: CancellationToken,
    whitelist: BTreeSet<String>,
    excluded: BTreeSet<String>,
    network_down: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if cancel.is_cancelled() || network_down.load(Ordering::SeqCst) {
            return Ok(());
        }
        let Some(host) = store.claim_next_host()? else {
            match store.next_queue_time()? {
                Some(next_at) => {
                    let delay_ms = (next_at - current_unix_timestamp_ms()).max(0) as u64;
                    cancel.sleep_or_cancelled(std::time::Duration::from_millis(delay_ms.min(5_000))).await;
                    continue;
                }
                None => return Ok(()),
            }
        };

        match walk_host(&cfg, &store, &http, &host, &whitelist, &excluded).await {
            Ok(()) => {
                store.mark_host_done(&host)?;
                store.increment_state("hosts_done", 1)?;
                info!(worker_id, host = %host, "federation walk succeeded");
            }
            Err(error) => {
                if error.downcast_ref::<FetchFault>().is_some_and(FetchFault::is_no_network) {
                    network_down.store(true, Ordering::SeqCst);
                    warn!(worker_id, host = %host, "no-network fault aborts federation walk");
                    return Ok(());
                }
                warn!(worker_id, host = %host, error = %error, "federation walk failed");
                store.mark_host_error(&host, &error.to_string())?;
                let error_count = store.get_host_error_count(&host)?;
                if error_count < cfg.max_errors as i64 {
                    let backoff_ms = crawler_core::clamped_backoff_ms(error_count as u32, 5_000, 300_000);
                    store.enqueue_host(&host, backoff_ms as i64)?;
                } else {
                    store.increment_state("hosts_error", 1)?;
                }
            }
        }
    }
}

/// Pages `server/following` and `server/followers` for `host`. A peer
/// excluded via `excluded_hosts` contributes neither an edge nor a queue
/// entry; otherwise an edge is recorded when `collect_graph` is set, and
/// the peer is queued for its own walk when it's in the whitelist or
/// `expand_beyond_whitelist` is set.
async fn walk_host(
    cfg: &FederationConfig,
    store: &Store,
    http: &ProtocolFetcher,
    host: &str,
    whitelist: &BTreeSet<String>,
    excluded: &BTreeSet<String>,
) -> Result<()> {
    for path in PAGINATED_PATHS {
        let mut start = 0u32;
        loop {
            let query = format!("{path}?start={start}&count={}", cfg.page_size);
            let page: Value = http
                .fetch_json(host, &query, cfg.request_timeout_ms, cfg.max_retries)
                .await?;
            let entries = page.get("data").and_then(Value::as_array).cloned().unwrap_or_default();
            if entries.is_empty() {
                break;
            }
            for entry in &entries {
                let Some(peer_host) = extract_peer_host(entry) else {
                    continue;
                };
                if peer_host.eq_ignore_ascii_case(host) || excluded.contains(&peer_host) {
                    continue;
                }
                if cfg.collect_graph {
                    store.insert_edge(host, &peer_host)?;
                }
                if whitelist.contains(&peer_host) || cfg.expand_beyond_whitelist {
                    store.ensure_host(&peer_host)?;
                    store.enqueue_host(&peer_host, 0)?;
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
    }
    Ok(())
}

fn extract_peer_host(entry: &Value) -> Option<String> {
    for key in ["following", "follower"] {
        if let Some(actor) = entry.get(key) {
            if let Some(host) = crawler_http::extract_entry_host(actor) {
                return Some(host);
            }
        }
    }
    crawler_http::extract_entry_host(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crawler_store::Store;
    use httpmock::{Method::GET, MockServer};
    use serde_json::json;

    fn empty_page(server: &MockServer, path: &str) {
        server.mock(|when, then| {
            when.method(GET).path(path);
            then.status(200).json_body(json!({"data": []}));
        });
    }

    #[tokio::test]
    async fn scenario_excluded_peer_gets_neither_edge_nor_queue_entry() {
        let server = MockServer::start();
        let host = server.address().to_string();
        server.mock(|when, then| {
            when.method(GET).path("/api/v1/server/following");
            then.status(200).json_body(json!({
                "data": [
                    {"following": {"host": "b.example.org"}},
                    {"following": {"host": "c.example.org"}},
                ],
            }));
        });
        empty_page(&server, "/api/v1/server/followers");

        let store_dir = tempfile::tempdir().unwrap();
        let store = Store::open(store_dir.path().join("crawler.sqlite"), false).unwrap();
        let http = ProtocolFetcher::new();
        http.seed_protocol(&host, "http");

        let cfg = FederationConfig {
            collect_graph: true,
            expand_beyond_whitelist: true,
            ..FederationConfig::default()
        };
        let whitelist: BTreeSet<String> = [host.clone()].into_iter().collect();
        let excluded: BTreeSet<String> = ["c.example.org".to_string()].into_iter().collect();

        walk_host(&cfg, &store, &http, &host, &whitelist, &excluded)
            .await
            .expect("walk should succeed");

        let edges = store.list_edges().unwrap();
        assert!(edges.contains(&(host.clone(), "b.example.org".to_string())));
        assert!(!edges.iter().any(|(_, target)| target == "c.example.org"));

        let hosts: Vec<String> = store.list_hosts().unwrap().into_iter().map(|h| h.host).collect();
        assert!(hosts.contains(&"b.example.org".to_string()));
        assert!(!hosts.contains(&"c.example.org".to_string()));
    }

    #[tokio::test]
    async fn scenario_expand_disabled_still_records_edges_without_queuing_new_hosts() {
        let server = MockServer::start();
        let host = server.address().to_string();
        server.mock(|when, then| {
            when.method(GET).path("/api/v1/server/following");
            then.status(200).json_body(json!({
                "data": [{"following": {"host": "b.example.org"}}],
            }));
        });
        empty_page(&server, "/api/v1/server/followers");

        let store_dir = tempfile::tempdir().unwrap();
        let store = Store::open(store_dir.path().join("crawler.sqlite"), false).unwrap();
        let http = ProtocolFetcher::new();
        http.seed_protocol(&host, "http");

        let cfg = FederationConfig {
            collect_graph: true,
            expand_beyond_whitelist: false,
            ..FederationConfig::default()
        };
        let whitelist: BTreeSet<String> = [host.clone()].into_iter().collect();
        let excluded = BTreeSet::new();

        walk_host(&cfg, &store, &http, &host, &whitelist, &excluded)
            .await
            .expect("walk should succeed");

        let edges = store.list_edges().unwrap();
        assert!(edges.contains(&(host.clone(), "b.example.org".to_string())), "edge must still be recorded");

        let hosts: Vec<String> = store.list_hosts().unwrap().into_iter().map(|h| h.host).collect();
        assert!(!hosts.contains(&"b.example.org".to_string()), "discovery must not expand past the whitelist");
    }

    #[test]
    fn unit_extract_peer_host_prefers_following_then_follower_then_top_level() {
        assert_eq!(
            extract_peer_host(&json!({"following": {"host": "a.example.org"}})).as_deref(),
            Some("a.example.org")
        );
        assert_eq!(
            extract_peer_host(&json!({"follower": {"host": "b.example.org"}})).as_deref(),
            Some("b.example.org")
        );
        assert_eq!(
            extract_peer_host(&json!({"host": "c.example.org"})).as_deref(),
            Some("c.example.org")
        );
        assert_eq!(extract_peer_host(&json!({})), None);
    }
}
