use std::sync::Arc;

use anyhow::Result;
use crawler_core::{current_unix_timestamp_ms, CancellationToken, ExitClass, RunSummary};
use crawler_http::ProtocolFetcher;
use crawler_store::{HealthStatus, Host, Store};
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

use crate::config::{HealthConfig, HealthScope};

const PROBE_PATH: &str = "/api/v1/config";

/// Probes each in-scope host's cheap config endpoint and records health
/// status, entirely independent of any walk's progress tables.
#[instrument(skip(cfg, store, http))]
pub async fn run(
    cfg: HealthConfig,
    store: Arc<Store>,
    http: Arc<ProtocolFetcher>,
    cancel: CancellationToken,
) -> Result<RunSummary> {
    let started_at_ms = current_unix_timestamp_ms();
    match run_inner(&cfg, Arc::clone(&store), http, cancel, started_at_ms).await {
        Ok(summary) => Ok(summary),
        Err(error) => match error.downcast::<crawler_store::StoreError>() {
            Ok(store_error) => {
                warn!(error = %store_error, "health probing aborted by a fatal store error");
                Ok(RunSummary {
                    stage: "health".to_string(),
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
    cfg: &HealthConfig,
    store: Arc<Store>,
    http: Arc<ProtocolFetcher>,
    cancel: CancellationToken,
    started_at_ms: i64,
) -> Result<RunSummary> {
    let hosts = store.list_hosts()?;
    let in_scope = select_scope(&hosts, &cfg);
    let now = current_unix_timestamp_ms();
    let due: Vec<Host> = in_scope
        .into_iter()
        .filter(|host| match host.health_checked_at {
            Some(checked_at) => now - checked_at >= cfg.min_age_ms,
            None => true,
        })
        .collect();

    let semaphore = Arc::new(Semaphore::new(cfg.concurrency.max(1)));
    let mut workers = JoinSet::new();
    for host in due {
        if cancel.is_cancelled() {
            break;
        }
        let store = Arc::clone(&store);
        let http = Arc::clone(&http);
        let cfg = cfg.clone();
        let permit_src = Arc::clone(&semaphore);
        workers.spawn(async move {
            let _permit = permit_src.acquire_owned().await.expect("semaphore not closed");
            probe_one(&cfg, &store, &http, &host.host).await;
        });
    }
    while workers.join_next().await.is_some() {}

    Ok(RunSummary {
        stage: "health".to_string(),
        hosts_done: 0,
        hosts_error: 0,
        channels_upserted: 0,
        videos_new_total: 0,
        started_at_ms,
        finished_at_ms: current_unix_timestamp_ms(),
        exit_class: ExitClass::Success.into(),
    })
}

fn select_scope(hosts: &[Host], cfg: &HealthConfig) -> Vec<Host> {
    match &cfg.scope {
        HealthScope::All => hosts.to_vec(),
        HealthScope::ErrorsOnly => hosts
            .iter()
            .filter(|host| host.health_status == HealthStatus::Error || host.last_error.is_some())
            .cloned()
            .collect(),
        HealthScope::SingleHost(target) => hosts
            .iter()
            .filter(|host| host.host.eq_ignore_ascii_case(target))
            .cloned()
            .collect(),
    }
}

async fn probe_one(cfg: &HealthConfig, store: &Store, http: &ProtocolFetcher, host: &str) {
    let result: Result<Value, _> = http.fetch_json(host, PROBE_PATH, cfg.request_timeout_ms, cfg.max_retries).await;
    match result {
        Ok(_) => {
            if let Err(error) = store.mark_host_health(host, HealthStatus::Ok, None) {
                warn!(host, error = %error, "failed to record healthy status");
            } else {
                info!(host, "host healthy");
            }
        }
        Err(fault) => {
            if let Err(error) = store.mark_host_health(host, HealthStatus::Error, Some(&fault.to_string())) {
                warn!(host, error = %error, "failed to record unhealthy status");
            } else {
                warn!(host, fault = %fault, "host unhealthy");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(name: &str, status: HealthStatus, checked_at: Option<i64>, last_error: Option<&str>) -> Host {
        Host {
            host: name.to_string(),
            health_status: status,
            health_checked_at: checked_at,
            health_error: None,
            last_error: last_error.map(ToOwned::to_owned),
            last_error_at: None,
        }
    }

    #[test]
    fn unit_select_scope_errors_only_matches_status_or_last_error() {
        let hosts = vec![
            host("a.example", HealthStatus::Ok, None, None),
            host("b.example", HealthStatus::Error, None, None),
            host("c.example", HealthStatus::Ok, None, Some("boom")),
        ];
        let cfg = HealthConfig { scope: HealthScope::ErrorsOnly, ..HealthConfig::default() };
        let selected = select_scope(&hosts, &cfg);
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn unit_select_scope_single_host_is_case_insensitive() {
        let hosts = vec![host("A.Example.org", HealthStatus::Ok, None, None)];
        let cfg = HealthConfig { scope: HealthScope::SingleHost("a.example.org".to_string()), ..HealthConfig::default() };
        assert_eq!(select_scope(&hosts, &cfg).len(), 1);
    }
}
