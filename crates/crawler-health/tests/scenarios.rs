use std::sync::Arc;

use crawler_core::CancellationToken;
use crawler_health::{run, HealthConfig, HealthScope};
use crawler_http::ProtocolFetcher;
use crawler_store::{HealthStatus, Store};
use httpmock::{Method::GET, MockServer};
use serde_json::json;

#[tokio::test]
async fn scenario_probes_reachable_host_and_marks_it_healthy() {
    let server = MockServer::start();
    let host = server.address().to_string();

    let mock = server.mock(|when, then| {
        when.method(GET).path("/api/v1/config");
        then.status(200).json_body(json!({"serverVersion": "6.0.0"}));
    });

    let store_dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(store_dir.path().join("crawler.sqlite"), false).unwrap());
    store.ensure_host(&host).unwrap();

    let http = Arc::new(ProtocolFetcher::new());
    http.seed_protocol(&host, "http");

    run(
        HealthConfig { scope: HealthScope::All, ..HealthConfig::default() },
        Arc::clone(&store),
        http,
        CancellationToken::new(),
    )
    .await
    .expect("health run should succeed");

    mock.assert();
    let hosts = store.list_hosts().unwrap();
    assert_eq!(hosts.len(), 1);
    assert_eq!(hosts[0].health_status, HealthStatus::Ok);
    assert!(hosts[0].health_checked_at.is_some());
}

#[tokio::test]
async fn scenario_marks_unreachable_host_as_error_without_failing_the_run() {
    let server = MockServer::start();
    let host = server.address().to_string();
    server.mock(|when, then| {
        when.method(GET).path("/api/v1/config");
        then.status(503).body("down for maintenance");
    });

    let store_dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(store_dir.path().join("crawler.sqlite"), false).unwrap());
    store.ensure_host(&host).unwrap();

    let http = Arc::new(ProtocolFetcher::new());
    http.seed_protocol(&host, "http");

    let cfg = HealthConfig {
        scope: HealthScope::All,
        max_retries: 0,
        ..HealthConfig::default()
    };
    run(cfg, Arc::clone(&store), http, CancellationToken::new())
        .await
        .expect("health run should succeed even when a probe fails");

    let hosts = store.list_hosts().unwrap();
    assert_eq!(hosts[0].health_status, HealthStatus::Error);
    assert!(hosts[0].health_error.is_some());
}
