use std::sync::Arc;

use crawler_core::CancellationToken;
use crawler_enrichment::{run, EnrichmentConfig, EnrichmentMode};
use crawler_http::ProtocolFetcher;
use crawler_store::{Store, TagsFilterMode, Video};
use httpmock::{Method::GET, MockServer};
use serde_json::json;

fn seeded_video(host: &str, video_id: &str) -> Video {
    Video {
        video_id: video_id.to_string(),
        host: host.to_string(),
        title: "untagged upload".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn scenario_tags_mode_fetches_and_persists_tags_for_untagged_videos() {
    let server = MockServer::start();
    let host = server.address().to_string();

    let mock = server.mock(|when, then| {
        when.method(GET).path("/api/v1/videos/v1");
        then.status(200).json_body(json!({"tags": ["rust", "async"]}));
    });

    let store_dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(store_dir.path().join("crawler.sqlite"), false).unwrap());
    store.upsert_videos(&[seeded_video(&host, "v1")]).unwrap();

    let http = Arc::new(ProtocolFetcher::new());
    http.seed_protocol(&host, "http");

    let summary = run(
        EnrichmentConfig::new(EnrichmentMode::Tags),
        Arc::clone(&store),
        http,
        CancellationToken::new(),
    )
    .await
    .expect("tags enrichment run should succeed");

    mock.assert();
    assert_eq!(summary.stage, "enrichment:tags");

    let tagged = store.list_videos_for_tags(TagsFilterMode::Present).unwrap();
    assert_eq!(tagged.len(), 1);
    assert_eq!(tagged[0].video_id, "v1");

    let still_missing = store.list_videos_for_tags(TagsFilterMode::Missing).unwrap();
    assert!(still_missing.is_empty());
}

#[tokio::test]
async fn scenario_comments_mode_invalidates_video_on_404() {
    let server = MockServer::start();
    let host = server.address().to_string();

    server.mock(|when, then| {
        when.method(GET).path("/api/v1/videos/v1");
        then.status(404).body("gone");
    });

    let store_dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(store_dir.path().join("crawler.sqlite"), false).unwrap());
    store.upsert_videos(&[seeded_video(&host, "v1")]).unwrap();

    let http = Arc::new(ProtocolFetcher::new());
    http.seed_protocol(&host, "http");

    run(
        EnrichmentConfig::new(EnrichmentMode::Comments),
        Arc::clone(&store),
        http,
        CancellationToken::new(),
    )
    .await
    .expect("comments enrichment run should succeed even when a video 404s");

    let remaining = store.list_videos_for_comments(false).unwrap();
    assert!(remaining.is_empty(), "a 404'd video must be dropped from further enrichment scope");
}
