use std::sync::Arc;

use crawler_core::CancellationToken;
use crawler_http::ProtocolFetcher;
use crawler_store::{Channel, Store};
use crawler_videos::{run, VideosConfig};
use httpmock::{Method::GET, MockServer};
use serde_json::json;

fn seeded_channel(host: &str) -> Channel {
    Channel {
        channel_id: "1".to_string(),
        host: host.to_string(),
        channel_name: "news_channel".to_string(),
        display_name: Some("News Channel".to_string()),
        channel_url: None,
        videos_count: Some(1),
        followers_count: None,
        avatar_url: None,
    }
}

#[tokio::test]
async fn scenario_discovers_videos_for_an_eligible_channel_and_stops_on_empty_page() {
    let server = MockServer::start();
    let host = server.address().to_string();

    let first_page = server.mock(|when, then| {
        when.method(GET)
            .path("/api/v1/video-channels/news_channel/videos")
            .query_param("start", "0");
        then.status(200).json_body(json!({
            "data": [{"uuid": "v1", "name": "first upload"}],
        }));
    });
    let second_page = server.mock(|when, then| {
        when.method(GET)
            .path("/api/v1/video-channels/news_channel/videos")
            .query_param("start", "50");
        then.status(200).json_body(json!({"data": []}));
    });

    let store_dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(store_dir.path().join("crawler.sqlite"), false).unwrap());
    store.upsert_channels(&[seeded_channel(&host)]).unwrap();

    let http = Arc::new(ProtocolFetcher::new());
    http.seed_protocol(&host, "http");

    let summary = run(VideosConfig::default(), Arc::clone(&store), http, CancellationToken::new())
        .await
        .expect("video discovery run should succeed");

    first_page.assert();
    second_page.assert();
    assert_eq!(summary.videos_new_total, 1);

    let videos = store.list_videos_for_comments(false).unwrap();
    assert_eq!(videos.len(), 1);
    assert_eq!(videos[0].video_id, "v1");
}

#[tokio::test]
async fn scenario_new_only_mode_drops_already_known_videos() {
    let server = MockServer::start();
    let host = server.address().to_string();

    server.mock(|when, then| {
        when.method(GET).path("/api/v1/video-channels/news_channel/videos");
        then.status(200).json_body(json!({
            "data": [{"uuid": "v1", "name": "already seen"}],
        }));
    });

    let store_dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(store_dir.path().join("crawler.sqlite"), false).unwrap());
    store.upsert_channels(&[seeded_channel(&host)]).unwrap();
    store
        .upsert_videos(&[crawler_store::Video {
            video_id: "v1".to_string(),
            host: host.clone(),
            title: "already seen".to_string(),
            ..Default::default()
        }])
        .unwrap();

    let http = Arc::new(ProtocolFetcher::new());
    http.seed_protocol(&host, "http");
    let mut cfg = VideosConfig::default();
    cfg.new_only = true;

    let summary = run(cfg, Arc::clone(&store), http, CancellationToken::new())
        .await
        .expect("video discovery run should succeed");

    assert_eq!(summary.videos_new_total, 0);
}
