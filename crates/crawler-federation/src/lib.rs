//! Federation-graph walker: expands a whitelist across PeerTube's
//! follower/following graph.

mod config;
mod run;

pub use config::FederationConfig;
pub use run::run;

#[cfg(test)]
mod tests {
    use super::*;
    use crawler_store::Store;

    #[test]
    fn functional_empty_whitelist_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let whitelist_path = dir.path().join("whitelist.txt");
        std::fs::write(&whitelist_path, "# nothing but comments\n").unwrap();

        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let store = std::sync::Arc::new(Store::open(dir.path().join("crawler.sqlite"), false).unwrap());
        let http = std::sync::Arc::new(crawler_http::ProtocolFetcher::new());
        let cfg = FederationConfig {
            whitelist_source: whitelist_path.to_str().unwrap().to_string(),
            ..FederationConfig::default()
        };
        let result = runtime.block_on(run(cfg, store, http, crawler_core::CancellationToken::new()));
        assert!(result.is_err(), "an empty whitelist must fail fast rather than run with zero hosts");
    }
}
