use serde::Deserialize;

fn default_concurrency() -> usize {
    4
}
fn default_timeout_ms() -> u64 {
    10_000
}
fn default_max_retries() -> u32 {
    3
}
fn default_page_size() -> u32 {
    50
}

/// Channel discovery walker configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelsConfig {
    pub whitelist_source: String,
    #[serde(default)]
    pub excluded_hosts: Vec<String>,
    #[serde(default)]
    pub max_instances: Option<usize>,
    /// Keep progress rows for hosts already walked instead of truncating.
    #[serde(default)]
    pub resume: bool,
    /// Skip already-known channels instead of re-upserting them. Channel
    /// listings carry no documented sort guarantee, so (unlike the video
    /// walker's `stop_after_full_pages`) this never stops paging early —
    /// a later page could still hold a channel this run hasn't seen yet.
    #[serde(default)]
    pub new_only: bool,
    /// Caps the total number of channels upserted across the whole run.
    #[serde(default)]
    pub global_channel_budget: Option<i64>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            whitelist_source: String::new(),
            excluded_hosts: Vec::new(),
            max_instances: None,
            resume: false,
            new_only: false,
            global_channel_budget: None,
            concurrency: default_concurrency(),
            request_timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            page_size: default_page_size(),
        }
    }
}
