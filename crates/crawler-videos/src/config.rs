use serde::Deserialize;

fn default_concurrency() -> usize {
    4
}
fn default_channel_concurrency() -> usize {
    2
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
fn default_sort() -> String {
    "-publishedAt".to_string()
}

/// Video discovery walker configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct VideosConfig {
    #[serde(default)]
    pub max_instances: Option<usize>,
    #[serde(default)]
    pub max_channels: Option<usize>,
    #[serde(default)]
    pub resume: bool,
    /// Re-walk only channels whose last attempt recorded an error.
    #[serde(default)]
    pub errors_only: bool,
    /// Stop paging a channel once a page is entirely already-known videos.
    #[serde(default)]
    pub new_only: bool,
    #[serde(default = "default_sort")]
    pub sort: String,
    /// Stop the whole channel once this many consecutive pages contained no
    /// new video (vs. `new_only`, this caps wasted pagination rather than
    /// skipping writes).
    #[serde(default)]
    pub stop_after_full_pages: Option<u32>,
    #[serde(default)]
    pub max_videos_pages: Option<u32>,
    #[serde(default = "default_channel_concurrency")]
    pub channel_concurrency: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for VideosConfig {
    fn default() -> Self {
        Self {
            max_instances: None,
            max_channels: None,
            resume: false,
            errors_only: false,
            new_only: false,
            sort: default_sort(),
            stop_after_full_pages: None,
            max_videos_pages: None,
            channel_concurrency: default_channel_concurrency(),
            concurrency: default_concurrency(),
            request_timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            page_size: default_page_size(),
        }
    }
}
