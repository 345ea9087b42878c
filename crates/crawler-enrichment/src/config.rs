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

/// Which per-video fields this run fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentMode {
    /// Fetch tags only for videos that don't have any yet.
    Tags,
    /// Re-fetch tags even for videos that already have some.
    UpdateTags,
    Comments,
}

/// Per-video enrichment walker configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EnrichmentConfig {
    pub mode: EnrichmentMode,
    #[serde(default)]
    pub resume: bool,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay between successive requests a single worker issues, to avoid
    /// hammering any one host.
    #[serde(default)]
    pub host_delay_ms: u64,
}

impl EnrichmentConfig {
    pub fn new(mode: EnrichmentMode) -> Self {
        Self {
            mode,
            resume: false,
            concurrency: default_concurrency(),
            request_timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            host_delay_ms: 0,
        }
    }
}
