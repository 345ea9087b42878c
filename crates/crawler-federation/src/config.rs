use serde::Deserialize;

fn default_max_errors() -> u32 {
    5
}

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

/// Federation walker configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FederationConfig {
    /// Local file path or `http(s)` URL the whitelist is read from.
    pub whitelist_source: String,
    #[serde(default)]
    pub excluded_hosts: Vec<String>,
    /// When true, hosts discovered during the walk that weren't in the
    /// initial whitelist are queued for their own walk. When false, the
    /// walker never grows past the whitelist it started with.
    #[serde(default)]
    pub expand_beyond_whitelist: bool,
    /// When true, opportunistic edges discovered during the walk are
    /// persisted; see DESIGN.md for why this defaults to off.
    #[serde(default)]
    pub collect_graph: bool,
    /// Caps the number of hosts enqueued after whitelist + exclusion.
    #[serde(default)]
    pub max_instances: Option<usize>,
    #[serde(default = "default_max_errors")]
    pub max_errors: u32,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            whitelist_source: String::new(),
            excluded_hosts: Vec::new(),
            expand_beyond_whitelist: false,
            collect_graph: false,
            max_instances: None,
            max_errors: default_max_errors(),
            concurrency: default_concurrency(),
            request_timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            page_size: default_page_size(),
        }
    }
}
