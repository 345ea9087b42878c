use serde::Deserialize;

fn default_concurrency() -> usize {
    8
}
fn default_timeout_ms() -> u64 {
    5_000
}
fn default_max_retries() -> u32 {
    1
}

/// Which hosts a health-check run probes.
#[derive(Debug, Clone, Deserialize)]
pub enum HealthScope {
    All,
    ErrorsOnly,
    SingleHost(String),
}

/// Host health-check configuration. Writes `hosts.health_status` independent
/// of any walk's progress tables.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    pub scope: HealthScope,
    /// Skip hosts probed more recently than this, to avoid re-checking a
    /// host that was just confirmed healthy by another stage.
    #[serde(default)]
    pub min_age_ms: i64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            scope: HealthScope::All,
            min_age_ms: 0,
            concurrency: default_concurrency(),
            request_timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
        }
    }
}
