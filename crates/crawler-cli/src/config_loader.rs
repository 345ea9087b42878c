use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

/// Loads a stage config from a TOML file if one was given, falling back to
/// `T::default()` otherwise. Walkers only ever see the materialized struct;
/// this is the crate's one place that touches the filesystem for config.
pub(crate) fn load_or_default<T: Default + DeserializeOwned>(path: Option<&Path>) -> Result<T> {
    let Some(path) = path else {
        return Ok(T::default());
    };
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
}

/// Overlay applied on top of [`crawler_enrichment::EnrichmentConfig::new`]
/// since that type has no sensible `Default` (its `mode` is selected by the
/// CLI's `--stage` flag, not read from the config file).
#[derive(Debug, Default, serde::Deserialize)]
pub(crate) struct EnrichmentOverrides {
    pub resume: Option<bool>,
    pub concurrency: Option<usize>,
    pub request_timeout_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub host_delay_ms: Option<u64>,
}

pub(crate) fn load_enrichment_overrides(path: Option<&Path>) -> Result<EnrichmentOverrides> {
    load_or_default(path)
}

impl EnrichmentOverrides {
    pub(crate) fn apply(self, mut cfg: crawler_enrichment::EnrichmentConfig) -> crawler_enrichment::EnrichmentConfig {
        if let Some(resume) = self.resume {
            cfg.resume = resume;
        }
        if let Some(concurrency) = self.concurrency {
            cfg.concurrency = concurrency;
        }
        if let Some(timeout_ms) = self.request_timeout_ms {
            cfg.request_timeout_ms = timeout_ms;
        }
        if let Some(max_retries) = self.max_retries {
            cfg.max_retries = max_retries;
        }
        if let Some(host_delay_ms) = self.host_delay_ms {
            cfg.host_delay_ms = host_delay_ms;
        }
        cfg
    }
}
