//! Whitelist loading and exclusion filtering.
//!
//! The whitelist is a plain-text, one-host-per-line file or URL; `#`-prefixed
//! lines are comments. Loading is deliberately separate from normalization,
//! which lives in [`crawler_http::normalize_host_fragment`].

use std::collections::HashSet;

use anyhow::{Context, Result};
use crawler_http::{extract_scheme, normalize_host_fragment};

/// A whitelist entry after normalization: the bare host, plus the scheme
/// the entry's own URL specified, if any (falls back to the protocol
/// fetcher's `https`-by-default rule when absent).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEntry {
    pub host: String,
    pub scheme: Option<&'static str>,
}

/// Loads and normalizes a whitelist from a local file path or an `http(s)`
/// URL, skipping blank lines and `#` comments.
pub async fn load_hosts(source: &str) -> Result<Vec<HostEntry>> {
    let body = if source.starts_with("http://") || source.starts_with("https://") {
        reqwest::get(source)
            .await
            .with_context(|| format!("fetching whitelist from {source}"))?
            .text()
            .await
            .with_context(|| format!("reading whitelist body from {source}"))?
    } else {
        tokio::fs::read_to_string(source)
            .await
            .with_context(|| format!("reading whitelist file {source}"))?
    };
    Ok(parse_hosts(&body))
}

fn parse_hosts(body: &str) -> Vec<HostEntry> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let host = normalize_host_fragment(line)?;
            Some(HostEntry { host, scheme: extract_scheme(line) })
        })
        .collect()
}

/// Removes any entry whose host is present (case-insensitively,
/// already-normalized) in `excluded`, preserving order and de-duplicating.
pub fn filter_hosts(hosts: Vec<HostEntry>, excluded: &[String]) -> Vec<HostEntry> {
    let excluded_normalized: HashSet<String> = excluded.iter().filter_map(|host| normalize_host_fragment(host)).collect();
    let mut seen = HashSet::new();
    hosts
        .into_iter()
        .filter(|entry| !excluded_normalized.contains(&entry.host))
        .filter(|entry| seen.insert(entry.host.clone()))
        .collect()
}
