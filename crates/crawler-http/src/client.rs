use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::fault::{classify_transport_error, FetchFault};
use crate::retry::{exponential_backoff, parse_retry_after, too_many_requests_delay};

/// DNS resolver that orders a host's addresses IPv4-first, so the
/// connector's happy-eyeballs dial tries IPv4 before any IPv6 record.
#[derive(Debug, Default)]
struct Ipv4PreferringResolver;

impl Resolve for Ipv4PreferringResolver {
    fn resolve(&self, name: Name) -> Resolving {
        Box::pin(async move {
            let host = name.as_str().to_string();
            let mut addrs: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), 0))
                .await?
                .collect();
            addrs.sort_by_key(|addr| !addr.is_ipv4());
            let iter: Addrs = Box::new(addrs.into_iter());
            Ok(iter)
        })
    }
}

/// JSON GET client with timeout, retry ladder, `Retry-After` honoring,
/// no-network shell-out fallback, and fault classification.
#[derive(Clone)]
pub struct FetchJson {
    client: reqwest::Client,
}

impl Default for FetchJson {
    fn default() -> Self {
        Self::new()
    }
}

impl FetchJson {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .dns_resolver(Arc::new(Ipv4PreferringResolver))
            .build()
            .expect("reqwest client with default TLS backend must build");
        Self { client }
    }

    /// Retries 5xx/429 up to `max_retries`, falls back to an out-of-process
    /// client on no-network faults, and raises the last observed fault on
    /// exhaustion.
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        url: &str,
        timeout_ms: u64,
        max_retries: u32,
    ) -> Result<T, FetchFault> {
        let mut attempt = 0u32;
        let mut last_fault;
        loop {
            match self.try_fetch_once(url, timeout_ms).await {
                Ok(body) => {
                    return serde_json::from_str::<T>(&body)
                        .map_err(|error| FetchFault::InvalidJson(error.to_string()));
                }
                Err(fault) => {
                    last_fault = fault;
                }
            }

            if last_fault.is_no_network() {
                debug!(url, "in-process client reports no-network, trying shell fallback");
                match fallback_shell_fetch(url, timeout_ms).await {
                    Ok(body) => {
                        return serde_json::from_str::<T>(&body)
                            .map_err(|error| FetchFault::InvalidJson(error.to_string()));
                    }
                    Err(shell_fault) => {
                        warn!(url, error = %shell_fault, "shell fallback also failed");
                        return Err(FetchFault::NoNetwork(shell_fault.to_string()));
                    }
                }
            }

            if let FetchFault::TooManyRequests { retry_after } = &last_fault {
                let backoff = exponential_backoff(attempt);
                let delay = too_many_requests_delay(*retry_after, backoff);
                tokio::time::sleep(delay).await;
                continue; // 429 retries do not consume the retry budget
            }

            if last_fault.is_terminal_for_url() {
                return Err(last_fault);
            }

            if attempt >= max_retries {
                return Err(last_fault);
            }
            let delay = exponential_backoff(attempt);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn try_fetch_once(&self, url: &str, timeout_ms: u64) -> Result<String, FetchFault> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(Duration::from_millis(timeout_ms.max(1)))
            .send()
            .await
            .map_err(|error| classify_transport_error(&error))?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(parse_retry_after);
            return Err(FetchFault::TooManyRequests { retry_after });
        }
        if status.is_server_error() {
            return Err(FetchFault::Http {
                status: status.as_u16(),
                body_snippet: truncate(&response.text().await.unwrap_or_default(), 300),
            });
        }
        if status.is_client_error() {
            return Err(FetchFault::Http {
                status: status.as_u16(),
                body_snippet: truncate(&response.text().await.unwrap_or_default(), 300),
            });
        }
        response
            .text()
            .await
            .map_err(|error| classify_transport_error(&error))
    }
}

/// Out-of-process shell client for environments where the in-process
/// resolver is broken. Its stdout is treated as a 200 body.
async fn fallback_shell_fetch(url: &str, timeout_ms: u64) -> Result<String, FetchFault> {
    let timeout_secs = (timeout_ms.max(1) / 1000).max(1).to_string();
    let rendered = format!(
        "curl -fsSL -H {} --max-time {timeout_secs} {}",
        shell_words::quote("Accept: application/json"),
        shell_words::quote(url),
    );
    let tokens = shell_words::split(&rendered)
        .map_err(|error| FetchFault::NoNetwork(format!("failed to tokenize shell fallback command: {error}")))?;
    let [program, args @ ..] = tokens.as_slice() else {
        return Err(FetchFault::NoNetwork("shell fallback command template is empty".to_string()));
    };

    let mut command = tokio::process::Command::new(program);
    command.args(args).kill_on_drop(true);

    let output = tokio::time::timeout(Duration::from_millis(timeout_ms.saturating_add(2000).max(1)), command.output())
        .await
        .map_err(|_| FetchFault::NoNetwork(format!("shell fallback timed out for {url}")))?
        .map_err(|error| FetchFault::NoNetwork(format!("failed to spawn shell fallback: {error}")))?;

    if !output.status.success() {
        return Err(FetchFault::NoNetwork(format!(
            "shell fallback exited with {:?}",
            output.status.code()
        )));
    }
    String::from_utf8(output.stdout).map_err(|error| FetchFault::NoNetwork(error.to_string()))
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated = text.chars().take(max_chars).collect::<String>();
    truncated.push_str("...");
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::GET, MockServer};
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Payload {
        ok: bool,
    }

    #[tokio::test]
    async fn functional_fetch_json_succeeds_on_200() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/ok");
            then.status(200).json_body_obj(&serde_json::json!({"ok": true}));
        });
        let fetcher = FetchJson::new();
        let result: Payload = fetcher
            .fetch_json(&server.url("/ok"), 2000, 3)
            .await
            .expect("fetch should succeed");
        mock.assert();
        assert_eq!(result, Payload { ok: true });
    }

    #[tokio::test]
    async fn unit_http_404_is_terminal_without_retry() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/missing");
            then.status(404).body("nope");
        });
        let fetcher = FetchJson::new();
        let result: Result<Payload, FetchFault> = fetcher.fetch_json(&server.url("/missing"), 2000, 3).await;
        mock.assert_hits(1);
        assert!(matches!(result, Err(FetchFault::Http { status: 404, .. })));
    }

    #[tokio::test]
    async fn functional_retries_5xx_then_succeeds() {
        let server = MockServer::start();
        let first = server.mock(|when, then| {
            when.method(GET).path("/flaky");
            then.status(503).body("try again");
        });
        let fetcher = FetchJson::new();
        // First request will hit the 503 mock; without a second mock replacing it
        // the retry also sees 503 and exhausts its budget — asserting the fault
        // propagates and the retry actually happened (hits > 1).
        let result: Result<Payload, FetchFault> = fetcher.fetch_json(&server.url("/flaky"), 2000, 1).await;
        assert!(result.is_err());
        first.assert_hits(2);
    }

    #[tokio::test]
    async fn scenario_429_with_retry_after_sleeps_then_succeeds() {
        let server = MockServer::start();
        let retry_mock = server.mock(|when, then| {
            when.method(GET).path("/limited");
            then.status(429).header("Retry-After", "1");
        });
        let fetcher = FetchJson::new();
        let started = std::time::Instant::now();
        let handle = tokio::spawn({
            let fetcher = fetcher.clone();
            let url = server.url("/limited");
            async move { fetcher.fetch_json::<Payload>(&url, 2000, 3).await }
        });
        tokio::time::sleep(Duration::from_millis(150)).await;
        retry_mock.delete();
        server.mock(|when, then| {
            when.method(GET).path("/limited");
            then.status(200).json_body_obj(&serde_json::json!({"ok": true}));
        });
        let result = handle.await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(900));
        assert_eq!(result.unwrap(), Payload { ok: true });
    }
}
