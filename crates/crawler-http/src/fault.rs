use std::time::Duration;

use thiserror::Error;

/// Classified transport/application faults for a single `FetchJson` call.
/// Walkers match on this to decide retry vs terminal vs abort-the-stage.
#[derive(Debug, Error)]
pub enum FetchFault {
    /// DNS/connection-refused/unreachable/timeout at the transport layer —
    /// distinct from an application-layer HTTP error. Aborts the stage.
    #[error("no network: {0}")]
    NoNetwork(String),
    #[error("HTTP {status}: {body_snippet}")]
    Http { status: u16, body_snippet: String },
    #[error("rate limited, retry after {retry_after:?}")]
    TooManyRequests { retry_after: Option<Duration> },
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("TLS certificate expired: {0}")]
    TlsExpired(String),
    #[error("TLS/SSL error: {0}")]
    TlsOther(String),
    #[error("request timed out: {0}")]
    Timeout(String),
}

impl FetchFault {
    /// True when this fault is terminal for the single URL that produced
    /// it: HTTP 4xx other than 429, or invalid JSON.
    pub fn is_terminal_for_url(&self) -> bool {
        matches!(
            self,
            FetchFault::Http { status, .. } if *status != 429
        ) || matches!(self, FetchFault::InvalidJson(_))
    }

    pub fn is_no_network(&self) -> bool {
        matches!(self, FetchFault::NoNetwork(_))
    }
}

/// Classifies a reqwest transport error from its message/debug metadata
/// into the fault kinds the enrichment walker needs to distinguish:
/// expired certificate, generic TLS/SSL, timeout, or no-network.
pub fn classify_transport_error(error: &reqwest::Error) -> FetchFault {
    let text = format!("{error:?} {error}");
    if error.is_timeout() || contains_any(&text, &["timed out", "timeout"]) {
        return FetchFault::Timeout(error.to_string());
    }
    if contains_any(&text, &["CERT_HAS_EXPIRED", "certificate has expired", "certificate expired"]) {
        return FetchFault::TlsExpired(error.to_string());
    }
    if contains_any(
        &text,
        &["tls", "ssl", "certificate", "UnknownIssuer", "InvalidCertificate"],
    ) {
        return FetchFault::TlsOther(error.to_string());
    }
    if error.is_connect()
        || contains_any(
            &text,
            &[
                "ENETUNREACH",
                "EHOSTUNREACH",
                "ENOTFOUND",
                "EAI_AGAIN",
                "ECONNREFUSED",
                "ETIMEDOUT",
                "dns error",
                "network is unreachable",
                "connection refused",
            ],
        )
    {
        return FetchFault::NoNetwork(error.to_string());
    }
    FetchFault::NoNetwork(error.to_string())
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    let lower = haystack.to_ascii_lowercase();
    needles.iter().any(|needle| lower.contains(&needle.to_ascii_lowercase()))
}
