//! HTTP fetching, fault classification, retry/backoff, and the tolerant
//! JSON extraction used by every walker crate.

mod aliasing;
mod client;
mod fault;
mod hostnorm;
mod protocol;
mod retry;

pub use aliasing::{
    extract_comments_count, extract_display_name, extract_entry_host, extract_followers_count,
    extract_videos_count, first_i64, first_str, first_str_nested,
};
pub use client::FetchJson;
pub use fault::{classify_transport_error, FetchFault};
pub use hostnorm::{extract_scheme, normalize_host_fragment};
pub use protocol::ProtocolFetcher;
pub use retry::{exponential_backoff, parse_retry_after, too_many_requests_delay};
