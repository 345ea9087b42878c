//! Foundational utilities shared across crawler crates: time helpers,
//! cooperative cancellation, and the run-summary/exit-code types every
//! stage binary reports through.

pub mod cancellation;
pub mod run_summary;
pub mod time_utils;

pub use cancellation::CancellationToken;
pub use run_summary::{ExitClass, ExitCode, RunSummary};
pub use time_utils::{clamped_backoff_ms, current_unix_timestamp_ms, exponential_backoff_ms};
