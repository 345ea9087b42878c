//! Per-video enrichment walker: fetches tags or comment counts and
//! classifies terminal vs. retryable faults.

mod config;
mod run;

pub use config::{EnrichmentConfig, EnrichmentMode};
pub use run::run;
