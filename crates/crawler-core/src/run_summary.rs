use serde::Serialize;

/// Process exit classification for a completed stage run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitClass {
    /// Zero exit: stage finished, individual hosts/channels/videos may have
    /// recorded errors but the run itself made progress.
    Success,
    /// Non-zero exit: a *no-network* fault aborted the stage.
    NoNetwork,
    /// Non-zero exit: the Store could not be written to.
    StoreFatal,
}

impl ExitClass {
    pub fn exit_code(self) -> i32 {
        match self {
            ExitClass::Success => 0,
            ExitClass::NoNetwork => 2,
            ExitClass::StoreFatal => 3,
        }
    }
}

/// Run-level counters read back from the Store's KV state at the end of a
/// stage.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub stage: String,
    pub hosts_done: u64,
    pub hosts_error: u64,
    pub channels_upserted: u64,
    pub videos_new_total: u64,
    pub started_at_ms: i64,
    pub finished_at_ms: i64,
    pub exit_class: ExitCode,
}

/// Serializable mirror of [`ExitClass`] for the run summary log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    Success,
    NoNetwork,
    StoreFatal,
}

impl From<ExitClass> for ExitCode {
    fn from(value: ExitClass) -> Self {
        match value {
            ExitClass::Success => ExitCode::Success,
            ExitClass::NoNetwork => ExitCode::NoNetwork,
            ExitClass::StoreFatal => ExitCode::StoreFatal,
        }
    }
}

impl Default for ExitCode {
    fn default() -> Self {
        ExitCode::Success
    }
}
