use thiserror::Error;

/// Store failure taxonomy. Every variant is fatal for the calling stage —
/// a write that can't reach sqlite aborts the run rather than limping on.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("migration failed: {0}")]
    Migration(String),
    #[error("failed to (de)serialize row payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
