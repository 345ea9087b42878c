//! Single embedded relational store: hosts, channels, videos, progress
//! tables, federation edges, retry queue, KV state.

mod error;
mod models;
mod schema;
mod store;

pub use error::{StoreError, StoreResult};
pub use models::{
    Channel, ChannelCrawlWorkItem, HealthStatus, Host, InvalidReason, LastErrorSource,
    TagsFilterMode, Video, VideoCrawlWorkItem, WalkStatus,
};
pub use store::Store;
