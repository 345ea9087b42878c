use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Unknown,
    Ok,
    Error,
}

impl HealthStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Unknown => "unknown",
            HealthStatus::Ok => "ok",
            HealthStatus::Error => "error",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "ok" => HealthStatus::Ok,
            "error" => HealthStatus::Error,
            _ => HealthStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LastErrorSource {
    Instances,
    Channels,
    VideosCount,
    ChannelsHealth,
}

impl LastErrorSource {
    pub fn as_str(self) -> &'static str {
        match self {
            LastErrorSource::Instances => "instances",
            LastErrorSource::Channels => "channels",
            LastErrorSource::VideosCount => "videos_count",
            LastErrorSource::ChannelsHealth => "channels_health",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub host: String,
    pub health_status: HealthStatus,
    pub health_checked_at: Option<i64>,
    pub health_error: Option<String>,
    pub last_error: Option<String>,
    pub last_error_at: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub channel_id: String,
    pub host: String,
    pub channel_name: String,
    pub display_name: Option<String>,
    pub channel_url: Option<String>,
    pub videos_count: Option<i64>,
    pub followers_count: Option<i64>,
    pub avatar_url: Option<String>,
}

impl Channel {
    /// Eligible for the video stage iff `videos_count >= 1` and
    /// `channel_name` is non-empty.
    pub fn is_video_eligible(&self) -> bool {
        self.videos_count.unwrap_or(0) >= 1 && !self.channel_name.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvalidReason {
    NotFound,
    CertExpired,
    TlsError,
    Timeout,
}

impl InvalidReason {
    pub fn as_str(self) -> &'static str {
        match self {
            InvalidReason::NotFound => "not_found",
            InvalidReason::CertExpired => "cert_expired",
            InvalidReason::TlsError => "tls_error",
            InvalidReason::Timeout => "timeout",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "not_found" => Some(InvalidReason::NotFound),
            "cert_expired" => Some(InvalidReason::CertExpired),
            "tls_error" => Some(InvalidReason::TlsError),
            "timeout" => Some(InvalidReason::Timeout),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub video_id: String,
    pub host: String,
    pub channel_id: Option<String>,
    pub channel_name: Option<String>,
    pub account_name: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub tags_json: Option<String>,
    pub category: Option<String>,
    pub published_at: Option<i64>,
    pub thumbnail_url: Option<String>,
    pub preview_url: Option<String>,
    pub embed_url: Option<String>,
    pub views: Option<i64>,
    pub likes: Option<i64>,
    pub dislikes: Option<i64>,
    pub comments_count: Option<i64>,
    pub nsfw: bool,
    pub last_checked_at: Option<i64>,
    pub last_error: Option<String>,
    pub error_count: i64,
    pub invalid_reason: Option<InvalidReason>,
    pub invalid_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalkStatus {
    Pending,
    Processing,
    InProgress,
    Done,
    Error,
}

impl WalkStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WalkStatus::Pending => "pending",
            WalkStatus::Processing => "processing",
            WalkStatus::InProgress => "in_progress",
            WalkStatus::Done => "done",
            WalkStatus::Error => "error",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "processing" => WalkStatus::Processing,
            "in_progress" => WalkStatus::InProgress,
            "done" => WalkStatus::Done,
            "error" => WalkStatus::Error,
            _ => WalkStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelCrawlWorkItem {
    pub host: String,
    pub status: WalkStatus,
    pub last_start: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoCrawlWorkItem {
    pub host: String,
    pub channel_id: String,
    pub channel_name: String,
    pub status: WalkStatus,
    pub last_start: i64,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagsFilterMode {
    Missing,
    Present,
}
