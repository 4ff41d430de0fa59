use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use derive_new::new;
use serde::{Deserialize, Serialize};
use url::Url;

pub type Timestamp = DateTime<Utc>;

/// The "never" value for stored times: a creator that has not been checked
/// and has no notified uploads sits at the unix epoch.
pub const NEVER: Timestamp = DateTime::UNIX_EPOCH;

pub fn now() -> Timestamp {
    Utc::now()
}

/// Opaque identifier of a creator account on the video platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CreatorId(String);

impl CreatorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CreatorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for CreatorId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Opaque identifier of a chat channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ChannelId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// The events a channel can subscribe to for a creator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "newVideo")]
    NewVideo,
}

/// Per-creator state: when it was last polled, the newest upload already
/// notified, and which channels want which events.
///
/// `last_checked_at` advances on every poll attempt. `last_upload_time`
/// advances only when a strictly newer video is observed; both are
/// monotonically non-decreasing and are mutated by the tracker only
/// (the store initializes them on a creator's first subscription).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct TrackedCreator {
    pub id: CreatorId,
    #[new(value = "NEVER")]
    #[serde(default = "never")]
    pub last_checked_at: Timestamp,
    #[new(value = "NEVER")]
    #[serde(default = "never")]
    pub last_upload_time: Timestamp,
    #[new(default)]
    #[serde(default)]
    pub subscriptions: BTreeMap<EventKind, BTreeSet<ChannelId>>,
}

fn never() -> Timestamp {
    NEVER
}

impl TrackedCreator {
    pub fn subscribers(&self, kind: EventKind) -> BTreeSet<ChannelId> {
        self.subscriptions.get(&kind).cloned().unwrap_or_default()
    }

    pub fn is_subscribed(&self, kind: EventKind, channel: &ChannelId) -> bool {
        self.subscriptions
            .get(&kind)
            .map_or(false, |set| set.contains(channel))
    }
}

/// A video as reported by the platform. Read-only; `upload_time` has already
/// been converted to the canonical representation at the platform boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct VideoRecord {
    pub id: String,
    pub author_id: CreatorId,
    pub author_name: String,
    pub description: String,
    pub upload_time: Timestamp,
    pub link: Url,
    pub thumbnail_url: Option<Url>,
}

/// One genuinely-new video together with the channels that asked to hear
/// about it. Produced once by the tracker, consumed once by the sink.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct NotificationEvent {
    pub video: VideoRecord,
    pub channels: Vec<ChannelId>,
}

/// A guild channel as reported by the chat transport, along with whether the
/// bot may post there.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, new)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    pub postable: bool,
}

/// Chat-transport facts a command is validated against: where it was
/// issued and what the guild looks like.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct CommandContext {
    /// The channel the command was issued in; the default target when no
    /// channel is named.
    pub current: Channel,
    pub channels: Vec<Channel>,
}
