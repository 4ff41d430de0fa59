use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use snafu::ResultExt;
use url::Url;

use crate::error::{ApplicationError, ConfigLoadSnafu};
use crate::tracker::TrackerOptions;

/// Environment-variable configuration, read after `.env` is applied.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub platform_api_url: Url,
    pub platform_token: String,

    pub nlu_api_url: Url,
    pub nlu_token: String,

    pub chat_api_url: Url,
    pub chat_token: String,

    /// Where the creator table snapshot lives; no persistence when unset.
    #[serde(default)]
    pub store_path: Option<PathBuf>,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// How often the scheduler wakes up to look for due creators.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Minimum time between checks of the same creator.
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    #[serde(default = "default_jitter_max")]
    pub jitter_max_secs: u64,

    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Per-call timeout for every outbound HTTP request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
}

pub fn load() -> Result<Config, ApplicationError> {
    envy::from_env::<Config>().context(ConfigLoadSnafu)
}

impl Config {
    pub fn tracker_options(&self) -> TrackerOptions {
        TrackerOptions {
            base_interval: Duration::from_secs(self.check_interval_secs),
            jitter_max: Duration::from_secs(self.jitter_max_secs),
            page_size: self.page_size,
        }
    }

    pub fn poll_period(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_poll_interval() -> u64 {
    30
}

fn default_check_interval() -> u64 {
    120
}

fn default_jitter_max() -> u64 {
    10
}

fn default_page_size() -> usize {
    5
}

fn default_request_timeout() -> u64 {
    5
}

fn default_confidence_threshold() -> f32 {
    0.6
}
