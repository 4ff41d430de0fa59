use std::future::Future;

use chrono::DateTime;
use derive_new::new;
use serde::Deserialize;
use snafu::ResultExt;
use tracing::instrument;
use url::Url;

use crate::model::{CreatorId, Timestamp, VideoRecord, NEVER};

pub use error::{classify_status, PlatformError, Result};

pub mod error;

/// A creator account as resolved by [VideoSource::get_user].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, new)]
pub struct UserRecord {
    pub id: CreatorId,
    pub display_name: String,
}

/// The video platform collaborator: recent-video search and user lookup.
/// Both calls carry the client-wide timeout, so one unresponsive upstream
/// cannot stall a whole poll cycle.
pub trait VideoSource: Send + Sync {
    /// Up to `limit` most recent videos of this creator, newest first.
    fn search_videos(
        &self,
        creator: &CreatorId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<VideoRecord>>> + Send;

    fn get_user(&self, username: &str) -> impl Future<Output = Result<UserRecord>> + Send;
}

impl<V: VideoSource + ?Sized> VideoSource for std::sync::Arc<V> {
    fn search_videos(
        &self,
        creator: &CreatorId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<VideoRecord>>> + Send {
        (**self).search_videos(creator, limit)
    }

    fn get_user(&self, username: &str) -> impl Future<Output = Result<UserRecord>> + Send {
        (**self).get_user(username)
    }
}

/// HTTP client for the platform API.
#[derive(Debug, Clone, new)]
pub struct PlatformClient {
    http: reqwest::Client,
    base: Url,
    token: String,
}

impl VideoSource for PlatformClient {
    #[instrument(skip(self))]
    async fn search_videos(&self, creator: &CreatorId, limit: usize) -> Result<Vec<VideoRecord>> {
        let mut url = self.base.join("videos").context(error::EndpointSnafu)?;
        url.query_pairs_mut()
            .append_pair("author", creator.as_str())
            .append_pair("limit", &limit.to_string())
            .append_pair("sort", "recent")
            .append_pair("order", "desc");

        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .context(error::TransportSnafu)?;

        if let Some(err) = classify_status(response.status(), creator.as_str()) {
            return Err(err);
        }

        let body: SearchResponse = response.json().await.context(error::DecodeSnafu)?;
        Ok(body.videos.into_iter().map(WireVideo::into_record).collect())
    }

    #[instrument(skip(self))]
    async fn get_user(&self, username: &str) -> Result<UserRecord> {
        let url = self
            .base
            .join(&format!("users/{username}"))
            .context(error::EndpointSnafu)?;

        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .context(error::TransportSnafu)?;

        if let Some(err) = classify_status(response.status(), username) {
            return Err(err);
        }

        response.json().await.context(error::DecodeSnafu)
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    videos: Vec<WireVideo>,
}

/// A video as it appears on the wire. The platform reports upload times in
/// whole seconds since the epoch; [WireVideo::into_record] is the one place
/// they become canonical [Timestamp]s.
#[derive(Debug, Deserialize)]
struct WireVideo {
    id: String,
    author: WireAuthor,
    #[serde(default)]
    description: String,
    upload_time: i64,
    link: Url,
    #[serde(default)]
    thumbnail: Option<Url>,
}

#[derive(Debug, Deserialize)]
struct WireAuthor {
    id: String,
    #[serde(default)]
    display_name: String,
}

impl WireVideo {
    fn into_record(self) -> VideoRecord {
        let upload_time: Timestamp = DateTime::from_timestamp(self.upload_time, 0).unwrap_or(NEVER);

        VideoRecord {
            id: self.id,
            author_id: CreatorId::new(self.author.id),
            author_name: self.author.display_name,
            description: self.description,
            upload_time,
            link: self.link,
            thumbnail_url: self.thumbnail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn upload_seconds_convert_once_at_the_boundary() {
        let wire: WireVideo = serde_json::from_value(json!({
            "id": "vid-1",
            "author": { "id": "alice", "display_name": "Alice" },
            "description": "first",
            "upload_time": 1_700_000_000,
            "link": "https://videos.example/v/vid-1",
        }))
        .unwrap();

        let record = wire.into_record();
        assert_eq!(record.upload_time.timestamp(), 1_700_000_000);
        assert_eq!(record.author_id, CreatorId::from("alice"));
        assert_eq!(record.thumbnail_url, None);
    }

    #[test]
    fn nonsense_upload_seconds_fall_back_to_never() {
        let wire: WireVideo = serde_json::from_value(json!({
            "id": "vid-1",
            "author": { "id": "alice" },
            "upload_time": i64::MAX,
            "link": "https://videos.example/v/vid-1",
        }))
        .unwrap();

        assert_eq!(wire.into_record().upload_time, NEVER);
        assert!(NEVER < Utc::now());
    }
}
