use std::future::Future;

use derive_new::new;
use serde_json::json;
use snafu::{Location, ResultExt, Snafu};
use tracing::instrument;
use url::Url;

use crate::model::{Channel, ChannelId, NotificationEvent, VideoRecord};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SinkError {
    /// transport-level failure talking to the chat API
    ChatTransport {
        source: reqwest::Error,
        #[snafu(implicit)]
        location: Location,
    },

    /// the chat API rejected the request
    ChatStatus {
        status: u16,
        #[snafu(implicit)]
        location: Location,
    },

    /// the chat API response was not the documented shape
    ChatDecode {
        source: reqwest::Error,
        #[snafu(implicit)]
        location: Location,
    },

    /// the configured chat base url cannot form the endpoint path
    ChatEndpoint {
        source: url::ParseError,
        #[snafu(implicit)]
        location: Location,
    },
}

/// Consumes the tracker's notification events. Delivery to each channel is
/// independent; one channel failing never aborts the others.
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, event: &NotificationEvent) -> impl Future<Output = ()> + Send;
}

/// Chat-transport sink: posts one formatted message per subscribed channel
/// and exposes the guild channel listing the command context is built from.
#[derive(Debug, Clone, new)]
pub struct ChatSink {
    http: reqwest::Client,
    base: Url,
    token: String,
}

impl ChatSink {
    /// The guild's channels, along with whether the bot may post in each.
    pub async fn channels(&self) -> Result<Vec<Channel>, SinkError> {
        let url = self.base.join("channels").context(ChatEndpointSnafu)?;

        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .context(ChatTransportSnafu)?;

        let status = response.status();
        if !status.is_success() {
            return ChatStatusSnafu {
                status: status.as_u16(),
            }
            .fail();
        }

        response.json().await.context(ChatDecodeSnafu)
    }

    #[instrument(skip(self, content))]
    async fn post(&self, channel: &ChannelId, content: &str) -> Result<(), SinkError> {
        let url = self
            .base
            .join(&format!("channels/{channel}/messages"))
            .context(ChatEndpointSnafu)?;

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&json!({ "content": content }))
            .send()
            .await
            .context(ChatTransportSnafu)?;

        let status = response.status();
        if !status.is_success() {
            return ChatStatusSnafu {
                status: status.as_u16(),
            }
            .fail();
        }

        Ok(())
    }
}

impl NotificationSink for ChatSink {
    async fn deliver(&self, event: &NotificationEvent) {
        let content = format_message(&event.video);

        let posts = event.channels.iter().map(|channel| {
            let content = &content;
            async move {
                if let Err(error) = self.post(channel, content).await {
                    tracing::warn!(%channel, %error, "could not deliver notification");
                }
            }
        });

        futures::future::join_all(posts).await;
    }
}

pub fn format_message(video: &VideoRecord) -> String {
    format!(
        "**{}** uploaded a new video!\n{}\n{}",
        video.author_name, video.description, video.link
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;

    use crate::model::CreatorId;

    #[test]
    fn message_carries_author_description_and_link() {
        let video = VideoRecord::new(
            "vid-1".to_string(),
            CreatorId::from("alice"),
            "Alice".to_string(),
            "ranked highlights".to_string(),
            Utc::now(),
            Url::parse("https://videos.example/v/vid-1").unwrap(),
            None,
        );

        let message = format_message(&video);
        assert!(message.contains("**Alice**"));
        assert!(message.contains("ranked highlights"));
        assert!(message.contains("https://videos.example/v/vid-1"));
    }
}
