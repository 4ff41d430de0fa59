use std::future::Future;

use derive_new::new;
use serde::Deserialize;
use snafu::{Location, ResultExt, Snafu};
use tracing::instrument;
use url::Url;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum NluError {
    /// transport-level failure talking to the classifier
    NluTransport {
        source: reqwest::Error,
        #[snafu(implicit)]
        location: Location,
    },

    /// the classifier rejected the request
    NluStatus {
        status: u16,
        #[snafu(implicit)]
        location: Location,
    },

    /// the classifier response was not the documented shape
    NluDecode {
        source: reqwest::Error,
        #[snafu(implicit)]
        location: Location,
    },

    /// the configured classifier base url cannot form the endpoint path
    NluEndpoint {
        source: url::ParseError,
        #[snafu(implicit)]
        location: Location,
    },
}

/// What the classifier made of a message: its best intent guess with a
/// confidence, plus any extracted entities.
#[derive(Debug, Clone, PartialEq, new)]
pub struct Classification {
    pub intent: Intent,
    pub confidence: f32,
    pub username: Option<String>,
    pub channel: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    TrackVideos,
    UntrackVideos,
    Unknown,
}

impl Intent {
    fn parse(value: &str) -> Intent {
        match value {
            "trackVideos" => Intent::TrackVideos,
            "untrackVideos" => Intent::UntrackVideos,
            _ => Intent::Unknown,
        }
    }
}

/// External intent-classification collaborator.
pub trait Classifier: Send + Sync {
    fn classify(&self, text: &str) -> impl Future<Output = Result<Classification, NluError>> + Send;
}

/// HTTP client for a wit.ai-style message endpoint: `GET /message?q=<text>`
/// answered with per-entity guess lists.
#[derive(Debug, Clone, new)]
pub struct WitClient {
    http: reqwest::Client,
    base: Url,
    token: String,
}

impl Classifier for WitClient {
    #[instrument(skip(self))]
    async fn classify(&self, text: &str) -> Result<Classification, NluError> {
        let mut url = self.base.join("message").context(NluEndpointSnafu)?;
        url.query_pairs_mut().append_pair("q", text);

        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .context(NluTransportSnafu)?;

        let status = response.status();
        if !status.is_success() {
            return NluStatusSnafu {
                status: status.as_u16(),
            }
            .fail();
        }

        let body: WitResponse = response.json().await.context(NluDecodeSnafu)?;
        Ok(body.into_classification())
    }
}

#[derive(Debug, Default, Deserialize)]
struct WitResponse {
    #[serde(default)]
    entities: WitEntities,
}

#[derive(Debug, Default, Deserialize)]
struct WitEntities {
    #[serde(default)]
    intent: Vec<WitGuess>,
    #[serde(default)]
    username: Vec<WitGuess>,
    #[serde(default)]
    channel: Vec<WitGuess>,
}

#[derive(Debug, Deserialize)]
struct WitGuess {
    value: String,
    #[serde(default)]
    confidence: f32,
}

impl WitResponse {
    fn into_classification(self) -> Classification {
        let (intent, confidence) = self
            .entities
            .intent
            .first()
            .map(|guess| (Intent::parse(&guess.value), guess.confidence))
            .unwrap_or((Intent::Unknown, 0.0));

        Classification {
            intent,
            confidence,
            username: self.entities.username.into_iter().next().map(|g| g.value),
            channel: self.entities.channel.into_iter().next().map(|g| g.value),
        }
    }
}
