use derive_new::new;

use crate::model::{Channel, CommandContext, EventKind};
use crate::platform::{PlatformError, VideoSource};
use crate::store::SubscriptionStore;

pub use matcher::closest_channel;
pub use nlu::{Classification, Classifier, Intent, NluError, WitClient};

mod matcher;
pub mod nlu;

/// The one user-facing message each command outcome maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Help,
    Unrecognized,
    MissingUsername,
    InvalidChannel { name: String },
    NoPermission { channel: String },
    InvalidUsername { username: String },
    RateLimited,
    TryAgain,
    AlreadyFollowing { username: String, channel: String },
    NotFollowing { username: String, channel: String },
    NowFollowing { username: String, channel: String },
    Unfollowed { username: String, channel: String },
}

impl std::fmt::Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reply::Help => f.write_str(
                "I post new videos from creators you follow.\n\
                 Tell me things like _follow alice in #clips_ or _stop following alice_.\n\
                 Say _help_ to see this message again.",
            ),
            Reply::Unrecognized => {
                f.write_str("**I don't understand that message.** You can ask me for _help_.")
            }
            Reply::MissingUsername => {
                f.write_str("you need to give me a username to follow them.")
            }
            Reply::InvalidChannel { name } => {
                write!(f, "I don't know what channel #{name} is.")
            }
            Reply::NoPermission { channel } => {
                write!(f, "I don't have permission to speak in #{channel}.")
            }
            Reply::InvalidUsername { username } => {
                write!(f, "I couldn't find the username **{username}**.")
            }
            Reply::RateLimited => {
                f.write_str("the video platform is telling me to slow down. Try again in a bit.")
            }
            Reply::TryAgain => f.write_str("something went wrong on my end. Try again."),
            Reply::AlreadyFollowing { username, channel } => {
                write!(f, "I'm already posting videos from **{username}** in #{channel}.")
            }
            Reply::NotFollowing { username, channel } => {
                write!(f, "I'm not following **{username}** in #{channel}.")
            }
            Reply::NowFollowing { username, channel } => {
                write!(
                    f,
                    "I'll now post new videos from **{username}** in #{channel}. \
                     You can tell me to unfollow them too."
                )
            }
            Reply::Unfollowed { username, channel } => {
                write!(f, "I'll stop posting videos from **{username}** in #{channel}.")
            }
        }
    }
}

/// Turns free text into subscribe/unsubscribe operations.
///
/// Each call runs an ordered validation pipeline that stops at the first
/// failing check; validation failures are replies to the user, never logged
/// as errors.
#[derive(Debug, new)]
pub struct Interpreter<S, V, C> {
    store: S,
    platform: V,
    classifier: C,
    confidence_threshold: f32,
}

impl<S, V, C> Interpreter<S, V, C>
where
    S: SubscriptionStore,
    V: VideoSource,
    C: Classifier,
{
    /// Handle one inbound message. `text` is expected to have the bot
    /// mention already stripped by the transport glue.
    pub async fn handle(&self, text: &str, ctx: &CommandContext) -> Reply {
        let text = clean(text);

        // literal help never goes through the classifier
        if text.eq_ignore_ascii_case("help") {
            return Reply::Help;
        }

        let classification = match self.classifier.classify(&text).await {
            Ok(classification) => classification,
            Err(error) => {
                tracing::warn!(%error, "could not classify message");
                return Reply::TryAgain;
            }
        };

        if classification.confidence < self.confidence_threshold {
            return Reply::Unrecognized;
        }

        match classification.intent {
            Intent::TrackVideos => self.track(&classification, ctx).await,
            Intent::UntrackVideos => self.untrack(&classification, ctx).await,
            Intent::Unknown => Reply::Unrecognized,
        }
    }

    async fn track(&self, command: &Classification, ctx: &CommandContext) -> Reply {
        let Some(username) = username_of(command) else {
            return Reply::MissingUsername;
        };

        let channel = match resolve_channel(command.channel.as_deref(), ctx) {
            Ok(channel) => channel,
            Err(reply) => return reply,
        };

        if !channel.postable {
            return Reply::NoPermission {
                channel: channel.name.clone(),
            };
        }

        let user = match self.platform.get_user(username).await {
            Ok(user) => user,
            Err(error) => return lookup_reply(error, username),
        };

        let already = match self.store.subscribers(&user.id, EventKind::NewVideo).await {
            Ok(subscribers) => subscribers.contains(&channel.id),
            Err(error) => {
                tracing::warn!(%error, creator = %user.id, "could not read subscriptions");
                return Reply::TryAgain;
            }
        };

        if already {
            return Reply::AlreadyFollowing {
                username: user.display_name,
                channel: channel.name.clone(),
            };
        }

        if let Err(error) = self
            .store
            .add_subscription(&user.id, EventKind::NewVideo, channel.id.clone())
            .await
        {
            tracing::warn!(%error, creator = %user.id, "could not persist subscription");
            return Reply::TryAgain;
        }

        tracing::info!(creator = %user.id, channel = %channel.id, "subscribed");
        Reply::NowFollowing {
            username: user.display_name,
            channel: channel.name.clone(),
        }
    }

    async fn untrack(&self, command: &Classification, ctx: &CommandContext) -> Reply {
        let Some(username) = username_of(command) else {
            return Reply::MissingUsername;
        };

        let channel = match resolve_channel(command.channel.as_deref(), ctx) {
            Ok(channel) => channel,
            Err(reply) => return reply,
        };

        let user = match self.platform.get_user(username).await {
            Ok(user) => user,
            Err(error) => return lookup_reply(error, username),
        };

        let following = match self.store.subscribers(&user.id, EventKind::NewVideo).await {
            Ok(subscribers) => subscribers.contains(&channel.id),
            Err(error) => {
                tracing::warn!(%error, creator = %user.id, "could not read subscriptions");
                return Reply::TryAgain;
            }
        };

        if !following {
            return Reply::NotFollowing {
                username: user.display_name,
                channel: channel.name.clone(),
            };
        }

        if let Err(error) = self
            .store
            .remove_subscription(&user.id, EventKind::NewVideo, &channel.id)
            .await
        {
            tracing::warn!(%error, creator = %user.id, "could not remove subscription");
            return Reply::TryAgain;
        }

        tracing::info!(creator = %user.id, channel = %channel.id, "unsubscribed");
        Reply::Unfollowed {
            username: user.display_name,
            channel: channel.name.clone(),
        }
    }
}

fn username_of(command: &Classification) -> Option<&str> {
    command
        .username
        .as_deref()
        .map(str::trim)
        .filter(|username| !username.is_empty())
}

/// An explicit channel name is fuzzy-matched against the guild; without one
/// the command applies to the channel it was issued in.
fn resolve_channel<'a>(
    name: Option<&str>,
    ctx: &'a CommandContext,
) -> Result<&'a Channel, Reply> {
    let Some(name) = name else {
        return Ok(&ctx.current);
    };

    let name = name.trim_start_matches('#');
    closest_channel(name, &ctx.channels).ok_or_else(|| Reply::InvalidChannel {
        name: name.to_string(),
    })
}

fn lookup_reply(error: PlatformError, username: &str) -> Reply {
    match error {
        PlatformError::NotFound { .. } => Reply::InvalidUsername {
            username: username.to_string(),
        },
        PlatformError::RateLimited { .. } => Reply::RateLimited,
        error => {
            tracing::warn!(%error, username, "user lookup failed");
            Reply::TryAgain
        }
    }
}

fn clean(text: &str) -> String {
    // the classifier only gets the first 100 characters
    text.trim().chars().take(100).collect()
}
