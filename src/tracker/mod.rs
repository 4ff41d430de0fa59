use std::time::Duration;

use derive_new::new;
use rand::Rng;
use snafu::{Location, ResultExt, Snafu};
use tracing::instrument;

use crate::model::{self, EventKind, NotificationEvent, Timestamp, TrackedCreator};
use crate::platform::{PlatformError, VideoSource};
use crate::sink::NotificationSink;
use crate::store::{StoreError, SubscriptionStore};

#[derive(Debug, Snafu)]
pub enum CheckError {
    /// could not fetch the creator's recent videos
    Fetch {
        source: PlatformError,
        #[snafu(implicit)]
        location: Location,
    },

    /// could not persist the creator's state
    Persist {
        source: StoreError,
        #[snafu(implicit)]
        location: Location,
    },
}

/// Tuning knobs for the staleness policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerOptions {
    /// Minimum time between checks of the same creator.
    pub base_interval: Duration,
    /// Upper bound of the random slack added to `base_interval`, resampled
    /// on every [Tracker::update] call so repeated cycles do not lock a
    /// creator into a fixed offset.
    pub jitter_max: Duration,
    /// How many recent videos to fetch per check.
    pub page_size: usize,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_secs(120),
            jitter_max: Duration::from_secs(10),
            page_size: 5,
        }
    }
}

/// The polling engine. Each [Tracker::update] call takes a snapshot of the
/// tracked creators, checks every one that is due, and returns the
/// notification events for genuinely-new uploads; the caller hands them to
/// the sink. No dispatch mechanism is baked in, which keeps the engine
/// testable against fakes.
#[derive(Debug, new)]
pub struct Tracker<S, V> {
    store: S,
    source: V,
    options: TrackerOptions,
}

impl<S, V> Tracker<S, V>
where
    S: SubscriptionStore,
    V: VideoSource,
{
    /// Run one poll cycle at `now`.
    ///
    /// Every due creator is checked, in no particular order; one creator's
    /// failure never stops the scan. Failed checks are logged and retried
    /// once their staleness interval elapses again.
    pub async fn update(&self, now: Timestamp) -> Vec<NotificationEvent> {
        let creators = match self.store.tracked_creators().await {
            Ok(creators) => creators,
            Err(error) => {
                tracing::error!(%error, "could not snapshot tracked creators");
                return Vec::new();
            }
        };

        let threshold = self.options.base_interval + self.sample_jitter();
        let mut events = Vec::new();

        for (id, creator) in creators {
            if !is_due(creator.last_checked_at, now, threshold) {
                continue;
            }

            match self.check_creator(&creator, now).await {
                Ok(mut found) => events.append(&mut found),
                Err(error) => {
                    tracing::warn!(creator = %id, %error, "skipping creator this cycle");
                }
            }
        }

        events
    }

    /// Check one creator: fetch its recent page, diff against the stored
    /// upload time, persist the advanced state and return one event per new
    /// video.
    #[instrument(skip_all, fields(creator = %creator.id))]
    async fn check_creator(
        &self,
        creator: &TrackedCreator,
        now: Timestamp,
    ) -> Result<Vec<NotificationEvent>, CheckError> {
        let fetched = self
            .source
            .search_videos(&creator.id, self.options.page_size)
            .await;

        let videos = match fetched.context(FetchSnafu) {
            Ok(videos) => videos,
            Err(err) => {
                // advancing the check time here backs off a persistently
                // failing upstream to once per staleness interval
                if let Err(error) = self.store.set_last_checked_at(&creator.id, now).await {
                    tracing::warn!(creator = %creator.id, %error, "could not record failed check");
                }
                return Err(err);
            }
        };

        let last_upload = creator.last_upload_time;
        let new_videos: Vec<_> = videos
            .into_iter()
            .filter(|video| video.upload_time > last_upload)
            .collect();

        // read the targets before any write so a store failure leaves the
        // creator exactly as it was, to be retried next eligible cycle
        let channels: Vec<_> = self
            .store
            .subscribers(&creator.id, EventKind::NewVideo)
            .await
            .context(PersistSnafu)?
            .into_iter()
            .collect();

        // max() keeps advancement monotonic even when the page is unsorted
        if let Some(latest) = new_videos.iter().map(|video| video.upload_time).max() {
            self.store
                .set_last_upload_time(&creator.id, latest.max(last_upload))
                .await
                .context(PersistSnafu)?;
        }

        self.store
            .set_last_checked_at(&creator.id, now)
            .await
            .context(PersistSnafu)?;

        if !new_videos.is_empty() {
            tracing::info!(creator = %creator.id, count = new_videos.len(), "found new videos");
        }

        Ok(new_videos
            .into_iter()
            .map(|video| NotificationEvent::new(video, channels.clone()))
            .collect())
    }

    fn sample_jitter(&self) -> Duration {
        let max = self.options.jitter_max.as_millis() as u64;
        if max == 0 {
            return Duration::ZERO;
        }

        Duration::from_millis(rand::thread_rng().gen_range(0..=max))
    }

    /// Drive the engine forever on a fixed period, feeding every cycle's
    /// events to the sink. The next tick is not started until the previous
    /// cycle has run to completion, so cycles never overlap; a cycle that
    /// outlives the period skips ticks instead of bunching them.
    pub async fn run<K: NotificationSink>(self, sink: K, period: Duration) {
        let mut timer = tokio::time::interval(period);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            timer.tick().await;

            let events = self.update(model::now()).await;
            for event in events {
                sink.deliver(&event).await;
            }
        }
    }
}

fn is_due(last_checked: Timestamp, now: Timestamp, threshold: Duration) -> bool {
    match (now - last_checked).to_std() {
        Ok(elapsed) => elapsed >= threshold,
        // a check time in the future is never due
        Err(_) => false,
    }
}
