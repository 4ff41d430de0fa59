use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use snafu::{Location, ResultExt, Snafu};

use crate::model::{self, ChannelId, CreatorId, EventKind, Timestamp, TrackedCreator, NEVER};

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    /// could not read the snapshot file
    ReadSnapshot {
        path: PathBuf,
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },

    /// could not write the snapshot file
    WriteSnapshot {
        path: PathBuf,
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },

    /// snapshot file is not valid JSON
    DecodeSnapshot {
        path: PathBuf,
        source: serde_json::Error,
        #[snafu(implicit)]
        location: Location,
    },

    /// could not serialize the creator table
    EncodeSnapshot {
        source: serde_json::Error,
        #[snafu(implicit)]
        location: Location,
    },
}

/// Persistence contract shared by the tracker and the command interpreter.
///
/// Timestamp writes are plain idempotent writes keyed by creator id; the
/// monotonic-advance invariants are upheld by the tracker, the only caller
/// that mutates them after initialization. Any operation may fail
/// transiently and callers are expected to log and carry on rather than
/// abort the polling loop.
pub trait SubscriptionStore: Send + Sync {
    /// Full snapshot of every tracked creator, taken once per poll cycle.
    fn tracked_creators(
        &self,
    ) -> impl Future<Output = Result<HashMap<CreatorId, TrackedCreator>>> + Send;

    fn last_checked_at(&self, id: &CreatorId) -> impl Future<Output = Result<Timestamp>> + Send;

    fn last_upload_time(&self, id: &CreatorId) -> impl Future<Output = Result<Timestamp>> + Send;

    fn set_last_checked_at(
        &self,
        id: &CreatorId,
        time: Timestamp,
    ) -> impl Future<Output = Result<()>> + Send;

    fn set_last_upload_time(
        &self,
        id: &CreatorId,
        time: Timestamp,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Subscribe `channel` to `kind` events for this creator. The very first
    /// subscription of a never-seen creator initializes both stored times to
    /// now, so the first poll after a follow does not flood the channel with
    /// the creator's historical uploads.
    fn add_subscription(
        &self,
        id: &CreatorId,
        kind: EventKind,
        channel: ChannelId,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Remove exactly the matching channel entry; a no-op when absent.
    fn remove_subscription(
        &self,
        id: &CreatorId,
        kind: EventKind,
        channel: &ChannelId,
    ) -> impl Future<Output = Result<()>> + Send;

    fn subscribers(
        &self,
        id: &CreatorId,
        kind: EventKind,
    ) -> impl Future<Output = Result<BTreeSet<ChannelId>>> + Send;
}

impl<'a, S: SubscriptionStore> SubscriptionStore for &'a S {
    fn tracked_creators(
        &self,
    ) -> impl Future<Output = Result<HashMap<CreatorId, TrackedCreator>>> + Send {
        (**self).tracked_creators()
    }

    fn last_checked_at(&self, id: &CreatorId) -> impl Future<Output = Result<Timestamp>> + Send {
        (**self).last_checked_at(id)
    }

    fn last_upload_time(&self, id: &CreatorId) -> impl Future<Output = Result<Timestamp>> + Send {
        (**self).last_upload_time(id)
    }

    fn set_last_checked_at(
        &self,
        id: &CreatorId,
        time: Timestamp,
    ) -> impl Future<Output = Result<()>> + Send {
        (**self).set_last_checked_at(id, time)
    }

    fn set_last_upload_time(
        &self,
        id: &CreatorId,
        time: Timestamp,
    ) -> impl Future<Output = Result<()>> + Send {
        (**self).set_last_upload_time(id, time)
    }

    fn add_subscription(
        &self,
        id: &CreatorId,
        kind: EventKind,
        channel: ChannelId,
    ) -> impl Future<Output = Result<()>> + Send {
        (**self).add_subscription(id, kind, channel)
    }

    fn remove_subscription(
        &self,
        id: &CreatorId,
        kind: EventKind,
        channel: &ChannelId,
    ) -> impl Future<Output = Result<()>> + Send {
        (**self).remove_subscription(id, kind, channel)
    }

    fn subscribers(
        &self,
        id: &CreatorId,
        kind: EventKind,
    ) -> impl Future<Output = Result<BTreeSet<ChannelId>>> + Send {
        (**self).subscribers(id, kind)
    }
}

impl<S: SubscriptionStore + ?Sized> SubscriptionStore for Arc<S> {
    fn tracked_creators(
        &self,
    ) -> impl Future<Output = Result<HashMap<CreatorId, TrackedCreator>>> + Send {
        (**self).tracked_creators()
    }

    fn last_checked_at(&self, id: &CreatorId) -> impl Future<Output = Result<Timestamp>> + Send {
        (**self).last_checked_at(id)
    }

    fn last_upload_time(&self, id: &CreatorId) -> impl Future<Output = Result<Timestamp>> + Send {
        (**self).last_upload_time(id)
    }

    fn set_last_checked_at(
        &self,
        id: &CreatorId,
        time: Timestamp,
    ) -> impl Future<Output = Result<()>> + Send {
        (**self).set_last_checked_at(id, time)
    }

    fn set_last_upload_time(
        &self,
        id: &CreatorId,
        time: Timestamp,
    ) -> impl Future<Output = Result<()>> + Send {
        (**self).set_last_upload_time(id, time)
    }

    fn add_subscription(
        &self,
        id: &CreatorId,
        kind: EventKind,
        channel: ChannelId,
    ) -> impl Future<Output = Result<()>> + Send {
        (**self).add_subscription(id, kind, channel)
    }

    fn remove_subscription(
        &self,
        id: &CreatorId,
        kind: EventKind,
        channel: &ChannelId,
    ) -> impl Future<Output = Result<()>> + Send {
        (**self).remove_subscription(id, kind, channel)
    }

    fn subscribers(
        &self,
        id: &CreatorId,
        kind: EventKind,
    ) -> impl Future<Output = Result<BTreeSet<ChannelId>>> + Send {
        (**self).subscribers(id, kind)
    }
}

/// Concurrent in-memory creator table with an optional JSON snapshot on
/// disk. Mutations are written through to the snapshot when a path is
/// configured; records are field-level last-writer-wins, which is enough
/// since the tracker and the interpreter touch disjoint fields.
#[derive(Debug, Default)]
pub struct MemoryStore {
    creators: DashMap<CreatorId, TrackedCreator>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a snapshot-backed store. A missing file starts an empty table;
    /// anything else unreadable is an error.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no snapshot yet, starting empty");
                return Ok(Self {
                    creators: DashMap::new(),
                    snapshot_path: Some(path),
                });
            }
            Err(source) => {
                return Err(source).context(ReadSnapshotSnafu { path });
            }
        };

        let table: BTreeMap<CreatorId, TrackedCreator> =
            serde_json::from_slice(&bytes).context(DecodeSnapshotSnafu { path: path.clone() })?;

        tracing::info!(path = %path.display(), creators = table.len(), "loaded snapshot");

        Ok(Self {
            creators: table.into_iter().collect(),
            snapshot_path: Some(path),
        })
    }

    async fn persist(&self) -> Result<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        // sorted copy so snapshots diff cleanly
        let table: BTreeMap<CreatorId, TrackedCreator> = self
            .creators
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let bytes = serde_json::to_vec_pretty(&table).context(EncodeSnapshotSnafu)?;
        tokio::fs::write(path, bytes)
            .await
            .context(WriteSnapshotSnafu { path: path.clone() })?;

        Ok(())
    }

    fn upsert(&self, id: &CreatorId, mutate: impl FnOnce(&mut TrackedCreator)) {
        let mut entry = self
            .creators
            .entry(id.clone())
            .or_insert_with(|| TrackedCreator::new(id.clone()));
        mutate(entry.value_mut());
    }
}

impl SubscriptionStore for MemoryStore {
    async fn tracked_creators(&self) -> Result<HashMap<CreatorId, TrackedCreator>> {
        Ok(self
            .creators
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect())
    }

    async fn last_checked_at(&self, id: &CreatorId) -> Result<Timestamp> {
        Ok(self
            .creators
            .get(id)
            .map(|creator| creator.last_checked_at)
            .unwrap_or(NEVER))
    }

    async fn last_upload_time(&self, id: &CreatorId) -> Result<Timestamp> {
        Ok(self
            .creators
            .get(id)
            .map(|creator| creator.last_upload_time)
            .unwrap_or(NEVER))
    }

    async fn set_last_checked_at(&self, id: &CreatorId, time: Timestamp) -> Result<()> {
        self.upsert(id, |creator| creator.last_checked_at = time);
        self.persist().await
    }

    async fn set_last_upload_time(&self, id: &CreatorId, time: Timestamp) -> Result<()> {
        self.upsert(id, |creator| creator.last_upload_time = time);
        self.persist().await
    }

    async fn add_subscription(
        &self,
        id: &CreatorId,
        kind: EventKind,
        channel: ChannelId,
    ) -> Result<()> {
        let first_ever = !self.creators.contains_key(id);

        self.upsert(id, |creator| {
            if first_ever {
                let now = model::now();
                creator.last_checked_at = now;
                creator.last_upload_time = now;
            }
            creator.subscriptions.entry(kind).or_default().insert(channel);
        });

        self.persist().await
    }

    async fn remove_subscription(
        &self,
        id: &CreatorId,
        kind: EventKind,
        channel: &ChannelId,
    ) -> Result<()> {
        if let Some(mut creator) = self.creators.get_mut(id) {
            if let Some(set) = creator.subscriptions.get_mut(&kind) {
                set.remove(channel);
            }
        }

        self.persist().await
    }

    async fn subscribers(&self, id: &CreatorId, kind: EventKind) -> Result<BTreeSet<ChannelId>> {
        Ok(self
            .creators
            .get(id)
            .map(|creator| creator.subscribers(kind))
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::now;

    fn alice() -> CreatorId {
        CreatorId::from("alice")
    }

    #[tokio::test]
    async fn unknown_creator_defaults_to_never() {
        let store = MemoryStore::new();

        assert_eq!(store.last_checked_at(&alice()).await.unwrap(), NEVER);
        assert_eq!(store.last_upload_time(&alice()).await.unwrap(), NEVER);
        assert!(store
            .subscribers(&alice(), EventKind::NewVideo)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn first_subscription_initializes_times_to_now() {
        let store = MemoryStore::new();
        let before = now();

        store
            .add_subscription(&alice(), EventKind::NewVideo, ChannelId::from("chan-1"))
            .await
            .unwrap();

        assert!(store.last_upload_time(&alice()).await.unwrap() >= before);
        assert!(store.last_checked_at(&alice()).await.unwrap() >= before);
    }

    #[tokio::test]
    async fn later_subscriptions_do_not_reset_times() {
        let store = MemoryStore::new();
        let past = NEVER;

        // record exists before the subscription, so it is not "first-ever"
        store.set_last_checked_at(&alice(), past).await.unwrap();

        store
            .add_subscription(&alice(), EventKind::NewVideo, ChannelId::from("chan-1"))
            .await
            .unwrap();

        assert_eq!(store.last_checked_at(&alice()).await.unwrap(), past);
        assert_eq!(store.last_upload_time(&alice()).await.unwrap(), past);
    }

    #[tokio::test]
    async fn duplicate_subscription_is_idempotent() {
        let store = MemoryStore::new();

        for _ in 0..2 {
            store
                .add_subscription(&alice(), EventKind::NewVideo, ChannelId::from("chan-1"))
                .await
                .unwrap();
        }

        let subscribers = store.subscribers(&alice(), EventKind::NewVideo).await.unwrap();
        assert_eq!(subscribers.len(), 1);
    }

    #[tokio::test]
    async fn remove_leaves_other_channels_untouched() {
        let store = MemoryStore::new();

        store
            .add_subscription(&alice(), EventKind::NewVideo, ChannelId::from("chan-1"))
            .await
            .unwrap();
        store
            .add_subscription(&alice(), EventKind::NewVideo, ChannelId::from("chan-2"))
            .await
            .unwrap();

        store
            .remove_subscription(&alice(), EventKind::NewVideo, &ChannelId::from("chan-1"))
            .await
            .unwrap();

        let subscribers = store.subscribers(&alice(), EventKind::NewVideo).await.unwrap();
        assert_eq!(subscribers, BTreeSet::from([ChannelId::from("chan-2")]));

        // removing an absent pair is a no-op
        store
            .remove_subscription(&alice(), EventKind::NewVideo, &ChannelId::from("chan-1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unsubscribed_creator_keeps_its_state() {
        let store = MemoryStore::new();

        store
            .add_subscription(&alice(), EventKind::NewVideo, ChannelId::from("chan-1"))
            .await
            .unwrap();
        let upload_time = store.last_upload_time(&alice()).await.unwrap();

        store
            .remove_subscription(&alice(), EventKind::NewVideo, &ChannelId::from("chan-1"))
            .await
            .unwrap();

        let creators = store.tracked_creators().await.unwrap();
        assert_eq!(creators[&alice()].last_upload_time, upload_time);
    }

    #[tokio::test]
    async fn snapshot_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creators.json");

        let store = MemoryStore::load(&path).await.unwrap();
        store
            .add_subscription(&alice(), EventKind::NewVideo, ChannelId::from("chan-1"))
            .await
            .unwrap();
        let checked = store.last_checked_at(&alice()).await.unwrap();

        let reloaded = MemoryStore::load(&path).await.unwrap();
        assert_eq!(reloaded.last_checked_at(&alice()).await.unwrap(), checked);
        assert_eq!(
            reloaded.subscribers(&alice(), EventKind::NewVideo).await.unwrap(),
            BTreeSet::from([ChannelId::from("chan-1")])
        );
    }
}
