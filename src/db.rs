//! The document-database seam.
//!
//! Records live at `users/{userId}/documents/{docId}` and are written with
//! merge semantics only. Reads come in two forms: a one-shot `get`, and a
//! push subscription that delivers the current record immediately (`None` if
//! it does not exist yet) and then every change it observes. The
//! subscription is fire-and-forget: it never waits for anything and never
//! ends on its own, not even at a terminal status — the caller decides when
//! to unsubscribe.
//!
//! Connectivity gaps may coalesce intermediate writes; the latest write is
//! always eventually delivered.

use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::fs;

use crate::{
    async_utils::Subscription,
    prelude::*,
    record::{DocumentRecord, RecordPatch},
};

/// Callback invoked with the current record on every observed change.
pub type UpdateFn = Box<dyn Fn(Option<DocumentRecord>) + Send + Sync>;

/// Access to the per-user document records.
#[async_trait]
pub trait DocumentDb: Send + Sync + 'static {
    /// Merge a patch into a record, creating the record if needed. Fields
    /// the patch does not mention are preserved.
    async fn merge(&self, user_id: &str, doc_id: &str, patch: RecordPatch) -> Result<()>;

    /// Read the current record, if it exists.
    async fn get(&self, user_id: &str, doc_id: &str) -> Result<Option<DocumentRecord>>;

    /// Watch a record. Must be called from within a tokio runtime.
    ///
    /// Subscription errors are delivered as `None` updates and logged; there
    /// is no automatic retry.
    fn subscribe(&self, user_id: &str, doc_id: &str, on_update: UpdateFn) -> Subscription;
}

type DocKey = (String, String);

/// One record plus its active subscribers.
#[derive(Default)]
struct Topic {
    record: Option<DocumentRecord>,
    subscribers: HashMap<u64, Arc<UpdateFn>>,
}

/// An in-process database with synchronous callback dispatch.
///
/// Every merge notifies subscribers before it returns, which makes the
/// delivery order exact. Used by tests and single-process demos.
#[derive(Default)]
pub struct MemoryDb {
    topics: Arc<Mutex<HashMap<DocKey, Topic>>>,
    next_sub_id: AtomicU64,
}

impl MemoryDb {
    pub fn new() -> MemoryDb {
        MemoryDb::default()
    }
}

#[async_trait]
impl DocumentDb for MemoryDb {
    async fn merge(&self, user_id: &str, doc_id: &str, patch: RecordPatch) -> Result<()> {
        let key = (user_id.to_owned(), doc_id.to_owned());
        let (record, subscribers) = {
            let mut topics = self.topics.lock().expect("lock poisoned");
            let topic = topics.entry(key).or_default();
            topic.record = Some(patch.apply_to(topic.record.take()));
            (
                topic.record.clone(),
                topic.subscribers.values().cloned().collect::<Vec<_>>(),
            )
        };
        // Dispatch outside the lock, so a callback may re-enter the db.
        for subscriber in subscribers {
            subscriber(record.clone());
        }
        Ok(())
    }

    async fn get(&self, user_id: &str, doc_id: &str) -> Result<Option<DocumentRecord>> {
        let key = (user_id.to_owned(), doc_id.to_owned());
        let topics = self.topics.lock().expect("lock poisoned");
        Ok(topics.get(&key).and_then(|topic| topic.record.clone()))
    }

    fn subscribe(&self, user_id: &str, doc_id: &str, on_update: UpdateFn) -> Subscription {
        let key = (user_id.to_owned(), doc_id.to_owned());
        let sub_id = self.next_sub_id.fetch_add(1, Ordering::Relaxed);
        let subscriber = Arc::new(on_update);
        let current = {
            let mut topics = self.topics.lock().expect("lock poisoned");
            let topic = topics.entry(key.clone()).or_default();
            topic.subscribers.insert(sub_id, subscriber.clone());
            topic.record.clone()
        };
        subscriber(current);
        let topics = self.topics.clone();
        Subscription::new(move || {
            let mut topics = topics.lock().expect("lock poisoned");
            if let Some(topic) = topics.get_mut(&key) {
                topic.subscribers.remove(&sub_id);
            }
        })
    }
}

/// A database that stores one JSON file per record.
///
/// This backs the CLI, where `upload`, `ingest`, and `status` run as
/// separate processes sharing a directory. Merges replace the file
/// atomically; subscriptions poll for changes.
pub struct JsonDb {
    root: PathBuf,
    poll_interval: Duration,
}

impl JsonDb {
    pub fn new(root: impl Into<PathBuf>) -> JsonDb {
        JsonDb {
            root: root.into(),
            poll_interval: Duration::from_millis(200),
        }
    }

    /// Override the subscription poll interval.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> JsonDb {
        self.poll_interval = poll_interval;
        self
    }

    fn record_path(&self, user_id: &str, doc_id: &str) -> Result<PathBuf> {
        if user_id.is_empty()
            || doc_id.is_empty()
            || [user_id, doc_id]
                .iter()
                .any(|id| id.contains(['/', '\\']) || *id == "." || *id == "..")
        {
            return Err(anyhow!("invalid record key: {:?}/{:?}", user_id, doc_id));
        }
        Ok(self
            .root
            .join("users")
            .join(user_id)
            .join("documents")
            .join(format!("{doc_id}.json")))
    }

    async fn read_record(path: &Path) -> Result<Option<DocumentRecord>> {
        let data = match fs::read(path).await {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {:?}", path));
            }
        };
        let record = serde_json::from_slice(&data)
            .with_context(|| format!("failed to parse record {:?}", path))?;
        Ok(Some(record))
    }
}

#[async_trait]
impl DocumentDb for JsonDb {
    async fn merge(&self, user_id: &str, doc_id: &str, patch: RecordPatch) -> Result<()> {
        let path = self.record_path(user_id, doc_id)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {:?}", parent))?;
        }
        let existing = Self::read_record(&path).await?;
        let record = patch.apply_to(existing);
        let data = serde_json::to_vec_pretty(&record)
            .context("failed to serialize record")?;

        // Replace atomically so a polling reader never sees a half-written
        // record.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, data)
            .await
            .with_context(|| format!("failed to write {:?}", tmp))?;
        fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("failed to replace {:?}", path))?;
        Ok(())
    }

    async fn get(&self, user_id: &str, doc_id: &str) -> Result<Option<DocumentRecord>> {
        let path = self.record_path(user_id, doc_id)?;
        Self::read_record(&path).await
    }

    fn subscribe(&self, user_id: &str, doc_id: &str, on_update: UpdateFn) -> Subscription {
        let path = match self.record_path(user_id, doc_id) {
            Ok(path) => path,
            Err(err) => {
                warn!("subscription failed: {:?}", err);
                on_update(None);
                return Subscription::new(|| {});
            }
        };
        let poll_interval = self.poll_interval;
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll_interval);
            let mut last: Option<Option<DocumentRecord>> = None;
            loop {
                interval.tick().await;
                let current = match Self::read_record(&path).await {
                    Ok(current) => current,
                    Err(err) => {
                        warn!("error watching record: {:?}", err);
                        None
                    }
                };
                if last.as_ref() != Some(&current) {
                    on_update(current.clone());
                    last = Some(current);
                }
            }
        });
        Subscription::from_task(handle)
    }
}
