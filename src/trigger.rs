//! The ingest trigger: reacts to finalized upload objects, runs OCR, and
//! writes the terminal status.
//!
//! One invocation handles one storage event. The client already wrote the
//! `processing` record; the trigger only performs the terminal transition,
//! and it performs exactly one record write per validated event: either the
//! `ocr_done` result or the `failed` result, never both.
//!
//! Failures are absorbed into the record rather than propagated: the only
//! error `handle_event` can return is the failure write itself failing. A
//! host that kills the invocation before the failure write runs leaves the
//! record `processing` forever; there is deliberately no timeout or
//! dead-letter path reclassifying such records.

use chrono::Utc;

use crate::{
    db::DocumentDb,
    ocr::OcrEngine,
    paths::UploadPath,
    prelude::*,
    record::RecordPatch,
    storage::{ObjectStore, StorageEvent},
};

/// What the trigger did with an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Not an image upload; ignored without touching the database.
    Skipped,

    /// OCR succeeded and the `ocr_done` record was written.
    OcrDone,

    /// Processing failed and the `failed` record was written.
    Failed,
}

/// Deployment knobs for the trigger.
#[derive(Clone, Debug, Default)]
pub struct TriggerConfig {
    /// Parent directory for scratch downloads. Defaults to the system
    /// temporary directory.
    pub scratch_dir: Option<PathBuf>,
}

/// The server-side OCR worker.
pub struct IngestTrigger {
    store: Arc<dyn ObjectStore>,
    db: Arc<dyn DocumentDb>,
    engine: Arc<dyn OcrEngine>,
    config: TriggerConfig,
}

impl IngestTrigger {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        db: Arc<dyn DocumentDb>,
        engine: Arc<dyn OcrEngine>,
    ) -> IngestTrigger {
        IngestTrigger {
            store,
            db,
            engine,
            config: TriggerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: TriggerConfig) -> IngestTrigger {
        self.config = config;
        self
    }

    /// Handle one storage event.
    ///
    /// Events for non-image objects, or for paths outside the upload layout,
    /// are expected noise: they are logged at info and skipped without a
    /// record write. Re-delivery of the same event re-runs OCR and
    /// overwrites the record with an equivalent result, which is harmless
    /// because the write is a merge keyed by the same fields.
    #[instrument(level = "debug", skip(self), fields(path = %event.path))]
    pub async fn handle_event(&self, event: &StorageEvent) -> Result<TriggerOutcome> {
        let is_image = event
            .content_type
            .as_deref()
            .is_some_and(|c| c.starts_with("image/"));
        if !is_image {
            info!(path = %event.path, "not an image, skipping");
            return Ok(TriggerOutcome::Skipped);
        }
        let Some(upload) = UploadPath::parse(&event.path) else {
            info!(path = %event.path, "invalid upload path, skipping");
            return Ok(TriggerOutcome::Skipped);
        };

        info!(user_id = %upload.user_id, doc_id = %upload.doc_id, "starting OCR");
        match self.process(&event.path, &upload).await {
            Ok(()) => {
                info!(doc_id = %upload.doc_id, "OCR completed successfully");
                Ok(TriggerOutcome::OcrDone)
            }
            Err(err) => {
                error!(doc_id = %upload.doc_id, "OCR failed: {:?}", err);
                self.db
                    .merge(
                        &upload.user_id,
                        &upload.doc_id,
                        RecordPatch::failed(format!("{err:#}"), Utc::now()),
                    )
                    .await?;
                Ok(TriggerOutcome::Failed)
            }
        }
    }

    /// Download, OCR, and write the success record. Any error here lands in
    /// the `failed` record instead.
    async fn process(&self, object_path: &str, upload: &UploadPath) -> Result<()> {
        // The scratch directory is removed when this guard drops, on the
        // success and failure paths alike.
        let scratch = match &self.config.scratch_dir {
            Some(dir) => tempfile::TempDir::with_prefix_in("securedoc-ingest", dir),
            None => tempfile::TempDir::with_prefix("securedoc-ingest"),
        }
        .context("cannot create scratch directory")?;
        let file_name = Path::new(object_path)
            .file_name()
            .unwrap_or_else(|| "upload".as_ref());
        let local_path = scratch.path().join(file_name);

        self.store.download(object_path, &local_path).await?;
        let raw_text = self.engine.extract_text(&local_path).await?;
        self.db
            .merge(
                &upload.user_id,
                &upload.doc_id,
                RecordPatch::ocr_done(raw_text, Utc::now()),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::{
        db::MemoryDb,
        ocr::echo::EchoOcrEngine,
        paths::upload_path,
        record::{DocStatus, RecordPatch},
        storage::LocalObjectStore,
    };

    /// An engine whose OCR call always fails.
    struct ExplodingEngine;

    #[async_trait]
    impl OcrEngine for ExplodingEngine {
        async fn extract_text(&self, _image: &Path) -> Result<String> {
            Err(anyhow!("OCR backend exploded"))
        }
    }

    struct Fixture {
        _bucket_dir: tempfile::TempDir,
        store: Arc<LocalObjectStore>,
        db: Arc<MemoryDb>,
    }

    impl Fixture {
        fn new() -> Fixture {
            let bucket_dir = tempfile::tempdir().unwrap();
            let store = Arc::new(LocalObjectStore::new(bucket_dir.path()));
            Fixture {
                _bucket_dir: bucket_dir,
                store,
                db: Arc::new(MemoryDb::new()),
            }
        }

        fn trigger(&self, engine: Arc<dyn OcrEngine>) -> IngestTrigger {
            IngestTrigger::new(self.store.clone(), self.db.clone(), engine)
        }

        /// Upload an object and create the `processing` record, the way the
        /// client does.
        async fn seed_upload(&self, user_id: &str, doc_id: &str, data: &[u8]) -> StorageEvent {
            let path = upload_path(user_id, doc_id);
            self.store.put(&path, data, "image/jpeg").await.unwrap();
            let now = Utc::now();
            self.db
                .merge(
                    user_id,
                    doc_id,
                    RecordPatch {
                        status: DocStatus::Processing,
                        storage_path: Some(path.clone()),
                        file_path: Some(path.clone()),
                        content_type: Some("image/jpeg".to_owned()),
                        created_at: Some(now),
                        updated_at: Some(now),
                        ..RecordPatch::default()
                    },
                )
                .await
                .unwrap();
            StorageEvent {
                path,
                content_type: Some("image/jpeg".to_owned()),
            }
        }
    }

    #[tokio::test]
    async fn skips_non_image_and_malformed_events_without_writes() {
        let fx = Fixture::new();
        let trigger = fx.trigger(Arc::new(EchoOcrEngine::new()));

        let events = [
            StorageEvent {
                path: "users/u1/uploads/d1.jpg".to_owned(),
                content_type: Some("application/pdf".to_owned()),
            },
            StorageEvent {
                path: "users/u1/uploads/d1.jpg".to_owned(),
                content_type: None,
            },
            StorageEvent {
                path: "users/u1/exports/d1.jpg".to_owned(),
                content_type: Some("image/jpeg".to_owned()),
            },
            StorageEvent {
                path: "users/u1/uploads/nested/d1.jpg".to_owned(),
                content_type: Some("image/jpeg".to_owned()),
            },
        ];
        for event in &events {
            let outcome = trigger.handle_event(event).await.unwrap();
            assert_eq!(outcome, TriggerOutcome::Skipped, "event: {:?}", event);
        }
        assert!(fx.db.get("u1", "d1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn writes_exactly_one_terminal_record_on_success() {
        let fx = Fixture::new();
        let event = fx.seed_upload("u1", "d1", b"HELLO WORLD").await;

        // Count writes observed after the processing record exists.
        let deliveries = Arc::new(Mutex::new(Vec::new()));
        let deliveries_clone = deliveries.clone();
        let sub = fx.db.subscribe(
            "u1",
            "d1",
            Box::new(move |record| {
                deliveries_clone.lock().unwrap().push(record.map(|r| r.status));
            }),
        );

        let trigger = fx.trigger(Arc::new(EchoOcrEngine::new()));
        let outcome = trigger.handle_event(&event).await.unwrap();
        assert_eq!(outcome, TriggerOutcome::OcrDone);
        sub.unsubscribe();

        // Initial delivery plus exactly one trigger write.
        assert_eq!(
            *deliveries.lock().unwrap(),
            vec![Some(DocStatus::Processing), Some(DocStatus::OcrDone)],
        );

        let record = fx.db.get("u1", "d1").await.unwrap().unwrap();
        assert_eq!(record.raw_text.as_deref(), Some("HELLO WORLD"));
        assert!(record.error.is_none());
    }

    #[tokio::test]
    async fn terminal_merge_preserves_the_processing_fields() {
        let fx = Fixture::new();
        let event = fx.seed_upload("u1", "d1", b"TEXT").await;
        let before = fx.db.get("u1", "d1").await.unwrap().unwrap();

        let trigger = fx.trigger(Arc::new(EchoOcrEngine::new()));
        trigger.handle_event(&event).await.unwrap();

        let after = fx.db.get("u1", "d1").await.unwrap().unwrap();
        assert_eq!(after.storage_path, before.storage_path);
        assert_eq!(after.file_path, before.file_path);
        assert_eq!(after.content_type, before.content_type);
        assert_eq!(after.created_at, before.created_at);
        assert!(after.updated_at >= before.updated_at);
    }

    #[tokio::test]
    async fn ocr_failure_writes_the_failed_record() {
        let fx = Fixture::new();
        let event = fx.seed_upload("u1", "d1", b"TEXT").await;

        let trigger = fx.trigger(Arc::new(ExplodingEngine));
        let outcome = trigger.handle_event(&event).await.unwrap();
        assert_eq!(outcome, TriggerOutcome::Failed);

        let record = fx.db.get("u1", "d1").await.unwrap().unwrap();
        assert_eq!(record.status, DocStatus::Failed);
        assert!(record.error.as_deref().unwrap().contains("exploded"));
        assert!(record.raw_text.is_none());
    }

    #[tokio::test]
    async fn missing_object_writes_the_failed_record() {
        let fx = Fixture::new();
        let trigger = fx.trigger(Arc::new(EchoOcrEngine::new()));
        let event = StorageEvent {
            path: "users/u1/uploads/ghost.jpg".to_owned(),
            content_type: Some("image/jpeg".to_owned()),
        };
        let outcome = trigger.handle_event(&event).await.unwrap();
        assert_eq!(outcome, TriggerOutcome::Failed);

        let record = fx.db.get("u1", "ghost").await.unwrap().unwrap();
        assert_eq!(record.status, DocStatus::Failed);
        assert!(record.error.is_some());
    }

    #[tokio::test]
    async fn scratch_download_is_removed_on_success_and_failure() {
        let fx = Fixture::new();
        let event = fx.seed_upload("u1", "d1", b"TEXT").await;
        let scratch_root = tempfile::tempdir().unwrap();
        let config = TriggerConfig {
            scratch_dir: Some(scratch_root.path().to_owned()),
        };

        let trigger = fx
            .trigger(Arc::new(EchoOcrEngine::new()))
            .with_config(config.clone());
        trigger.handle_event(&event).await.unwrap();
        assert_eq!(std::fs::read_dir(scratch_root.path()).unwrap().count(), 0);

        let trigger = fx.trigger(Arc::new(ExplodingEngine)).with_config(config);
        trigger.handle_event(&event).await.unwrap();
        assert_eq!(std::fs::read_dir(scratch_root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn rerunning_an_event_is_idempotent() {
        let fx = Fixture::new();
        let event = fx.seed_upload("u1", "d1", b"SAME TEXT").await;
        let trigger = fx.trigger(Arc::new(EchoOcrEngine::new()));

        trigger.handle_event(&event).await.unwrap();
        let first = fx.db.get("u1", "d1").await.unwrap().unwrap();
        trigger.handle_event(&event).await.unwrap();
        let second = fx.db.get("u1", "d1").await.unwrap().unwrap();

        assert_eq!(second.status, DocStatus::OcrDone);
        assert_eq!(second.raw_text, first.raw_text);
        assert!(second.error.is_none());
        assert_eq!(second.storage_path, first.storage_path);
        assert_eq!(second.created_at, first.created_at);
    }
}
