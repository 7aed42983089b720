//! The upload + status client.
//!
//! `submit` gets a local image into the per-user upload path and announces
//! intent with a `processing` record; `subscribe` then observes the ingest
//! trigger's terminal write. The two are composed sequentially by the
//! caller: upload first, then listen.
//!
//! The record subscription is push-only. It delivers the current value
//! immediately (possibly `None`: "no record yet" is a distinct state from
//! "processing", not an error) and keeps delivering until the caller
//! unsubscribes — it does not stop at a terminal status, and it imposes no
//! timeout on `processing`.

use chrono::Utc;

use crate::{
    async_utils::Subscription,
    db::{DocumentDb, UpdateFn},
    identity::IdentityProvider,
    paths::upload_path,
    prelude::*,
    record::{DocStatus, DocumentRecord, NlpStatus, RecordPatch},
    storage::ObjectStore,
};

/// Client-local view of a single upload's lifecycle.
///
/// `Failed` is reachable from `Uploading` (a local upload error) and from
/// `Processing` (a server-reported failure). `Idle` is both the initial
/// state and the reset target after the result is acknowledged.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum UploadState {
    #[default]
    Idle,
    Uploading,
    Processing,
    Done {
        raw_text: String,
    },
    Failed {
        error: String,
    },
}

impl UploadState {
    /// The local upload has started.
    pub fn begin_upload(&mut self) {
        *self = UploadState::Uploading;
    }

    /// The local upload failed before any record was written.
    pub fn fail_upload(&mut self, error: String) {
        *self = UploadState::Failed { error };
    }

    /// Fold a record delivered by the listener into the state machine.
    ///
    /// `None` means the record is not visible yet; the upload stays in
    /// whatever state it was in.
    pub fn observe(&mut self, record: Option<&DocumentRecord>) {
        let Some(record) = record else { return };
        match record.status {
            DocStatus::Processing => *self = UploadState::Processing,
            DocStatus::OcrDone => {
                *self = UploadState::Done {
                    raw_text: record.raw_text.clone().unwrap_or_default(),
                }
            }
            DocStatus::Failed => {
                *self = UploadState::Failed {
                    error: record
                        .error
                        .clone()
                        .unwrap_or_else(|| "unknown error".to_owned()),
                }
            }
        }
    }

    /// Acknowledge the result and return to `Idle`.
    pub fn reset(&mut self) {
        *self = UploadState::Idle;
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadState::Done { .. } | UploadState::Failed { .. })
    }
}

/// Uploads images and watches their processing status.
pub struct UploadClient {
    store: Arc<dyn ObjectStore>,
    db: Arc<dyn DocumentDb>,
    identity: Arc<dyn IdentityProvider>,
    fallback_user: Option<String>,
}

impl UploadClient {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        db: Arc<dyn DocumentDb>,
        identity: Arc<dyn IdentityProvider>,
    ) -> UploadClient {
        UploadClient {
            store,
            db,
            identity,
            fallback_user: None,
        }
    }

    /// Use a fixed user when nobody is signed in. A development convenience
    /// only: it must be configured explicitly, and every use is logged.
    pub fn with_fallback_user(mut self, user: impl Into<String>) -> UploadClient {
        self.fallback_user = Some(user.into());
        self
    }

    /// Resolve the user all operations act as.
    fn effective_user(&self) -> Result<String> {
        if let Some(user) = self.identity.current_user() {
            return Ok(user);
        }
        if let Some(user) = &self.fallback_user {
            warn!(user = %user, "no authenticated user, using configured fallback");
            return Ok(user.clone());
        }
        Err(anyhow!("no authenticated user and no fallback configured"))
    }

    /// Upload a local image and create its `processing` record.
    ///
    /// Returns the storage path. A failure during the upload itself aborts
    /// before the record write, leaving no record at all.
    #[instrument(level = "debug", skip(self), fields(doc_id = %doc_id))]
    pub async fn submit(&self, image: &Path, doc_id: &str) -> Result<String> {
        let user_id = self.effective_user()?;
        let data = tokio::fs::read(image)
            .await
            .with_context(|| format!("cannot read {:?}", image))?;

        let storage_path = upload_path(&user_id, doc_id);
        debug!(path = %storage_path, bytes = data.len(), "uploading image");
        self.store
            .put(&storage_path, &data, "image/jpeg")
            .await
            .context("upload failed")?;

        let now = Utc::now();
        self.db
            .merge(
                &user_id,
                doc_id,
                RecordPatch {
                    status: DocStatus::Processing,
                    storage_path: Some(storage_path.clone()),
                    file_path: Some(storage_path.clone()),
                    content_type: Some("image/jpeg".to_owned()),
                    nlp_status: Some(NlpStatus::Pending),
                    created_at: Some(now),
                    updated_at: Some(now),
                    uploaded_at: Some(now),
                    ..RecordPatch::default()
                },
            )
            .await
            .context("failed to create document record")?;
        Ok(storage_path)
    }

    /// Watch the record for `doc_id` under the current user.
    ///
    /// The caller is responsible for unsubscribing once it has seen a
    /// terminal status.
    pub fn subscribe(&self, doc_id: &str, on_update: UpdateFn) -> Result<Subscription> {
        let user_id = self.effective_user()?;
        debug!(user_id = %user_id, doc_id = %doc_id, "starting record listener");
        Ok(self.db.subscribe(&user_id, doc_id, on_update))
    }

    /// One-shot read of the current record.
    pub async fn fetch(&self, doc_id: &str) -> Result<Option<DocumentRecord>> {
        let user_id = self.effective_user()?;
        self.db.get(&user_id, doc_id).await
    }
}
