//! The document record and its status state machine.
//!
//! Each uploaded image is tracked by exactly one record, addressed by
//! `(user_id, doc_id)`. The record is created by the client as `processing`
//! and moved to a terminal status by the ingest trigger, never the other way
//! around. All writes are merges: a partial update never deletes fields it
//! does not mention.

use chrono::{DateTime, Utc};

use crate::prelude::*;

/// Processing status of a document record.
///
/// `Processing` is the sole initial state. `OcrDone` and `Failed` are
/// terminal: no further transition is expected once either is written.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocStatus {
    /// The upload exists and the trigger has not finished with it.
    #[default]
    Processing,

    /// OCR succeeded and `raw_text` holds the extracted text.
    OcrDone,

    /// Processing failed and `error` holds a human-readable reason.
    Failed,
}

impl DocStatus {
    /// Is this a terminal status?
    pub fn is_terminal(self) -> bool {
        matches!(self, DocStatus::OcrDone | DocStatus::Failed)
    }
}

/// Placeholder for a later NLP pass over the extracted text. Written by the
/// client at creation time and not consumed by anything yet.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NlpStatus {
    Pending,
    Processing,
    Done,
}

/// One document record, in the camelCase wire shape shared by every
/// component that reads or writes the database.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    /// Current processing status. Drives all downstream consumers.
    pub status: DocStatus,

    /// Extracted text. Present if and only if `status` is `ocr_done`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,

    /// Failure reason. Present if and only if `status` is `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Path of the source image in object storage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,

    /// Same path again, under the older field name some readers still use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,

    /// MIME type of the source image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// Forward-compatibility placeholder. See [`NlpStatus`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nlp_status: Option<NlpStatus>,

    /// When the record was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// Advances on every status transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// When the client finished uploading the image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<DateTime<Utc>>,
}

/// A merge write against a document record.
///
/// `status` is always written (every writer in the pipeline sets it); all
/// other fields are written only when present. Applying a patch never
/// removes a field the patch does not mention.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecordPatch {
    pub status: DocStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nlp_status: Option<NlpStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<DateTime<Utc>>,
}

impl RecordPatch {
    /// The terminal patch written by the trigger on success.
    pub fn ocr_done(raw_text: String, now: DateTime<Utc>) -> RecordPatch {
        RecordPatch {
            status: DocStatus::OcrDone,
            raw_text: Some(raw_text),
            updated_at: Some(now),
            ..RecordPatch::default()
        }
    }

    /// The terminal patch written by the trigger on failure.
    pub fn failed(error: String, now: DateTime<Utc>) -> RecordPatch {
        RecordPatch {
            status: DocStatus::Failed,
            error: Some(error),
            updated_at: Some(now),
            ..RecordPatch::default()
        }
    }

    /// Merge this patch into an existing record, or create the record if it
    /// does not exist yet.
    ///
    /// A terminal patch can land before the client's `processing` write is
    /// visible (or after it failed entirely); in that case the patch creates
    /// the record, with `created_at` falling back to the patch's
    /// `updated_at`.
    pub fn apply_to(self, existing: Option<DocumentRecord>) -> DocumentRecord {
        let mut record = existing.unwrap_or(DocumentRecord {
            status: self.status,
            raw_text: None,
            error: None,
            file_path: None,
            storage_path: None,
            content_type: None,
            nlp_status: None,
            created_at: self.created_at.or(self.updated_at),
            updated_at: None,
            uploaded_at: None,
        });
        record.status = self.status;
        if let Some(raw_text) = self.raw_text {
            record.raw_text = Some(raw_text);
        }
        if let Some(error) = self.error {
            record.error = Some(error);
        }
        if let Some(file_path) = self.file_path {
            record.file_path = Some(file_path);
        }
        if let Some(storage_path) = self.storage_path {
            record.storage_path = Some(storage_path);
        }
        if let Some(content_type) = self.content_type {
            record.content_type = Some(content_type);
        }
        if let Some(nlp_status) = self.nlp_status {
            record.nlp_status = Some(nlp_status);
        }
        if let Some(created_at) = self.created_at {
            record.created_at = Some(created_at);
        }
        if let Some(updated_at) = self.updated_at {
            record.updated_at = Some(updated_at);
        }
        if let Some(uploaded_at) = self.uploaded_at {
            record.uploaded_at = Some(uploaded_at);
        }
        record
    }
}
