//! The object-storage path convention shared by the client and the trigger.
//!
//! Uploads live at `users/{userId}/uploads/{docId}.jpg`, and the matching
//! document record lives at `users/{userId}/documents/{docId}`. The trigger
//! sees storage events for every object in the bucket, so anything that does
//! not match the upload layout is expected noise, not an error.

use crate::prelude::*;

/// Build the storage path for an upload.
pub fn upload_path(user_id: &str, doc_id: &str) -> String {
    format!("users/{user_id}/uploads/{doc_id}.jpg")
}

/// A storage path that parsed as a valid upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadPath {
    pub user_id: String,
    pub doc_id: String,
}

impl UploadPath {
    /// Parse an object path, returning `None` unless it has exactly the
    /// upload layout: four non-empty slash-separated segments, with segment
    /// 0 = `users` and segment 2 = `uploads`. The doc id is the final
    /// segment with its extension stripped.
    pub fn parse(path: &str) -> Option<UploadPath> {
        let segments = path.split('/').collect::<Vec<_>>();
        if segments.len() != 4
            || segments[0] != "users"
            || segments[2] != "uploads"
            || segments.iter().any(|s| s.is_empty())
        {
            return None;
        }
        // Strip the extension by hand: `Path::file_stem` would treat a name
        // like `.jpg` as an extensionless hidden file.
        let doc_id = match segments[3].rsplit_once('.') {
            Some((stem, _ext)) => stem,
            None => segments[3],
        };
        if doc_id.is_empty() {
            return None;
        }
        Some(UploadPath {
            user_id: segments[1].to_owned(),
            doc_id: doc_id.to_owned(),
        })
    }
}
