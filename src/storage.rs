//! The object-store seam.
//!
//! The client writes image bytes here and the trigger reads them back. In
//! production this is a managed bucket; [`LocalObjectStore`] mirrors one
//! onto a local directory so the pipeline can run and be tested on a single
//! machine.

use async_trait::async_trait;
use tokio::fs;

use crate::prelude::*;

/// Notification that an object has been finalized in storage.
///
/// The trigger receives one of these per object. Objects other than uploads
/// (thumbnails, exports, whatever lands in the bucket later) produce events
/// too, so consumers must treat unrecognized events as noise.
#[derive(Clone, Debug)]
pub struct StorageEvent {
    /// Bucket-relative object path.
    pub path: String,

    /// MIME type of the object, when storage knows it.
    pub content_type: Option<String>,
}

/// Read/write access to object storage.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Store an object at a bucket-relative path.
    async fn put(&self, path: &str, data: &[u8], content_type: &str) -> Result<()>;

    /// Download an object to a local destination file.
    async fn download(&self, path: &str, dest: &Path) -> Result<()>;
}

/// An object store rooted in a local directory.
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> LocalObjectStore {
        LocalObjectStore { root: root.into() }
    }

    /// Resolve a bucket-relative path, rejecting anything that could escape
    /// the root.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| !matches!(c, std::path::Component::Normal(_)))
        {
            return Err(anyhow!("invalid object path: {:?}", path));
        }
        Ok(self.root.join(relative))
    }

    /// Synthesize storage events for every object currently under
    /// `users/*/uploads/`, with content types guessed from extensions.
    ///
    /// A managed bucket pushes these events; a local directory has to be
    /// scanned for them instead.
    pub async fn scan_upload_events(&self) -> Result<Vec<StorageEvent>> {
        let mut events = vec![];
        let users_dir = self.root.join("users");
        let mut user_entries = match fs::read_dir(&users_dir).await {
            Ok(entries) => entries,
            Err(_) => return Ok(events),
        };
        while let Some(user_entry) = user_entries.next_entry().await? {
            let uploads_dir = user_entry.path().join("uploads");
            let mut upload_entries = match fs::read_dir(&uploads_dir).await {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            let user_name = user_entry.file_name();
            let user_name = user_name.to_string_lossy();
            while let Some(upload_entry) = upload_entries.next_entry().await? {
                if !upload_entry.file_type().await?.is_file() {
                    continue;
                }
                let file_name = upload_entry.file_name();
                let file_name = file_name.to_string_lossy();
                let content_type = mime_guess::from_path(upload_entry.path())
                    .first()
                    .map(|m| m.essence_str().to_owned());
                events.push(StorageEvent {
                    path: format!("users/{user_name}/uploads/{file_name}"),
                    content_type,
                });
            }
        }
        Ok(events)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    #[instrument(level = "debug", skip(self, data))]
    async fn put(&self, path: &str, data: &[u8], content_type: &str) -> Result<()> {
        let full_path = self.resolve(path)?;
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {:?}", parent))?;
        }
        fs::write(&full_path, data)
            .await
            .with_context(|| format!("failed to write object {:?}", path))?;
        debug!(path, content_type, bytes = data.len(), "stored object");
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    async fn download(&self, path: &str, dest: &Path) -> Result<()> {
        let full_path = self.resolve(path)?;
        fs::copy(&full_path, dest)
            .await
            .with_context(|| format!("failed to download object {:?}", path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_download_round_trips() {
        let root = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(root.path());
        store
            .put("users/u1/uploads/d1.jpg", b"fake image", "image/jpeg")
            .await
            .unwrap();

        let dest = root.path().join("scratch.jpg");
        store
            .download("users/u1/uploads/d1.jpg", &dest)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"fake image");
    }

    #[tokio::test]
    async fn rejects_paths_that_escape_the_root() {
        let root = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(root.path());
        assert!(store.put("../outside.jpg", b"x", "image/jpeg").await.is_err());
        assert!(store.put("/etc/passwd", b"x", "image/jpeg").await.is_err());
    }

    #[tokio::test]
    async fn scan_finds_only_uploads() {
        let root = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(root.path());
        store
            .put("users/u1/uploads/d1.jpg", b"a", "image/jpeg")
            .await
            .unwrap();
        store
            .put("users/u1/uploads/d2.png", b"b", "image/png")
            .await
            .unwrap();
        store
            .put("users/u1/exports/report.pdf", b"c", "application/pdf")
            .await
            .unwrap();

        let mut events = store.scan_upload_events().await.unwrap();
        events.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].path, "users/u1/uploads/d1.jpg");
        assert_eq!(events[0].content_type.as_deref(), Some("image/jpeg"));
        assert_eq!(events[1].path, "users/u1/uploads/d2.png");
        assert_eq!(events[1].content_type.as_deref(), Some("image/png"));
    }
}
