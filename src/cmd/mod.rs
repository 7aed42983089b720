//! Command-line entry points.

use clap::Args;

use crate::{
    db::{DocumentDb, JsonDb},
    prelude::*,
    storage::LocalObjectStore,
};

pub mod ingest;
pub mod status;
pub mod upload;
pub mod watch;

/// Options shared by subcommands that touch the local data directories.
#[derive(Debug, Clone, Args)]
pub struct StoreOpts {
    /// Directory mirroring the storage bucket.
    #[clap(long, env = "SECUREDOC_BUCKET", default_value = "securedoc-bucket")]
    bucket: PathBuf,

    /// Directory holding document records.
    #[clap(long, env = "SECUREDOC_DB", default_value = "securedoc-db")]
    db: PathBuf,
}

impl StoreOpts {
    pub fn object_store(&self) -> Arc<LocalObjectStore> {
        Arc::new(LocalObjectStore::new(&self.bucket))
    }

    pub fn document_db(&self) -> Arc<dyn DocumentDb> {
        Arc::new(JsonDb::new(&self.db))
    }
}

/// Options identifying the acting user.
///
/// The CLI has no real sign-in flow, so the identity is always explicit.
#[derive(Debug, Clone, Args)]
pub struct UserOpts {
    /// Act as this user.
    #[clap(long, env = "SECUREDOC_USER")]
    pub user: String,
}
