//! The `status` subcommand.

use clap::Args;

use crate::{client::UploadClient, identity::SessionIdentity, prelude::*};

use super::{StoreOpts, UserOpts};

/// The `status` subcommand.
#[derive(Debug, Args)]
pub struct StatusOpts {
    /// The document id to look up.
    doc_id: String,

    #[clap(flatten)]
    user: UserOpts,

    #[clap(flatten)]
    store: StoreOpts,
}

pub async fn cmd_status(opts: &StatusOpts) -> Result<()> {
    let client = UploadClient::new(
        opts.store.object_store(),
        opts.store.document_db(),
        Arc::new(SessionIdentity::new(Some(opts.user.user.clone()))),
    );
    // `null` means the record does not exist, which is distinct from a
    // record that is still processing.
    let record = client.fetch(&opts.doc_id).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
