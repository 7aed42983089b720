//! The `upload` subcommand.

use std::sync::Mutex;

use clap::Args;
use uuid::Uuid;

use crate::{
    client::UploadClient,
    identity::SessionIdentity,
    prelude::*,
    ui::Ui,
};

use super::{StoreOpts, UserOpts};

/// The `upload` subcommand.
#[derive(Debug, Args)]
pub struct UploadOpts {
    /// The image file to upload.
    image: PathBuf,

    /// Document id. Defaults to a fresh UUID.
    #[clap(long)]
    doc_id: Option<String>,

    /// Wait for OCR to finish and print the final record as JSON.
    #[clap(long)]
    wait: bool,

    #[clap(flatten)]
    user: UserOpts,

    #[clap(flatten)]
    store: StoreOpts,
}

pub async fn cmd_upload(ui: Ui, opts: &UploadOpts) -> Result<()> {
    let client = UploadClient::new(
        opts.store.object_store(),
        opts.store.document_db(),
        Arc::new(SessionIdentity::new(Some(opts.user.user.clone()))),
    );
    let doc_id = opts
        .doc_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let storage_path = client.submit(&opts.image, &doc_id).await?;
    info!(doc_id = %doc_id, path = %storage_path, "upload complete");
    println!("{doc_id}");

    if opts.wait {
        let sp = ui.new_spinner("Waiting for OCR", "OCR finished");

        // The subscription is push-only and never ends on its own, so we
        // bridge its first terminal record into a oneshot we can await.
        let (tx, rx) = futures::channel::oneshot::channel();
        let tx = Mutex::new(Some(tx));
        let sub = client.subscribe(
            &doc_id,
            Box::new(move |record| {
                let Some(record) = record else { return };
                if record.status.is_terminal() {
                    if let Some(tx) = tx.lock().expect("lock poisoned").take() {
                        let _ = tx.send(record);
                    }
                }
            }),
        )?;
        let record = rx.await.context("record listener went away")?;
        sub.unsubscribe();
        sp.finish_using_style();
        println!("{}", serde_json::to_string_pretty(&record)?);
    }
    Ok(())
}
