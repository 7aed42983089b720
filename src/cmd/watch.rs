//! The `watch` subcommand.

use std::sync::Mutex;

use clap::Args;

use crate::{client::UploadClient, identity::SessionIdentity, prelude::*};

use super::{StoreOpts, UserOpts};

/// The `watch` subcommand.
#[derive(Debug, Args)]
pub struct WatchOpts {
    /// The document id to watch.
    doc_id: String,

    #[clap(flatten)]
    user: UserOpts,

    #[clap(flatten)]
    store: StoreOpts,
}

pub async fn cmd_watch(opts: &WatchOpts) -> Result<()> {
    let client = UploadClient::new(
        opts.store.object_store(),
        opts.store.document_db(),
        Arc::new(SessionIdentity::new(Some(opts.user.user.clone()))),
    );

    // Print every update as a JSON line, and resolve the oneshot on the
    // first terminal status so we know when to unsubscribe.
    let (tx, rx) = futures::channel::oneshot::channel();
    let tx = Mutex::new(Some(tx));
    let sub = client.subscribe(
        &opts.doc_id,
        Box::new(move |record| {
            match serde_json::to_string(&record) {
                Ok(line) => println!("{line}"),
                Err(err) => warn!("could not serialize record: {:?}", err),
            }
            if record.is_some_and(|r| r.status.is_terminal()) {
                if let Some(tx) = tx.lock().expect("lock poisoned").take() {
                    let _ = tx.send(());
                }
            }
        }),
    )?;
    rx.await.context("record listener went away")?;
    sub.unsubscribe();
    Ok(())
}
