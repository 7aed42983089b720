//! The `ingest` subcommand.

use std::{collections::HashSet, time::Duration};

use clap::Args;

use crate::{
    ocr::ocr_engine_for_name,
    paths::UploadPath,
    prelude::*,
    trigger::{IngestTrigger, TriggerConfig},
    ui::Ui,
};

use super::StoreOpts;

/// The `ingest` subcommand.
#[derive(Debug, Args)]
pub struct IngestOpts {
    /// OCR engine to use: `tesseract`, `vision`, or `echo`.
    #[clap(long, default_value = "tesseract")]
    engine: String,

    /// Keep polling for new uploads instead of exiting after one pass.
    #[clap(long)]
    watch: bool,

    /// Poll interval in milliseconds, used with --watch.
    #[clap(long, default_value = "1000")]
    poll_ms: u64,

    /// Scratch directory for downloads. Defaults to the system temp dir.
    #[clap(long)]
    scratch_dir: Option<PathBuf>,

    #[clap(flatten)]
    store: StoreOpts,
}

pub async fn cmd_ingest(ui: Ui, opts: &IngestOpts) -> Result<()> {
    let store = opts.store.object_store();
    let db = opts.store.document_db();
    let engine = ocr_engine_for_name(&opts.engine)?;
    let trigger = IngestTrigger::new(store.clone(), db.clone(), engine).with_config(
        TriggerConfig {
            scratch_dir: opts.scratch_dir.clone(),
        },
    );

    let sp = opts
        .watch
        .then(|| ui.new_spinner("Watching for uploads", "Stopped watching"));

    // A managed bucket pushes each finalized object exactly once; scanning a
    // directory re-finds everything, so remember what we already handled and
    // leave already-terminal records alone.
    let mut handled = HashSet::new();
    loop {
        for event in store.scan_upload_events().await? {
            if handled.contains(&event.path) {
                continue;
            }
            if let Some(upload) = UploadPath::parse(&event.path) {
                let record = db.get(&upload.user_id, &upload.doc_id).await?;
                if record.is_some_and(|r| r.status.is_terminal()) {
                    handled.insert(event.path);
                    continue;
                }
            }
            trigger.handle_event(&event).await?;
            handled.insert(event.path);
        }
        if !opts.watch {
            break;
        }
        tokio::time::sleep(Duration::from_millis(opts.poll_ms)).await;
    }
    if let Some(sp) = sp {
        sp.finish_using_style();
    }
    Ok(())
}
