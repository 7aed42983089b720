use std::str::FromStr;

use clap::{Parser, Subcommand};
use tracing_subscriber::{
    EnvFilter, Layer as _, filter::Directive, fmt::format::FmtSpan, layer::SubscriberExt,
    util::SubscriberInitExt as _,
};

use self::{prelude::*, ui::Ui};

mod async_utils;
mod client;
mod cmd;
mod db;
mod identity;
mod ocr;
mod paths;
mod prelude;
mod record;
mod storage;
mod trigger;
mod ui;

/// Store documents, OCR them in the background, and watch their status.
#[derive(Debug, Parser)]
#[clap(
    version,
    after_help = r#"
Environment Variables:
  - SECUREDOC_BUCKET (optional): Directory mirroring the storage bucket.
  - SECUREDOC_DB (optional): Directory holding document records.
  - GOOGLE_VISION_API_KEY: API key for the `vision` OCR engine.

  These variables may be set in a standard `.env` file.
"#
)]
struct Opts {
    #[clap(subcommand)]
    subcmd: Cmd,
}

/// The subcommands we support.
#[derive(Debug, Subcommand)]
enum Cmd {
    /// Upload an image and create its processing record.
    Upload(cmd::upload::UploadOpts),
    /// Run the ingest trigger over finalized uploads.
    Ingest(cmd::ingest::IngestOpts),
    /// Print the current record for a document.
    Status(cmd::status::StatusOpts),
    /// Watch a document record until it reaches a terminal status.
    Watch(cmd::watch::WatchOpts),
}

impl Cmd {
    /// Are we using stdout for machine-readable output?
    fn using_stdout_for_output(&self) -> bool {
        matches!(self, Cmd::Status(_) | Cmd::Watch(_))
    }
}

/// Our entry point, which can return an error. [`anyhow::Result`] will
/// automatically print a nice error message with optional backtrace.
#[tokio::main]
async fn main() -> Result<()> {
    let ui = Ui::init();

    // Initialize tracing.
    let directive =
        Directive::from_str("info").expect("built-in directive should be valid");
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_writer(ui.get_stderr_writer())
        .with_filter(env_filter);

    // We can stack multiple layers here if we need to.
    tracing_subscriber::registry().with(subscriber).init();

    // Call our real `main` function now that logging is set up.
    real_main(ui).await
}

/// Our real entry point.
#[instrument(level = "debug", name = "main", skip_all)]
async fn real_main(ui: Ui) -> Result<()> {
    // Load environment variables from a `.env` file, if it exists.
    dotenvy::dotenv().ok();

    // Parse command-line arguments.
    let opts = Opts::parse();
    debug!("Parsed options: {:?}", opts);

    // Hide spinners if stdout carries real output.
    if opts.subcmd.using_stdout_for_output() {
        ui.hide_progress_bars();
    }

    // Run the appropriate subcommand.
    match &opts.subcmd {
        Cmd::Upload(opts) => cmd::upload::cmd_upload(ui, opts).await,
        Cmd::Ingest(opts) => cmd::ingest::cmd_ingest(ui, opts).await,
        Cmd::Status(opts) => cmd::status::cmd_status(opts).await,
        Cmd::Watch(opts) => cmd::watch::cmd_watch(opts).await,
    }
}
