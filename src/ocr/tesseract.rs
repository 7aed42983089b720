//! OCR engine wrapping the `tesseract` CLI tool.

use async_trait::async_trait;
use tokio::process::Command;

use crate::{async_utils::check_for_command_failure, prelude::*};

use super::OcrEngine;

/// Runs the locally installed `tesseract` binary against the image.
#[non_exhaustive]
pub struct TesseractOcrEngine {}

impl TesseractOcrEngine {
    pub fn new() -> TesseractOcrEngine {
        TesseractOcrEngine {}
    }
}

impl Default for TesseractOcrEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OcrEngine for TesseractOcrEngine {
    #[instrument(level = "debug", skip_all, fields(image = ?image))]
    async fn extract_text(&self, image: &Path) -> Result<String> {
        // Tesseract writes `<base>.txt` next to whatever output base we give
        // it, so point it into its own scratch directory.
        let tmpdir = tempfile::TempDir::with_prefix("tesseract")?;
        let output_base = tmpdir.path().join("output");

        let output = Command::new("tesseract")
            .arg(image)
            .arg(&output_base)
            .output()
            .await
            .context("cannot run tesseract")?;
        check_for_command_failure("tesseract", &output)?;

        let text = tokio::fs::read_to_string(output_base.with_extension("txt"))
            .await
            .context("cannot read tesseract output file")?;
        Ok(text)
    }
}
