//! A fake OCR engine for tests and local demos.

use async_trait::async_trait;

use crate::prelude::*;

use super::OcrEngine;

/// "Extracts" text by reading the file contents directly.
///
/// Upload a plain-text file in place of an image and the pipeline behaves
/// exactly as if OCR had recognized that text. Lets the full
/// upload-to-terminal-status flow run with no OCR backend installed.
#[non_exhaustive]
pub struct EchoOcrEngine {}

impl EchoOcrEngine {
    pub fn new() -> EchoOcrEngine {
        EchoOcrEngine {}
    }
}

impl Default for EchoOcrEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OcrEngine for EchoOcrEngine {
    async fn extract_text(&self, image: &Path) -> Result<String> {
        let data = tokio::fs::read(image)
            .await
            .with_context(|| format!("cannot read {:?}", image))?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }
}
