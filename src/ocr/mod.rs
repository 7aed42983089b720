//! OCR engine interface.

use async_trait::async_trait;

use crate::prelude::*;

pub mod echo;
pub mod tesseract;
pub mod vision;

/// Interface for extracting text from a single image file.
#[async_trait]
pub trait OcrEngine: Send + Sync + 'static {
    /// Extract all text from an image. An empty string is a valid result:
    /// an image with no recognizable text is a success, not a failure.
    async fn extract_text(&self, image: &Path) -> Result<String>;
}

/// Get the OCR engine with the specified name.
pub fn ocr_engine_for_name(name: &str) -> Result<Arc<dyn OcrEngine>> {
    match name {
        "tesseract" => Ok(Arc::new(tesseract::TesseractOcrEngine::new())),
        "vision" => Ok(Arc::new(vision::VisionOcrEngine::from_env()?)),
        "echo" => Ok(Arc::new(echo::EchoOcrEngine::new())),
        other => Err(anyhow!("unknown OCR engine: {:?}", other)),
    }
}
