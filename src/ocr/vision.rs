//! OCR engine backed by the Google Vision `images:annotate` REST API.

use async_trait::async_trait;
use base64::prelude::{BASE64_STANDARD, Engine as _};
use serde_json::json;

use crate::prelude::*;

use super::OcrEngine;

/// Default API endpoint. Override with `GOOGLE_VISION_API_BASE` to point at
/// a proxy or a fake for testing.
static DEFAULT_API_BASE: &str = "https://vision.googleapis.com";

/// Calls Google Vision `TEXT_DETECTION` over REST.
pub struct VisionOcrEngine {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl VisionOcrEngine {
    /// Create an engine configured from `GOOGLE_VISION_API_KEY` and
    /// (optionally) `GOOGLE_VISION_API_BASE`.
    pub fn from_env() -> Result<VisionOcrEngine> {
        let api_key = std::env::var("GOOGLE_VISION_API_KEY")
            .context("GOOGLE_VISION_API_KEY must be set to use the vision engine")?;
        let api_base = std::env::var("GOOGLE_VISION_API_BASE")
            .unwrap_or_else(|_| DEFAULT_API_BASE.to_owned());
        Ok(VisionOcrEngine {
            client: reqwest::Client::new(),
            api_base,
            api_key,
        })
    }
}

/// The slice of the `images:annotate` response we consume.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateResult {
    full_text_annotation: Option<FullTextAnnotation>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct FullTextAnnotation {
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

#[async_trait]
impl OcrEngine for VisionOcrEngine {
    #[instrument(level = "debug", skip_all, fields(image = ?image))]
    async fn extract_text(&self, image: &Path) -> Result<String> {
        let data = tokio::fs::read(image)
            .await
            .with_context(|| format!("cannot read {:?}", image))?;
        let body = json!({
            "requests": [{
                "image": { "content": BASE64_STANDARD.encode(&data) },
                "features": [{ "type": "TEXT_DETECTION" }],
            }],
        });

        let url = format!("{}/v1/images:annotate", self.api_base);
        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .context("vision API request failed")?
            .error_for_status()
            .context("vision API returned an error status")?;
        let annotated = response
            .json::<AnnotateResponse>()
            .await
            .context("cannot parse vision API response")?;

        let result = annotated
            .responses
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("vision API returned no responses"))?;
        if let Some(api_error) = result.error {
            return Err(anyhow!("vision API error: {}", api_error.message));
        }

        // No annotation means no recognizable text, which is a success.
        Ok(result
            .full_text_annotation
            .map(|annotation| annotation.text)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_text_detection_response() {
        let raw = serde_json::json!({
            "responses": [{
                "fullTextAnnotation": { "text": "INVOICE #55\n", "pages": [] },
                "textAnnotations": [],
            }],
        });
        let parsed = serde_json::from_value::<AnnotateResponse>(raw).unwrap();
        let text = parsed.responses[0]
            .full_text_annotation
            .as_ref()
            .map(|a| a.text.clone());
        assert_eq!(text.as_deref(), Some("INVOICE #55\n"));
    }

    #[test]
    fn parses_an_empty_response_as_no_text() {
        let raw = serde_json::json!({ "responses": [{}] });
        let parsed = serde_json::from_value::<AnnotateResponse>(raw).unwrap();
        assert!(parsed.responses[0].full_text_annotation.is_none());
        assert!(parsed.responses[0].error.is_none());
    }

    #[test]
    fn parses_an_api_error() {
        let raw = serde_json::json!({
            "responses": [{ "error": { "code": 7, "message": "permission denied" } }],
        });
        let parsed = serde_json::from_value::<AnnotateResponse>(raw).unwrap();
        let error = parsed.responses[0].error.as_ref().unwrap();
        assert_eq!(error.message, "permission denied");
    }
}
