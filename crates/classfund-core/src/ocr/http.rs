//! HTTP sidecar OCR backend.
//!
//! Talks to a small text-recognition service (typically a Tesseract wrapper)
//! over JSON: the image goes up base64-encoded, plain recognized text comes
//! back. Field extraction happens on our side in [`super::parse`], so the
//! sidecar stays dumb and replaceable.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

use super::parse::extract_fields;
use super::{OcrBackend, OcrExtraction};

/// Default request timeout for the sidecar; proof images are small
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP OCR backend
#[derive(Clone)]
pub struct HttpOcrBackend {
    http_client: Client,
    base_url: String,
    languages: String,
}

impl HttpOcrBackend {
    /// Create a new backend against a sidecar URL
    pub fn new(base_url: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            languages: "vie+eng".to_string(),
        }
    }

    /// Override the recognition languages (Tesseract syntax, e.g. "vie+eng")
    pub fn with_languages(mut self, languages: &str) -> Self {
        self.languages = languages.to_string();
        self
    }

    /// Create from environment variables.
    ///
    /// Requires `CLASSFUND_OCR_HOST`; honors `CLASSFUND_OCR_LANG`.
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("CLASSFUND_OCR_HOST").ok()?;
        let backend = Self::new(&host);
        match std::env::var("CLASSFUND_OCR_LANG") {
            Ok(lang) => Some(backend.with_languages(&lang)),
            Err(_) => Some(backend),
        }
    }
}

/// Request to the OCR sidecar
#[derive(Debug, Serialize)]
struct OcrRequest {
    /// Base64-encoded image bytes
    image: String,
    /// Recognition languages
    lang: String,
}

/// Response from the OCR sidecar
#[derive(Debug, Deserialize)]
struct OcrResponse {
    /// Recognized plain text (may be empty)
    #[serde(default)]
    text: String,
    /// Mean word confidence, 0-100
    #[serde(default)]
    confidence: Option<f64>,
}

#[async_trait]
impl OcrBackend for HttpOcrBackend {
    async fn extract(&self, image_path: &Path) -> Result<OcrExtraction> {
        let bytes = tokio::fs::read(image_path).await?;
        let payload = OcrRequest {
            image: base64::engine::general_purpose::STANDARD.encode(&bytes),
            lang: self.languages.clone(),
        };

        debug!(path = %image_path.display(), bytes = bytes.len(), "OCR extract request");

        let response = self
            .http_client
            .post(format!("{}/ocr", self.base_url))
            .timeout(REQUEST_TIMEOUT)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Ocr(format!(
                "sidecar returned {}",
                response.status()
            )));
        }

        let body: OcrResponse = response.json().await?;
        let confidence = body
            .confidence
            .map(|c| c.clamp(0.0, 100.0).round() as u8);

        Ok(extract_fields(&body.text, confidence))
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self
            .http_client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn engine(&self) -> &str {
        &self.base_url
    }
}
