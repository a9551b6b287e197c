//! Pluggable OCR backend abstraction.
//!
//! The proof-processing pipeline talks to a text recognizer through this
//! seam. The recognizer is an external collaborator with one obligation:
//! given an accessible image, return whatever text it can read. Everything
//! domain-specific (amounts, methods, transaction refs) is derived from that
//! raw text by [`parse::extract_fields`], so any engine that can read a
//! wallet screenshot plugs in.
//!
//! # Architecture
//!
//! - `OcrBackend` trait: the interface every engine implements
//! - `OcrClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `HttpOcrBackend` (sidecar), `MockOcrBackend`
//!
//! # Configuration
//!
//! Environment variables:
//! - `CLASSFUND_OCR_BACKEND`: Backend to use (http, mock). Default: http
//! - `CLASSFUND_OCR_HOST`: Sidecar URL (required for the http backend)
//! - `CLASSFUND_OCR_LANG`: Recognition languages (default: vie+eng)

mod http;
mod mock;
pub mod parse;

pub use http::HttpOcrBackend;
pub use mock::MockOcrBackend;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Structured result of extracting a payment proof image.
///
/// `ok == false` means no usable amount was read; the caller must treat the
/// rest of the fields as noise. The engine is never assumed reliable — any
/// error from it is a soft failure at the pipeline level.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcrExtraction {
    pub ok: bool,
    pub raw_text: String,
    /// Extracted amount in integer currency units
    pub amount: Option<i64>,
    /// Payment channel guessed from the text (bank/momo/zalopay)
    pub method: Option<String>,
    pub txn_ref: Option<String>,
    /// Receiving account, when the screenshot shows one
    pub payee_account: Option<String>,
    /// Transfer note; falls back to the raw text for engines that cannot
    /// isolate the note field
    pub note: Option<String>,
    /// Engine confidence, 0-100
    pub confidence: Option<u8>,
}

/// Trait defining the interface for OCR engines
#[async_trait]
pub trait OcrBackend: Send + Sync {
    /// Extract structured transaction data from an image on disk
    async fn extract(&self, image_path: &Path) -> Result<OcrExtraction>;

    /// Check if the engine is reachable
    async fn health_check(&self) -> bool;

    /// Engine name (for logging)
    fn engine(&self) -> &str;
}

/// Concrete OCR client enum.
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum OcrClient {
    /// HTTP sidecar (e.g. a Tesseract wrapper)
    Http(HttpOcrBackend),
    /// Mock backend for testing
    Mock(MockOcrBackend),
}

impl OcrClient {
    /// Create an OCR client from environment variables.
    ///
    /// Returns None when the selected backend is not configured — the
    /// pipeline then leaves submissions for manual treasurer review.
    pub fn from_env() -> Option<Self> {
        let backend =
            std::env::var("CLASSFUND_OCR_BACKEND").unwrap_or_else(|_| "http".to_string());

        match backend.to_lowercase().as_str() {
            "http" => HttpOcrBackend::from_env().map(OcrClient::Http),
            "mock" => Some(OcrClient::Mock(MockOcrBackend::new())),
            _ => {
                tracing::warn!(backend = %backend, "Unknown CLASSFUND_OCR_BACKEND, falling back to http");
                HttpOcrBackend::from_env().map(OcrClient::Http)
            }
        }
    }

    /// Create an HTTP backend directly
    pub fn http(host: &str) -> Self {
        OcrClient::Http(HttpOcrBackend::new(host))
    }

    /// Create a mock backend for testing
    pub fn mock(backend: MockOcrBackend) -> Self {
        OcrClient::Mock(backend)
    }
}

#[async_trait]
impl OcrBackend for OcrClient {
    async fn extract(&self, image_path: &Path) -> Result<OcrExtraction> {
        match self {
            OcrClient::Http(b) => b.extract(image_path).await,
            OcrClient::Mock(b) => b.extract(image_path).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            OcrClient::Http(b) => b.health_check().await,
            OcrClient::Mock(b) => b.health_check().await,
        }
    }

    fn engine(&self) -> &str {
        match self {
            OcrClient::Http(b) => b.engine(),
            OcrClient::Mock(b) => b.engine(),
        }
    }
}
