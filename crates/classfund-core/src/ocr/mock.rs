//! Mock OCR backend for testing.
//!
//! Returns a programmable extraction (or error) and counts calls, which the
//! pipeline tests use to assert the idempotence guard short-circuits before
//! the engine is ever invoked.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::{OcrBackend, OcrExtraction};

/// Mock OCR backend
#[derive(Clone, Default)]
pub struct MockOcrBackend {
    /// Extraction returned by `extract`; None simulates an engine failure
    response: Option<OcrExtraction>,
    /// Error message used when `response` is None
    error: Option<String>,
    /// Whether health_check should return true
    pub healthy: bool,
    calls: Arc<AtomicUsize>,
}

impl MockOcrBackend {
    /// A healthy mock returning an empty (not-ok) extraction
    pub fn new() -> Self {
        Self {
            response: Some(OcrExtraction::default()),
            error: None,
            healthy: true,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Mock that returns the given extraction on every call
    pub fn returning(extraction: OcrExtraction) -> Self {
        Self {
            response: Some(extraction),
            ..Self::new()
        }
    }

    /// Mock whose extract always fails
    pub fn failing(message: &str) -> Self {
        Self {
            response: None,
            error: Some(message.to_string()),
            ..Self::new()
        }
    }

    /// How many times `extract` was invoked
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OcrBackend for MockOcrBackend {
    async fn extract(&self, _image_path: &Path) -> Result<OcrExtraction> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.response {
            Some(extraction) => Ok(extraction.clone()),
            None => Err(Error::Ocr(
                self.error.clone().unwrap_or_else(|| "mock failure".into()),
            )),
        }
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn engine(&self) -> &str {
        "mock"
    }
}
