//! Content analysis: vision-model captions with a deterministic fallback.

pub mod claude;
pub mod fallback;
pub mod memory;
pub mod prompt;

use crate::exif_parser::ExifRecord;
use crate::image_processing::CompressedImage;
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;

pub use fallback::fallback_analysis;
pub use memory::MemoryWindow;

/// Caption generated for one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisResult {
    pub title: String,
    pub description: String,
    pub alt_text: String,
    pub tags: Vec<String>,
}

/// Backend for describing images with a vision model.
#[async_trait]
pub trait VisionBackend: Send + Sync {
    /// Sends the image and prompt, returning the raw text reply.
    async fn describe(&self, image_data: &[u8], media_type: &str, prompt: &str) -> Result<String>;

    fn name(&self) -> &str;
}

/// Turns images into captions, never failing: any backend problem yields
/// the filename-derived fallback.
#[derive(Clone, Default)]
pub struct ContentAnalyzer {
    backend: Option<Arc<dyn VisionBackend>>,
}

impl ContentAnalyzer {
    pub fn new(backend: Option<Arc<dyn VisionBackend>>) -> Self {
        Self { backend }
    }

    /// Whether a backend is configured; without one compression is pointless.
    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    pub async fn analyze(
        &self,
        image: Option<&CompressedImage>,
        exif: Option<&ExifRecord>,
        file_name: &str,
        date: Option<NaiveDate>,
        memory: &mut MemoryWindow,
    ) -> AnalysisResult {
        let (Some(backend), Some(image)) = (&self.backend, image) else {
            return fallback_analysis(file_name, date);
        };

        let request = prompt::build_prompt(exif, memory);
        let reply = match backend.describe(&image.data, image.media_type(), &request).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!("Vision backend {} failed for {}: {:#}", backend.name(), file_name, e);
                return fallback_analysis(file_name, date);
            }
        };

        match prompt::parse_analysis_response(&reply) {
            Ok(result) => {
                memory.push(result.title.clone(), date.map(|d| d.to_string()));
                result
            }
            Err(e) => {
                tracing::warn!("Unusable analysis for {}: {:#}", file_name, e);
                fallback_analysis(file_name, date)
            }
        }
    }
}
