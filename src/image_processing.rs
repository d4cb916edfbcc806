use crate::constants::*;
use crate::error::CompressionError;
use crate::exif_parser::{apply_orientation, orientation_from_bytes};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView};

/// JPEG bytes ready for upload, with the settings that produced them.
#[derive(Debug, Clone)]
pub struct CompressedImage {
    pub data: Vec<u8>,
    pub quality: u8,
    pub max_dimension: u32,
}

impl CompressedImage {
    pub fn media_type(&self) -> &'static str {
        "image/jpeg"
    }
}

/// Usable byte budget for a nominal upload limit after base64 overhead.
pub fn upload_budget(nominal_limit: usize) -> usize {
    (nominal_limit as u128 * 3 / 4) as usize
}

/// One step of the compression ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionStep {
    pub quality: u8,
    pub max_dimension: u32,
}

impl CompressionStep {
    pub fn initial() -> Self {
        Self {
            quality: INITIAL_QUALITY,
            max_dimension: INITIAL_MAX_DIMENSION,
        }
    }

    pub fn at_floor(&self) -> bool {
        self.quality <= FLOOR_QUALITY && self.max_dimension <= MIN_DIMENSION
    }

    /// Quality first, then size, then fine quality.
    pub fn next(self) -> Self {
        if self.quality > COARSE_QUALITY_THRESHOLD {
            Self {
                quality: self.quality - COARSE_QUALITY_STEP,
                ..self
            }
        } else if self.max_dimension > MIN_DIMENSION {
            Self {
                quality: self.quality.max(QUALITY_AFTER_SHRINK),
                max_dimension: (self.max_dimension as f64 * DIMENSION_SHRINK_FACTOR) as u32,
            }
        } else {
            Self {
                quality: self.quality.saturating_sub(FINE_QUALITY_STEP),
                ..self
            }
        }
    }
}

/// Compresses an image to fit `budget` bytes.
///
/// Returns bytes at or under budget, or `BudgetExceeded` once the
/// quality/size floor is reached without fitting.
pub fn compress_for_upload(data: &[u8], budget: usize) -> Result<CompressedImage, CompressionError> {
    let img = image::load_from_memory(data)?;
    let img = apply_orientation(img, orientation_from_bytes(data));
    compress_image(&img, budget)
}

pub fn compress_image(img: &DynamicImage, budget: usize) -> Result<CompressedImage, CompressionError> {
    let mut step = CompressionStep::initial();
    loop {
        let encoded = encode_scaled(img, step)?;
        if encoded.len() <= budget {
            tracing::debug!(
                "Compressed to {} bytes (quality {}, max {}px)",
                encoded.len(),
                step.quality,
                step.max_dimension
            );
            return Ok(CompressedImage {
                data: encoded,
                quality: step.quality,
                max_dimension: step.max_dimension,
            });
        }
        if step.at_floor() {
            return Err(CompressionError::BudgetExceeded {
                size: encoded.len(),
                budget,
            });
        }
        step = step.next();
    }
}

/// Scales to fit `max_dimension` (never upscaling) and encodes as JPEG.
fn encode_scaled(img: &DynamicImage, step: CompressionStep) -> Result<Vec<u8>, CompressionError> {
    let (width, height) = img.dimensions();
    let rgb = if width.max(height) > step.max_dimension {
        img.resize(
            step.max_dimension,
            step.max_dimension,
            image::imageops::FilterType::Triangle,
        )
        .to_rgb8()
    } else {
        img.to_rgb8()
    };

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, step.quality)
        .encode_image(&rgb)
        .map_err(|e| CompressionError::Encode(e.to_string()))?;
    Ok(out)
}
