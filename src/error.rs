use std::path::PathBuf;
use thiserror::Error;

/// Failure of the upload compressor.
#[derive(Debug, Error)]
pub enum CompressionError {
    #[error("compressed image is {size} bytes, over the {budget} byte budget at the quality/size floor")]
    BudgetExceeded { size: usize, budget: usize },

    #[error("failed to decode image")]
    Decode(#[from] image::ImageError),

    #[error("failed to encode JPEG: {0}")]
    Encode(String),
}

/// Errors that abort a whole run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("assets directory is not readable: {}", .0.display())]
    AssetsDirUnreadable(PathBuf),

    #[error("output directory is not writable: {}", .0.display())]
    OutputDirUnwritable(PathBuf),

    #[error("not a supported image file: {}", .0.display())]
    UnsupportedFile(PathBuf),
}
