pub mod analysis;
pub mod constants;
pub mod error;
pub mod exif_parser;
pub mod geocoding;
pub mod image_processing;
pub mod processing;
pub mod records;
pub mod settings;

pub use error::{CompressionError, PipelineError};
pub use processing::{AutoConfirm, BatchSummary, Confirmer, Mode, Orchestrator, RunOptions};
pub use settings::Settings;
