// Recognized image extensions (compared lowercase)
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tiff", "tif"];

// Directories never descended into during discovery
pub const IGNORED_DIRS: &[&str] = &["node_modules", "target", ".git"];

// Upload compression ladder
pub const INITIAL_QUALITY: u8 = 85;
pub const INITIAL_MAX_DIMENSION: u32 = 1920;
pub const COARSE_QUALITY_THRESHOLD: u8 = 40;
pub const COARSE_QUALITY_STEP: u8 = 15;
pub const FINE_QUALITY_STEP: u8 = 5;
pub const MIN_DIMENSION: u32 = 800;
pub const QUALITY_AFTER_SHRINK: u8 = 30;
pub const FLOOR_QUALITY: u8 = 20;
pub const DIMENSION_SHRINK_FACTOR: f64 = 0.8;

// Nominal upload limit of the vision API (5 MB). Base64 adds ~33%.
pub const DEFAULT_UPLOAD_LIMIT_BYTES: usize = 5 * 1024 * 1024;

// Memory window
pub const MEMORY_CAPACITY: usize = 5;
pub const MEMORY_TITLES_IN_PROMPT: usize = 3;

// Geocoding
pub const GEOCODE_CANDIDATE_LIMIT: usize = 5;

// Record file extension
pub const RECORD_EXTENSION: &str = "json";

pub const FALLBACK_TAG: &str = "photography";
