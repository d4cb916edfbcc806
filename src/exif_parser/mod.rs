pub mod extract;
pub mod generic;
pub mod gps;

pub use extract::{extract_exif, extract_exif_from_bytes, ExifRecord, ExposureSettings};
pub use generic::{apply_orientation, orientation_from_bytes};
pub use gps::GpsCoordinate;
