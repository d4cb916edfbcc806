use super::generic::{
    get_datetime_from_exif, rational_field, read_exif_tolerant, string_field, uint_field,
    user_comment,
};
use super::gps::{extract_gps, GpsCoordinate};
use chrono::NaiveDateTime;
use exif::{Exif, Tag};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;

/// Technical facts read from an image. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExifRecord {
    pub camera: Option<String>,
    pub lens: Option<String>,
    pub settings: Option<ExposureSettings>,
    pub gps: Option<GpsCoordinate>,
    pub capture_timestamp: Option<NaiveDateTime>,
    pub raw_caption: Option<String>,
}

/// Exposure settings as display strings ("f/2.8", "1/250s", "100", "85mm").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExposureSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aperture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shutter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iso: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focal_length: Option<String>,
}

impl ExposureSettings {
    pub fn is_empty(&self) -> bool {
        self.aperture.is_none()
            && self.shutter.is_none()
            && self.iso.is_none()
            && self.focal_length.is_none()
    }
}

/// Reads technical metadata from an image file.
///
/// Never fails: unreadable files and files without EXIF produce an empty
/// record and a warning.
pub fn extract_exif(path: &Path) -> ExifRecord {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!("Cannot read {}: {}", path.display(), e);
            return ExifRecord::default();
        }
    };
    let record = extract_exif_from_bytes(&data);
    if record == ExifRecord::default() {
        tracing::warn!("No EXIF metadata in {}", path.display());
    }
    record
}

pub fn extract_exif_from_bytes(data: &[u8]) -> ExifRecord {
    let primary = match read_exif_tolerant(&mut Cursor::new(data)) {
        Ok(exif) => Some(exif),
        Err(e) => {
            tracing::debug!("EXIF container parse failed: {}", e);
            None
        }
    };

    let mut record = primary.as_ref().map(record_from_exif).unwrap_or_default();

    // GPS is looked up separately so a failure there never costs the rest
    record.gps = extract_gps(data, primary.as_ref());
    record
}

fn record_from_exif(exif: &Exif) -> ExifRecord {
    let settings = ExposureSettings {
        aperture: rational_field(exif, Tag::FNumber).and_then(format_aperture),
        shutter: rational_field(exif, Tag::ExposureTime).and_then(format_shutter),
        iso: uint_field(exif, Tag::PhotographicSensitivity).map(|iso| iso.to_string()),
        focal_length: format_focal_length(
            uint_field(exif, Tag::FocalLengthIn35mmFilm),
            rational_field(exif, Tag::FocalLength),
        ),
    };

    ExifRecord {
        camera: format_camera(
            string_field(exif, Tag::Make).as_deref(),
            string_field(exif, Tag::Model).as_deref(),
        ),
        lens: string_field(exif, Tag::LensModel).or_else(|| string_field(exif, Tag::LensMake)),
        settings: (!settings.is_empty()).then_some(settings),
        gps: None,
        capture_timestamp: get_datetime_from_exif(exif),
        raw_caption: string_field(exif, Tag::ImageDescription).or_else(|| user_comment(exif)),
    }
}

/// "Make Model", without repeating the make when the model already names it.
pub fn format_camera(make: Option<&str>, model: Option<&str>) -> Option<String> {
    match (make, model) {
        (Some(make), Some(model)) => {
            if model.to_lowercase().starts_with(&make.to_lowercase()) {
                Some(model.to_string())
            } else {
                Some(format!("{} {}", make, model))
            }
        }
        (Some(only), None) | (None, Some(only)) => Some(only.to_string()),
        (None, None) => None,
    }
}

pub fn format_aperture(f_number: f64) -> Option<String> {
    (f_number > 0.0).then(|| format!("f/{}", trim_decimal(f_number)))
}

/// "{n}s" for exposures of a second or longer, otherwise "1/{n}s".
pub fn format_shutter(exposure: f64) -> Option<String> {
    if exposure <= 0.0 {
        return None;
    }
    if exposure >= 1.0 {
        Some(format!("{}s", trim_decimal(exposure)))
    } else {
        Some(format!("1/{}s", (1.0 / exposure).round() as u64))
    }
}

/// The 35mm-equivalent value wins over the raw focal length.
pub fn format_focal_length(equivalent_35mm: Option<u32>, raw: Option<f64>) -> Option<String> {
    match (equivalent_35mm, raw) {
        (Some(mm), _) if mm > 0 => Some(format!("{}mm", mm)),
        (_, Some(mm)) if mm > 0.0 => Some(format!("{}mm", trim_decimal(mm))),
        _ => None,
    }
}

/// One decimal at most, trailing zeros dropped.
fn trim_decimal(value: f64) -> String {
    let rounded = (value * 10.0).round() / 10.0;
    if rounded.fract() == 0.0 {
        format!("{}", rounded as i64)
    } else {
        format!("{:.1}", rounded)
    }
}
