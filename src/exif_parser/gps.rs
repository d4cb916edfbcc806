use super::generic::get_gps_coord;
use exif::{Exif, Tag};
use serde::{Deserialize, Serialize};

/// Decimal-degree GPS position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsCoordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsCoordinate {
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        valid.then_some(Self { latitude, longitude })
    }
}

/// Resolves the GPS position of an image.
///
/// The primary parse is tried first. When that parse failed or carried no
/// GPS IFD, the raw APP1 segment of a JPEG is scanned directly, which
/// recovers location from files whose container structure trips the
/// regular reader.
pub fn extract_gps(data: &[u8], primary: Option<&Exif>) -> Option<GpsCoordinate> {
    if let Some(coord) = primary.and_then(gps_from_exif) {
        return Some(coord);
    }
    match gps_from_jpeg_app1(data) {
        Some(coord) => Some(coord),
        None => {
            tracing::debug!("No GPS data found");
            None
        }
    }
}

pub fn gps_from_exif(exif: &Exif) -> Option<GpsCoordinate> {
    let lat = get_gps_coord(exif, Tag::GPSLatitude, Tag::GPSLatitudeRef)?;
    let lng = get_gps_coord(exif, Tag::GPSLongitude, Tag::GPSLongitudeRef)?;
    GpsCoordinate::new(lat, lng)
}

/// Walks JPEG segments looking for an `Exif\0\0` APP1 and parses its TIFF body.
fn gps_from_jpeg_app1(data: &[u8]) -> Option<GpsCoordinate> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return None;
    }

    let mut i = 2;
    while i + 4 <= data.len() {
        if data[i] != 0xFF {
            i += 1;
            continue;
        }

        let marker = data[i + 1];
        match marker {
            // SOS: entropy-coded data follows, no more metadata
            0xDA => break,
            // Fill bytes and standalone markers carry no length
            0xFF | 0x01 | 0xD0..=0xD7 => {
                i += 1;
                continue;
            }
            _ => {}
        }

        let segment_length = u16::from_be_bytes([data[i + 2], data[i + 3]]) as usize;
        let segment_end = (i + 2 + segment_length).min(data.len());

        if marker == 0xE1 && i + 10 <= segment_end && &data[i + 4..i + 10] == b"Exif\0\0" {
            let tiff = &data[i + 10..segment_end];
            if let Ok(exif) = exif::Reader::new().read_raw(tiff.to_vec()) {
                if let Some(coord) = gps_from_exif(&exif) {
                    return Some(coord);
                }
            }
        }

        i += segment_length + 2;
    }

    None
}
