use chrono::NaiveDateTime;
use exif::{Exif, In, Reader, Tag, Value};
use std::io::{BufRead, Cursor, Seek};

/// Reads an EXIF container, keeping whatever parsed before the first error.
pub fn read_exif_tolerant<R: BufRead + Seek>(reader: &mut R) -> Result<Exif, exif::Error> {
    let mut exif_reader = Reader::new();
    exif_reader.continue_on_error(true); // Tolerate non-standard EXIF structures
    exif_reader
        .read_from_container(reader)
        .or_else(|e| e.distill_partial_result(|errors| {
            for err in errors {
                tracing::debug!("Ignoring EXIF entry error: {}", err);
            }
        }))
}

/// Applies the EXIF orientation flag to a decoded image.
pub fn apply_orientation(img: image::DynamicImage, orientation: u32) -> image::DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

/// Orientation flag of in-memory image bytes, 1 (upright) when absent.
pub fn orientation_from_bytes(data: &[u8]) -> u32 {
    read_exif_tolerant(&mut Cursor::new(data))
        .ok()
        .and_then(|exif| {
            exif.get_field(Tag::Orientation, In::PRIMARY)
                .and_then(|f| f.value.get_uint(0))
        })
        .unwrap_or(1)
}

pub fn get_gps_coord(exif: &Exif, coord_tag: Tag, ref_tag: Tag) -> Option<f64> {
    let coord = exif.get_field(coord_tag, In::PRIMARY)?;
    let reference = exif.get_field(ref_tag, In::PRIMARY)?;

    let Value::Rational(ref parts) = coord.value else {
        return None;
    };
    if parts.len() < 3 {
        return None;
    }

    let degrees = parts[0].to_f64();
    let minutes = parts[1].to_f64();
    let seconds = parts[2].to_f64();
    let mut decimal = degrees + minutes / 60.0 + seconds / 3600.0;
    if !decimal.is_finite() {
        return None;
    }

    // S/W are negative
    if matches!(ascii_value(&reference.value).as_deref(), Some("S") | Some("W")) {
        decimal = -decimal;
    }
    Some(decimal)
}

/// Capture time, preferring DateTimeOriginal over DateTimeDigitized over DateTime.
pub fn get_datetime_from_exif(exif: &Exif) -> Option<NaiveDateTime> {
    [Tag::DateTimeOriginal, Tag::DateTimeDigitized, Tag::DateTime]
        .iter()
        .filter_map(|&tag| exif.get_field(tag, In::PRIMARY))
        .filter_map(|field| ascii_value(&field.value))
        .find_map(|s| parse_exif_datetime(&s))
}

/// Parses the EXIF "YYYY:MM:DD HH:MM:SS" form.
pub fn parse_exif_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s.trim(), "%Y:%m:%d %H:%M:%S").ok()
}

/// First ASCII component of a value, trimmed of NULs and whitespace.
pub fn ascii_value(value: &Value) -> Option<String> {
    let Value::Ascii(ref parts) = value else {
        return None;
    };
    let raw = parts.first()?;
    let s = String::from_utf8_lossy(raw)
        .trim_matches(char::from(0))
        .trim()
        .to_string();
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

pub fn string_field(exif: &Exif, tag: Tag) -> Option<String> {
    exif.get_field(tag, In::PRIMARY)
        .and_then(|f| ascii_value(&f.value))
}

pub fn rational_field(exif: &Exif, tag: Tag) -> Option<f64> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    let value = match field.value {
        Value::Rational(ref r) if !r.is_empty() => r[0].to_f64(),
        Value::SRational(ref r) if !r.is_empty() => r[0].to_f64(),
        _ => return None,
    };
    value.is_finite().then_some(value)
}

pub fn uint_field(exif: &Exif, tag: Tag) -> Option<u32> {
    exif.get_field(tag, In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
}

/// UserComment carries an 8-byte charset header; only ASCII is decoded.
pub fn user_comment(exif: &Exif) -> Option<String> {
    let field = exif.get_field(Tag::UserComment, In::PRIMARY)?;
    let Value::Undefined(ref bytes, _) = field.value else {
        return None;
    };
    let body = bytes.strip_prefix(b"ASCII\0\0\0")?;
    let s = String::from_utf8_lossy(body)
        .trim_matches(char::from(0))
        .trim()
        .to_string();
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}
