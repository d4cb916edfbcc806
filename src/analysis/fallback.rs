use super::AnalysisResult;
use crate::constants::FALLBACK_TAG;
use chrono::NaiveDate;
use std::path::Path;

/// Metadata derived only from the file name and capture date.
pub fn fallback_analysis(file_name: &str, date: Option<NaiveDate>) -> AnalysisResult {
    let title = sanitize_title(file_name);
    let description = match date {
        Some(date) => format!("Photograph taken on {}.", date.format("%B %-d, %Y")),
        None => "Photograph.".to_string(),
    };

    AnalysisResult {
        alt_text: title.clone(),
        title,
        description,
        tags: vec![FALLBACK_TAG.to_string()],
    }
}

/// File stem with `_` and `-` turned into single spaces.
pub fn sanitize_title(file_name: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);

    let title = stem
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    if title.is_empty() {
        "Untitled".to_string()
    } else {
        title
    }
}
