//! Prompt rendering and response parsing for the vision model.

use super::memory::MemoryWindow;
use super::AnalysisResult;
use crate::constants::MEMORY_TITLES_IN_PROMPT;
use crate::exif_parser::ExifRecord;
use anyhow::{Context, Result};
use serde::Deserialize;

const SMARTPHONE_BRANDS: &[&str] = &[
    "iphone", "apple", "pixel", "galaxy", "samsung", "huawei", "xiaomi", "oneplus", "oppo",
    "vivo", "motorola", "nokia",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraKind {
    Smartphone,
    Dedicated,
}

impl CameraKind {
    pub fn classify(camera: &str) -> Self {
        let lower = camera.to_lowercase();
        if SMARTPHONE_BRANDS.iter().any(|brand| lower.contains(brand)) {
            CameraKind::Smartphone
        } else {
            CameraKind::Dedicated
        }
    }

    fn describe(self) -> &'static str {
        match self {
            CameraKind::Smartphone => "a smartphone",
            CameraKind::Dedicated => "a dedicated camera",
        }
    }
}

pub fn build_prompt(exif: Option<&ExifRecord>, memory: &MemoryWindow) -> String {
    let mut parts = vec![
        "You are writing captions for a personal photography portfolio.".to_string(),
        "Look at this photograph and respond with a JSON object containing:".to_string(),
        "- title: an evocative title of 3 to 8 words".to_string(),
        "- description: 1 to 3 sentences describing the scene, light and mood".to_string(),
        "- altText: a concise, literal description for screen readers".to_string(),
        "- tags: 5 to 10 lowercase keywords".to_string(),
    ];

    let recent: Vec<_> = memory.recent(MEMORY_TITLES_IN_PROMPT).collect();
    if !recent.is_empty() {
        parts.push(String::new());
        parts.push("Recent titles in this gallery (avoid repeating their wording or structure):".to_string());
        for entry in recent {
            match &entry.date {
                Some(date) => parts.push(format!("- \"{}\" ({})", entry.title, date)),
                None => parts.push(format!("- \"{}\"", entry.title)),
            }
        }
    }

    if let Some(exif) = exif {
        let mut context = Vec::new();

        if let Some(camera) = &exif.camera {
            let kind = CameraKind::classify(camera);
            context.push(format!("Shot on {} ({}).", camera, kind.describe()));
        }
        if let Some(lens) = &exif.lens {
            context.push(format!("Lens: {}.", lens));
        }
        if let Some(settings) = &exif.settings {
            let formatted: Vec<String> = [
                settings.aperture.clone(),
                settings.shutter.clone(),
                settings.iso.as_ref().map(|iso| format!("ISO {}", iso)),
                settings.focal_length.clone(),
            ]
            .into_iter()
            .flatten()
            .collect();
            if !formatted.is_empty() {
                context.push(format!("Exposure: {}.", formatted.join(", ")));
            }
        }
        if let Some(gps) = &exif.gps {
            context.push(format!(
                "Taken near latitude {:.2}, longitude {:.2}.",
                gps.latitude, gps.longitude
            ));
        }
        if let Some(ts) = &exif.capture_timestamp {
            context.push(format!("Captured on {}.", ts.format("%Y-%m-%d")));
        }
        if let Some(caption) = exif.raw_caption.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            context.push(format!(
                "The photographer captioned it \"{}\"; use this as a hint, not as the title.",
                caption
            ));
        }

        if !context.is_empty() {
            parts.push(String::new());
            parts.push("Technical context:".to_string());
            parts.extend(context);
        }
    }

    parts.push(String::new());
    parts.push("Respond with the JSON object only.".to_string());
    parts.join("\n")
}

#[derive(Debug, Deserialize)]
struct RawAnalysis {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default, rename = "altText", alias = "alt", alias = "alt_text")]
    alt_text: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

/// Parses the model reply; accepts fenced or bare JSON.
pub fn parse_analysis_response(text: &str) -> Result<AnalysisResult> {
    let json_text = extract_json_block(text);
    let raw: RawAnalysis =
        serde_json::from_str(json_text).context("Failed to parse analysis response as JSON")?;

    let title = raw.title.trim().to_string();
    if title.is_empty() {
        anyhow::bail!("Analysis response has an empty title");
    }
    let description = raw.description.trim().to_string();
    let alt_text = raw
        .alt_text
        .map(|alt| alt.trim().to_string())
        .filter(|alt| !alt.is_empty())
        .unwrap_or_else(|| if description.is_empty() { title.clone() } else { description.clone() });

    Ok(AnalysisResult {
        title,
        description,
        alt_text,
        tags: raw.tags,
    })
}

fn extract_json_block(text: &str) -> &str {
    if let Some(after) = text.split("```json").nth(1) {
        return after.split("```").next().unwrap_or(after).trim();
    }
    if let Some(after) = text.split("```").nth(1) {
        return after.split("```").next().unwrap_or(after).trim();
    }
    let trimmed = text.trim();
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}
