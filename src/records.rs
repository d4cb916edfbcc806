use crate::constants::RECORD_EXTENSION;
use crate::error::PipelineError;
use crate::exif_parser::ExposureSettings;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

// Persisted metadata for one photo, as consumed by the gallery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    pub cover_image: CoverImage,
    pub tags: Vec<String>,
    pub publish_date: NaiveDate,
    pub draft: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lens: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<ExposureSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverImage {
    pub src: String, // Path of the image relative to the gallery content
    pub alt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
}

/// `{YYYY-MM-DD}_{file stem}`; depends only on the date and the file name.
pub fn record_id(date: NaiveDate, image_path: &Path) -> String {
    let stem = image_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "image".to_string());
    format!("{}_{}", date.format("%Y-%m-%d"), stem)
}

/// Capture date, else modification date, else today.
pub fn publish_date(
    captured: Option<NaiveDateTime>,
    modified: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> NaiveDate {
    captured
        .map(|ts| ts.date())
        .or_else(|| modified.map(|m| m.date_naive()))
        .unwrap_or_else(|| now.date_naive())
}

/// Trims, drops empties and removes case-insensitive duplicates, keeping
/// the first spelling.
pub fn normalize_tags(tags: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tags.into_iter()
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty())
        .filter(|tag| seen.insert(tag.to_lowercase()))
        .collect()
}

/// One JSON file per record under the output directory.
#[derive(Debug, Clone)]
pub struct RecordStore {
    output_dir: PathBuf,
}

impl RecordStore {
    /// A store rooted at `output_dir`. Touches nothing on disk.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Opens the store, creating the directory. Failure here is fatal for a run.
    pub async fn open(output_dir: impl Into<PathBuf>) -> Result<Self> {
        let store = Self::new(output_dir);
        store.ensure_writable().await?;
        Ok(store)
    }

    pub async fn ensure_writable(&self) -> Result<()> {
        let unwritable = || PipelineError::OutputDirUnwritable(self.output_dir.clone());
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|_| unwritable())?;

        let metadata = tokio::fs::metadata(&self.output_dir)
            .await
            .map_err(|_| unwritable())?;
        if !metadata.is_dir() || metadata.permissions().readonly() {
            return Err(unwritable().into());
        }
        Ok(())
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn record_path(&self, id: &str) -> PathBuf {
        self.output_dir.join(format!("{}.{}", id, RECORD_EXTENSION))
    }

    pub async fn exists(&self, id: &str) -> bool {
        tokio::fs::try_exists(self.record_path(id)).await.unwrap_or(false)
    }

    pub async fn write(&self, record: &MetadataRecord) -> Result<PathBuf> {
        let json = serde_json::to_string_pretty(record).context("Failed to serialize record")?;
        self.write_raw(&record.id, json).await
    }

    /// Loads a record as a generic map so unknown keys survive a rewrite.
    pub async fn load_map(&self, id: &str) -> Result<Option<Map<String, Value>>> {
        let path = self.record_path(id);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
        };
        let value: Value = serde_json::from_str(&text)
            .with_context(|| format!("Record {} is not valid JSON", path.display()))?;
        match value {
            Value::Object(map) => Ok(Some(map)),
            _ => anyhow::bail!("Record {} is not a JSON object", path.display()),
        }
    }

    pub async fn write_map(&self, id: &str, map: &Map<String, Value>) -> Result<PathBuf> {
        let json = serde_json::to_string_pretty(map).context("Failed to serialize record")?;
        self.write_raw(id, json).await
    }

    // Write-then-rename so a crash never leaves a half-written record
    async fn write_raw(&self, id: &str, mut json: String) -> Result<PathBuf> {
        json.push('\n');
        let path = self.record_path(id);
        let tmp = path.with_extension(format!("{}.tmp", RECORD_EXTENSION));
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to move record into place at {}", path.display()))?;
        Ok(path)
    }
}
