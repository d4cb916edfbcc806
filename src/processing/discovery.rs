use crate::constants::{IGNORED_DIRS, SUPPORTED_EXTENSIONS};
use crate::error::PipelineError;
use crate::exif_parser::{extract_exif, ExifRecord};
use crate::records;
use anyhow::Result;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

/// A source image found under the assets root, with its extracted EXIF.
#[derive(Debug, Clone)]
pub struct ImageAsset {
    pub path: PathBuf,
    pub relative_path: PathBuf,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub exif: ExifRecord,
}

impl ImageAsset {
    pub fn from_path(path: &Path, root: &Path) -> Self {
        let metadata = std::fs::metadata(path).ok();
        let relative_path = path
            .strip_prefix(root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.file_name().map(PathBuf::from).unwrap_or_default());

        Self {
            path: path.to_path_buf(),
            relative_path,
            size: metadata.as_ref().map(|m| m.len()).unwrap_or(0),
            modified: metadata
                .and_then(|m| m.modified().ok())
                .map(DateTime::<Utc>::from),
            exif: extract_exif(path),
        }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    pub fn publish_date(&self, now: DateTime<Utc>) -> NaiveDate {
        records::publish_date(self.exif.capture_timestamp, self.modified, now)
    }

    pub fn record_id(&self, now: DateTime<Utc>) -> String {
        records::record_id(self.publish_date(now), &self.path)
    }

    /// Relative path with forward slashes, for gallery URLs.
    pub fn relative_url_path(&self) -> String {
        self.relative_path
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn sort_key(&self) -> Option<NaiveDateTime> {
        self.exif
            .capture_timestamp
            .or_else(|| self.modified.map(|m| m.naive_utc()))
    }
}

pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Recursively collects supported images under `root`, skipping hidden
/// entries and build directories, ordered oldest capture first.
pub fn discover_images(root: &Path) -> Result<Vec<ImageAsset>> {
    if std::fs::read_dir(root).is_err() {
        return Err(PipelineError::AssetsDirUnreadable(root.to_path_buf()).into());
    }

    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .hidden(true)
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            !IGNORED_DIRS.contains(&name.as_ref())
        })
        .build();

    let mut assets: Vec<ImageAsset> = walker
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|e| e.file_type().map_or(false, |ft| ft.is_file()))
        .filter(|e| is_supported_image(e.path()))
        .map(|e| ImageAsset::from_path(e.path(), root))
        .collect();

    sort_assets(&mut assets);
    Ok(assets)
}

/// Oldest first; undated files last; ties broken by path.
pub fn sort_assets(assets: &mut [ImageAsset]) {
    assets.sort_by(|a, b| {
        let (ka, kb) = (a.sort_key(), b.sort_key());
        ka.is_none()
            .cmp(&kb.is_none())
            .then(ka.cmp(&kb))
            .then_with(|| a.path.cmp(&b.path))
    });
}

/// A single explicitly named file in place of discovery.
pub fn single_image(path: &Path, root: &Path) -> Result<Vec<ImageAsset>> {
    if !path.is_file() || !is_supported_image(path) {
        return Err(PipelineError::UnsupportedFile(path.to_path_buf()).into());
    }
    Ok(vec![ImageAsset::from_path(path, root)])
}
