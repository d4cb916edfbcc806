//! Batch orchestration: discovery, skip/update/force semantics and the
//! per-file generate pipeline.

pub mod discovery;
pub mod sequencer;

use crate::analysis::claude::{ClaudeVisionBackend, ClaudeVisionConfig};
use crate::analysis::{AnalysisResult, ContentAnalyzer, MemoryWindow, VisionBackend};
use crate::error::CompressionError;
use crate::exif_parser::ExifRecord;
use crate::geocoding::opencage::OpenCageGeocoder;
use crate::geocoding::{LocationResolver, ReverseGeocoder};
use crate::image_processing::{compress_for_upload, upload_budget, CompressedImage};
use crate::records::{normalize_tags, CoverImage, Location, MetadataRecord, RecordStore};
use crate::settings::Settings;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

pub use discovery::{discover_images, ImageAsset};
pub use sequencer::TurnSequencer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Generate,
    UpdateExif,
    UpdateLocation,
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub mode: Mode,
    pub force: bool,
    pub single_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchSummary {
    fn record(&mut self, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::Processed => self.processed += 1,
            FileOutcome::Skipped => self.skipped += 1,
            FileOutcome::Failed => self.failed += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileOutcome {
    Processed,
    Skipped,
    Failed,
}

/// Asks the operator before a generate batch starts.
#[async_trait]
pub trait Confirmer: Send + Sync {
    async fn confirm(&self, pending: usize) -> Result<bool>;
}

/// Confirms everything; used for forced and non-interactive runs.
pub struct AutoConfirm;

#[async_trait]
impl Confirmer for AutoConfirm {
    async fn confirm(&self, _pending: usize) -> Result<bool> {
        Ok(true)
    }
}

// Per-run state shared by the file futures
struct RunContext<'a> {
    store: &'a RecordStore,
    memory: &'a Mutex<MemoryWindow>,
    sequencer: &'a TurnSequencer,
    force: bool,
    started: DateTime<Utc>,
}

pub struct Orchestrator {
    settings: Settings,
    analyzer: ContentAnalyzer,
    resolver: LocationResolver,
    confirmer: Arc<dyn Confirmer>,
}

impl Orchestrator {
    pub fn new(
        settings: Settings,
        analyzer: ContentAnalyzer,
        resolver: LocationResolver,
        confirmer: Arc<dyn Confirmer>,
    ) -> Self {
        Self {
            settings,
            analyzer,
            resolver,
            confirmer,
        }
    }

    /// Builds the vision and geocoding backends the settings enable.
    /// A missing key disables the feature rather than failing.
    pub fn from_settings(settings: Settings, confirmer: Arc<dyn Confirmer>) -> Result<Self> {
        settings.validate()?;

        let vision: Option<Arc<dyn VisionBackend>> = match (&settings.anthropic_api_key, settings.ai_enabled) {
            (Some(key), true) => {
                let backend = ClaudeVisionBackend::new(ClaudeVisionConfig {
                    api_key: key.clone(),
                    model: settings.anthropic_model.clone(),
                    base_url: settings.anthropic_base_url.clone(),
                    max_tokens: settings.max_tokens,
                    timeout_secs: settings.request_timeout_secs,
                })?;
                Some(Arc::new(backend) as Arc<dyn VisionBackend>)
            }
            (None, true) => {
                tracing::warn!("ANTHROPIC_API_KEY not set; titles will be derived from file names");
                None
            }
            (_, false) => None,
        };

        let geocoder: Option<Arc<dyn ReverseGeocoder>> = match (&settings.opencage_api_key, settings.geocoding_enabled) {
            (Some(key), true) => {
                let geocoder = OpenCageGeocoder::new(
                    settings.opencage_base_url.clone(),
                    key.clone(),
                    settings.request_timeout_secs,
                )?;
                Some(Arc::new(geocoder) as Arc<dyn ReverseGeocoder>)
            }
            (None, true) => {
                tracing::warn!("OPENCAGE_API_KEY not set; locations will keep coordinates only");
                None
            }
            (_, false) => None,
        };

        Ok(Self::new(
            settings,
            ContentAnalyzer::new(vision),
            LocationResolver::new(geocoder),
            confirmer,
        ))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub async fn run(&self, options: RunOptions) -> Result<BatchSummary> {
        // No disk writes until the operator has confirmed
        let store = RecordStore::new(&self.settings.output_dir);
        let assets = self.collect_assets(&options).await?;

        if assets.is_empty() {
            println!("ℹ️  No images found in {}", self.settings.assets_dir.display());
            return Ok(BatchSummary::default());
        }

        let started = Utc::now();
        println!("✅ Found {} images in {}", assets.len(), self.settings.assets_dir.display());

        if options.mode == Mode::Generate && !options.force {
            let mut pending = 0;
            for asset in &assets {
                if !store.exists(&asset.record_id(started)).await {
                    pending += 1;
                }
            }
            if pending > 0 && !self.confirmer.confirm(pending).await? {
                println!("🚫 Aborted, nothing was written");
                return Ok(BatchSummary::default());
            }
        }

        store.ensure_writable().await?;

        let memory = Mutex::new(MemoryWindow::default());
        let sequencer = TurnSequencer::new();
        let ctx = RunContext {
            store: &store,
            memory: &memory,
            sequencer: &sequencer,
            force: options.force,
            started,
        };

        let total = assets.len();
        let run_start = std::time::Instant::now();
        let outcomes: Vec<FileOutcome> = stream::iter(assets.into_iter().enumerate())
            .map(|(turn, asset)| self.process_file(&ctx, options.mode, turn, total, asset))
            .buffered(self.settings.concurrency)
            .collect()
            .await;

        let mut summary = BatchSummary::default();
        for outcome in &outcomes {
            summary.record(outcome);
        }

        println!("\n📊 Summary:");
        println!("   📸 Processed: {}", summary.processed);
        println!("   ⏭️  Skipped: {}", summary.skipped);
        println!("   ❌ Failed: {}", summary.failed);
        println!("   ⏱️  Time: {:.2} s", run_start.elapsed().as_secs_f64());

        Ok(summary)
    }

    async fn collect_assets(&self, options: &RunOptions) -> Result<Vec<ImageAsset>> {
        let root = self.settings.assets_dir.clone();
        let single = options.single_file.clone();
        println!("🔍 Scanning {}", root.display());
        tokio::task::spawn_blocking(move || match single {
            Some(path) => discovery::single_image(&path, &root),
            None => discover_images(&root),
        })
        .await
        .context("Discovery task panicked")?
    }

    async fn process_file(
        &self,
        ctx: &RunContext<'_>,
        mode: Mode,
        turn: usize,
        total: usize,
        asset: ImageAsset,
    ) -> FileOutcome {
        // Taken up front so a skipped or failed file never holds up later turns
        let ticket = ctx.sequencer.ticket(turn);
        let file_name = asset.file_name();
        tracing::info!("[{}/{}] {}", turn + 1, total, file_name);

        let result = match mode {
            Mode::Generate => self.generate(ctx, &asset, ticket).await,
            Mode::UpdateExif => {
                drop(ticket);
                self.update_exif(ctx, &asset).await
            }
            Mode::UpdateLocation => {
                drop(ticket);
                self.update_location(ctx, &asset).await
            }
        };

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Failed to process {}: {:#}", asset.path.display(), e);
                println!("❌ {}: {:#}", file_name, e);
                FileOutcome::Failed
            }
        }
    }

    async fn generate(
        &self,
        ctx: &RunContext<'_>,
        asset: &ImageAsset,
        ticket: sequencer::TurnTicket<'_>,
    ) -> Result<FileOutcome> {
        let file_name = asset.file_name();
        let id = asset.record_id(ctx.started);

        if !ctx.force && ctx.store.exists(&id).await {
            println!("⏭️  {}: record {} exists", file_name, id);
            return Ok(FileOutcome::Skipped);
        }

        let analysis = self.analyze_in_turn(ctx, asset, ticket);
        let location = async {
            match asset.exif.gps {
                Some(gps) => self.resolver.resolve(gps.latitude, gps.longitude).await,
                None => None,
            }
        };

        let (analysis, location_name) = tokio::join!(analysis, location);
        let analysis = analysis?;

        let record = build_record(&self.settings, asset, &id, analysis, location_name, ctx.started);
        ctx.store.write(&record).await?;
        println!("✅ {} → {}.json \"{}\"", file_name, id, record.title);
        Ok(FileOutcome::Processed)
    }

    // The ticket is consumed here so the next file may start its turn
    // while this one is still geocoding and writing.
    async fn analyze_in_turn(
        &self,
        ctx: &RunContext<'_>,
        asset: &ImageAsset,
        ticket: sequencer::TurnTicket<'_>,
    ) -> Result<AnalysisResult> {
        let compressed = self.compress(asset).await?;
        ticket.wait().await;
        let mut memory = ctx.memory.lock().await;
        let date = asset.publish_date(ctx.started);
        Ok(self
            .analyzer
            .analyze(compressed.as_ref(), Some(&asset.exif), &asset.file_name(), Some(date), &mut memory)
            .await)
    }

    // Only worth doing when a backend will receive the bytes
    async fn compress(&self, asset: &ImageAsset) -> Result<Option<CompressedImage>> {
        if !self.analyzer.has_backend() {
            return Ok(None);
        }
        let data = tokio::fs::read(&asset.path)
            .await
            .with_context(|| format!("Failed to read {}", asset.path.display()))?;
        let budget = upload_budget(self.settings.upload_limit_bytes);
        let compressed = match tokio::task::spawn_blocking(move || compress_for_upload(&data, budget))
            .await
            .context("Compression task panicked")?
        {
            Ok(compressed) => compressed,
            Err(e @ CompressionError::BudgetExceeded { .. }) => return Err(e.into()),
            Err(e) => {
                // Undecodable input still gets a filename-derived record
                tracing::warn!(
                    "Cannot prepare {} for analysis: {:#}",
                    asset.path.display(),
                    anyhow::Error::new(e)
                );
                return Ok(None);
            }
        };
        tracing::debug!(
            "Compressed {} to {} bytes (quality {}, max {}px)",
            asset.path.display(),
            compressed.data.len(),
            compressed.quality,
            compressed.max_dimension
        );
        Ok(Some(compressed))
    }

    async fn update_exif(&self, ctx: &RunContext<'_>, asset: &ImageAsset) -> Result<FileOutcome> {
        let file_name = asset.file_name();
        let id = asset.record_id(ctx.started);
        let Some(mut map) = ctx.store.load_map(&id).await? else {
            tracing::warn!("No record {} for {}; run generate first", id, file_name);
            println!("⏭️  {}: no record to update", file_name);
            return Ok(FileOutcome::Skipped);
        };

        apply_exif_fields(&mut map, &asset.exif)?;
        ctx.store.write_map(&id, &map).await?;
        println!("✅ {}: camera data updated", file_name);
        Ok(FileOutcome::Processed)
    }

    async fn update_location(&self, ctx: &RunContext<'_>, asset: &ImageAsset) -> Result<FileOutcome> {
        let file_name = asset.file_name();
        let Some(gps) = asset.exif.gps else {
            println!("⏭️  {}: no GPS data", file_name);
            return Ok(FileOutcome::Skipped);
        };

        let id = asset.record_id(ctx.started);
        let Some(mut map) = ctx.store.load_map(&id).await? else {
            tracing::warn!("No record {} for {}; run generate first", id, file_name);
            println!("⏭️  {}: no record to update", file_name);
            return Ok(FileOutcome::Skipped);
        };

        let name = self.resolver.resolve(gps.latitude, gps.longitude).await;
        let location = Location {
            name,
            latitude: gps.latitude,
            longitude: gps.longitude,
        };
        map.insert("location".to_string(), serde_json::to_value(&location)?);
        ctx.store.write_map(&id, &map).await?;
        println!(
            "✅ {}: location {}",
            file_name,
            location.name.as_deref().unwrap_or("coordinates only")
        );
        Ok(FileOutcome::Processed)
    }
}

/// Merges analysis, EXIF and location into the persisted record.
pub fn build_record(
    settings: &Settings,
    asset: &ImageAsset,
    id: &str,
    analysis: AnalysisResult,
    location_name: Option<String>,
    now: DateTime<Utc>,
) -> MetadataRecord {
    let exif = &asset.exif;
    MetadataRecord {
        id: id.to_string(),
        title: analysis.title,
        description: analysis.description,
        cover_image: CoverImage {
            src: format!(
                "{}/{}",
                settings.cover_src_prefix.trim_end_matches('/'),
                asset.relative_url_path()
            ),
            alt: analysis.alt_text,
        },
        tags: normalize_tags(analysis.tags),
        publish_date: asset.publish_date(now),
        draft: settings.draft,
        camera: exif.camera.clone(),
        lens: exif.lens.clone(),
        settings: exif.settings.clone().filter(|s| !s.is_empty()),
        location: exif.gps.map(|gps| Location {
            name: location_name,
            latitude: gps.latitude,
            longitude: gps.longitude,
        }),
    }
}

/// Overwrites the camera group with the values present; absent ones are left alone.
pub fn apply_exif_fields(map: &mut serde_json::Map<String, Value>, exif: &ExifRecord) -> Result<()> {
    if let Some(camera) = &exif.camera {
        map.insert("camera".to_string(), Value::String(camera.clone()));
    }
    if let Some(lens) = &exif.lens {
        map.insert("lens".to_string(), Value::String(lens.clone()));
    }
    if let Some(settings) = exif.settings.as_ref().filter(|s| !s.is_empty()) {
        map.insert("settings".to_string(), serde_json::to_value(settings)?);
    }
    Ok(())
}
