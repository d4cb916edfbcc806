use anyhow::Result;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use image::{ImageBuffer, Rgb};
use exif::experimental::Writer;
use exif::{Field, In, Rational, Tag, Value};
use photometa::analysis::{ContentAnalyzer, VisionBackend};
use photometa::geocoding::{GeocodeCandidate, LocationResolver, ReverseGeocoder};
use photometa::{
    AutoConfirm, BatchSummary, Confirmer, Mode, Orchestrator, PipelineError, RunOptions, Settings,
};
use std::fs::File;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    assets: PathBuf,
    output: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let assets = dir.path().join("assets");
        let output = dir.path().join("content");
        std::fs::create_dir_all(&assets).unwrap();
        Self {
            _dir: dir,
            assets,
            output,
        }
    }

    fn settings(&self) -> Settings {
        Settings {
            assets_dir: self.assets.clone(),
            output_dir: self.output.clone(),
            ai_enabled: false,
            geocoding_enabled: false,
            ..Settings::default()
        }
    }

    /// Writes a small PNG whose mtime is noon UTC on the given day.
    fn add_photo(&self, relative: &str, (y, m, d): (i32, u32, u32)) -> PathBuf {
        let path = self.assets.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let img = ImageBuffer::from_fn(64, 48, |x, y| Rgb([(x * 4) as u8, (y * 5) as u8, 128]));
        img.save(&path).unwrap();
        set_noon_mtime(&path, (y, m, d));
        path
    }

    /// Writes raw bytes under the assets root with a noon UTC mtime.
    fn add_file(&self, relative: &str, bytes: &[u8], date: (i32, u32, u32)) -> PathBuf {
        let path = self.assets.join(relative);
        std::fs::write(&path, bytes).unwrap();
        set_noon_mtime(&path, date);
        path
    }

    fn record(&self, id: &str) -> Option<serde_json::Value> {
        let text = std::fs::read_to_string(self.output.join(format!("{}.json", id))).ok()?;
        Some(serde_json::from_str(&text).unwrap())
    }

    fn record_count(&self) -> usize {
        match std::fs::read_dir(&self.output) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().extension().map_or(false, |ext| ext == "json"))
                .count(),
            Err(_) => 0,
        }
    }

    fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(
            self.settings(),
            ContentAnalyzer::default(),
            LocationResolver::default(),
            Arc::new(AutoConfirm),
        )
    }
}

fn set_noon_mtime(path: &Path, (y, m, d): (i32, u32, u32)) {
    let secs = Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap().timestamp() as u64;
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
        .unwrap();
}

/// A JPEG holding only an Exif APP1 segment with the given GPS position.
fn jpeg_with_gps((lat_deg, lat_min): (u32, u32), (lng_deg, lng_min): (u32, u32)) -> Vec<u8> {
    let dms = |deg: u32, min: u32| {
        Value::Rational(vec![
            Rational { num: deg, denom: 1 },
            Rational { num: min, denom: 1 },
            Rational { num: 0, denom: 1 },
        ])
    };
    let field = |tag: Tag, value: Value| Field {
        tag,
        ifd_num: In::PRIMARY,
        value,
    };
    let fields = [
        field(Tag::GPSLatitude, dms(lat_deg, lat_min)),
        field(Tag::GPSLatitudeRef, Value::Ascii(vec![b"N".to_vec()])),
        field(Tag::GPSLongitude, dms(lng_deg, lng_min)),
        field(Tag::GPSLongitudeRef, Value::Ascii(vec![b"E".to_vec()])),
    ];

    let mut writer = Writer::new();
    for f in &fields {
        writer.push_field(f);
    }
    let mut tiff = Cursor::new(Vec::new());
    writer.write(&mut tiff, false).unwrap();
    let tiff = tiff.into_inner();

    let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE1];
    jpeg.extend_from_slice(&((2 + 6 + tiff.len()) as u16).to_be_bytes());
    jpeg.extend_from_slice(b"Exif\0\0");
    jpeg.extend_from_slice(&tiff);
    jpeg.extend_from_slice(&[0xFF, 0xD9]);
    jpeg
}

fn generate() -> RunOptions {
    RunOptions::default()
}

#[tokio::test]
async fn fallback_record_for_photo_without_exif() {
    let fx = Fixture::new();
    fx.add_photo("sunset_beach.png", (2023, 5, 1));

    let summary = fx.orchestrator().run(generate()).await.unwrap();
    assert_eq!(summary, BatchSummary { processed: 1, skipped: 0, failed: 0 });

    let record = fx.record("2023-05-01_sunset_beach").expect("record written");
    assert_eq!(record["title"], "sunset beach");
    assert_eq!(record["publishDate"], "2023-05-01");
    assert_eq!(record["description"], "Photograph taken on May 1, 2023.");
    assert_eq!(record["coverImage"]["src"], "../../assets/photos/sunset_beach.png");
    assert!(record["tags"].as_array().unwrap().contains(&"photography".into()));
    for key in ["camera", "lens", "settings", "location"] {
        assert!(record.get(key).is_none(), "{} should be omitted", key);
    }
}

#[tokio::test]
async fn second_run_skips_and_leaves_records_untouched() {
    let fx = Fixture::new();
    fx.add_photo("a.png", (2023, 1, 1));
    fx.add_photo("nested/b.png", (2023, 1, 2));
    let orchestrator = fx.orchestrator();

    let first = orchestrator.run(generate()).await.unwrap();
    assert_eq!(first.processed, 2);
    let before = std::fs::read(fx.output.join("2023-01-02_b.json")).unwrap();

    let second = orchestrator.run(generate()).await.unwrap();
    assert_eq!(second, BatchSummary { processed: 0, skipped: 2, failed: 0 });
    assert_eq!(std::fs::read(fx.output.join("2023-01-02_b.json")).unwrap(), before);
    assert_eq!(fx.record_count(), 2);
}

#[tokio::test]
async fn existing_records_are_skipped_within_a_batch() {
    let fx = Fixture::new();
    for i in 0..10 {
        fx.add_photo(&format!("photo_{}.png", i), (2022, 3, i + 1));
    }
    std::fs::create_dir_all(&fx.output).unwrap();
    for i in [0, 4, 9] {
        let id = format!("2022-03-{:02}_photo_{}", i + 1, i);
        std::fs::write(fx.output.join(format!("{}.json", id)), "{\"title\":\"kept\"}").unwrap();
    }

    let summary = fx.orchestrator().run(generate()).await.unwrap();
    assert_eq!(summary, BatchSummary { processed: 7, skipped: 3, failed: 0 });
    assert_eq!(fx.record("2022-03-05_photo_4").unwrap()["title"], "kept");
    assert_eq!(fx.record_count(), 10);
}

#[tokio::test]
async fn force_regenerates_existing_records() {
    let fx = Fixture::new();
    fx.add_photo("harbor.png", (2024, 6, 2));
    std::fs::create_dir_all(&fx.output).unwrap();
    std::fs::write(fx.output.join("2024-06-02_harbor.json"), "{\"title\":\"stale\"}").unwrap();

    let options = RunOptions {
        force: true,
        ..RunOptions::default()
    };
    let summary = fx.orchestrator().run(options).await.unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(fx.record("2024-06-02_harbor").unwrap()["title"], "harbor");
}

#[tokio::test]
async fn update_exif_without_record_writes_nothing() {
    let fx = Fixture::new();
    fx.add_photo("portrait.png", (2023, 7, 4));

    let options = RunOptions {
        mode: Mode::UpdateExif,
        ..RunOptions::default()
    };
    let summary = fx.orchestrator().run(options).await.unwrap();
    assert_eq!(summary, BatchSummary { processed: 0, skipped: 1, failed: 0 });
    assert_eq!(fx.record_count(), 0);
}

#[tokio::test]
async fn update_exif_preserves_unknown_keys() {
    let fx = Fixture::new();
    fx.add_photo("portrait.png", (2023, 7, 4));
    std::fs::create_dir_all(&fx.output).unwrap();
    let original = "{\n  \"id\": \"2023-07-04_portrait\",\n  \"title\": \"Hand written\",\n  \"featured\": true\n}\n";
    std::fs::write(fx.output.join("2023-07-04_portrait.json"), original).unwrap();

    let options = RunOptions {
        mode: Mode::UpdateExif,
        ..RunOptions::default()
    };
    let summary = fx.orchestrator().run(options).await.unwrap();
    assert_eq!(summary.processed, 1);

    let record = fx.record("2023-07-04_portrait").unwrap();
    assert_eq!(record["title"], "Hand written");
    assert_eq!(record["featured"], true);
    // A PNG carries no camera data, so nothing is added
    assert!(record.get("camera").is_none());
}

#[tokio::test]
async fn update_locations_skips_photos_without_gps() {
    let fx = Fixture::new();
    fx.add_photo("indoor.png", (2023, 2, 2));

    let options = RunOptions {
        mode: Mode::UpdateLocation,
        ..RunOptions::default()
    };
    let summary = fx.orchestrator().run(options).await.unwrap();
    assert_eq!(summary, BatchSummary { processed: 0, skipped: 1, failed: 0 });
}

#[tokio::test]
async fn empty_directory_yields_zero_summary() {
    let fx = Fixture::new();
    let summary = fx.orchestrator().run(generate()).await.unwrap();
    assert_eq!(summary, BatchSummary::default());
}

#[tokio::test]
async fn missing_assets_directory_is_fatal() {
    let fx = Fixture::new();
    let settings = Settings {
        assets_dir: fx.assets.join("does-not-exist"),
        ..fx.settings()
    };
    let orchestrator = Orchestrator::new(
        settings,
        ContentAnalyzer::default(),
        LocationResolver::default(),
        Arc::new(AutoConfirm),
    );

    let err = orchestrator.run(generate()).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::AssetsDirUnreadable(_))
    ));
}

#[tokio::test]
async fn single_file_must_be_supported() {
    let fx = Fixture::new();
    let notes = fx.assets.join("notes.txt");
    std::fs::write(&notes, "not a photo").unwrap();

    let options = RunOptions {
        single_file: Some(notes),
        ..RunOptions::default()
    };
    let err = fx.orchestrator().run(options).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::UnsupportedFile(_))
    ));
}

#[tokio::test]
async fn single_file_replaces_discovery() {
    let fx = Fixture::new();
    fx.add_photo("one.png", (2023, 1, 1));
    let two = fx.add_photo("two.png", (2023, 1, 2));

    let options = RunOptions {
        single_file: Some(two),
        ..RunOptions::default()
    };
    let summary = fx.orchestrator().run(options).await.unwrap();
    assert_eq!(summary.processed, 1);
    assert!(fx.record("2023-01-02_two").is_some());
    assert!(fx.record("2023-01-01_one").is_none());
}

struct Decline;

#[async_trait]
impl Confirmer for Decline {
    async fn confirm(&self, pending: usize) -> Result<bool> {
        assert_eq!(pending, 2);
        Ok(false)
    }
}

#[tokio::test]
async fn declined_confirmation_writes_nothing() {
    let fx = Fixture::new();
    fx.add_photo("a.png", (2023, 1, 1));
    fx.add_photo("b.png", (2023, 1, 2));
    let orchestrator = Orchestrator::new(
        fx.settings(),
        ContentAnalyzer::default(),
        LocationResolver::default(),
        Arc::new(Decline),
    );

    let summary = orchestrator.run(generate()).await.unwrap();
    assert_eq!(summary, BatchSummary::default());
    assert_eq!(fx.record_count(), 0);
    assert!(!fx.output.exists());
}

/// Titles each call "Title N" and records the prompts it was sent.
struct NumberingBackend {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl VisionBackend for NumberingBackend {
    async fn describe(&self, image_data: &[u8], media_type: &str, prompt: &str) -> Result<String> {
        assert_eq!(media_type, "image/jpeg");
        assert!(image_data.starts_with(&[0xFF, 0xD8]));
        let mut prompts = self.prompts.lock().unwrap();
        prompts.push(prompt.to_string());
        Ok(format!(
            r#"```json
{{"title": "Title {}", "description": "A test image.", "altText": "Gradient", "tags": ["test", "Test"]}}
```"#,
            prompts.len()
        ))
    }

    fn name(&self) -> &str {
        "numbering"
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn analysis_runs_in_file_order_and_remembers_titles() {
    let fx = Fixture::new();
    for i in 0..4 {
        fx.add_photo(&format!("shot_{}.png", i), (2021, 8, i + 1));
    }
    let backend = Arc::new(NumberingBackend {
        prompts: Mutex::new(Vec::new()),
    });
    let settings = Settings {
        concurrency: 3,
        ..fx.settings()
    };
    let orchestrator = Orchestrator::new(
        settings,
        ContentAnalyzer::new(Some(backend.clone() as Arc<dyn VisionBackend>)),
        LocationResolver::default(),
        Arc::new(AutoConfirm),
    );

    let summary = orchestrator.run(generate()).await.unwrap();
    assert_eq!(summary.processed, 4);

    for i in 0..4u32 {
        let record = fx.record(&format!("2021-08-{:02}_shot_{}", i + 1, i)).unwrap();
        assert_eq!(record["title"], format!("Title {}", i + 1));
        assert_eq!(record["coverImage"]["alt"], "Gradient");
        assert_eq!(record["tags"], serde_json::json!(["test"]));
    }

    let prompts = backend.prompts.lock().unwrap();
    assert!(!prompts[0].contains("Title 1"));
    assert!(prompts[1].contains("Title 1"));
    assert!(prompts[3].contains("Title 3"));
}

/// Counts calls and always answers with a valid caption.
#[derive(Default)]
struct CountingBackend {
    calls: AtomicUsize,
}

#[async_trait]
impl VisionBackend for CountingBackend {
    async fn describe(&self, _image_data: &[u8], _media_type: &str, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(r#"{"title": "Described", "description": "Seen.", "altText": "Seen", "tags": []}"#.to_string())
    }

    fn name(&self) -> &str {
        "counting"
    }
}

fn with_vision(settings: Settings, backend: Arc<CountingBackend>) -> Orchestrator {
    Orchestrator::new(
        Settings {
            ai_enabled: true,
            ..settings
        },
        ContentAnalyzer::new(Some(backend as Arc<dyn VisionBackend>)),
        LocationResolver::default(),
        Arc::new(AutoConfirm),
    )
}

#[tokio::test]
async fn undecodable_jpeg_gets_a_fallback_record() {
    let fx = Fixture::new();
    // SOI and a truncated APP0 header: a .jpg that no decoder accepts
    fx.add_file("broken_scan.jpg", &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10], (2022, 9, 14));
    let backend = Arc::new(CountingBackend::default());

    let summary = with_vision(fx.settings(), backend.clone()).run(generate()).await.unwrap();
    assert_eq!(summary, BatchSummary { processed: 1, skipped: 0, failed: 0 });
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);

    let record = fx.record("2022-09-14_broken_scan").expect("record written");
    assert_eq!(record["title"], "broken scan");
    assert_eq!(record["description"], "Photograph taken on September 14, 2022.");
    assert!(record["tags"].as_array().unwrap().contains(&"photography".into()));
}

#[tokio::test]
async fn image_over_upload_budget_fails_without_a_record() {
    let fx = Fixture::new();
    fx.add_photo("huge.png", (2023, 3, 3));
    let backend = Arc::new(CountingBackend::default());
    let settings = Settings {
        upload_limit_bytes: 4,
        ..fx.settings()
    };

    let summary = with_vision(settings, backend.clone()).run(generate()).await.unwrap();
    assert_eq!(summary, BatchSummary { processed: 0, skipped: 0, failed: 1 });
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    assert_eq!(fx.record_count(), 0);
}

/// Answers every lookup with the same place and counts the lookups.
#[derive(Default)]
struct FixedPlace {
    lookups: AtomicUsize,
}

#[async_trait]
impl ReverseGeocoder for FixedPlace {
    async fn reverse(&self, _latitude: f64, _longitude: f64, _limit: usize) -> Result<Vec<GeocodeCandidate>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let components = serde_json::json!({"city": "Paris", "country": "France"});
        Ok(vec![GeocodeCandidate {
            components: components.as_object().cloned().unwrap_or_default(),
            confidence: 9.0,
        }])
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

#[tokio::test]
async fn update_locations_overwrites_location_and_keeps_other_keys() {
    let fx = Fixture::new();
    fx.add_file("tower.jpg", &jpeg_with_gps((48, 51), (2, 18)), (2024, 6, 2));
    std::fs::create_dir_all(&fx.output).unwrap();
    let original = serde_json::json!({
        "id": "2024-06-02_tower",
        "title": "Iron lattice",
        "featured": true,
        "location": {"name": "Somewhere old", "latitude": 1.0, "longitude": 1.0}
    });
    std::fs::write(
        fx.output.join("2024-06-02_tower.json"),
        serde_json::to_string_pretty(&original).unwrap(),
    )
    .unwrap();

    let geocoder = Arc::new(FixedPlace::default());
    let orchestrator = Orchestrator::new(
        Settings {
            geocoding_enabled: true,
            ..fx.settings()
        },
        ContentAnalyzer::default(),
        LocationResolver::new(Some(geocoder.clone() as Arc<dyn ReverseGeocoder>)),
        Arc::new(AutoConfirm),
    );
    let options = RunOptions {
        mode: Mode::UpdateLocation,
        ..RunOptions::default()
    };

    let summary = orchestrator.run(options).await.unwrap();
    assert_eq!(summary, BatchSummary { processed: 1, skipped: 0, failed: 0 });
    assert_eq!(geocoder.lookups.load(Ordering::SeqCst), 1);

    let record = fx.record("2024-06-02_tower").unwrap();
    assert_eq!(record["title"], "Iron lattice");
    assert_eq!(record["featured"], true);
    assert_eq!(record["location"]["name"], "Paris, France");
    let latitude = record["location"]["latitude"].as_f64().unwrap();
    let longitude = record["location"]["longitude"].as_f64().unwrap();
    assert!((latitude - 48.85).abs() < 1e-6);
    assert!((longitude - 2.3).abs() < 1e-6);
}

#[test]
fn records_never_leave_temporary_files() {
    // Write-then-rename must not leave *.tmp next to the records.
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let fx = Fixture::new();
    fx.add_photo("a.png", (2023, 1, 1));
    runtime.block_on(fx.orchestrator().run(generate())).unwrap();

    let leftovers: Vec<_> = std::fs::read_dir(&fx.output)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
    assert!(Path::new(&fx.output).join("2023-01-01_a.json").exists());
}
