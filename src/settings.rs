use crate::analysis::claude;
use crate::constants::DEFAULT_UPLOAD_LIMIT_BYTES;
use crate::geocoding::opencage;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "photometa.ini";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub assets_dir: PathBuf,
    pub output_dir: PathBuf,
    pub cover_src_prefix: String,
    pub ai_enabled: bool,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    pub anthropic_base_url: String,
    pub max_tokens: u32,
    pub geocoding_enabled: bool,
    pub opencage_api_key: Option<String>,
    pub opencage_base_url: String,
    pub upload_limit_bytes: usize,
    pub request_timeout_secs: u64,
    pub concurrency: usize,
    pub draft: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            assets_dir: PathBuf::from("src/assets/photos"),
            output_dir: PathBuf::from("src/content/photos"),
            cover_src_prefix: "../../assets/photos".to_string(),
            ai_enabled: true,
            anthropic_api_key: None,
            anthropic_model: claude::DEFAULT_MODEL.to_string(),
            anthropic_base_url: claude::DEFAULT_API_BASE.to_string(),
            max_tokens: 1024,
            geocoding_enabled: true,
            opencage_api_key: None,
            opencage_base_url: opencage::DEFAULT_API_BASE.to_string(),
            upload_limit_bytes: DEFAULT_UPLOAD_LIMIT_BYTES,
            request_timeout_secs: 60,
            concurrency: 2,
            draft: false,
        }
    }
}

impl Settings {
    /// Defaults, then the config file (explicit path or the default location
    /// when present), then environment variables.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut settings = match explicit {
            Some(path) => Self::load_from(path)?,
            None => {
                let default_path = Self::config_path();
                if default_path.exists() {
                    Self::load_from(&default_path)?
                } else {
                    Settings::default()
                }
            }
        };
        settings.apply_overrides(|key| std::env::var(key).ok());
        Ok(settings)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        let file = File::open(config_path)
            .with_context(|| format!("Failed to open config file {}", config_path.display()))?;
        let reader = BufReader::new(file);
        let mut config_map = HashMap::new();

        for line in reader.lines() {
            let line = line.context("Failed to read line from config")?;
            let line = line.trim();
            if line.starts_with('#') || line.starts_with('[') || line.is_empty() {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                config_map.insert(
                    key.trim().to_string(),
                    value.trim().trim_matches('"').to_string(),
                );
            }
        }

        let mut settings = Settings::default();
        settings.apply_map(&config_map);
        Ok(settings)
    }

    fn apply_map(&mut self, map: &HashMap<String, String>) {
        if let Some(v) = map.get("assets_dir") {
            self.assets_dir = PathBuf::from(v);
        }
        if let Some(v) = map.get("output_dir") {
            self.output_dir = PathBuf::from(v);
        }
        if let Some(v) = map.get("cover_src_prefix") {
            self.cover_src_prefix = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = map.get("anthropic_api_key") {
            self.anthropic_api_key = non_empty(v);
        }
        if let Some(v) = map.get("anthropic_model") {
            self.anthropic_model = v.clone();
        }
        if let Some(v) = map.get("anthropic_base_url") {
            self.anthropic_base_url = v.clone();
        }
        if let Some(v) = map.get("opencage_api_key") {
            self.opencage_api_key = non_empty(v);
        }
        if let Some(v) = map.get("opencage_base_url") {
            self.opencage_base_url = v.clone();
        }
        parse_into(map, "ai_enabled", &mut self.ai_enabled);
        parse_into(map, "geocoding_enabled", &mut self.geocoding_enabled);
        parse_into(map, "max_tokens", &mut self.max_tokens);
        parse_into(map, "upload_limit_bytes", &mut self.upload_limit_bytes);
        parse_into(map, "request_timeout_secs", &mut self.request_timeout_secs);
        parse_into(map, "concurrency", &mut self.concurrency);
        parse_into(map, "draft", &mut self.draft);
    }

    /// Environment variables win over the file.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("ANTHROPIC_API_KEY").as_deref().and_then(non_empty) {
            self.anthropic_api_key = Some(key);
        }
        if let Some(key) = lookup("OPENCAGE_API_KEY").as_deref().and_then(non_empty) {
            self.opencage_api_key = Some(key);
        }
        if let Some(dir) = lookup("PHOTOMETA_ASSETS_DIR").as_deref().and_then(non_empty) {
            self.assets_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("PHOTOMETA_OUTPUT_DIR").as_deref().and_then(non_empty) {
            self.output_dir = PathBuf::from(dir);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            anyhow::bail!("concurrency must be at least 1");
        }
        if self.upload_limit_bytes == 0 {
            anyhow::bail!("upload_limit_bytes must be greater than zero");
        }
        if self.assets_dir == self.output_dir {
            anyhow::bail!(
                "assets_dir and output_dir must differ (both are {})",
                self.assets_dir.display()
            );
        }
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        let cwd_path = PathBuf::from(CONFIG_FILE_NAME);
        if cwd_path.exists() {
            return cwd_path;
        }

        let mut path = std::env::current_exe()
            .unwrap_or_default()
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();

        if path.ends_with("target/debug") || path.ends_with("target/release") {
            path.pop();
            path.pop();
        }
        path.push(CONFIG_FILE_NAME);
        path
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn parse_into<T: std::str::FromStr>(map: &HashMap<String, String>, key: &str, target: &mut T) {
    if let Some(raw) = map.get(key) {
        match raw.parse::<T>() {
            Ok(value) => *target = value,
            Err(_) => tracing::warn!("Ignoring invalid value for {}: {:?}", key, raw),
        }
    }
}
