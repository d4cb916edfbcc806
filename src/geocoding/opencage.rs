use super::{GeocodeCandidate, ReverseGeocoder};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.opencagedata.com";

/// OpenCage reverse geocoding (`/geocode/v1/json`).
pub struct OpenCageGeocoder {
    base_url: String,
    api_key: String,
    language: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct OpenCageResponse {
    #[serde(default)]
    results: Vec<OpenCageResult>,
}

#[derive(Debug, Deserialize)]
struct OpenCageResult {
    #[serde(default)]
    components: Map<String, Value>,
    #[serde(default)]
    confidence: f64,
}

impl OpenCageGeocoder {
    pub fn new(base_url: String, api_key: String, timeout_secs: u64) -> Result<Self> {
        if api_key.trim().is_empty() {
            anyhow::bail!("OpenCage API key is empty");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to create HTTP client for the geocoder")?;
        Ok(Self {
            base_url,
            api_key,
            language: "en".to_string(),
            client,
        })
    }
}

#[async_trait]
impl ReverseGeocoder for OpenCageGeocoder {
    async fn reverse(&self, latitude: f64, longitude: f64, limit: usize) -> Result<Vec<GeocodeCandidate>> {
        let url = format!("{}/geocode/v1/json", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", format!("{},{}", latitude, longitude)),
                ("key", self.api_key.clone()),
                ("limit", limit.to_string()),
                ("language", self.language.clone()),
                ("no_annotations", "1".to_string()),
            ])
            .send()
            .await
            .context("Geocoding request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Geocoding API returned {}: {}", status, body);
        }

        let parsed: OpenCageResponse = response
            .json()
            .await
            .context("Failed to parse geocoding response")?;

        Ok(parsed
            .results
            .into_iter()
            .take(limit)
            .map(|r| GeocodeCandidate {
                components: r.components,
                confidence: r.confidence,
            })
            .collect())
    }

    fn name(&self) -> &str {
        "opencage"
    }
}
