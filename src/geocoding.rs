//! Privacy-aware reverse geocoding.
//!
//! Candidates from a [`ReverseGeocoder`] are ranked by how locally specific
//! they are, and the winner is reduced to landmark / settlement / county /
//! state / country. Street-level components are never read.

pub mod opencage;

use crate::constants::GEOCODE_CANDIDATE_LIMIT;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// One place returned by a reverse-geocoding service.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeCandidate {
    /// Address components keyed by place type. Values are strings or
    /// language-keyed maps of strings.
    pub components: Map<String, Value>,
    /// Service confidence on a 0–10 scale.
    pub confidence: f64,
}

#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    async fn reverse(&self, latitude: f64, longitude: f64, limit: usize) -> Result<Vec<GeocodeCandidate>>;

    fn name(&self) -> &str;
}

const SPECIFICITY_LADDER: &[(&str, f64)] = &[
    ("attraction", 12.0),
    ("landmark", 12.0),
    ("mountain", 12.0),
    ("peak", 12.0),
    ("tourism", 11.0),
    ("hamlet", 10.0),
    ("village", 9.0),
    ("suburb", 8.0),
    ("town", 7.0),
    ("city", 6.0),
    ("county", 4.0),
    ("state", 3.0),
    ("country", 1.0),
];

const CONFIDENCE_WEIGHT: f64 = 0.5;

const LANDMARK_TIER: &[&str] = &["attraction", "mountain", "peak"];
const SETTLEMENT_TIER: &[&str] = &["hamlet", "village", "suburb", "town", "city"];

/// Place type weight of the most specific component present, plus a
/// confidence tiebreak.
pub fn specificity_score(candidate: &GeocodeCandidate) -> f64 {
    let place = SPECIFICITY_LADDER
        .iter()
        .find(|(key, _)| component(&candidate.components, key).is_some())
        .map(|(_, weight)| *weight)
        .unwrap_or(0.0);
    place + CONFIDENCE_WEIGHT * candidate.confidence.clamp(0.0, 10.0)
}

/// Highest score wins; on ties the earlier candidate is kept.
pub fn best_candidate(candidates: &[GeocodeCandidate]) -> Option<&GeocodeCandidate> {
    candidates.iter().fold(None, |best: Option<(&GeocodeCandidate, f64)>, candidate| {
        let score = specificity_score(candidate);
        match best {
            Some((_, best_score)) if best_score >= score => best,
            _ => Some((candidate, score)),
        }
    })
    .map(|(candidate, _)| candidate)
}

/// Display name for a candidate, most specific part first.
///
/// Returns `None` when neither a landmark nor a settlement is present, so a
/// bare country is never produced.
pub fn assemble_location_name(components: &Map<String, Value>) -> Option<String> {
    let landmark = first_component(components, LANDMARK_TIER);
    let settlement = first_component(components, SETTLEMENT_TIER);
    if landmark.is_none() && settlement.is_none() {
        return None;
    }

    let mut parts: Vec<String> = Vec::new();
    if let Some(landmark) = landmark {
        push_distinct(&mut parts, landmark);
    }
    if let Some(settlement) = settlement {
        push_distinct(&mut parts, settlement);
        if let Some(county) = component(components, "county") {
            push_distinct(&mut parts, county);
        }
    }

    let country = component(components, "country");
    if let Some(state) = component(components, "state") {
        if !is_united_states(components, country.as_deref()) {
            push_distinct(&mut parts, state);
        }
    }
    if let Some(country) = country {
        push_distinct(&mut parts, country);
    }

    Some(parts.join(", "))
}

fn push_distinct(parts: &mut Vec<String>, value: String) {
    if !parts.iter().any(|p| p.eq_ignore_ascii_case(&value)) {
        parts.push(value);
    }
}

fn is_united_states(components: &Map<String, Value>, country: Option<&str>) -> bool {
    country == Some("United States")
        || component(components, "country_code").is_some_and(|code| code.eq_ignore_ascii_case("us"))
}

fn first_component(components: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| component(components, key))
}

/// A component as display text. Language maps prefer English, else the
/// first value.
fn component(components: &Map<String, Value>, key: &str) -> Option<String> {
    let text = match components.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Object(by_language) => by_language
            .iter()
            .find(|(lang, _)| is_english_tag(lang))
            .or_else(|| by_language.iter().next())
            .and_then(|(_, v)| v.as_str())
            .map(str::to_string),
        _ => None,
    }?;
    let text = text.trim().to_string();
    (!text.is_empty()).then_some(text)
}

fn is_english_tag(tag: &str) -> bool {
    let tag = tag.to_ascii_lowercase();
    tag == "en" || tag == "english" || tag.starts_with("en-") || tag.starts_with("en_")
}

/// Resolves coordinates to a place name, memoized per coordinate pair.
///
/// Never fails: service errors are logged and yield `None`.
#[derive(Clone, Default)]
pub struct LocationResolver {
    geocoder: Option<Arc<dyn ReverseGeocoder>>,
    cache: Arc<Mutex<HashMap<(u64, u64), Option<String>>>>,
}

impl LocationResolver {
    pub fn new(geocoder: Option<Arc<dyn ReverseGeocoder>>) -> Self {
        Self {
            geocoder,
            cache: Arc::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.geocoder.is_some()
    }

    pub async fn resolve(&self, latitude: f64, longitude: f64) -> Option<String> {
        let geocoder = self.geocoder.as_ref()?;
        let key = (latitude.to_bits(), longitude.to_bits());
        if let Some(cached) = self.cache.lock().await.get(&key) {
            return cached.clone();
        }

        let name = match geocoder.reverse(latitude, longitude, GEOCODE_CANDIDATE_LIMIT).await {
            Ok(candidates) => {
                let name = best_candidate(&candidates).and_then(|c| assemble_location_name(&c.components));
                if name.is_none() {
                    tracing::debug!("No usable place for {:.4}, {:.4}", latitude, longitude);
                }
                name
            }
            Err(e) => {
                tracing::warn!(
                    "Geocoder {} failed for {:.4}, {:.4}: {:#}",
                    geocoder.name(),
                    latitude,
                    longitude,
                    e
                );
                None
            }
        };

        self.cache.lock().await.insert(key, name.clone());
        name
    }
}
