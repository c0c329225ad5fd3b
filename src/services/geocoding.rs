use crate::models::Coordinate;
use crate::services::cache::{CacheError, GeoCache};
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while resolving an address
///
/// These never escape the geocoder: callers see `Option` results while the
/// underlying cause is logged with the failing address.
#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("provider call timed out")]
    Timeout,

    #[error("no result for address")]
    NotFound,

    #[error("invalid response format: {0}")]
    InvalidResponse(String),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Geocoding provider selected at construction
///
/// Both backends answer the same contract; swapping one for the other
/// changes nothing for callers.
#[derive(Debug, Clone)]
pub enum GeocodeBackend {
    /// OpenStreetMap's open dataset API
    Nominatim { base_url: String },
    /// Commercial API, keyed
    LocationIq { base_url: String, api_key: String },
}

/// Address resolution with a TTL cache in front of one upstream provider
///
/// Forward and reverse lookups are cached independently, keyed by a stable
/// hash of the normalized input. Provider failures (including timeouts)
/// resolve to `None` and are never cached, so the next call retries.
pub struct Geocoder {
    backend: GeocodeBackend,
    client: reqwest::Client,
    cache: GeoCache,
}

impl Geocoder {
    pub fn new(backend: GeocodeBackend, cache: GeoCache, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            backend,
            client,
            cache,
        }
    }

    /// Resolve a free-text address to coordinates
    pub async fn geocode(&self, address: &str) -> Option<Coordinate> {
        let normalized = normalize_address(address);
        if normalized.is_empty() {
            return None;
        }

        let key = cache_key("geo:fwd", &normalized);
        let result = self
            .cache
            .get_or_load(&key, async {
                match self.forward_query(&normalized).await {
                    Ok(coord) => serde_json::to_string(&coord)
                        .map_err(|e| CacheError::Upstream(e.to_string())),
                    Err(e) => Err(CacheError::Upstream(e.to_string())),
                }
            })
            .await;

        match result {
            Ok(json) => serde_json::from_str(&json).ok(),
            Err(e) => {
                tracing::warn!("Geocoding failed for \"{}\": {}", address, e);
                None
            }
        }
    }

    /// Resolve coordinates back to a display address
    pub async fn reverse_geocode(&self, coord: Coordinate) -> Option<String> {
        if !coord.is_valid() {
            return None;
        }

        // Round to ~1m so nearby lookups share a cache entry
        let normalized = format!("{:.5},{:.5}", coord.latitude, coord.longitude);
        let key = cache_key("geo:rev", &normalized);

        let result = self
            .cache
            .get_or_load(&key, async {
                self.reverse_query(coord)
                    .await
                    .map_err(|e| CacheError::Upstream(e.to_string()))
            })
            .await;

        match result {
            Ok(address) => Some(address),
            Err(e) => {
                tracing::warn!(
                    "Reverse geocoding failed for ({:.5}, {:.5}): {}",
                    coord.latitude,
                    coord.longitude,
                    e
                );
                None
            }
        }
    }

    async fn forward_query(&self, address: &str) -> Result<Coordinate, GeocodeError> {
        let url = match &self.backend {
            GeocodeBackend::Nominatim { base_url } => format!(
                "{}/search?q={}&format=json&limit=1",
                base_url.trim_end_matches('/'),
                urlencoding::encode(address)
            ),
            GeocodeBackend::LocationIq { base_url, api_key } => format!(
                "{}/v1/search?key={}&q={}&format=json&limit=1",
                base_url.trim_end_matches('/'),
                api_key,
                urlencoding::encode(address)
            ),
        };

        tracing::debug!("Forward geocoding via {}", provider_name(&self.backend));

        let json = self.fetch_json(&url).await?;
        let first = json
            .as_array()
            .and_then(|results| results.first())
            .ok_or(GeocodeError::NotFound)?;

        let latitude = field_as_f64(first, "lat")?;
        let longitude = field_as_f64(first, "lon")?;

        Coordinate::new(latitude, longitude).ok_or_else(|| {
            GeocodeError::InvalidResponse(format!(
                "coordinates out of range: ({}, {})",
                latitude, longitude
            ))
        })
    }

    async fn reverse_query(&self, coord: Coordinate) -> Result<String, GeocodeError> {
        let url = match &self.backend {
            GeocodeBackend::Nominatim { base_url } => format!(
                "{}/reverse?lat={}&lon={}&format=json",
                base_url.trim_end_matches('/'),
                coord.latitude,
                coord.longitude
            ),
            GeocodeBackend::LocationIq { base_url, api_key } => format!(
                "{}/v1/reverse?key={}&lat={}&lon={}&format=json",
                base_url.trim_end_matches('/'),
                api_key,
                coord.latitude,
                coord.longitude
            ),
        };

        let json = self.fetch_json(&url).await?;
        json.get("display_name")
            .and_then(|name| name.as_str())
            .map(|name| name.to_string())
            .ok_or(GeocodeError::NotFound)
    }

    async fn fetch_json(&self, url: &str) -> Result<Value, GeocodeError> {
        let response = self
            .client
            .get(url)
            .header("User-Agent", concat!("presta-match/", env!("CARGO_PKG_VERSION")))
            .send()
            .await
            .map_err(map_request_error)?;

        if !response.status().is_success() {
            return Err(GeocodeError::InvalidResponse(format!(
                "provider returned {}",
                response.status()
            )));
        }

        response.json().await.map_err(map_request_error)
    }
}

fn map_request_error(e: reqwest::Error) -> GeocodeError {
    if e.is_timeout() {
        GeocodeError::Timeout
    } else {
        GeocodeError::Request(e)
    }
}

fn provider_name(backend: &GeocodeBackend) -> &'static str {
    match backend {
        GeocodeBackend::Nominatim { .. } => "nominatim",
        GeocodeBackend::LocationIq { .. } => "locationiq",
    }
}

/// Providers return coordinates either as JSON numbers or as strings
fn field_as_f64(value: &Value, field: &str) -> Result<f64, GeocodeError> {
    let raw = value
        .get(field)
        .ok_or_else(|| GeocodeError::InvalidResponse(format!("missing field {}", field)))?;

    raw.as_f64()
        .or_else(|| raw.as_str().and_then(|s| s.parse().ok()))
        .ok_or_else(|| GeocodeError::InvalidResponse(format!("unparseable field {}", field)))
}

/// Trim, collapse inner whitespace, lowercase
pub fn normalize_address(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Stable cache key: prefix plus a hash of the normalized payload
fn cache_key(prefix: &str, normalized: &str) -> String {
    let mut hasher = DefaultHasher::new();
    normalized.hash(&mut hasher);
    format!("{}:{:016x}", prefix, hasher.finish())
}
