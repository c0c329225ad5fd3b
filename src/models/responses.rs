use crate::models::domain::{MatchResult, MatchingStatistics, RequestMatch};
use serde::{Deserialize, Serialize};

/// Response for the find-matches endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindMatchesResponse {
    pub matches: Vec<MatchResult>,
    #[serde(rename = "totalCandidates")]
    pub total_candidates: usize,
    pub statistics: MatchingStatistics,
    #[serde(rename = "geocodingFailed")]
    pub geocoding_failed: bool,
}

/// Response for the provider feed endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderFeedResponse {
    pub matches: Vec<RequestMatch>,
    pub total: usize,
    pub page: usize,
    #[serde(rename = "perPage")]
    pub per_page: usize,
    #[serde(rename = "geocodingFailed")]
    pub geocoding_failed: bool,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}
