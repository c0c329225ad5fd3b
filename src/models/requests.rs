use crate::models::{MatchFilters, RequestSortKey};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Request to rank providers for a service request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FindMatchesRequest {
    #[serde(alias = "request_id", rename = "requestId")]
    pub request_id: Uuid,
    #[validate(range(min = 1))]
    #[serde(default = "default_limit")]
    pub limit: u16,
    #[serde(alias = "minScore", rename = "minScore", default)]
    pub min_score: Option<f64>,
    #[serde(default)]
    pub filters: MatchFilters,
}

/// Request for a provider's ranked feed of open service requests
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProviderFeedRequest {
    #[serde(alias = "provider_id", rename = "providerId")]
    pub provider_id: Uuid,
    #[validate(range(min = 1))]
    #[serde(default = "default_page")]
    pub page: u16,
    #[validate(range(min = 1))]
    #[serde(alias = "perPage", rename = "perPage", default = "default_limit")]
    pub per_page: u16,
    #[serde(alias = "sortBy", rename = "sortBy", default)]
    pub sort_by: RequestSortKey,
    #[serde(alias = "minScore", rename = "minScore", default)]
    pub min_score: Option<f64>,
}

/// Request to notify the best-ranked providers for a service request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NotifyMatchesRequest {
    #[serde(alias = "request_id", rename = "requestId")]
    pub request_id: Uuid,
    #[validate(range(min = 1))]
    #[serde(default = "default_notify_limit")]
    pub limit: u16,
}

fn default_limit() -> u16 {
    20
}

fn default_page() -> u16 {
    1
}

fn default_notify_limit() -> u16 {
    10
}
