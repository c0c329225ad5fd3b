use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur when dispatching notifications
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API returned error: {0}")]
    Api(String),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

/// Delivery result for one notified candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryReport {
    #[serde(rename = "candidateId")]
    pub candidate_id: Uuid,
    pub accepted: bool,
    #[serde(default)]
    pub detail: Option<String>,
}

/// Client for the external notification workflow
///
/// The matching engine decides *who* gets notified for a request; this
/// client hands that selection to the delivery service, which owns the
/// transport (email, push, SMS) entirely.
pub struct NotificationClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl NotificationClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url,
            api_key,
            client,
        }
    }

    /// Dispatch a match notification to the selected candidates
    pub async fn notify_candidates(
        &self,
        request_id: Uuid,
        candidate_ids: &[Uuid],
    ) -> Result<Vec<DeliveryReport>, NotifyError> {
        if candidate_ids.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!(
            "{}/notifications/match",
            self.base_url.trim_end_matches('/')
        );

        let payload = serde_json::json!({
            "requestId": request_id,
            "candidateIds": candidate_ids,
        });

        tracing::debug!(
            "Dispatching match notification for request {} to {} candidates",
            request_id,
            candidate_ids.len()
        );

        let response = self
            .client
            .post(&url)
            .header("X-Api-Key", &self.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NotifyError::Api(format!(
                "Failed to dispatch notifications: {}",
                response.status()
            )));
        }

        let json: Value = response.json().await?;
        let reports = json
            .get("deliveries")
            .cloned()
            .ok_or_else(|| NotifyError::InvalidResponse("Missing deliveries array".into()))?;

        serde_json::from_value(reports)
            .map_err(|e| NotifyError::InvalidResponse(format!("Failed to parse deliveries: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_report_parsing() {
        let json = serde_json::json!([
            {"candidateId": "00000000-0000-0000-0000-000000000001", "accepted": true},
            {"candidateId": "00000000-0000-0000-0000-000000000002", "accepted": false, "detail": "unreachable"}
        ]);

        let reports: Vec<DeliveryReport> = serde_json::from_value(json).unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports[0].accepted);
        assert_eq!(reports[1].detail.as_deref(), Some("unreachable"));
    }

    #[tokio::test]
    async fn test_empty_selection_skips_dispatch() {
        let client = NotificationClient::new(
            "http://127.0.0.1:9".to_string(),
            "test_key".to_string(),
        );

        let reports = client
            .notify_candidates(Uuid::from_u128(1), &[])
            .await
            .unwrap();
        assert!(reports.is_empty());
    }
}
