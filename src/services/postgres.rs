use crate::core::distance::calculate_bounding_box;
use crate::models::{AvailabilitySlot, Coordinate, MatchCandidate, MatchRequest};
use chrono::Weekday;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur when reading marketplace records
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Read-only client over the externally-owned marketplace records
///
/// The matching engine never writes through this client: requests,
/// providers, availability and quotes all belong to the main application.
/// This layer owns the coarse pre-filtering (category, approval/active
/// flags, bounding box) that keeps candidate pools small before scoring.
pub struct StorageClient {
    pool: PgPool,
}

impl StorageClient {
    /// Create a new storage client from a connection string
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(600))
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        // Run migrations on startup
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a new storage client from settings
    pub async fn from_settings(
        url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
    ) -> Result<Self, StorageError> {
        tracing::info!("Connecting to PostgreSQL");

        Self::new(
            url,
            max_connections.unwrap_or(10),
            min_connections.unwrap_or(1),
        )
        .await
    }

    /// Fetch the matching projection of one service request
    pub async fn get_request(&self, request_id: Uuid) -> Result<MatchRequest, StorageError> {
        let query = r#"
            SELECT id, category_id, address, latitude, longitude, preferred_at,
                   alternative_dates, budget, estimated_duration_minutes, created_at
            FROM service_requests
            WHERE id = $1
        "#;

        let row = sqlx::query(query)
            .bind(request_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("request {}", request_id)))?;

        Ok(request_from_row(&row))
    }

    /// Fetch the matching projection of one provider, availability included
    pub async fn get_provider(&self, provider_id: Uuid) -> Result<MatchCandidate, StorageError> {
        let query = r#"
            SELECT id, display_name, category_id, address, latitude, longitude,
                   service_radius_km, hourly_rate, average_rating, completed_bookings,
                   response_rate, is_approved, is_active
            FROM providers
            WHERE id = $1
        "#;

        let row = sqlx::query(query)
            .bind(provider_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("provider {}", provider_id)))?;

        let mut candidate = candidate_from_row(&row);
        let mut availability = self.load_availability(&[provider_id]).await?;
        candidate.availability = availability.remove(&provider_id).unwrap_or_default();

        Ok(candidate)
    }

    /// Coarse candidate pool for a request: category, approval/active flags
    /// and a bounding-box pre-filter
    ///
    /// Providers with no stored coordinates are kept; the engine resolves
    /// their addresses at scoring time.
    pub async fn find_eligible_candidates(
        &self,
        category_id: &str,
        center: Coordinate,
        max_radius_km: f64,
    ) -> Result<Vec<MatchCandidate>, StorageError> {
        let bbox = calculate_bounding_box(center, max_radius_km);

        let query = r#"
            SELECT id, display_name, category_id, address, latitude, longitude,
                   service_radius_km, hourly_rate, average_rating, completed_bookings,
                   response_rate, is_approved, is_active
            FROM providers
            WHERE category_id = $1
              AND is_approved = TRUE
              AND is_active = TRUE
              AND (latitude IS NULL
                   OR (latitude > $2 AND latitude < $3
                       AND longitude > $4 AND longitude < $5))
        "#;

        let rows = sqlx::query(query)
            .bind(category_id)
            .bind(bbox.min_lat)
            .bind(bbox.max_lat)
            .bind(bbox.min_lon)
            .bind(bbox.max_lon)
            .fetch_all(&self.pool)
            .await?;

        let mut candidates: Vec<MatchCandidate> =
            rows.iter().map(candidate_from_row).collect();

        let ids: Vec<Uuid> = candidates.iter().map(|c| c.id).collect();
        let mut availability = self.load_availability(&ids).await?;
        for candidate in &mut candidates {
            candidate.availability = availability.remove(&candidate.id).unwrap_or_default();
        }

        tracing::debug!(
            "Found {} eligible candidates for category {} within {}km",
            candidates.len(),
            category_id,
            max_radius_km
        );

        Ok(candidates)
    }

    /// Open requests in a provider's category around its location
    pub async fn find_open_requests(
        &self,
        category_id: &str,
        center: Coordinate,
        max_radius_km: f64,
    ) -> Result<Vec<MatchRequest>, StorageError> {
        let bbox = calculate_bounding_box(center, max_radius_km);

        let query = r#"
            SELECT id, category_id, address, latitude, longitude, preferred_at,
                   alternative_dates, budget, estimated_duration_minutes, created_at
            FROM service_requests
            WHERE category_id = $1
              AND status = 'open'
              AND (latitude IS NULL
                   OR (latitude > $2 AND latitude < $3
                       AND longitude > $4 AND longitude < $5))
            ORDER BY created_at DESC
        "#;

        let rows = sqlx::query(query)
            .bind(category_id)
            .bind(bbox.min_lat)
            .bind(bbox.max_lat)
            .bind(bbox.min_lon)
            .bind(bbox.max_lon)
            .fetch_all(&self.pool)
            .await?;

        let requests: Vec<MatchRequest> = rows.iter().map(request_from_row).collect();

        tracing::debug!(
            "Found {} open requests for category {}",
            requests.len(),
            category_id
        );

        Ok(requests)
    }

    /// Requests the provider has already quoted, to exclude from its feed
    pub async fn quoted_request_ids(&self, provider_id: Uuid) -> Result<Vec<Uuid>, StorageError> {
        let query = r#"
            SELECT request_id
            FROM quotes
            WHERE provider_id = $1
        "#;

        let rows = sqlx::query(query)
            .bind(provider_id)
            .fetch_all(&self.pool)
            .await?;

        let ids: Vec<Uuid> = rows.iter().map(|row| row.get("request_id")).collect();

        tracing::debug!("Provider {} has quoted {} requests", provider_id, ids.len());

        Ok(ids)
    }

    /// Health check for the database connection
    pub async fn health_check(&self) -> Result<bool, StorageError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .map_err(Into::into)
    }

    async fn load_availability(
        &self,
        provider_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<AvailabilitySlot>>, StorageError> {
        if provider_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let query = r#"
            SELECT provider_id, weekday, on_date, start_time, end_time, is_available
            FROM provider_availability
            WHERE provider_id = ANY($1)
        "#;

        let rows = sqlx::query(query)
            .bind(provider_ids)
            .fetch_all(&self.pool)
            .await?;

        let mut by_provider: HashMap<Uuid, Vec<AvailabilitySlot>> = HashMap::new();
        for row in &rows {
            let provider_id: Uuid = row.get("provider_id");
            let Some(slot) = slot_from_row(row) else {
                tracing::warn!(
                    "Skipping malformed availability row for provider {}",
                    provider_id
                );
                continue;
            };
            by_provider.entry(provider_id).or_default().push(slot);
        }

        Ok(by_provider)
    }
}

fn request_from_row(row: &sqlx::postgres::PgRow) -> MatchRequest {
    MatchRequest {
        id: row.get("id"),
        category_id: row.get("category_id"),
        address: row.get("address"),
        coordinates: coordinates_from_row(row),
        preferred_at: row.get("preferred_at"),
        alternative_dates: row
            .get::<Option<Vec<chrono::DateTime<chrono::Utc>>>, _>("alternative_dates")
            .unwrap_or_default(),
        budget: row.get("budget"),
        estimated_duration_minutes: row
            .get::<Option<i32>, _>("estimated_duration_minutes")
            .map(|minutes| minutes.max(0) as u32),
        created_at: row.get("created_at"),
    }
}

fn candidate_from_row(row: &sqlx::postgres::PgRow) -> MatchCandidate {
    MatchCandidate {
        id: row.get("id"),
        display_name: row.get("display_name"),
        category_id: row.get("category_id"),
        address: row.get("address"),
        coordinates: coordinates_from_row(row),
        service_radius_km: row.get("service_radius_km"),
        hourly_rate: row.get("hourly_rate"),
        average_rating: row.get("average_rating"),
        completed_bookings: row.get::<i32, _>("completed_bookings").max(0) as u32,
        response_rate: row.get("response_rate"),
        availability: Vec::new(),
        is_approved: row.get("is_approved"),
        is_active: row.get("is_active"),
    }
}

fn coordinates_from_row(row: &sqlx::postgres::PgRow) -> Option<Coordinate> {
    let latitude: Option<f64> = row.get("latitude");
    let longitude: Option<f64> = row.get("longitude");
    Coordinate::new(latitude?, longitude?)
}

fn slot_from_row(row: &sqlx::postgres::PgRow) -> Option<AvailabilitySlot> {
    let weekday: Option<i16> = row.get("weekday");
    let on_date: Option<chrono::NaiveDate> = row.get("on_date");
    let start_time: chrono::NaiveTime = row.get("start_time");
    let end_time: chrono::NaiveTime = row.get("end_time");
    let available: bool = row.get("is_available");

    match (weekday, on_date) {
        (Some(number), None) => Some(AvailabilitySlot::Recurring {
            weekday: weekday_from_number(number)?,
            start_time,
            end_time,
        }),
        (None, Some(date)) => Some(AvailabilitySlot::OneOff {
            date,
            start_time,
            end_time,
            available,
        }),
        _ => None,
    }
}

/// 0 = Monday … 6 = Sunday, matching the schema's CHECK constraint
fn weekday_from_number(number: i16) -> Option<Weekday> {
    match number {
        0 => Some(Weekday::Mon),
        1 => Some(Weekday::Tue),
        2 => Some(Weekday::Wed),
        3 => Some(Weekday::Thu),
        4 => Some(Weekday::Fri),
        5 => Some(Weekday::Sat),
        6 => Some(Weekday::Sun),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weekday_mapping() {
        assert_eq!(weekday_from_number(0), Some(Weekday::Mon));
        assert_eq!(weekday_from_number(6), Some(Weekday::Sun));
        assert_eq!(weekday_from_number(7), None);
        assert_eq!(weekday_from_number(-1), None);
    }
}
