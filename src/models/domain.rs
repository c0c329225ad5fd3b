use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Service radius applied when a provider record carries none
pub const DEFAULT_SERVICE_RADIUS_KM: f64 = 30.0;

/// A latitude/longitude pair in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let coord = Self { latitude, longitude };
        coord.is_valid().then_some(coord)
    }

    /// Latitude in [-90, 90], longitude in [-180, 180], both finite
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Geospatial bounding box
#[derive(Debug, Clone, Copy)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

/// One availability entry for a provider
///
/// Recurring entries repeat every week on `weekday`; one-off entries apply
/// to a single calendar date and take precedence over recurring entries on
/// that date. A one-off with `available: false` blocks its time range.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AvailabilitySlot {
    Recurring {
        weekday: Weekday,
        #[serde(rename = "startTime")]
        start_time: NaiveTime,
        #[serde(rename = "endTime")]
        end_time: NaiveTime,
    },
    OneOff {
        date: NaiveDate,
        #[serde(rename = "startTime")]
        start_time: NaiveTime,
        #[serde(rename = "endTime")]
        end_time: NaiveTime,
        #[serde(default = "default_true")]
        available: bool,
    },
}

fn default_true() -> bool {
    true
}

/// The slice of a service request the matching engine reads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRequest {
    pub id: Uuid,
    #[serde(rename = "categoryId")]
    pub category_id: String,
    pub address: String,
    #[serde(default)]
    pub coordinates: Option<Coordinate>,
    #[serde(rename = "preferredAt", default)]
    pub preferred_at: Option<DateTime<Utc>>,
    #[serde(rename = "alternativeDates", default)]
    pub alternative_dates: Vec<DateTime<Utc>>,
    #[serde(default)]
    pub budget: Option<f64>,
    #[serde(rename = "estimatedDurationMinutes", default)]
    pub estimated_duration_minutes: Option<u32>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// The slice of a provider the matching engine reads
///
/// A flat projection mapped from whatever the storage layer returns; the
/// engine never sees (or mutates) the full provider record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub id: Uuid,
    #[serde(rename = "displayName")]
    pub display_name: String,
    #[serde(rename = "categoryId")]
    pub category_id: String,
    pub address: String,
    #[serde(default)]
    pub coordinates: Option<Coordinate>,
    #[serde(rename = "serviceRadiusKm", default)]
    pub service_radius_km: Option<f64>,
    #[serde(rename = "hourlyRate", default)]
    pub hourly_rate: Option<f64>,
    #[serde(rename = "averageRating", default)]
    pub average_rating: Option<f64>,
    #[serde(rename = "completedBookings", default)]
    pub completed_bookings: u32,
    #[serde(rename = "responseRate", default)]
    pub response_rate: Option<f64>,
    #[serde(default)]
    pub availability: Vec<AvailabilitySlot>,
    #[serde(rename = "isApproved", default)]
    pub is_approved: bool,
    #[serde(rename = "isActive", default = "default_true")]
    pub is_active: bool,
}

impl MatchCandidate {
    /// Service radius with the marketplace default applied
    pub fn effective_radius_km(&self) -> f64 {
        self.service_radius_km.unwrap_or(DEFAULT_SERVICE_RADIUS_KM)
    }

    /// Whether the provider has any rating history (0 means unrated)
    pub fn rated(&self) -> bool {
        self.average_rating.map_or(false, |r| r > 0.0)
    }
}

/// Per-criterion sub-scores plus the weighted total, all in [0, 100]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub distance: f64,
    pub availability: f64,
    pub rating: f64,
    pub experience: f64,
    pub price: f64,
    #[serde(rename = "responseRate")]
    pub response_rate: f64,
    pub total: f64,
}

/// A ranked provider for a service request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    #[serde(rename = "candidateId")]
    pub candidate_id: Uuid,
    #[serde(rename = "displayName")]
    pub display_name: String,
    #[serde(rename = "hourlyRate")]
    pub hourly_rate: Option<f64>,
    #[serde(rename = "averageRating")]
    pub average_rating: Option<f64>,
    #[serde(rename = "completedBookings")]
    pub completed_bookings: u32,
    #[serde(rename = "distanceKm")]
    pub distance_km: Option<f64>,
    #[serde(rename = "totalScore")]
    pub total_score: f64,
    pub breakdown: ScoreBreakdown,
}

/// A ranked open request for a provider (reverse direction)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMatch {
    #[serde(rename = "requestId")]
    pub request_id: Uuid,
    #[serde(rename = "categoryId")]
    pub category_id: String,
    #[serde(default)]
    pub budget: Option<f64>,
    #[serde(rename = "preferredAt")]
    pub preferred_at: Option<DateTime<Utc>>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "distanceKm")]
    pub distance_km: Option<f64>,
    #[serde(rename = "totalScore")]
    pub total_score: f64,
    pub breakdown: ScoreBreakdown,
}

/// Score distribution buckets for operational dashboards
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreDistribution {
    /// total >= 80
    pub excellent: usize,
    /// 60 <= total < 80
    pub good: usize,
    /// 40 <= total < 60
    pub average: usize,
    /// total < 40
    pub poor: usize,
}

/// Aggregate statistics over one matching call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingStatistics {
    #[serde(rename = "totalCandidates")]
    pub total_candidates: usize,
    #[serde(rename = "scoredCandidates")]
    pub scored_candidates: usize,
    #[serde(rename = "averageScore")]
    pub average_score: f64,
    #[serde(rename = "minScore")]
    pub min_score: f64,
    #[serde(rename = "maxScore")]
    pub max_score: f64,
    pub distribution: ScoreDistribution,
}

/// Weights applied to the six criterion sub-scores
///
/// An immutable value handed to the engine at construction; must sum to
/// 1.00 within tolerance (checked there, never renormalized silently).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Weights {
    pub distance: f64,
    pub availability: f64,
    pub rating: f64,
    pub experience: f64,
    pub price: f64,
    #[serde(rename = "responseRate")]
    pub response_rate: f64,
}

impl Weights {
    pub fn sum(&self) -> f64 {
        self.distance
            + self.availability
            + self.rating
            + self.experience
            + self.price
            + self.response_rate
    }
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            distance: 0.30,
            availability: 0.25,
            rating: 0.20,
            experience: 0.10,
            price: 0.10,
            response_rate: 0.05,
        }
    }
}

/// Caller-supplied result filters, AND-combined
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MatchFilters {
    #[serde(rename = "minRating", default)]
    pub min_rating: Option<f64>,
    #[serde(rename = "maxHourlyRate", default)]
    pub max_hourly_rate: Option<f64>,
    #[serde(rename = "maxDistanceKm", default)]
    pub max_distance_km: Option<f64>,
    #[serde(rename = "minExperience", default)]
    pub min_experience: Option<u32>,
    #[serde(rename = "minScore", default)]
    pub min_score: Option<f64>,
    #[serde(rename = "availableNow", default)]
    pub available_now: bool,
}

/// Sort keys supported by the provider feed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestSortKey {
    #[default]
    Score,
    Distance,
    Budget,
    Recency,
}
