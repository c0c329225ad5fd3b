// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    AvailabilitySlot, BoundingBox, Coordinate, MatchCandidate, MatchFilters, MatchRequest,
    MatchResult, MatchingStatistics, RequestMatch, RequestSortKey, ScoreBreakdown,
    ScoreDistribution, Weights, DEFAULT_SERVICE_RADIUS_KM,
};
pub use requests::{FindMatchesRequest, NotifyMatchesRequest, ProviderFeedRequest};
pub use responses::{ErrorResponse, FindMatchesResponse, HealthResponse, ProviderFeedResponse};
