// Core algorithm exports
pub mod availability;
pub mod distance;
pub mod filters;
pub mod matcher;
pub mod scoring;

pub use availability::{availability_fraction, is_available_at};
pub use distance::{
    calculate_bounding_box, centroid, haversine_distance, haversine_distance_in,
    is_within_bounding_box, is_within_radius, nearest_point, DistanceUnit,
};
pub use filters::{passes_filters, sort_request_matches, sort_results};
pub use matcher::{FeedOptions, FeedOutcome, MatchEngine, MatchOptions, MatchOutcome};
pub use scoring::{
    score_candidate, validate_weights, MatchError, ScoringCurves, DEFAULT_MIN_SCORE_THRESHOLD,
};
