//! Presta Match - provider matching engine for the Presta services marketplace
//!
//! This library ranks service providers ("prestataires") against client
//! requests across six weighted criteria, and symmetrically surfaces
//! relevant open requests to providers. It owns the scoring, filtering and
//! geocoding layers; record storage and notification delivery stay with
//! the surrounding application.

pub mod config;
pub mod core;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use crate::core::{
    distance::{calculate_bounding_box, haversine_distance},
    FeedOptions, MatchEngine, MatchOptions,
};
pub use crate::models::{
    MatchCandidate, MatchFilters, MatchRequest, MatchResult, RequestMatch, ScoreBreakdown,
    Weights,
};
