use crate::core::distance::haversine_distance;
use crate::core::filters::{passes_filters, sort_request_matches, sort_results};
use crate::core::scoring::{
    round2, score_candidate, validate_weights, MatchError, ScoringCurves,
    DEFAULT_MIN_SCORE_THRESHOLD,
};
use crate::models::{
    Coordinate, MatchCandidate, MatchFilters, MatchRequest, MatchResult, MatchingStatistics,
    RequestMatch, RequestSortKey, ScoreDistribution, Weights,
};
use crate::services::geocoding::Geocoder;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinSet;
use uuid::Uuid;

/// Per-call knobs for the request → providers direction
#[derive(Debug, Clone)]
pub struct MatchOptions {
    pub limit: usize,
    /// Admission threshold on the total score
    pub min_score: f64,
    pub filters: MatchFilters,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            limit: 20,
            min_score: DEFAULT_MIN_SCORE_THRESHOLD,
            filters: MatchFilters::default(),
        }
    }
}

/// Per-call knobs for the provider → open requests direction
#[derive(Debug, Clone)]
pub struct FeedOptions {
    pub page: usize,
    pub per_page: usize,
    pub sort_by: RequestSortKey,
    pub min_score: f64,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
            sort_by: RequestSortKey::Score,
            min_score: DEFAULT_MIN_SCORE_THRESHOLD,
        }
    }
}

/// Result of one request-side matching call
#[derive(Debug)]
pub struct MatchOutcome {
    pub matches: Vec<MatchResult>,
    pub total_candidates: usize,
    pub statistics: MatchingStatistics,
    /// The anchor address could not be resolved; the list is empty by
    /// construction, not because nobody qualified
    pub geocoding_failed: bool,
}

impl MatchOutcome {
    fn empty(total_candidates: usize, geocoding_failed: bool) -> Self {
        Self {
            matches: Vec::new(),
            total_candidates,
            statistics: empty_statistics(total_candidates),
            geocoding_failed,
        }
    }
}

/// Result of one provider-feed call
#[derive(Debug)]
pub struct FeedOutcome {
    pub matches: Vec<RequestMatch>,
    /// Admitted matches before pagination
    pub total: usize,
    pub geocoding_failed: bool,
}

/// Matching orchestrator
///
/// Holds the immutable scoring configuration and the shared geocoder; the
/// candidate pool itself is fetched by the caller (the storage layer owns
/// coarse pre-filtering), mirroring the split between ranking and lookup.
#[derive(Clone)]
pub struct MatchEngine {
    weights: Weights,
    curves: Arc<ScoringCurves>,
    geocoder: Arc<Geocoder>,
    resolver_concurrency: usize,
}

impl MatchEngine {
    /// Validates the scoring configuration; invalid weights or curves are
    /// a deployment error and fail construction outright.
    pub fn new(
        weights: Weights,
        curves: ScoringCurves,
        geocoder: Arc<Geocoder>,
        resolver_concurrency: usize,
    ) -> Result<Self, MatchError> {
        validate_weights(&weights)?;
        curves.validate()?;
        if resolver_concurrency == 0 {
            return Err(MatchError::Configuration(
                "resolver concurrency must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            weights,
            curves: Arc::new(curves),
            geocoder,
            resolver_concurrency,
        })
    }

    pub fn with_defaults(geocoder: Arc<Geocoder>) -> Result<Self, MatchError> {
        Self::new(Weights::default(), ScoringCurves::default(), geocoder, 8)
    }

    /// Rank a candidate pool against a service request
    ///
    /// Scores every candidate, admits those at or above `min_score`,
    /// applies the caller's filters, sorts deterministically and truncates
    /// to `limit`. Per-candidate geocoding failures skip only that
    /// candidate; an unresolvable anchor yields an empty, flagged outcome.
    pub async fn find_matches_for_request(
        &self,
        request: &MatchRequest,
        candidates: Vec<MatchCandidate>,
        options: &MatchOptions,
    ) -> MatchOutcome {
        let total_candidates = candidates.len();

        let Some(anchor) = self
            .resolve_anchor(&request.address, request.coordinates)
            .await
        else {
            tracing::warn!(
                "Geocoding failed for request {} (\"{}\"); returning empty match list",
                request.id,
                request.address
            );
            return MatchOutcome::empty(total_candidates, true);
        };

        if candidates.is_empty() {
            tracing::debug!("Empty candidate pool for request {}", request.id);
            return MatchOutcome::empty(0, false);
        }

        let coords = self.resolve_candidate_coords(&candidates).await;

        let mut seen: HashSet<Uuid> = HashSet::with_capacity(candidates.len());
        let mut scored: Vec<MatchResult> = Vec::with_capacity(candidates.len());

        for (candidate, coord) in candidates.into_iter().zip(coords) {
            if !seen.insert(candidate.id) {
                tracing::debug!("Dropping duplicate candidate {}", candidate.id);
                continue;
            }
            if candidate.effective_radius_km() <= 0.0 {
                tracing::warn!(
                    "Skipping candidate {}: invalid service radius {:?}",
                    candidate.id,
                    candidate.service_radius_km
                );
                continue;
            }

            if coord.is_none() {
                tracing::debug!(
                    "Candidate {} address (\"{}\") could not be resolved; distance scores 0",
                    candidate.id,
                    candidate.address
                );
            }

            let distance_km = coord.map(|c| haversine_distance(anchor, c));
            let breakdown = score_candidate(
                request,
                &candidate,
                distance_km,
                &self.weights,
                &self.curves,
            );

            scored.push(MatchResult {
                candidate_id: candidate.id,
                display_name: candidate.display_name,
                hourly_rate: candidate.hourly_rate,
                average_rating: candidate.average_rating,
                completed_bookings: candidate.completed_bookings,
                distance_km: distance_km.map(round2),
                total_score: breakdown.total,
                breakdown,
            });
        }

        let statistics = compute_statistics(total_candidates, &scored);

        let mut admitted: Vec<MatchResult> = scored
            .into_iter()
            .filter(|r| r.total_score >= options.min_score)
            .filter(|r| passes_filters(r, &options.filters))
            .collect();

        sort_results(&mut admitted);
        admitted.truncate(options.limit);

        tracing::info!(
            "Request {}: {} of {} candidates admitted (threshold {})",
            request.id,
            admitted.len(),
            total_candidates,
            options.min_score
        );

        MatchOutcome {
            matches: admitted,
            total_candidates,
            statistics,
            geocoding_failed: false,
        }
    }

    /// Rank open requests for a provider (the reverse direction)
    ///
    /// Requests the provider has already quoted are excluded before
    /// scoring. `total` counts every admitted match so callers can page.
    pub async fn find_requests_for_provider(
        &self,
        candidate: &MatchCandidate,
        requests: Vec<MatchRequest>,
        quoted_request_ids: &[Uuid],
        options: &FeedOptions,
    ) -> FeedOutcome {
        let Some(anchor) = self
            .resolve_anchor(&candidate.address, candidate.coordinates)
            .await
        else {
            tracing::warn!(
                "Geocoding failed for provider {} (\"{}\"); returning empty feed",
                candidate.id,
                candidate.address
            );
            return FeedOutcome {
                matches: Vec::new(),
                total: 0,
                geocoding_failed: true,
            };
        };

        let quoted: HashSet<Uuid> = quoted_request_ids.iter().copied().collect();
        let mut seen: HashSet<Uuid> = HashSet::with_capacity(requests.len());
        let requests: Vec<MatchRequest> = requests
            .into_iter()
            .filter(|r| !quoted.contains(&r.id))
            .filter(|r| seen.insert(r.id))
            .collect();

        let coords = self.resolve_request_coords(&requests).await;

        let mut scored: Vec<RequestMatch> = Vec::with_capacity(requests.len());
        for (request, coord) in requests.into_iter().zip(coords) {
            if coord.is_none() {
                tracing::debug!(
                    "Request {} address (\"{}\") could not be resolved; distance scores 0",
                    request.id,
                    request.address
                );
            }

            let distance_km = coord.map(|c| haversine_distance(anchor, c));
            let breakdown = score_candidate(
                &request,
                candidate,
                distance_km,
                &self.weights,
                &self.curves,
            );

            scored.push(RequestMatch {
                request_id: request.id,
                category_id: request.category_id,
                budget: request.budget,
                preferred_at: request.preferred_at,
                created_at: request.created_at,
                distance_km: distance_km.map(round2),
                total_score: breakdown.total,
                breakdown,
            });
        }

        let mut admitted: Vec<RequestMatch> = scored
            .into_iter()
            .filter(|r| r.total_score >= options.min_score)
            .collect();

        sort_request_matches(&mut admitted, options.sort_by);

        let total = admitted.len();
        let page = options.page.max(1);
        let start = (page - 1).saturating_mul(options.per_page);
        let matches: Vec<RequestMatch> = admitted
            .into_iter()
            .skip(start)
            .take(options.per_page)
            .collect();

        tracing::info!(
            "Provider {}: {} open requests admitted, returning page {} ({} items)",
            candidate.id,
            total,
            page,
            matches.len()
        );

        FeedOutcome {
            matches,
            total,
            geocoding_failed: false,
        }
    }

    /// Inline coordinates win; otherwise the address goes to the geocoder
    async fn resolve_anchor(
        &self,
        address: &str,
        known: Option<Coordinate>,
    ) -> Option<Coordinate> {
        match known.filter(Coordinate::is_valid) {
            Some(coord) => Some(coord),
            None => self.geocoder.geocode(address).await,
        }
    }

    async fn resolve_candidate_coords(
        &self,
        candidates: &[MatchCandidate],
    ) -> Vec<Option<Coordinate>> {
        let pending: Vec<(usize, String)> = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| c.coordinates.filter(Coordinate::is_valid).is_none())
            .map(|(idx, c)| (idx, c.address.clone()))
            .collect();

        let mut coords: Vec<Option<Coordinate>> = candidates
            .iter()
            .map(|c| c.coordinates.filter(Coordinate::is_valid))
            .collect();

        for (idx, coord) in self.resolve_batch(pending).await {
            coords[idx] = coord;
        }
        coords
    }

    async fn resolve_request_coords(&self, requests: &[MatchRequest]) -> Vec<Option<Coordinate>> {
        let pending: Vec<(usize, String)> = requests
            .iter()
            .enumerate()
            .filter(|(_, r)| r.coordinates.filter(Coordinate::is_valid).is_none())
            .map(|(idx, r)| (idx, r.address.clone()))
            .collect();

        let mut coords: Vec<Option<Coordinate>> = requests
            .iter()
            .map(|r| r.coordinates.filter(Coordinate::is_valid))
            .collect();

        for (idx, coord) in self.resolve_batch(pending).await {
            coords[idx] = coord;
        }
        coords
    }

    /// Geocode a batch of addresses with bounded concurrency
    ///
    /// Results are keyed by index, so completion order does not affect the
    /// final ranking. Failed lookups come back as None and only affect the
    /// one entry they belong to.
    async fn resolve_batch(
        &self,
        pending: Vec<(usize, String)>,
    ) -> Vec<(usize, Option<Coordinate>)> {
        let mut resolved: Vec<(usize, Option<Coordinate>)> = Vec::with_capacity(pending.len());
        let mut queue = pending.into_iter();
        let mut tasks: JoinSet<(usize, Option<Coordinate>)> = JoinSet::new();

        loop {
            while tasks.len() < self.resolver_concurrency {
                let Some((idx, address)) = queue.next() else {
                    break;
                };
                let geocoder = Arc::clone(&self.geocoder);
                tasks.spawn(async move { (idx, geocoder.geocode(&address).await) });
            }

            match tasks.join_next().await {
                Some(Ok(entry)) => resolved.push(entry),
                Some(Err(e)) => tracing::warn!("Coordinate resolution task failed: {}", e),
                None => break,
            }
        }

        resolved
    }
}

fn compute_statistics(total_candidates: usize, scored: &[MatchResult]) -> MatchingStatistics {
    if scored.is_empty() {
        return empty_statistics(total_candidates);
    }

    let mut distribution = ScoreDistribution::default();
    let mut sum = 0.0;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;

    for result in scored {
        let score = result.total_score;
        sum += score;
        min = min.min(score);
        max = max.max(score);

        if score >= 80.0 {
            distribution.excellent += 1;
        } else if score >= 60.0 {
            distribution.good += 1;
        } else if score >= 40.0 {
            distribution.average += 1;
        } else {
            distribution.poor += 1;
        }
    }

    MatchingStatistics {
        total_candidates,
        scored_candidates: scored.len(),
        average_score: round2(sum / scored.len() as f64),
        min_score: min,
        max_score: max,
        distribution,
    }
}

fn empty_statistics(total_candidates: usize) -> MatchingStatistics {
    MatchingStatistics {
        total_candidates,
        scored_candidates: 0,
        average_score: 0.0,
        min_score: 0.0,
        max_score: 0.0,
        distribution: ScoreDistribution::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::cache::GeoCache;
    use crate::services::geocoding::GeocodeBackend;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    /// Engine whose geocoder points at a dead endpoint; tests that supply
    /// coordinates inline never touch it, tests that omit them exercise
    /// the failure path.
    fn test_engine() -> MatchEngine {
        let geocoder = Geocoder::new(
            GeocodeBackend::Nominatim {
                base_url: "http://127.0.0.1:9".to_string(),
            },
            GeoCache::in_memory(64, 60),
            Duration::from_millis(200),
        );
        MatchEngine::with_defaults(Arc::new(geocoder)).unwrap()
    }

    fn paris_request() -> MatchRequest {
        MatchRequest {
            id: Uuid::from_u128(1000),
            category_id: "plumbing".to_string(),
            address: "10 Rue Oberkampf, Paris".to_string(),
            coordinates: Coordinate::new(48.8566, 2.3522),
            preferred_at: None,
            alternative_dates: vec![],
            budget: Some(100.0),
            estimated_duration_minutes: Some(90),
            created_at: Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap(),
        }
    }

    fn candidate(id: u128, lat: f64, lon: f64) -> MatchCandidate {
        MatchCandidate {
            id: Uuid::from_u128(id),
            display_name: format!("Provider {}", id),
            category_id: "plumbing".to_string(),
            address: format!("Address {}", id),
            coordinates: Coordinate::new(lat, lon),
            service_radius_km: Some(20.0),
            hourly_rate: Some(100.0),
            average_rating: Some(4.5),
            completed_bookings: 25,
            response_rate: Some(90.0),
            availability: vec![],
            is_approved: true,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn test_ranking_prefers_closer_candidates() {
        let engine = test_engine();
        let request = paris_request();

        let candidates = vec![
            candidate(2, 48.95, 2.45), // ~12km out
            candidate(1, 48.86, 2.35), // next door
        ];

        let outcome = engine
            .find_matches_for_request(&request, candidates, &MatchOptions::default())
            .await;

        assert!(!outcome.geocoding_failed);
        assert_eq!(outcome.total_candidates, 2);
        assert_eq!(outcome.matches.len(), 2);
        assert_eq!(outcome.matches[0].candidate_id, Uuid::from_u128(1));
        assert!(outcome.matches[0].total_score >= outcome.matches[1].total_score);
    }

    #[tokio::test]
    async fn test_empty_pool_is_not_an_error() {
        let engine = test_engine();
        let outcome = engine
            .find_matches_for_request(&paris_request(), vec![], &MatchOptions::default())
            .await;

        assert!(outcome.matches.is_empty());
        assert!(!outcome.geocoding_failed);
        assert_eq!(outcome.statistics.scored_candidates, 0);
    }

    #[tokio::test]
    async fn test_unresolvable_anchor_flags_outcome() {
        let engine = test_engine();
        let mut request = paris_request();
        request.coordinates = None; // forces a geocoder call that will fail

        let outcome = engine
            .find_matches_for_request(&request, vec![candidate(1, 48.86, 2.35)], &MatchOptions::default())
            .await;

        assert!(outcome.geocoding_failed);
        assert!(outcome.matches.is_empty());
        assert_eq!(outcome.total_candidates, 1);
    }

    #[tokio::test]
    async fn test_candidate_with_unresolvable_address_is_isolated() {
        let engine = test_engine();
        let request = paris_request();

        let mut unresolvable = candidate(2, 0.0, 0.0);
        unresolvable.coordinates = None; // dead geocoder -> no coordinates
        unresolvable.average_rating = None;
        unresolvable.hourly_rate = None;
        unresolvable.response_rate = None;
        unresolvable.completed_bookings = 0;

        let outcome = engine
            .find_matches_for_request(
                &request,
                vec![candidate(1, 48.86, 2.35), unresolvable],
                &MatchOptions::default(),
            )
            .await;

        // The resolvable candidate still ranks; the other scored distance 0
        // and fell below the threshold rather than aborting the call
        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].candidate_id, Uuid::from_u128(1));
        assert_eq!(outcome.statistics.scored_candidates, 2);
    }

    #[tokio::test]
    async fn test_duplicate_candidates_are_dropped() {
        let engine = test_engine();
        let request = paris_request();

        let outcome = engine
            .find_matches_for_request(
                &request,
                vec![candidate(1, 48.86, 2.35), candidate(1, 48.86, 2.35)],
                &MatchOptions::default(),
            )
            .await;

        assert_eq!(outcome.matches.len(), 1);
    }

    #[tokio::test]
    async fn test_admission_threshold_boundary() {
        let engine = test_engine();
        let request = paris_request();
        let near = candidate(1, 48.86, 2.35);

        let baseline = engine
            .find_matches_for_request(&request, vec![near.clone()], &MatchOptions::default())
            .await;
        let score = baseline.matches[0].total_score;

        // At exactly the candidate's score the candidate is admitted
        let at = MatchOptions {
            min_score: score,
            ..Default::default()
        };
        let outcome = engine
            .find_matches_for_request(&request, vec![near.clone()], &at)
            .await;
        assert_eq!(outcome.matches.len(), 1);

        // A hair above and it is excluded
        let above = MatchOptions {
            min_score: score + 0.01,
            ..Default::default()
        };
        let outcome = engine
            .find_matches_for_request(&request, vec![near], &above)
            .await;
        assert!(outcome.matches.is_empty());
    }

    #[tokio::test]
    async fn test_limit_truncates_after_sort() {
        let engine = test_engine();
        let request = paris_request();

        let candidates: Vec<MatchCandidate> = (1..=10)
            .map(|i| candidate(i, 48.86 + i as f64 * 0.005, 2.35))
            .collect();

        let options = MatchOptions {
            limit: 3,
            ..Default::default()
        };
        let outcome = engine
            .find_matches_for_request(&request, candidates, &options)
            .await;

        assert_eq!(outcome.matches.len(), 3);
        assert_eq!(outcome.statistics.scored_candidates, 10);
        // Closest first
        assert_eq!(outcome.matches[0].candidate_id, Uuid::from_u128(1));
    }

    #[tokio::test]
    async fn test_provider_feed_excludes_quoted_and_paginates() {
        let engine = test_engine();
        let provider = candidate(99, 48.8566, 2.3522);

        let requests: Vec<MatchRequest> = (1..=5)
            .map(|i| {
                let mut r = paris_request();
                r.id = Uuid::from_u128(i);
                r.coordinates = Coordinate::new(48.86 + i as f64 * 0.004, 2.35);
                r
            })
            .collect();

        let quoted = vec![Uuid::from_u128(1)];
        let options = FeedOptions {
            page: 1,
            per_page: 2,
            ..Default::default()
        };

        let outcome = engine
            .find_requests_for_provider(&provider, requests.clone(), &quoted, &options)
            .await;

        assert!(!outcome.geocoding_failed);
        assert_eq!(outcome.total, 4, "quoted request must be excluded");
        assert_eq!(outcome.matches.len(), 2);

        let second_page = FeedOptions {
            page: 2,
            per_page: 2,
            ..Default::default()
        };
        let outcome_p2 = engine
            .find_requests_for_provider(&provider, requests, &quoted, &second_page)
            .await;
        assert_eq!(outcome_p2.matches.len(), 2);
        assert_ne!(
            outcome.matches[0].request_id,
            outcome_p2.matches[0].request_id
        );
    }

    #[tokio::test]
    async fn test_deterministic_across_calls() {
        let engine = test_engine();
        let request = paris_request();
        let build = || -> Vec<MatchCandidate> {
            (1..=6)
                .map(|i| candidate(i, 48.86 + (i % 3) as f64 * 0.01, 2.35))
                .collect()
        };

        let first = engine
            .find_matches_for_request(&request, build(), &MatchOptions::default())
            .await;
        let second = engine
            .find_matches_for_request(&request, build(), &MatchOptions::default())
            .await;

        let order = |o: &MatchOutcome| -> Vec<(Uuid, f64)> {
            o.matches
                .iter()
                .map(|m| (m.candidate_id, m.total_score))
                .collect()
        };
        assert_eq!(order(&first), order(&second));
    }

    #[test]
    fn test_engine_rejects_bad_weights() {
        let geocoder = Arc::new(Geocoder::new(
            GeocodeBackend::Nominatim {
                base_url: "http://127.0.0.1:9".to_string(),
            },
            GeoCache::in_memory(8, 60),
            Duration::from_millis(100),
        ));

        let mut weights = Weights::default();
        weights.distance = 0.60; // sums to 1.30
        assert!(MatchEngine::new(weights, ScoringCurves::default(), geocoder, 8).is_err());
    }
}
