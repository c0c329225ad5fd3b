use crate::core::availability::availability_fraction;
use crate::models::{AvailabilitySlot, MatchCandidate, MatchRequest, ScoreBreakdown, Weights};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Minimum total score for a candidate to be admitted into results
pub const DEFAULT_MIN_SCORE_THRESHOLD: f64 = 40.0;

/// Allowed deviation of the weight sum from 1.00
const WEIGHT_SUM_TOLERANCE: f64 = 0.01;

/// Errors raised when the engine is configured with invalid parameters
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("invalid matching configuration: {0}")]
    Configuration(String),
}

/// Breakpoints for the piecewise scoring curves
///
/// These ship with the marketplace defaults but are tunable at engine
/// construction. Validation rejects curves that could push a sub-score
/// outside [0, 100].
#[derive(Debug, Clone)]
pub struct ScoringCurves {
    /// Average rating below which the rating sub-score collapses to 0
    pub rating_floor: f64,
    /// Sub-score for unrated providers
    pub neutral_rating: f64,
    /// Sub-score when the request carries no preferred date
    pub neutral_availability: f64,
    /// Sub-score when budget or hourly rate is unknown
    pub neutral_price: f64,
    /// Sub-score when the response rate is unset
    pub neutral_response_rate: f64,
    /// (completed bookings, sub-score) ramp; linear between points,
    /// saturating toward 100 past the last one
    pub experience_ramp: Vec<(u32, f64)>,
    /// (relative budget deviation, sub-score) bands, best band first
    pub price_bands: Vec<(f64, f64)>,
    /// Sub-score when the rate deviates beyond every band
    pub price_floor: f64,
}

impl Default for ScoringCurves {
    fn default() -> Self {
        Self {
            rating_floor: 3.0,
            neutral_rating: 50.0,
            neutral_availability: 50.0,
            neutral_price: 70.0,
            neutral_response_rate: 70.0,
            experience_ramp: vec![(0, 30.0), (5, 50.0), (20, 70.0), (50, 85.0)],
            price_bands: vec![(0.10, 100.0), (0.20, 85.0), (0.30, 70.0), (0.50, 50.0)],
            price_floor: 30.0,
        }
    }
}

impl ScoringCurves {
    pub fn validate(&self) -> Result<(), MatchError> {
        let in_range = |v: f64| (0.0..=100.0).contains(&v);

        if !(0.0..=5.0).contains(&self.rating_floor) {
            return Err(MatchError::Configuration(format!(
                "rating floor {} outside [0, 5]",
                self.rating_floor
            )));
        }

        for (name, v) in [
            ("neutral rating", self.neutral_rating),
            ("neutral availability", self.neutral_availability),
            ("neutral price", self.neutral_price),
            ("neutral response rate", self.neutral_response_rate),
            ("price floor", self.price_floor),
        ] {
            if !in_range(v) {
                return Err(MatchError::Configuration(format!(
                    "{} score {} outside [0, 100]",
                    name, v
                )));
            }
        }

        if self.experience_ramp.is_empty() {
            return Err(MatchError::Configuration(
                "experience ramp must have at least one point".to_string(),
            ));
        }
        for pair in self.experience_ramp.windows(2) {
            if pair[1].0 <= pair[0].0 || pair[1].1 < pair[0].1 {
                return Err(MatchError::Configuration(
                    "experience ramp must be strictly increasing in count and non-decreasing in score"
                        .to_string(),
                ));
            }
        }
        if self.experience_ramp.iter().any(|(_, s)| !in_range(*s)) {
            return Err(MatchError::Configuration(
                "experience ramp score outside [0, 100]".to_string(),
            ));
        }

        for pair in self.price_bands.windows(2) {
            if pair[1].0 <= pair[0].0 || pair[1].1 > pair[0].1 {
                return Err(MatchError::Configuration(
                    "price bands must widen in deviation and narrow in score".to_string(),
                ));
            }
        }
        if self
            .price_bands
            .iter()
            .any(|(d, s)| *d < 0.0 || !in_range(*s))
        {
            return Err(MatchError::Configuration(
                "price band outside valid domain".to_string(),
            ));
        }

        Ok(())
    }
}

/// Reject weight sets that do not sum to 1.00 within tolerance
///
/// Never renormalizes: a bad weight set is a deployment mistake, and
/// silently fixing it would hide which criteria actually applied.
pub fn validate_weights(weights: &Weights) -> Result<(), MatchError> {
    let components = [
        ("distance", weights.distance),
        ("availability", weights.availability),
        ("rating", weights.rating),
        ("experience", weights.experience),
        ("price", weights.price),
        ("response_rate", weights.response_rate),
    ];

    for (name, w) in components {
        if !w.is_finite() || w < 0.0 {
            return Err(MatchError::Configuration(format!(
                "weight for {} must be a non-negative number, got {}",
                name, w
            )));
        }
    }

    let sum = weights.sum();
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(MatchError::Configuration(format!(
            "weights sum to {:.4}, expected 1.00 ± {}",
            sum, WEIGHT_SUM_TOLERANCE
        )));
    }

    Ok(())
}

/// Distance sub-score: linear falloff reaching 0 at the service radius
///
/// A candidate whose coordinates could not be resolved scores 0 — an
/// unknowable distance is never rewarded.
#[inline]
pub fn distance_score(distance_km: Option<f64>, service_radius_km: f64) -> f64 {
    let Some(distance) = distance_km else {
        return 0.0;
    };

    if service_radius_km <= 0.0 || distance > service_radius_km {
        return 0.0;
    }

    (100.0 - (distance / service_radius_km) * 100.0).clamp(0.0, 100.0)
}

/// Availability sub-score: fraction of requested dates the provider covers
#[inline]
pub fn availability_score(
    slots: &[AvailabilitySlot],
    preferred_at: Option<DateTime<Utc>>,
    alternative_dates: &[DateTime<Utc>],
    curves: &ScoringCurves,
) -> f64 {
    let Some(preferred) = preferred_at else {
        return curves.neutral_availability;
    };

    let mut dates = Vec::with_capacity(1 + alternative_dates.len());
    dates.push(preferred);
    dates.extend_from_slice(alternative_dates);

    match availability_fraction(slots, &dates) {
        Some(fraction) => (fraction * 100.0).clamp(0.0, 100.0),
        None => curves.neutral_availability,
    }
}

/// Rating sub-score: linear 0–5 → 0–100, with a hard floor
#[inline]
pub fn rating_score(average_rating: Option<f64>, curves: &ScoringCurves) -> f64 {
    match average_rating {
        // Unrated providers get a neutral score rather than a penalty
        None => curves.neutral_rating,
        Some(rating) if rating <= 0.0 => curves.neutral_rating,
        Some(rating) if rating < curves.rating_floor => 0.0,
        Some(rating) => (rating / 5.0 * 100.0).clamp(0.0, 100.0),
    }
}

/// Experience sub-score: piecewise-linear ramp on completed bookings
///
/// New providers land on the ramp's floor instead of 0 so they are not
/// shut out of the marketplace entirely; very high counts saturate
/// toward 100 without ever reaching it.
pub fn experience_score(completed_bookings: u32, curves: &ScoringCurves) -> f64 {
    let ramp = &curves.experience_ramp;
    let Some(&(first_count, first_score)) = ramp.first() else {
        return 0.0;
    };

    if completed_bookings <= first_count {
        return first_score;
    }

    for pair in ramp.windows(2) {
        let (c0, s0) = pair[0];
        let (c1, s1) = pair[1];
        if completed_bookings <= c1 {
            let progress = (completed_bookings - c0) as f64 / (c1 - c0) as f64;
            return (s0 + (s1 - s0) * progress).clamp(0.0, 100.0);
        }
    }

    // Past the last breakpoint: hyperbolic saturation toward 100, with the
    // last count acting as the half-life
    let &(last_count, last_score) = ramp.last().unwrap_or(&(first_count, first_score));
    let over = (completed_bookings - last_count) as f64;
    let half_life = last_count.max(1) as f64;
    (last_score + (100.0 - last_score) * over / (over + half_life)).clamp(0.0, 100.0)
}

/// Price sub-score: banded on relative deviation from the request budget
#[inline]
pub fn price_score(
    hourly_rate: Option<f64>,
    budget: Option<f64>,
    curves: &ScoringCurves,
) -> f64 {
    let (Some(rate), Some(budget)) = (hourly_rate, budget) else {
        return curves.neutral_price;
    };

    // A zero or negative budget carries no pricing signal
    if budget <= 0.0 || rate < 0.0 {
        return curves.neutral_price;
    }

    let deviation = (rate - budget).abs() / budget;
    for &(threshold, score) in &curves.price_bands {
        if deviation <= threshold {
            return score;
        }
    }

    curves.price_floor
}

/// Response-rate sub-score: the stored percentage, used as-is
#[inline]
pub fn response_rate_score(response_rate: Option<f64>, curves: &ScoringCurves) -> f64 {
    match response_rate {
        Some(rate) => rate.clamp(0.0, 100.0),
        None => curves.neutral_response_rate,
    }
}

/// Score a candidate against a request across all six criteria
///
/// Pure: the same inputs always produce the same breakdown. `distance_km`
/// is resolved by the caller (the orchestrator owns geocoding).
pub fn score_candidate(
    request: &MatchRequest,
    candidate: &MatchCandidate,
    distance_km: Option<f64>,
    weights: &Weights,
    curves: &ScoringCurves,
) -> ScoreBreakdown {
    let distance = distance_score(distance_km, candidate.effective_radius_km());
    let availability = availability_score(
        &candidate.availability,
        request.preferred_at,
        &request.alternative_dates,
        curves,
    );
    let rating = rating_score(candidate.average_rating, curves);
    let experience = experience_score(candidate.completed_bookings, curves);
    let price = price_score(candidate.hourly_rate, request.budget, curves);
    let response_rate = response_rate_score(candidate.response_rate, curves);

    let total = distance * weights.distance
        + availability * weights.availability
        + rating * weights.rating
        + experience * weights.experience
        + price * weights.price
        + response_rate * weights.response_rate;

    ScoreBreakdown {
        distance,
        availability,
        rating,
        experience,
        price,
        response_rate,
        total: round2(total.clamp(0.0, 100.0)),
    }
}

/// Round to two decimals (wire precision for totals)
#[inline]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn curves() -> ScoringCurves {
        ScoringCurves::default()
    }

    fn test_request(budget: Option<f64>) -> MatchRequest {
        MatchRequest {
            id: Uuid::new_v4(),
            category_id: "plumbing".to_string(),
            address: "10 Rue Oberkampf, Paris".to_string(),
            coordinates: None,
            preferred_at: None,
            alternative_dates: vec![],
            budget,
            estimated_duration_minutes: Some(120),
            created_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
        }
    }

    fn test_candidate() -> MatchCandidate {
        MatchCandidate {
            id: Uuid::new_v4(),
            display_name: "Test Provider".to_string(),
            category_id: "plumbing".to_string(),
            address: "25 Avenue de la République, Paris".to_string(),
            coordinates: None,
            service_radius_km: Some(20.0),
            hourly_rate: None,
            average_rating: None,
            completed_bookings: 0,
            response_rate: None,
            availability: vec![],
            is_approved: true,
            is_active: true,
        }
    }

    #[test]
    fn test_distance_score_formula() {
        // Half the radius away -> 50
        assert_eq!(distance_score(Some(10.0), 20.0), 50.0);
        // At the boundary -> exactly 0
        assert_eq!(distance_score(Some(20.0), 20.0), 0.0);
        // Beyond the boundary -> exactly 0
        assert_eq!(distance_score(Some(25.0), 20.0), 0.0);
        // On top of the request -> 100
        assert_eq!(distance_score(Some(0.0), 20.0), 100.0);
    }

    #[test]
    fn test_distance_score_monotonic() {
        let mut previous = f64::INFINITY;
        for step in 0..=40 {
            let d = step as f64;
            let score = distance_score(Some(d), 20.0);
            assert!(score <= previous, "closer distance must never score lower");
            assert!((0.0..=100.0).contains(&score));
            previous = score;
        }
    }

    #[test]
    fn test_distance_score_unresolved_is_zero() {
        assert_eq!(distance_score(None, 20.0), 0.0);
        assert_eq!(distance_score(Some(5.0), 0.0), 0.0);
    }

    #[test]
    fn test_rating_score_mapping() {
        let c = curves();
        assert_eq!(rating_score(Some(5.0), &c), 100.0);
        assert_eq!(rating_score(Some(4.0), &c), 80.0);
        assert_eq!(rating_score(Some(3.0), &c), 60.0);
        // Below the floor collapses to 0
        assert_eq!(rating_score(Some(2.9), &c), 0.0);
        // Unrated is neutral, not punished
        assert_eq!(rating_score(None, &c), 50.0);
        assert_eq!(rating_score(Some(0.0), &c), 50.0);
    }

    #[test]
    fn test_rating_score_monotonic_above_floor() {
        let c = curves();
        let mut previous = 0.0;
        for step in 30..=50 {
            let rating = step as f64 / 10.0;
            let score = rating_score(Some(rating), &c);
            assert!(score >= previous, "higher rating must never score lower");
            previous = score;
        }
    }

    #[test]
    fn test_experience_ramp_breakpoints() {
        let c = curves();
        assert_eq!(experience_score(0, &c), 30.0);
        assert_eq!(experience_score(5, &c), 50.0);
        assert_eq!(experience_score(20, &c), 70.0);
        assert_eq!(experience_score(50, &c), 85.0);
    }

    #[test]
    fn test_experience_saturates_toward_100() {
        let c = curves();
        let mut previous = 0.0;
        for bookings in [0, 1, 5, 10, 20, 50, 100, 500, 10_000] {
            let score = experience_score(bookings, &c);
            assert!(score >= previous);
            assert!(score <= 100.0);
            previous = score;
        }
        assert!(experience_score(10_000, &c) > 95.0);
        assert!(experience_score(10_000, &c) < 100.0);
    }

    #[test]
    fn test_price_bands() {
        let c = curves();
        assert_eq!(price_score(Some(105.0), Some(100.0), &c), 100.0);
        assert_eq!(price_score(Some(115.0), Some(100.0), &c), 85.0);
        assert_eq!(price_score(Some(125.0), Some(100.0), &c), 70.0);
        assert_eq!(price_score(Some(145.0), Some(100.0), &c), 50.0);
        assert_eq!(price_score(Some(200.0), Some(100.0), &c), 30.0);
        // Undercutting the budget is banded the same way
        assert_eq!(price_score(Some(95.0), Some(100.0), &c), 100.0);
    }

    #[test]
    fn test_price_missing_data_is_neutral() {
        let c = curves();
        assert_eq!(price_score(None, Some(100.0), &c), 70.0);
        assert_eq!(price_score(Some(50.0), None, &c), 70.0);
        // Zero budget carries no signal and must not divide by zero
        assert_eq!(price_score(Some(50.0), Some(0.0), &c), 70.0);
    }

    #[test]
    fn test_response_rate_identity() {
        let c = curves();
        assert_eq!(response_rate_score(Some(90.0), &c), 90.0);
        assert_eq!(response_rate_score(Some(130.0), &c), 100.0);
        assert_eq!(response_rate_score(None, &c), 70.0);
    }

    #[test]
    fn test_weight_validation() {
        assert!(validate_weights(&Weights::default()).is_ok());

        let mut low = Weights::default();
        low.distance = 0.10; // sums to 0.80
        assert!(validate_weights(&low).is_err());

        let mut high = Weights::default();
        high.availability = 0.55; // sums to 1.30
        assert!(validate_weights(&high).is_err());

        let mut negative = Weights::default();
        negative.price = -0.10;
        negative.distance = 0.50;
        assert!(validate_weights(&negative).is_err());
    }

    #[test]
    fn test_curves_validation() {
        assert!(curves().validate().is_ok());

        let mut bad_ramp = curves();
        bad_ramp.experience_ramp = vec![(0, 30.0), (5, 20.0)];
        assert!(bad_ramp.validate().is_err());

        let mut bad_band = curves();
        bad_band.price_bands = vec![(0.10, 100.0), (0.05, 85.0)];
        assert!(bad_band.validate().is_err());

        let mut bad_neutral = curves();
        bad_neutral.neutral_price = 140.0;
        assert!(bad_neutral.validate().is_err());
    }

    #[test]
    fn test_score_candidate_scenario() {
        // Provider 10km away with a 20km radius, top rating, brand new,
        // budget matched within 5%, 90% response rate, no preferred date
        // (availability comes out neutral at 50):
        // 0.30*50 + 0.25*50 + 0.20*100 + 0.10*30 + 0.10*100 + 0.05*90 = 65.0
        let request = test_request(Some(100.0));
        let mut candidate = test_candidate();
        candidate.average_rating = Some(5.0);
        candidate.hourly_rate = Some(105.0);
        candidate.response_rate = Some(90.0);

        let breakdown = score_candidate(
            &request,
            &candidate,
            Some(10.0),
            &Weights::default(),
            &curves(),
        );

        assert_eq!(breakdown.distance, 50.0);
        assert_eq!(breakdown.availability, 50.0);
        assert_eq!(breakdown.rating, 100.0);
        assert_eq!(breakdown.experience, 30.0);
        assert_eq!(breakdown.price, 100.0);
        assert_eq!(breakdown.response_rate, 90.0);
        assert_eq!(breakdown.total, 65.0);
    }

    #[test]
    fn test_score_bounds_on_edge_inputs() {
        let request = test_request(Some(0.0));
        let mut candidate = test_candidate();
        candidate.average_rating = Some(0.0);
        candidate.hourly_rate = None;
        candidate.service_radius_km = Some(0.0);

        let breakdown = score_candidate(
            &request,
            &candidate,
            Some(0.0),
            &Weights::default(),
            &curves(),
        );

        for sub in [
            breakdown.distance,
            breakdown.availability,
            breakdown.rating,
            breakdown.experience,
            breakdown.price,
            breakdown.response_rate,
            breakdown.total,
        ] {
            assert!((0.0..=100.0).contains(&sub));
        }
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(77.499), 77.5);
        assert_eq!(round2(39.994), 39.99);
        assert_eq!(round2(40.0), 40.0);
    }
}
