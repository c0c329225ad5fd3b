use crate::models::{MatchFilters, MatchResult, RequestMatch, RequestSortKey};
use std::cmp::Ordering;

/// Availability sub-score at or above which a candidate counts as
/// "available now" for filtering purposes
const AVAILABLE_NOW_THRESHOLD: f64 = 80.0;

/// Check a ranked result against the caller's filters (AND-combined)
///
/// Absent filters always pass; a filter on a field the candidate does not
/// carry (e.g. max price with no hourly rate) passes rather than excluding
/// providers for missing optional data.
pub fn passes_filters(result: &MatchResult, filters: &MatchFilters) -> bool {
    if let Some(min_rating) = filters.min_rating {
        match result.average_rating {
            Some(rating) if rating >= min_rating => {}
            _ => return false,
        }
    }

    if let Some(max_rate) = filters.max_hourly_rate {
        if let Some(rate) = result.hourly_rate {
            if rate > max_rate {
                return false;
            }
        }
    }

    if let Some(max_distance) = filters.max_distance_km {
        match result.distance_km {
            Some(distance) if distance <= max_distance => {}
            _ => return false,
        }
    }

    if let Some(min_experience) = filters.min_experience {
        if result.completed_bookings < min_experience {
            return false;
        }
    }

    if let Some(min_score) = filters.min_score {
        if result.total_score < min_score {
            return false;
        }
    }

    if filters.available_now && result.breakdown.availability < AVAILABLE_NOW_THRESHOLD {
        return false;
    }

    true
}

/// Rank results: total score descending, distance ascending, id ascending
///
/// The identity tie-break makes the order fully deterministic across runs,
/// which pagination depends on.
pub fn sort_results(results: &mut [MatchResult]) {
    results.sort_by(|a, b| {
        b.total_score
            .total_cmp(&a.total_score)
            .then_with(|| cmp_distance(a.distance_km, b.distance_km))
            .then_with(|| a.candidate_id.cmp(&b.candidate_id))
    });
}

/// Order the provider feed by the caller-selected key
///
/// Every chain ends in the request id so repeated calls paginate stably.
pub fn sort_request_matches(results: &mut [RequestMatch], key: RequestSortKey) {
    results.sort_by(|a, b| {
        let primary = match key {
            RequestSortKey::Score => b.total_score.total_cmp(&a.total_score),
            RequestSortKey::Distance => cmp_distance(a.distance_km, b.distance_km),
            RequestSortKey::Budget => cmp_budget(a.budget, b.budget),
            RequestSortKey::Recency => b.created_at.cmp(&a.created_at),
        };

        primary
            .then_with(|| b.total_score.total_cmp(&a.total_score))
            .then_with(|| cmp_distance(a.distance_km, b.distance_km))
            .then_with(|| a.request_id.cmp(&b.request_id))
    });
}

/// Ascending by distance; unknown distances sort last
#[inline]
fn cmp_distance(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(da), Some(db)) => da.total_cmp(&db),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Descending by budget; requests without one sort last
#[inline]
fn cmp_budget(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(ba), Some(bb)) => bb.total_cmp(&ba),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
