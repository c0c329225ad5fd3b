use crate::core::{FeedOptions, MatchEngine, MatchOptions};
use crate::models::{
    ErrorResponse, FindMatchesRequest, FindMatchesResponse, HealthResponse, MatchRequest,
    MatchingStatistics, NotifyMatchesRequest, ProviderFeedRequest, ProviderFeedResponse,
    ScoreDistribution,
};
use crate::services::{Geocoder, NotificationClient, StorageClient, StorageError};
use actix_web::{web, HttpResponse, Responder};
use std::sync::Arc;
use validator::Validate;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<StorageClient>,
    pub notifier: Arc<NotificationClient>,
    pub geocoder: Arc<Geocoder>,
    pub engine: MatchEngine,
    pub min_score_threshold: f64,
    pub max_limit: u16,
    pub search_radius_km: f64,
}

/// Configure all match-related routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/matches/find", web::post().to(find_matches))
        .route("/matches/provider-feed", web::post().to(provider_feed))
        .route("/matches/notify", web::post().to(notify_matches));
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let db_healthy = state.storage.health_check().await.unwrap_or(false);

    let status = if db_healthy { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// Rank providers for a service request
///
/// POST /api/v1/matches/find
///
/// Request body:
/// ```json
/// {
///   "requestId": "uuid",
///   "limit": 20,
///   "minScore": 40.0,
///   "filters": { "minRating": 4.0, "availableNow": true }
/// }
/// ```
async fn find_matches(
    state: web::Data<AppState>,
    req: web::Json<FindMatchesRequest>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        return HttpResponse::BadRequest().json(ErrorResponse {
            error: "Validation failed".to_string(),
            message: errors.to_string(),
            status_code: 400,
        });
    }

    // Cap limit to prevent excessive queries
    let limit = req.limit.min(state.max_limit) as usize;

    tracing::info!(
        "Finding matches for request: {}, limit: {}",
        req.request_id,
        limit
    );

    let request = match fetch_request(&state, req.request_id).await {
        Ok(request) => request,
        Err(response) => return response,
    };

    // Anchor address unresolvable: an empty, flagged result, not an error
    let Some((request, center)) = request else {
        return HttpResponse::Ok().json(FindMatchesResponse {
            matches: vec![],
            total_candidates: 0,
            statistics: empty_statistics(),
            geocoding_failed: true,
        });
    };

    let candidates = match state
        .storage
        .find_eligible_candidates(&request.category_id, center, state.search_radius_km)
        .await
    {
        Ok(candidates) => candidates,
        Err(e) => {
            tracing::error!("Failed to query candidates for {}: {}", req.request_id, e);
            return HttpResponse::InternalServerError().json(ErrorResponse {
                error: "Failed to query candidates".to_string(),
                message: e.to_string(),
                status_code: 500,
            });
        }
    };

    tracing::debug!("Found {} candidates for {}", candidates.len(), req.request_id);

    let options = MatchOptions {
        limit,
        min_score: req.min_score.unwrap_or(state.min_score_threshold),
        filters: req.filters,
    };

    let outcome = state
        .engine
        .find_matches_for_request(&request, candidates, &options)
        .await;

    tracing::info!(
        "Returning {} matches for request {} (from {} candidates)",
        outcome.matches.len(),
        req.request_id,
        outcome.total_candidates
    );

    HttpResponse::Ok().json(FindMatchesResponse {
        matches: outcome.matches,
        total_candidates: outcome.total_candidates,
        statistics: outcome.statistics,
        geocoding_failed: outcome.geocoding_failed,
    })
}

/// Ranked feed of open requests for a provider
///
/// POST /api/v1/matches/provider-feed
///
/// Request body:
/// ```json
/// {
///   "providerId": "uuid",
///   "page": 1,
///   "perPage": 20,
///   "sortBy": "score"
/// }
/// ```
async fn provider_feed(
    state: web::Data<AppState>,
    req: web::Json<ProviderFeedRequest>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        return HttpResponse::BadRequest().json(ErrorResponse {
            error: "Validation failed".to_string(),
            message: errors.to_string(),
            status_code: 400,
        });
    }

    let per_page = req.per_page.min(state.max_limit) as usize;
    let page = req.page.max(1) as usize;

    tracing::info!(
        "Building feed for provider: {}, page: {}",
        req.provider_id,
        page
    );

    let mut provider = match state.storage.get_provider(req.provider_id).await {
        Ok(provider) => provider,
        Err(StorageError::NotFound(what)) => {
            return HttpResponse::NotFound().json(ErrorResponse {
                error: "Provider not found".to_string(),
                message: what,
                status_code: 404,
            });
        }
        Err(e) => {
            tracing::error!("Failed to fetch provider {}: {}", req.provider_id, e);
            return HttpResponse::InternalServerError().json(ErrorResponse {
                error: "Failed to fetch provider".to_string(),
                message: e.to_string(),
                status_code: 500,
            });
        }
    };

    if provider.coordinates.is_none() {
        provider.coordinates = state.geocoder.geocode(&provider.address).await;
    }
    let Some(center) = provider.coordinates else {
        tracing::warn!(
            "Geocoding failed for provider {} (\"{}\")",
            provider.id,
            provider.address
        );
        return HttpResponse::Ok().json(ProviderFeedResponse {
            matches: vec![],
            total: 0,
            page,
            per_page,
            geocoding_failed: true,
        });
    };

    let radius = provider.effective_radius_km().max(state.search_radius_km);
    let open_requests = match state
        .storage
        .find_open_requests(&provider.category_id, center, radius)
        .await
    {
        Ok(requests) => requests,
        Err(e) => {
            tracing::error!(
                "Failed to query open requests for {}: {}",
                req.provider_id,
                e
            );
            return HttpResponse::InternalServerError().json(ErrorResponse {
                error: "Failed to query open requests".to_string(),
                message: e.to_string(),
                status_code: 500,
            });
        }
    };

    let quoted = match state.storage.quoted_request_ids(provider.id).await {
        Ok(ids) => ids,
        Err(e) => {
            tracing::warn!(
                "Failed to fetch quoted requests for {}, proceeding without exclusion: {}",
                provider.id,
                e
            );
            vec![]
        }
    };

    let options = FeedOptions {
        page,
        per_page,
        sort_by: req.sort_by,
        min_score: req.min_score.unwrap_or(state.min_score_threshold),
    };

    let outcome = state
        .engine
        .find_requests_for_provider(&provider, open_requests, &quoted, &options)
        .await;

    HttpResponse::Ok().json(ProviderFeedResponse {
        matches: outcome.matches,
        total: outcome.total,
        page,
        per_page,
        geocoding_failed: outcome.geocoding_failed,
    })
}

/// Notify the best-ranked providers for a request
///
/// POST /api/v1/matches/notify
///
/// Runs a match, then hands the selection to the delivery service. The
/// response reports per-candidate delivery outcomes; transport stays
/// entirely with the delivery service.
async fn notify_matches(
    state: web::Data<AppState>,
    req: web::Json<NotifyMatchesRequest>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        return HttpResponse::BadRequest().json(ErrorResponse {
            error: "Validation failed".to_string(),
            message: errors.to_string(),
            status_code: 400,
        });
    }

    let request = match fetch_request(&state, req.request_id).await {
        Ok(Some(found)) => found,
        Ok(None) => {
            return HttpResponse::Ok().json(serde_json::json!({
                "requestId": req.request_id,
                "notified": [],
                "geocodingFailed": true,
            }));
        }
        Err(response) => return response,
    };
    let (request, center) = request;

    let candidates = match state
        .storage
        .find_eligible_candidates(&request.category_id, center, state.search_radius_km)
        .await
    {
        Ok(candidates) => candidates,
        Err(e) => {
            tracing::error!("Failed to query candidates for {}: {}", req.request_id, e);
            return HttpResponse::InternalServerError().json(ErrorResponse {
                error: "Failed to query candidates".to_string(),
                message: e.to_string(),
                status_code: 500,
            });
        }
    };

    let options = MatchOptions {
        limit: req.limit.min(state.max_limit) as usize,
        min_score: state.min_score_threshold,
        ..Default::default()
    };

    let outcome = state
        .engine
        .find_matches_for_request(&request, candidates, &options)
        .await;

    let selected: Vec<uuid::Uuid> = outcome.matches.iter().map(|m| m.candidate_id).collect();

    let deliveries = match state
        .notifier
        .notify_candidates(req.request_id, &selected)
        .await
    {
        Ok(reports) => reports,
        Err(e) => {
            tracing::error!("Notification dispatch failed for {}: {}", req.request_id, e);
            return HttpResponse::BadGateway().json(ErrorResponse {
                error: "Notification dispatch failed".to_string(),
                message: e.to_string(),
                status_code: 502,
            });
        }
    };

    HttpResponse::Ok().json(serde_json::json!({
        "requestId": req.request_id,
        "notified": deliveries,
        "considered": outcome.total_candidates,
        "geocodingFailed": false,
    }))
}

/// Fetch a request and resolve its anchor coordinates
///
/// `Ok(None)` means the request exists but its address cannot be geocoded;
/// callers translate that into an empty, flagged response.
async fn fetch_request(
    state: &web::Data<AppState>,
    request_id: uuid::Uuid,
) -> Result<Option<(MatchRequest, crate::models::Coordinate)>, HttpResponse> {
    let mut request = match state.storage.get_request(request_id).await {
        Ok(request) => request,
        Err(StorageError::NotFound(what)) => {
            return Err(HttpResponse::NotFound().json(ErrorResponse {
                error: "Request not found".to_string(),
                message: what,
                status_code: 404,
            }));
        }
        Err(e) => {
            tracing::error!("Failed to fetch request {}: {}", request_id, e);
            return Err(HttpResponse::InternalServerError().json(ErrorResponse {
                error: "Failed to fetch request".to_string(),
                message: e.to_string(),
                status_code: 500,
            }));
        }
    };

    if request.coordinates.is_none() {
        request.coordinates = state.geocoder.geocode(&request.address).await;
    }

    match request.coordinates {
        Some(center) => Ok(Some((request, center))),
        None => {
            tracing::warn!(
                "Geocoding failed for request {} (\"{}\")",
                request.id,
                request.address
            );
            Ok(None)
        }
    }
}

fn empty_statistics() -> MatchingStatistics {
    MatchingStatistics {
        total_candidates: 0,
        scored_candidates: 0,
        average_score: 0.0,
        min_score: 0.0,
        max_score: 0.0,
        distribution: ScoreDistribution::default(),
    }
}
