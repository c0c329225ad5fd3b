use actix_cors::Cors;
use actix_web::{error, http::StatusCode, middleware, web, App, HttpResponse, HttpServer};
use presta_match::config::Settings;
use presta_match::core::{MatchEngine, ScoringCurves};
use presta_match::models::Weights;
use presta_match::routes;
use presta_match::routes::matches::AppState;
use presta_match::services::{GeoCache, GeocodeBackend, Geocoder, NotificationClient, StorageClient};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// JSON error response for JSON payload errors
#[derive(Debug, serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

impl std::fmt::Display for JsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

impl std::error::Error for JsonError {}

impl error::ResponseError for JsonError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::BAD_REQUEST))
            .content_type("application/json")
            .body(serde_json::to_string(self).unwrap())
    }
}

/// Handle JSON payload errors
pub fn handle_json_payload_error(
    err: error::JsonPayloadError,
    req: &actix_web::HttpRequest,
) -> actix_web::Error {
    tracing::info!("JSON payload error on {}: {}", req.path(), err);
    JsonError {
        error: "invalid_json".to_string(),
        message: format!("Invalid JSON: {}", err),
        status_code: 400,
    }
    .into()
}

/// Handle query payload errors
pub fn handle_query_payload_error(
    err: error::QueryPayloadError,
    _req: &actix_web::HttpRequest,
) -> actix_web::Error {
    JsonError {
        error: "invalid_query".to_string(),
        message: format!("Invalid query: {}", err),
        status_code: 400,
    }
    .into()
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    // Initialize logging
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());

    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true);

    if log_format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.init();
    }

    info!("Starting Presta Match service...");

    // Load configuration
    let settings = Settings::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        panic!("Configuration error: {}", e);
    });

    info!("Configuration loaded successfully");

    // Initialize the geocode cache; redis is the shared tier, and its
    // absence only costs cross-instance reuse
    let ttl_secs = settings.geocoding.cache_ttl_secs;
    let l1_size = settings.geocoding.l1_cache_size;

    let cache = match &settings.cache.redis_url {
        Some(redis_url) => match GeoCache::connect(redis_url, l1_size, ttl_secs).await {
            Ok(cache) => {
                info!(
                    "Geocode cache initialized with redis tier (L1: {} entries, TTL: {}s)",
                    l1_size, ttl_secs
                );
                cache
            }
            Err(e) => {
                warn!("Failed to connect to Redis ({}), caching in-process only", e);
                GeoCache::in_memory(l1_size, ttl_secs)
            }
        },
        None => {
            info!("No redis configured, caching geocode results in-process only");
            GeoCache::in_memory(l1_size, ttl_secs)
        }
    };

    // Select the geocoding backend
    let backend = match settings.geocoding.provider.as_str() {
        "nominatim" => GeocodeBackend::Nominatim {
            base_url: settings.geocoding.nominatim_url.clone(),
        },
        "locationiq" => {
            let api_key = settings
                .geocoding
                .locationiq_api_key
                .clone()
                .unwrap_or_else(|| {
                    error!("LocationIQ selected but no API key configured");
                    panic!("Configuration error: missing LocationIQ API key");
                });
            GeocodeBackend::LocationIq {
                base_url: settings.geocoding.locationiq_url.clone(),
                api_key,
            }
        }
        other => {
            error!("Unknown geocoding provider: {}", other);
            panic!("Configuration error: unknown geocoding provider {}", other);
        }
    };

    let geocoder = Arc::new(Geocoder::new(
        backend,
        cache,
        Duration::from_secs(settings.geocoding.timeout_secs),
    ));

    info!(
        "Geocoder initialized (provider: {}, timeout: {}s)",
        settings.geocoding.provider, settings.geocoding.timeout_secs
    );

    // Initialize the matching engine with configured weights and curves
    let weights = Weights {
        distance: settings.scoring.weights.distance,
        availability: settings.scoring.weights.availability,
        rating: settings.scoring.weights.rating,
        experience: settings.scoring.weights.experience,
        price: settings.scoring.weights.price,
        response_rate: settings.scoring.weights.response_rate,
    };

    let curves = ScoringCurves {
        rating_floor: settings.scoring.rating_floor,
        ..ScoringCurves::default()
    };

    let engine = MatchEngine::new(
        weights,
        curves,
        Arc::clone(&geocoder),
        settings.matching.resolver_concurrency,
    )
    .unwrap_or_else(|e| {
        error!("Invalid matching configuration: {}", e);
        panic!("Configuration error: {}", e);
    });

    info!("Match engine initialized with weights: {:?}", weights);

    // Initialize the storage client
    let storage = Arc::new(
        StorageClient::from_settings(
            &settings.database.url,
            settings.database.max_connections,
            settings.database.min_connections,
        )
        .await
        .unwrap_or_else(|e| {
            error!("Failed to connect to PostgreSQL: {}", e);
            panic!("PostgreSQL connection error: {}", e);
        }),
    );

    info!("Storage client initialized");

    // Initialize the notification dispatch client
    let notifier = Arc::new(NotificationClient::new(
        settings.notifications.endpoint.clone(),
        settings.notifications.api_key.clone(),
    ));

    // Build application state
    let app_state = AppState {
        storage,
        notifier,
        geocoder,
        engine,
        min_score_threshold: settings.matching.min_score_threshold,
        max_limit: settings.matching.max_limit,
        search_radius_km: settings.matching.search_radius_km,
    };

    // Configure HTTP server
    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().error_handler(handle_json_payload_error))
            .app_data(web::QueryConfig::default().error_handler(handle_query_payload_error))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
