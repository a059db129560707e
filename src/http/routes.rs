use super::handlers;
use super::state::AppState;
use axum::{
    http::{request::Parts, HeaderValue},
    routing::{get, post},
    Router,
};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tower::ServiceBuilder;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// Browsers on the local 192.168.1.0/24 network
static PRIVATE_NETWORK_ORIGIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://192\.168\.1\.\d{1,3}(:\d+)?$").expect("private network origin regex")
});

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.service.cors_origins);

    Router::new()
        .route("/", get(handlers::index))
        // Health check
        .route("/health", get(handlers::health_check))
        // Session provisioning
        .route("/connect", post(handlers::connect))
        .route("/offer", post(handlers::offer))
        // Static browser client
        .route("/client", get(handlers::client_page))
        .layer(
            ServiceBuilder::new()
                // Add tracing middleware for request logging
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Arc<Vec<String>> = Arc::new(origins.to_vec());

    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _parts: &Parts| {
                origin
                    .to_str()
                    .map(|origin| is_allowed_origin(origin, &allowed))
                    .unwrap_or(false)
            },
        ))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// Whether `origin` is in the allow-list or on the private network
pub fn is_allowed_origin(origin: &str, allowed: &[String]) -> bool {
    allowed.iter().any(|a| a == origin) || PRIVATE_NETWORK_ORIGIN.is_match(origin)
}
