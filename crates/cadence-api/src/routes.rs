//! API routes

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::{auth_middleware, AppState};
use crate::handlers::{automation, contacts, health, webhooks};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);

    // Health check routes (no auth required)
    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/live", get(health::liveness))
        .route("/ready", get(health::readiness))
        .with_state(state.clone());

    // Automation routes
    let automation_routes = Router::new().route("/run", post(automation::run_automation));

    // Contact timing routes
    let campaign_routes = Router::new()
        .route("/:campaign_id/due-contacts", get(contacts::due_contacts))
        .route(
            "/:campaign_id/contacts/:contact_id/next-send",
            get(contacts::next_send),
        )
        .route("/:campaign_id/sync-timings", post(contacts::sync_timings));

    // API v1 routes with authentication
    let api_v1 = Router::new()
        .nest("/automation", automation_routes)
        .nest("/campaigns", campaign_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state.clone());

    // Provider webhooks authenticate with their own signatures
    let webhook_routes = Router::new()
        .route("/mailgun", post(webhooks::mailgun))
        .route("/mailersend", post(webhooks::mailersend))
        .route("/smtp", post(webhooks::smtp))
        .route("/sendgrid", post(webhooks::sendgrid))
        .layer(DefaultBodyLimit::max(state.config.webhooks.max_body_bytes))
        .with_state(state.clone());

    let router = Router::new()
        .nest("/health", health_routes)
        .nest("/api/v1", api_v1)
        .nest("/webhooks", webhook_routes);

    let router = match cors_layer(&state.config.api.cors_origins) {
        Some(cors) => router.layer(cors),
        None => router,
    };

    router.layer(TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    if origins.is_empty() {
        return None;
    }

    let cors = CorsLayer::new().allow_methods([Method::GET, Method::POST]);
    if origins.iter().any(|o| o == "*") {
        return Some(cors.allow_origin(Any).allow_headers(Any));
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    Some(cors.allow_origin(origins).allow_headers([
        header::AUTHORIZATION,
        header::CONTENT_TYPE,
        HeaderName::from_static("x-api-key"),
    ]))
}
