//! REST API Routes Module
//!
//! Route handlers organized by entity type, plus the router builder that
//! applies metrics, request tracing and CORS.

pub mod agent;
pub mod handoff;
pub mod health;
pub mod task;

use std::time::Duration;

use axum::{
    http::{header, HeaderValue, Method},
    middleware::from_fn,
    routing::get,
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::ApiConfig;
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

pub use agent::create_router as agent_router;
pub use handoff::create_router as handoff_router;
pub use health::create_router as health_router;
pub use task::create_router as task_router;

/// Handler for /openapi.json when Swagger UI is not serving it.
#[cfg(not(feature = "swagger-ui"))]
async fn openapi_json() -> impl axum::response::IntoResponse {
    use utoipa::OpenApi;
    axum::Json(crate::openapi::ApiDoc::openapi())
}

/// Build the versioned entity routes.
fn build_entity_routes() -> Router<AppState> {
    Router::new()
        .nest("/tasks", task::create_router())
        .nest("/handoffs", handoff::create_router())
        .nest("/agents", agent::create_router())
}

/// Build the complete application router.
///
/// # Middleware Order (outer to inner)
/// 1. CORS - handles preflight requests
/// 2. TraceLayer - request/response spans
/// 3. Observability - per-route metrics (route layer, sees the matched path)
pub fn create_api_router(state: AppState, config: &ApiConfig) -> Router {
    let mut router = Router::new()
        .nest("/api/v1", build_entity_routes())
        .nest("/health", health::create_router())
        .route("/metrics", get(metrics_handler));

    #[cfg(feature = "swagger-ui")]
    {
        use crate::openapi::ApiDoc;
        use utoipa::OpenApi;
        use utoipa_swagger_ui::SwaggerUi;
        router = router.merge(SwaggerUi::new("/swagger-ui").url("/openapi.json", ApiDoc::openapi()));
    }
    #[cfg(not(feature = "swagger-ui"))]
    {
        router = router.route("/openapi.json", get(openapi_json));
    }

    router
        .route_layer(from_fn(observability_middleware))
        .with_state(state)
        // Router::layer wraps outward: TraceLayer first, then CORS outermost.
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(config))
}

/// Build CORS layer from configuration.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: Development mode - allowing all origins");
        cors.allow_origin(Any).allow_headers(Any)
    } else {
        tracing::info!(origins = ?config.cors_origins, "CORS: Restricting origins");
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        let cors = cors
            .allow_origin(origins)
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);
        if config.cors_allow_credentials {
            cors.allow_credentials(true)
        } else {
            cors
        }
    }
}
