//! Roster API - REST server with JWT authentication
//!
//! Provides login, token refresh and revocation endpoints plus gated
//! user and project management.

pub mod audit;
pub mod auth;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod openapi;
pub mod projects;
pub mod routes;
pub mod state;
pub mod users;

use crate::auth::auth_gate;
use crate::handlers::health;
use crate::openapi::ApiDoc;
use crate::state::AppState;
use axum::{http::HeaderValue, middleware, routing::get, Router};
use roster_core::ServerConfig;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Build the full application router
///
/// The request gate wraps every route; the allow-list in
/// [`AppState::public_routes`] decides which ones skip it.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = build_cors_layer(&state.config.server);

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .nest("/api/v1", routes::api_routes())
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn_with_state(state.clone(), auth_gate))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if config.cors_origins.is_empty() || config.cors_origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    cors.allow_origin(AllowOrigin::list(origins))
}

/// Secret used by [`create_test_state`]
#[cfg(any(test, feature = "test-utils"))]
pub const TEST_SECRET: &str = "roster-test-secret";

/// In-memory state with a fixed secret and cheap password hashing
#[cfg(any(test, feature = "test-utils"))]
pub fn create_test_state() -> Arc<AppState> {
    let mut config = roster_core::AppConfig::default();
    config.auth.secret = TEST_SECRET.to_string();
    create_test_state_with(config)
}

#[cfg(any(test, feature = "test-utils"))]
pub fn create_test_state_with(config: roster_core::AppConfig) -> Arc<AppState> {
    let state = AppState::in_memory(config, auth::PasswordConfig::light())
        .unwrap_or_else(|e| panic!("test state: {e}"));
    Arc::new(state)
}

/// Router over [`create_test_state`]
#[cfg(any(test, feature = "test-utils"))]
pub fn create_router_for_testing() -> Router {
    create_router(create_test_state())
}
