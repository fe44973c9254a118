//! API route definitions

use crate::handlers::{auth, projects, users};
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// API v1 routes, nested under `/api/v1`
///
/// The request gate runs in front of the whole router, so routes here are
/// gated unless their full path is allow-listed (everything under
/// `/api/v1/auth` is).
pub fn api_routes() -> Router<Arc<AppState>> {
    let auth_routes = Router::new()
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/login_json", post(auth::login_json_handler))
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/refresh", post(auth::refresh_handler))
        .route("/auth/logout", post(auth::logout_handler));

    let user_routes = Router::new()
        .route("/users", get(users::list_users).post(users::create_user))
        .route("/users/bulk", post(users::create_users_bulk))
        .route("/users/me", get(users::me_handler))
        .route(
            "/users/:id",
            get(users::get_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        );

    let project_routes = Router::new()
        .route("/projects", get(projects::list_projects).post(projects::create_project))
        .route("/projects/bulk", post(projects::create_projects_bulk))
        .route(
            "/projects/:id",
            get(projects::get_project)
                .patch(projects::update_project)
                .delete(projects::delete_project),
        );

    Router::new()
        .merge(auth_routes)
        .merge(user_routes)
        .merge(project_routes)
}
