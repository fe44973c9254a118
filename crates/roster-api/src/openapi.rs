//! OpenAPI document

use crate::auth::{
    AuthResponse, LoginForm, LoginRequest, LogoutRequest, MessageResponse, RefreshRequest,
    TokenPair,
};
use crate::error::ApiError;
use crate::handlers::{auth, health, projects, users};
use crate::projects::{
    ProjectCreate, ProjectDeleted, ProjectRead, ProjectUpdate, ProjectsList, ProjectsPage,
};
use crate::users::{UserCreate, UserDeleted, UserPublic, UserUpdate, UsersList};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        health::readiness_check,
        auth::login_handler,
        auth::login_json_handler,
        auth::register_handler,
        auth::refresh_handler,
        auth::logout_handler,
        users::me_handler,
        users::get_user,
        users::list_users,
        users::create_user,
        users::create_users_bulk,
        users::update_user,
        users::delete_user,
        projects::get_project,
        projects::list_projects,
        projects::create_project,
        projects::create_projects_bulk,
        projects::update_project,
        projects::delete_project,
    ),
    components(schemas(
        ApiError,
        LoginForm,
        LoginRequest,
        RefreshRequest,
        LogoutRequest,
        TokenPair,
        AuthResponse,
        MessageResponse,
        UserCreate,
        UserUpdate,
        UserPublic,
        UsersList,
        UserDeleted,
        ProjectCreate,
        ProjectUpdate,
        ProjectRead,
        ProjectsPage,
        ProjectsList,
        ProjectDeleted,
        health::HealthResponse,
        health::ReadinessResponse,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "auth", description = "Login, registration and token lifecycle"),
        (name = "users", description = "User management"),
        (name = "projects", description = "Projects and their person in charge"),
        (name = "health", description = "Liveness and readiness probes"),
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
