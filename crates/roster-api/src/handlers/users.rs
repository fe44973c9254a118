//! User management API handlers
//!
//! All routes here are behind the request gate.

use crate::auth::AuthenticatedSubject;
use crate::error::AppError;
use crate::extractors::{ApiJson, ApiPath, ApiQuery};
use crate::state::AppState;
use crate::users::{UserCreate, UserDeleted, UserPublic, UserUpdate, UsersList, UsersQuery};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

/// Current user, resolved from the access token subject
#[utoipa::path(
    get,
    path = "/api/v1/users/me",
    tag = "users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Authenticated user", body = UserPublic),
        (status = 401, description = "Not authenticated", body = crate::error::ApiError),
        (status = 404, description = "User no longer exists", body = crate::error::ApiError),
    )
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(subject): Extension<AuthenticatedSubject>,
) -> Result<Json<UserPublic>, AppError> {
    let user = state.users.get(subject.user_id()?).await?;
    Ok(Json(UserPublic::from(user)))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/{id}",
    tag = "users",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "User ID")),
    responses(
        (status = 200, description = "User found", body = UserPublic),
        (status = 404, description = "User not found", body = crate::error::ApiError),
    )
)]
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<UserPublic>, AppError> {
    let user = state.users.get(id).await?;
    Ok(Json(UserPublic::from(user)))
}

/// List all users, or only those named by `ids`
#[utoipa::path(
    get,
    path = "/api/v1/users",
    tag = "users",
    security(("bearer" = [])),
    params(UsersQuery),
    responses(
        (status = 200, description = "Users", body = UsersList),
        (status = 422, description = "Malformed ids", body = crate::error::ApiError),
    )
)]
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<UsersQuery>,
) -> Result<Json<UsersList>, AppError> {
    let ids = query.parse_ids()?;
    let users = state.users.list(ids.as_deref()).await?;
    Ok(Json(UsersList::from(users)))
}

#[utoipa::path(
    post,
    path = "/api/v1/users",
    tag = "users",
    security(("bearer" = [])),
    request_body = UserCreate,
    responses(
        (status = 201, description = "User created", body = UserPublic),
        (status = 409, description = "Username or e-mail taken", body = crate::error::ApiError),
        (status = 422, description = "Invalid input", body = crate::error::ApiError),
    )
)]
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<UserCreate>,
) -> Result<impl IntoResponse, AppError> {
    let user = state.users.create(request).await?;
    Ok((StatusCode::CREATED, Json(UserPublic::from(user))))
}

/// Create several users at once; nothing is stored if any entry fails
#[utoipa::path(
    post,
    path = "/api/v1/users/bulk",
    tag = "users",
    security(("bearer" = [])),
    request_body = Vec<UserCreate>,
    responses(
        (status = 201, description = "Users created", body = UsersList),
        (status = 409, description = "Username or e-mail taken", body = crate::error::ApiError),
        (status = 422, description = "Invalid input", body = crate::error::ApiError),
    )
)]
pub async fn create_users_bulk(
    State(state): State<Arc<AppState>>,
    ApiJson(requests): ApiJson<Vec<UserCreate>>,
) -> Result<impl IntoResponse, AppError> {
    let users = state.users.create_many(requests).await?;
    Ok((StatusCode::CREATED, Json(UsersList::from(users))))
}

#[utoipa::path(
    patch,
    path = "/api/v1/users/{id}",
    tag = "users",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "User ID")),
    request_body = UserUpdate,
    responses(
        (status = 200, description = "User updated", body = UserPublic),
        (status = 404, description = "User not found", body = crate::error::ApiError),
        (status = 409, description = "Username or e-mail taken", body = crate::error::ApiError),
        (status = 422, description = "Invalid input", body = crate::error::ApiError),
    )
)]
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(request): ApiJson<UserUpdate>,
) -> Result<Json<UserPublic>, AppError> {
    let user = state.users.update(id, request).await?;
    Ok(Json(UserPublic::from(user)))
}

/// Delete a user and return the removed record
///
/// Projects the user was in charge of become unowned.
#[utoipa::path(
    delete,
    path = "/api/v1/users/{id}",
    tag = "users",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "User ID")),
    responses(
        (status = 200, description = "User deleted", body = UserDeleted),
        (status = 404, description = "User not found", body = crate::error::ApiError),
    )
)]
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<UserDeleted>, AppError> {
    let user = state.users.delete(id).await?;
    state.projects.release_owner(id).await?;
    Ok(Json(UserDeleted {
        user: UserPublic::from(user),
        deleted: true,
    }))
}
