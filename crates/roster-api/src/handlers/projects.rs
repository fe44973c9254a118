//! Project API handlers
//!
//! All routes here are behind the request gate; the caller's user id comes
//! from the access token subject.

use crate::auth::AuthenticatedSubject;
use crate::error::AppError;
use crate::extractors::{ApiJson, ApiPath, ApiQuery};
use crate::projects::{
    ProjectCreate, ProjectDeleted, ProjectRead, ProjectUpdate, ProjectsList, ProjectsPage,
    ProjectsQuery,
};
use crate::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

#[utoipa::path(
    get,
    path = "/api/v1/projects/{id}",
    tag = "projects",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Project found", body = ProjectRead),
        (status = 404, description = "Project not found", body = crate::error::ApiError),
    )
)]
pub async fn get_project(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<ProjectRead>, AppError> {
    let project = state.projects.get(id).await?;
    Ok(Json(ProjectRead::from(project)))
}

/// One page of projects, optionally filtered by status or person in charge
#[utoipa::path(
    get,
    path = "/api/v1/projects",
    tag = "projects",
    security(("bearer" = [])),
    params(ProjectsQuery),
    responses(
        (status = 200, description = "Projects page", body = ProjectsPage),
        (status = 422, description = "Invalid page selection", body = crate::error::ApiError),
    )
)]
pub async fn list_projects(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<ProjectsQuery>,
) -> Result<Json<ProjectsPage>, AppError> {
    let page = state.projects.list(query.into_filter()?).await?;
    Ok(Json(ProjectsPage::from(page)))
}

#[utoipa::path(
    post,
    path = "/api/v1/projects",
    tag = "projects",
    security(("bearer" = [])),
    request_body = ProjectCreate,
    responses(
        (status = 201, description = "Project created", body = ProjectRead),
        (status = 409, description = "Name taken or unknown person", body = crate::error::ApiError),
        (status = 422, description = "Invalid input", body = crate::error::ApiError),
    )
)]
pub async fn create_project(
    State(state): State<Arc<AppState>>,
    Extension(subject): Extension<AuthenticatedSubject>,
    ApiJson(request): ApiJson<ProjectCreate>,
) -> Result<impl IntoResponse, AppError> {
    let project = state.projects.create(subject.user_id()?, request).await?;
    Ok((StatusCode::CREATED, Json(ProjectRead::from(project))))
}

#[utoipa::path(
    post,
    path = "/api/v1/projects/bulk",
    tag = "projects",
    security(("bearer" = [])),
    request_body = Vec<ProjectCreate>,
    responses(
        (status = 201, description = "Projects created", body = ProjectsList),
        (status = 409, description = "Name taken or unknown person", body = crate::error::ApiError),
        (status = 422, description = "Invalid input", body = crate::error::ApiError),
    )
)]
pub async fn create_projects_bulk(
    State(state): State<Arc<AppState>>,
    Extension(subject): Extension<AuthenticatedSubject>,
    ApiJson(requests): ApiJson<Vec<ProjectCreate>>,
) -> Result<impl IntoResponse, AppError> {
    let projects = state.projects.create_many(subject.user_id()?, requests).await?;
    Ok((StatusCode::CREATED, Json(ProjectsList::from(projects))))
}

#[utoipa::path(
    patch,
    path = "/api/v1/projects/{id}",
    tag = "projects",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Project ID")),
    request_body = ProjectUpdate,
    responses(
        (status = 200, description = "Project updated", body = ProjectRead),
        (status = 403, description = "Caller is not in charge", body = crate::error::ApiError),
        (status = 404, description = "Project not found", body = crate::error::ApiError),
        (status = 422, description = "Invalid input", body = crate::error::ApiError),
    )
)]
pub async fn update_project(
    State(state): State<Arc<AppState>>,
    Extension(subject): Extension<AuthenticatedSubject>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(request): ApiJson<ProjectUpdate>,
) -> Result<Json<ProjectRead>, AppError> {
    let project = state.projects.update(subject.user_id()?, id, request).await?;
    Ok(Json(ProjectRead::from(project)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/projects/{id}",
    tag = "projects",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Project deleted", body = ProjectDeleted),
        (status = 403, description = "Caller is not in charge", body = crate::error::ApiError),
        (status = 404, description = "Project not found", body = crate::error::ApiError),
    )
)]
pub async fn delete_project(
    State(state): State<Arc<AppState>>,
    Extension(subject): Extension<AuthenticatedSubject>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<ProjectDeleted>, AppError> {
    let project = state.projects.delete(subject.user_id()?, id).await?;
    Ok(Json(ProjectDeleted {
        project: ProjectRead::from(project),
        deleted: true,
    }))
}
