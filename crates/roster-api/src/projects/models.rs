//! Project request and response models

use crate::users::models::{field_error, into_result};
use chrono::{DateTime, Utc};
use roster_core::projects::{PAGE_DEFAULT, PER_PAGE_DEFAULT, PER_PAGE_MAX, PROJECT_NAME_MAX_LEN};
use roster_core::{ProjectFilter, ProjectOrder, ProjectPage, ProjectRecord, ProjectStatus};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::ValidationErrors;

/// New project
///
/// `person_in_charge` defaults to the caller.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ProjectCreate {
    #[schema(example = "apollo")]
    pub name: String,
    #[serde(default)]
    #[schema(value_type = String, example = "new")]
    pub status: ProjectStatus,
    pub description: Option<String>,
    pub person_in_charge: Option<i64>,
}

impl ProjectCreate {
    pub fn check(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let len = self.name.trim().chars().count();
        if len == 0 {
            errors.add("name", field_error("blank", "Project name must not be blank"));
        } else if len > PROJECT_NAME_MAX_LEN {
            errors.add(
                "name",
                field_error("length", "Project name must be at most 255 characters"),
            );
        }
        into_result(errors)
    }
}

/// Partial update; the name cannot be changed
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ProjectUpdate {
    #[schema(value_type = Option<String>, example = "in_progress")]
    pub status: Option<ProjectStatus>,
    pub start_time: Option<DateTime<Utc>>,
    pub complete_time: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub person_in_charge: Option<i64>,
}

impl ProjectUpdate {
    pub fn check(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.status.is_none()
            && self.start_time.is_none()
            && self.complete_time.is_none()
            && self.description.is_none()
            && self.person_in_charge.is_none()
        {
            errors.add(
                "__all__",
                field_error("empty_update", "At least one field must be provided"),
            );
        }
        into_result(errors)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProjectRead {
    pub id: i64,
    pub name: String,
    #[schema(value_type = String, example = "new")]
    pub status: ProjectStatus,
    pub description: Option<String>,
    pub person_in_charge: Option<i64>,
    pub create_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub complete_time: Option<DateTime<Utc>>,
}

impl From<ProjectRecord> for ProjectRead {
    fn from(record: ProjectRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            status: record.status,
            description: record.description,
            person_in_charge: record.person_in_charge,
            create_time: record.create_time,
            start_time: record.start_time,
            complete_time: record.complete_time,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProjectsPage {
    pub items: Vec<ProjectRead>,
    pub page: i64,
    pub per_page: i64,
    pub total_count: i64,
    pub has_prev: bool,
    pub has_next: bool,
}

impl From<ProjectPage> for ProjectsPage {
    fn from(page: ProjectPage) -> Self {
        Self {
            items: page.items.into_iter().map(ProjectRead::from).collect(),
            page: page.page,
            per_page: page.per_page,
            total_count: page.total_count,
            has_prev: page.has_prev,
            has_next: page.has_next,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProjectsList {
    pub projects: Vec<ProjectRead>,
}

impl From<Vec<ProjectRecord>> for ProjectsList {
    fn from(records: Vec<ProjectRecord>) -> Self {
        Self {
            projects: records.into_iter().map(ProjectRead::from).collect(),
        }
    }
}

/// Deleted project with a `deleted: true` marker
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProjectDeleted {
    #[serde(flatten)]
    pub project: ProjectRead,
    pub deleted: bool,
}

/// `GET /projects` filter and page selection
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProjectsQuery {
    /// Page number, starting at 1
    pub page: Option<i64>,
    /// Page size, 1-100 (default 20)
    pub per_page: Option<i64>,
    #[param(value_type = Option<String>, example = "in_progress")]
    pub status: Option<ProjectStatus>,
    /// Only projects whose person in charge is this user
    pub person_id: Option<i64>,
    /// `create_time`, `start_time` or `complete_time`
    #[param(value_type = Option<String>, example = "create_time")]
    pub order_by: Option<ProjectOrder>,
    /// Newest first unless `false`
    pub desc: Option<bool>,
}

impl ProjectsQuery {
    pub fn into_filter(self) -> Result<ProjectFilter, ValidationErrors> {
        let page = self.page.unwrap_or(PAGE_DEFAULT);
        let per_page = self.per_page.unwrap_or(PER_PAGE_DEFAULT);

        let mut errors = ValidationErrors::new();
        if page < 1 {
            errors.add("page", field_error("range", "page must be at least 1"));
        }
        if !(1..=PER_PAGE_MAX).contains(&per_page) {
            errors.add("per_page", field_error("range", "per_page must be 1 to 100"));
        }
        into_result(errors)?;

        Ok(ProjectFilter {
            status: self.status,
            person_id: self.person_id,
            order_by: self.order_by.unwrap_or_default(),
            desc: self.desc.unwrap_or(true),
            page,
            per_page,
        })
    }
}
