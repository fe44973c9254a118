//! Project service
//!
//! Ownership rule: only the person in charge may change or delete a
//! project. Unowned projects are open to any authenticated user.

use super::models::{ProjectCreate, ProjectUpdate};
use roster_core::projects::OWNER_MISSING;
use roster_core::{
    NewProject, ProjectFilter, ProjectPage, ProjectPatch, ProjectRecord, ProjectStore, Result,
    RosterError, UserStore,
};
use std::sync::Arc;
use validator::ValidationErrors;

#[derive(Clone)]
pub struct ProjectService {
    projects: Arc<dyn ProjectStore>,
    users: Arc<dyn UserStore>,
}

fn validation_error(errors: ValidationErrors) -> RosterError {
    RosterError::ValidationError(errors.to_string())
}

fn not_found() -> RosterError {
    RosterError::NotFound("Project".to_string())
}

impl ProjectService {
    pub fn new(projects: Arc<dyn ProjectStore>, users: Arc<dyn UserStore>) -> Self {
        Self { projects, users }
    }

    pub async fn get(&self, id: i64) -> Result<ProjectRecord> {
        self.projects.find_by_id(id).await?.ok_or_else(not_found)
    }

    pub async fn list(&self, filter: ProjectFilter) -> Result<ProjectPage> {
        self.projects.list(filter).await
    }

    /// Create a project on behalf of `caller`
    pub async fn create(&self, caller: i64, request: ProjectCreate) -> Result<ProjectRecord> {
        let project = self.prepare(caller, request).await?;
        self.projects.insert(project).await
    }

    /// Create several projects; nothing is stored if any entry fails
    pub async fn create_many(
        &self,
        caller: i64,
        requests: Vec<ProjectCreate>,
    ) -> Result<Vec<ProjectRecord>> {
        let mut projects = Vec::with_capacity(requests.len());
        for request in requests {
            projects.push(self.prepare(caller, request).await?);
        }
        self.projects.insert_many(projects).await
    }

    pub async fn update(
        &self,
        caller: i64,
        id: i64,
        request: ProjectUpdate,
    ) -> Result<ProjectRecord> {
        request.check().map_err(validation_error)?;
        let existing = self.managed(caller, id).await?;

        let start = request.start_time.or(existing.start_time);
        let complete = request.complete_time.or(existing.complete_time);
        if matches!((start, complete), (Some(start), Some(complete)) if complete < start) {
            return Err(RosterError::ValidationError(
                "complete_time must not precede start_time".to_string(),
            ));
        }
        if let Some(person) = request.person_in_charge {
            self.require_user(person).await?;
        }

        let patch = ProjectPatch {
            status: request.status,
            start_time: request.start_time,
            complete_time: request.complete_time,
            description: request.description,
            person_in_charge: request.person_in_charge,
        };
        self.projects.update(id, patch).await?.ok_or_else(not_found)
    }

    pub async fn delete(&self, caller: i64, id: i64) -> Result<ProjectRecord> {
        self.managed(caller, id).await?;
        self.projects.delete(id).await?.ok_or_else(not_found)
    }

    /// Leave the projects of a removed user without a person in charge
    pub async fn release_owner(&self, user_id: i64) -> Result<u64> {
        let released = self.projects.clear_owner(user_id).await?;
        if released > 0 {
            tracing::info!(user_id, released, "Released projects of deleted user");
        }
        Ok(released)
    }

    async fn managed(&self, caller: i64, id: i64) -> Result<ProjectRecord> {
        let project = self.get(id).await?;
        if !project.is_managed_by(caller) {
            return Err(RosterError::Forbidden(
                "only the person in charge may change this project".to_string(),
            ));
        }
        Ok(project)
    }

    async fn prepare(&self, caller: i64, request: ProjectCreate) -> Result<NewProject> {
        request.check().map_err(validation_error)?;
        let person = request.person_in_charge.unwrap_or(caller);
        self.require_user(person).await?;
        Ok(NewProject {
            name: request.name.trim().to_string(),
            status: request.status,
            description: request.description,
            person_in_charge: Some(person),
        })
    }

    async fn require_user(&self, id: i64) -> Result<()> {
        match self.users.find_by_id(id).await? {
            Some(_) => Ok(()),
            None => Err(RosterError::Integrity(OWNER_MISSING.to_string())),
        }
    }
}
