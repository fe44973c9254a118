//! Projects: request models and the service over `ProjectStore`

pub mod models;
pub mod service;

pub use models::{
    ProjectCreate, ProjectDeleted, ProjectRead, ProjectUpdate, ProjectsList, ProjectsPage,
    ProjectsQuery,
};
pub use service::ProjectService;
