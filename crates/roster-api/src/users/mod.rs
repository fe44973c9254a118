//! User management: request models and the service over `UserStore`

pub mod models;
pub mod service;

pub use models::{UserCreate, UserDeleted, UserPublic, UserUpdate, UsersList, UsersQuery};
pub use service::UserService;
