//! Persistence collaborator for the project entity.

pub mod models;
pub mod repository;

pub use models::Project;
pub use repository::{ProjectRepo, Repository};
