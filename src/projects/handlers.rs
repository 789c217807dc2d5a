use actix_web::{http::StatusCode, web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::Authenticated;
use crate::db::Project;
use crate::error::{AppError, DatabaseError};
use crate::response::ApiResponse;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ProjectRequest {
    pub name: String,
    pub description: Option<String>,
}

impl ProjectRequest {
    fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::ValidationError("project name must not be empty".into()));
        }
        Ok(())
    }
}

/// Loads a project and checks that it belongs to `owner_id`. Someone else's
/// project reads as missing.
async fn owned_project(state: &AppState, owner_id: &str, id: Uuid) -> Result<Project, AppError> {
    let project = state.projects.find(id).await?;
    if project.owner_id != owner_id {
        warn!(function = "owned_project", uid = %owner_id, project = %id, "project owned by another subject");
        return Err(DatabaseError::NotFound.into());
    }
    Ok(project)
}

pub async fn create_project(
    auth: Authenticated,
    path: web::Path<String>,
    req: web::Json<ProjectRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let uid = path.into_inner();
    state.guard.authorize(&uid, &auth.0)?;
    req.validate()?;

    let req = req.into_inner();
    let project = Project::new(uid, req.name, req.description);
    state.projects.create(&project).await?;
    info!("Project {} created by {}", project.id, project.owner_id);

    Ok(HttpResponse::Created().json(ApiResponse::new(
        StatusCode::CREATED,
        "Project created",
        project,
    )))
}

pub async fn update_project(
    auth: Authenticated,
    path: web::Path<(String, Uuid)>,
    req: web::Json<ProjectRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let (uid, id) = path.into_inner();
    state.guard.authorize(&uid, &auth.0)?;
    req.validate()?;

    let req = req.into_inner();
    let mut project = owned_project(&state, &uid, id).await?;
    project.name = req.name;
    project.description = req.description;
    project.updated_at = Utc::now();
    state.projects.update(&project).await?;
    info!("Project {} updated by {}", project.id, project.owner_id);

    Ok(HttpResponse::Ok().json(ApiResponse::new(
        StatusCode::OK,
        "Project updated",
        project,
    )))
}

pub async fn delete_project(
    auth: Authenticated,
    path: web::Path<(String, Uuid)>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let (uid, id) = path.into_inner();
    state.guard.authorize(&uid, &auth.0)?;

    owned_project(&state, &uid, id).await?;
    state.projects.delete(id).await?;
    info!("Project {} deleted by {}", id, uid);

    Ok(HttpResponse::Ok().json(ApiResponse::new(
        StatusCode::OK,
        "Project deleted",
        (),
    )))
}
