use actix_web::{http::StatusCode, web, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::guard::Authenticated;
use super::session::ReferenceStatus;
use super::token::TokenPair;
use crate::error::AppError;
use crate::response::ApiResponse;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: i64,
    pub refresh_expires_at: i64,
}

impl From<TokenPair> for TokenResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            access_expires_at: pair.access_expires_at,
            refresh_expires_at: pair.refresh_expires_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReferenceResponse {
    pub reference_id: String,
    pub present: bool,
}

pub async fn logout(
    auth: Authenticated,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let Authenticated(details) = auth;

    if let Err(e) = state.guard.logout(&details).await {
        error!("Logout failed for uid {}: {}", details.subject_id, e);
        return Err(e);
    }

    Ok(HttpResponse::Ok().json(ApiResponse::new(
        StatusCode::OK,
        "Successfully logged out",
        (),
    )))
}

pub async fn refresh(
    req: web::Json<RefreshRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let pair = state.guard.refresh(&req.refresh_token).await?;
    info!("Token pair refreshed, new access uuid {}", pair.access_id);

    Ok(HttpResponse::Ok().json(ApiResponse::new(
        StatusCode::OK,
        "Token refreshed",
        TokenResponse::from(pair),
    )))
}

pub async fn put_reference(
    _auth: Authenticated,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let reference_id = path.into_inner();
    state.guard.sessions().put_one_time_reference(&reference_id).await?;

    Ok(HttpResponse::Created().json(ApiResponse::new(
        StatusCode::CREATED,
        "Reference created",
        ReferenceResponse {
            reference_id,
            present: true,
        },
    )))
}

pub async fn check_reference(
    _auth: Authenticated,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let reference_id = path.into_inner();
    let status = state.guard.sessions().has_one_time_reference(&reference_id).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(
        StatusCode::OK,
        "Reference checked",
        ReferenceResponse {
            reference_id,
            present: status == ReferenceStatus::Present,
        },
    )))
}
