use actix_web::{
    body::MessageBody,
    dev::{ServiceRequest, ServiceResponse},
    middleware::Next,
    web, Error, ResponseError,
};
use tracing::{error, warn};

use crate::error::{AppError, AuthError};
use crate::AppState;

/// Admission gate run ahead of routing. A denied request gets a 429 and
/// nothing else runs for it.
pub async fn rate_limit(
    req: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    let rejection = match req.app_data::<web::Data<AppState>>() {
        Some(state) if state.rate_limiter.allow() => None,
        Some(_) => {
            warn!(function = "rate_limit", path = %req.path(), "rate limit exceeded");
            Some(AppError::AuthError(AuthError::RateLimited))
        }
        None => {
            error!(function = "rate_limit", "application state missing");
            Some(AppError::InternalError("application state missing".into()))
        }
    };

    match rejection {
        Some(err) => Ok(req.into_response(err.error_response()).map_into_right_body()),
        None => next.call(req).await.map(ServiceResponse::map_into_left_body),
    }
}
