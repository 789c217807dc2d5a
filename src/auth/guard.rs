//! Request authentication and ownership checks.
//!
//! The guard is the only place where token and session failures meet the
//! HTTP layer. Whatever the underlying cause, callers see `Unauthorized`;
//! the cause is logged.

use actix_web::{dev::Payload, http::header::AUTHORIZATION, web, FromRequest, HttpRequest};
use futures::future::LocalBoxFuture;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::session::SessionStore;
use super::token::{split_refresh_id, AccessDetails, TokenPair, TokenService};
use crate::error::{AppError, AuthError, StoreError};
use crate::AppState;

pub const ADMIN_ROLE: &str = "admin";

pub struct AccessGuard {
    tokens: Arc<TokenService>,
    sessions: Arc<SessionStore>,
}

impl AccessGuard {
    pub fn new(tokens: Arc<TokenService>, sessions: Arc<SessionStore>) -> Self {
        Self { tokens, sessions }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Issues a token pair for `subject_id` and records its session.
    ///
    /// Not idempotent: every call opens a new session.
    pub async fn issue(&self, subject_id: &str, role: &str) -> Result<TokenPair, AppError> {
        let pair = self.tokens.issue_access_token(subject_id, role)?;
        self.sessions.persist(subject_id, &pair).await?;
        info!(uid = %subject_id, access_uuid = %pair.access_id, "session opened");
        Ok(pair)
    }

    /// Verifies the bearer credential and checks that its session is live.
    pub async fn authenticate(&self, header: Option<&str>) -> Result<AccessDetails, AuthError> {
        let header = header.ok_or_else(|| {
            warn!(function = "authenticate", "missing authorization header");
            AuthError::Unauthorized
        })?;

        let details = self.tokens.extract_identity(header).map_err(|e| {
            error!(function = "authenticate", error = %e, "invalid token");
            AuthError::Unauthorized
        })?;

        match self.sessions.lookup_access(&details.access_id).await {
            Ok(owner) if owner == details.subject_id => Ok(details),
            Ok(owner) => {
                error!(function = "authenticate", uid = %details.subject_id, owner = %owner, "session owner mismatch");
                Err(AuthError::Unauthorized)
            }
            Err(e) => {
                error!(function = "authenticate", uid = %details.subject_id, error = %e, "session not usable");
                Err(AuthError::Unauthorized)
            }
        }
    }

    /// Ownership and role check for an operation on `target_subject`.
    ///
    /// Only an admin acting on their own identifier passes.
    pub fn authorize(&self, target_subject: &str, details: &AccessDetails) -> Result<(), AuthError> {
        if target_subject != details.subject_id {
            error!(
                function = "authorize",
                uid = %details.subject_id,
                target = %target_subject,
                "caller does not own the target resource"
            );
            return Err(AuthError::Unauthorized);
        }

        if details.role != ADMIN_ROLE {
            error!(function = "authorize", uid = %details.subject_id, role = %details.role, "role not allowed");
            return Err(AuthError::Unauthorized);
        }

        Ok(())
    }

    /// Ends the session behind `details`.
    pub async fn logout(&self, details: &AccessDetails) -> Result<(), AppError> {
        self.sessions.revoke_session(details).await?;
        info!(uid = %details.subject_id, access_uuid = %details.access_id, "session closed");
        Ok(())
    }

    /// Trades a live refresh token for a new pair. The refresh entry is
    /// consumed atomically, so of any number of concurrent calls with the
    /// same token at most one succeeds.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AppError> {
        let details = self.tokens.extract_refresh(refresh_token).map_err(|e| {
            error!(function = "refresh", error = %e, "invalid refresh token");
            AuthError::Unauthorized
        })?;

        match self.sessions.consume_refresh(&details.refresh_id).await {
            Ok(owner) if owner == details.subject_id => {}
            Ok(owner) => {
                error!(function = "refresh", uid = %details.subject_id, owner = %owner, "refresh owner mismatch");
                return Err(AuthError::Unauthorized.into());
            }
            Err(StoreError::NotFound) => {
                error!(function = "refresh", uid = %details.subject_id, "refresh session not found");
                return Err(AuthError::Unauthorized.into());
            }
            Err(e) => return Err(e.into()),
        }

        if let Some((access_id, _)) = split_refresh_id(&details.refresh_id) {
            if let Err(e) = self.sessions.revoke_access(access_id).await {
                warn!(function = "refresh", error = %e, "could not revoke paired access entry");
            }
        }

        self.issue(&details.subject_id, &details.role).await
    }
}

/// Extractor for handlers that require a live session.
#[derive(Debug, Clone)]
pub struct Authenticated(pub AccessDetails);

impl FromRequest for Authenticated {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let guard = req.app_data::<web::Data<AppState>>().map(|state| state.guard.clone());
        let header = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .map(str::to_owned);

        Box::pin(async move {
            let guard = guard.ok_or_else(|| AppError::InternalError("application state missing".into()))?;
            let details = guard.authenticate(header.as_deref()).await?;
            Ok(Authenticated(details))
        })
    }
}
