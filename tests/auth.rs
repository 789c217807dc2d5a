use chrono::Duration;
use project_gate::{
    auth::{
        token::refresh_id, AccessGuard, MemoryStore, RateLimitConfig, RateLimiter, SessionStore,
        TokenLifetimes, TokenService,
    },
    error::{AuthError, StoreError},
};
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

fn sessions() -> Arc<SessionStore> {
    Arc::new(SessionStore::new(
        Arc::new(MemoryStore::new()),
        std::time::Duration::from_millis(500),
    ))
}

#[test_log::test]
fn test_issue_then_verify_for_many_subjects() {
    let tokens = TokenService::new("integration_secret");

    for (uid, role) in [("u-1", "admin"), ("u-2", "member"), ("odd++uid", "viewer"), ("", "")] {
        let pair = assert_ok!(tokens.issue_access_token(uid, role));
        let claims = assert_ok!(tokens.verify_signature(&pair.access_token));
        assert_eq!(claims.string("uid").unwrap(), uid);
        assert_eq!(claims.string("role").unwrap(), role);
    }
}

#[test_log::test(tokio::test)]
async fn test_session_lifecycle() {
    let guard = AccessGuard::new(Arc::new(TokenService::new("integration_secret")), sessions());

    // Issued -> Valid
    let pair = assert_ok!(guard.issue("user-1", "admin").await);
    let header = format!("Bearer {}", pair.access_token);
    let details = assert_ok!(guard.authenticate(Some(&header)).await);

    // Valid -> Revoked
    assert_ok!(guard.logout(&details).await);
    assert_eq!(
        guard.sessions().lookup_access(&details.access_id).await.unwrap_err(),
        StoreError::NotFound
    );
    assert_eq!(
        guard
            .sessions()
            .lookup_refresh(&refresh_id(&details.access_id, &details.subject_id))
            .await
            .unwrap_err(),
        StoreError::NotFound
    );
    assert_err!(guard.authenticate(Some(&header)).await);
}

#[test_log::test(tokio::test)]
async fn test_expired_credentials_are_unusable() {
    let tokens = TokenService::with_lifetimes(
        "integration_secret",
        TokenLifetimes {
            access: Duration::seconds(-1),
            refresh: Duration::seconds(-1),
        },
    );
    let pair = assert_ok!(tokens.issue_access_token("user-1", "admin"));
    assert_eq!(
        tokens.verify_signature(&pair.access_token).unwrap_err(),
        AuthError::TokenExpired
    );

    let guard = AccessGuard::new(Arc::new(tokens), sessions());
    let pair = assert_ok!(guard.issue("user-1", "admin").await);
    let header = format!("Bearer {}", pair.access_token);
    assert_eq!(
        guard.authenticate(Some(&header)).await.unwrap_err(),
        AuthError::Unauthorized
    );
    assert_err!(guard.refresh(&pair.refresh_token).await);
}

#[test]
fn test_default_admission_gate() {
    let limiter = RateLimiter::new(RateLimitConfig::default());
    let admitted = (0..20).filter(|_| limiter.allow()).count();
    // burst of 5, refill is too slow to matter within this loop
    assert!((5..=6).contains(&admitted));
}
