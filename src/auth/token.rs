//! Signed access/refresh credentials.
//!
//! Tokens are HMAC-signed JWTs carrying the claim names the rest of the
//! platform already understands (`access_uuid`, `refresh_uuid`, `uid`,
//! `role`, `expires_at`). Nothing here touches the session store; the
//! service only builds and checks claims.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::error;
use uuid::Uuid;

use crate::error::AuthError;

const REFRESH_SEPARATOR: &str = "++";

/// Builds the refresh identifier paired with an access identifier.
///
/// Issuance and revocation must agree on this derivation, so it lives here
/// and nowhere else.
pub fn refresh_id(access_id: &str, subject_id: &str) -> String {
    format!("{}{}{}", access_id, REFRESH_SEPARATOR, subject_id)
}

/// Splits a refresh identifier into `(access_id, subject_id)`.
///
/// Access identifiers are UUIDs and never contain the separator, so the
/// first occurrence is always the boundary even if the subject contains it.
pub fn split_refresh_id(refresh_id: &str) -> Option<(&str, &str)> {
    refresh_id
        .split_once(REFRESH_SEPARATOR)
        .filter(|(access, subject)| !access.is_empty() && !subject.is_empty())
}

/// Pulls the token out of an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Result<&str, AuthError> {
    let mut parts = header.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() => {
            Ok(token)
        }
        _ => {
            error!(function = "bearer_token", "invalid authorization header shape");
            Err(AuthError::Malformed)
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TokenLifetimes {
    pub access: Duration,
    pub refresh: Duration,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access: Duration::minutes(15),
            refresh: Duration::hours(72),
        }
    }
}

/// Everything produced by a successful login.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_id: String,
    pub refresh_id: String,
    pub access_expires_at: i64,
    pub refresh_expires_at: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccessClaims {
    pub authorized: bool,
    pub access_uuid: String,
    pub uid: String,
    pub role: String,
    pub expires_at: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub refresh_uuid: String,
    pub uid: String,
    pub role: String,
    pub expires_at: i64,
}

/// Identity carried by a verified access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDetails {
    pub access_id: String,
    pub subject_id: String,
    pub role: String,
}

/// Identity carried by a verified refresh token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshDetails {
    pub refresh_id: String,
    pub subject_id: String,
    pub role: String,
}

/// Claim set of a token whose signature and expiry have been checked.
#[derive(Debug, Clone)]
pub struct VerifiedClaims(Map<String, Value>);

impl VerifiedClaims {
    /// A claim that must be present and string-typed.
    pub fn string(&self, name: &'static str) -> Result<&str, AuthError> {
        self.0.get(name).and_then(Value::as_str).ok_or_else(|| {
            error!(function = "VerifiedClaims::string", claim = name, "missing or non-string claim");
            AuthError::MissingClaim(name)
        })
    }

    pub fn expires_at(&self) -> Result<i64, AuthError> {
        self.0
            .get("expires_at")
            .and_then(Value::as_i64)
            .ok_or(AuthError::MissingClaim("expires_at"))
    }

    pub fn authorized(&self) -> bool {
        self.0.get("authorized").and_then(Value::as_bool).unwrap_or(false)
    }
}

pub struct TokenService {
    secret: String,
    lifetimes: TokenLifetimes,
}

impl TokenService {
    pub fn new(secret: impl Into<String>) -> Self {
        Self::with_lifetimes(secret, TokenLifetimes::default())
    }

    pub fn with_lifetimes(secret: impl Into<String>, lifetimes: TokenLifetimes) -> Self {
        Self {
            secret: secret.into(),
            lifetimes,
        }
    }

    fn secret(&self) -> Result<&[u8], AuthError> {
        if self.secret.is_empty() {
            error!(function = "TokenService::secret", "access secret is not configured");
            return Err(AuthError::SigningError("access secret is not configured".into()));
        }
        Ok(self.secret.as_bytes())
    }

    fn sign<T: Serialize>(&self, claims: &T) -> Result<String, AuthError> {
        let key = EncodingKey::from_secret(self.secret()?);
        encode(&Header::new(Algorithm::HS256), claims, &key)
            .map_err(|e| AuthError::SigningError(e.to_string()))
    }

    /// Issues a fresh access token and its paired refresh token.
    pub fn issue_access_token(&self, subject_id: &str, role: &str) -> Result<TokenPair, AuthError> {
        let access_id = Uuid::new_v4().to_string();
        let access_expires_at = (Utc::now() + self.lifetimes.access).timestamp();

        let claims = AccessClaims {
            authorized: true,
            access_uuid: access_id.clone(),
            uid: subject_id.to_string(),
            role: role.to_string(),
            expires_at: access_expires_at,
        };

        let access_token = self.sign(&claims).map_err(|e| {
            error!(function = "issue_access_token", error = %e, "error signing access token");
            e
        })?;

        let mut pair = TokenPair {
            access_token,
            refresh_token: String::new(),
            access_id,
            refresh_id: String::new(),
            access_expires_at,
            refresh_expires_at: 0,
        };

        pair.refresh_token = self.issue_refresh_token(subject_id, role, &mut pair)?;
        Ok(pair)
    }

    /// Fills in the refresh half of `pair` and returns the signed refresh token.
    pub fn issue_refresh_token(
        &self,
        subject_id: &str,
        role: &str,
        pair: &mut TokenPair,
    ) -> Result<String, AuthError> {
        pair.refresh_expires_at = (Utc::now() + self.lifetimes.refresh).timestamp();
        pair.refresh_id = refresh_id(&pair.access_id, subject_id);

        let claims = RefreshClaims {
            refresh_uuid: pair.refresh_id.clone(),
            uid: subject_id.to_string(),
            role: role.to_string(),
            expires_at: pair.refresh_expires_at,
        };

        self.sign(&claims).map_err(|e| {
            error!(function = "issue_refresh_token", error = %e, "error signing refresh token");
            e
        })
    }

    /// Checks algorithm, signature and `expires_at` of a raw token.
    pub fn verify_signature(&self, token: &str) -> Result<VerifiedClaims, AuthError> {
        let key = DecodingKey::from_secret(self.secret()?);

        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        validation.required_spec_claims.clear();
        // Expiry lives in `expires_at`, not the registered `exp` claim.
        validation.validate_exp = false;

        let data = decode::<Map<String, Value>>(token, &key, &validation).map_err(|e| {
            error!(function = "verify_signature", error = %e, "error parsing token");
            AuthError::from(e)
        })?;

        let claims = VerifiedClaims(data.claims);
        if Utc::now().timestamp() >= claims.expires_at()? {
            error!(function = "verify_signature", "token has expired");
            return Err(AuthError::TokenExpired);
        }

        Ok(claims)
    }

    /// Verifies the credential inside an `Authorization` header value.
    pub fn verify_bearer(&self, header: &str) -> Result<VerifiedClaims, AuthError> {
        self.verify_signature(bearer_token(header)?)
    }

    /// Verifies the bearer credential and returns its access identity.
    ///
    /// Every missing claim is an error; a verified token never yields an
    /// empty identity.
    pub fn extract_identity(&self, header: &str) -> Result<AccessDetails, AuthError> {
        let claims = self.verify_bearer(header)?;

        if !claims.authorized() {
            error!(function = "extract_identity", "token is not an authorized access token");
            return Err(AuthError::MissingClaim("authorized"));
        }

        Ok(AccessDetails {
            access_id: claims.string("access_uuid")?.to_string(),
            subject_id: claims.string("uid")?.to_string(),
            role: claims.string("role")?.to_string(),
        })
    }

    /// Verifies a raw refresh token and returns its identity.
    pub fn extract_refresh(&self, token: &str) -> Result<RefreshDetails, AuthError> {
        let claims = self.verify_signature(token)?;

        let details = RefreshDetails {
            refresh_id: claims.string("refresh_uuid")?.to_string(),
            subject_id: claims.string("uid")?.to_string(),
            role: claims.string("role")?.to_string(),
        };

        match split_refresh_id(&details.refresh_id) {
            Some((_, subject)) if subject == details.subject_id => Ok(details),
            _ => {
                error!(function = "extract_refresh", uid = %details.subject_id, "refresh id does not match subject");
                Err(AuthError::InvalidSignature)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new("test_secret")
    }

    fn bearer(token: &str) -> String {
        format!("Bearer {}", token)
    }

    #[test]
    fn test_issue_then_verify() {
        let tokens = service();
        let pair = tokens.issue_access_token("user-1", "admin").unwrap();

        let claims = tokens.verify_signature(&pair.access_token).unwrap();
        assert_eq!(claims.string("uid").unwrap(), "user-1");
        assert_eq!(claims.string("role").unwrap(), "admin");
        assert_eq!(claims.string("access_uuid").unwrap(), pair.access_id);
        assert!(claims.authorized());
        assert_eq!(claims.expires_at().unwrap(), pair.access_expires_at);
    }

    #[test]
    fn test_pair_lifetimes_and_refresh_id() {
        let pair = service().issue_access_token("user-1", "member").unwrap();
        let now = Utc::now().timestamp();

        assert!((pair.access_expires_at - (now + 15 * 60)).abs() <= 2);
        assert!((pair.refresh_expires_at - (now + 72 * 3600)).abs() <= 2);
        assert_eq!(pair.refresh_id, format!("{}++user-1", pair.access_id));
        assert!(Uuid::parse_str(&pair.access_id).is_ok());
    }

    #[test]
    fn test_access_ids_are_unique() {
        let tokens = service();
        let a = tokens.issue_access_token("user-1", "admin").unwrap();
        let b = tokens.issue_access_token("user-1", "admin").unwrap();
        assert_ne!(a.access_id, b.access_id);
    }

    #[test]
    fn test_expired_token_fails() {
        let tokens = TokenService::with_lifetimes(
            "test_secret",
            TokenLifetimes {
                access: Duration::seconds(-1),
                refresh: Duration::seconds(-1),
            },
        );
        let pair = tokens.issue_access_token("user-1", "admin").unwrap();

        assert_eq!(tokens.verify_signature(&pair.access_token).unwrap_err(), AuthError::TokenExpired);
        assert_eq!(tokens.extract_refresh(&pair.refresh_token).unwrap_err(), AuthError::TokenExpired);
    }

    #[test]
    fn test_foreign_secret_is_invalid_signature() {
        let pair = TokenService::new("other_secret").issue_access_token("user-1", "admin").unwrap();
        assert_eq!(service().verify_signature(&pair.access_token).unwrap_err(), AuthError::InvalidSignature);
    }

    #[test]
    fn test_non_hmac_algorithm_rejected() {
        // header {"alg":"RS256","typ":"JWT"}, payload {"uid":"u1"}
        let token = "eyJhbGciOiJSUzI1NiIsInR5cCI6IkpXVCJ9.eyJ1aWQiOiJ1MSJ9.c2ln";
        assert_eq!(service().verify_signature(token).unwrap_err(), AuthError::InvalidAlgorithm);
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert_eq!(service().verify_signature("not-a-token").unwrap_err(), AuthError::Malformed);
    }

    #[test]
    fn test_bearer_header_shape() {
        assert_eq!(bearer_token("Bearer abc").unwrap(), "abc");
        assert_eq!(bearer_token("Bearer").unwrap_err(), AuthError::Malformed);
        assert_eq!(bearer_token("Bearer a b").unwrap_err(), AuthError::Malformed);
        assert_eq!(bearer_token("Basic abc").unwrap_err(), AuthError::Malformed);
        assert_eq!(bearer_token("").unwrap_err(), AuthError::Malformed);
    }

    #[test]
    fn test_extract_identity() {
        let tokens = service();
        let pair = tokens.issue_access_token("user-1", "admin").unwrap();

        let details = tokens.extract_identity(&bearer(&pair.access_token)).unwrap();
        assert_eq!(
            details,
            AccessDetails {
                access_id: pair.access_id.clone(),
                subject_id: "user-1".into(),
                role: "admin".into(),
            }
        );
    }

    #[test]
    fn test_extract_identity_missing_role_is_an_error() {
        #[derive(Serialize)]
        struct NoRole<'a> {
            authorized: bool,
            access_uuid: &'a str,
            uid: &'a str,
            expires_at: i64,
        }

        let tokens = service();
        let token = tokens
            .sign(&NoRole {
                authorized: true,
                access_uuid: "a-1",
                uid: "user-1",
                expires_at: Utc::now().timestamp() + 60,
            })
            .unwrap();

        assert_eq!(
            tokens.extract_identity(&bearer(&token)).unwrap_err(),
            AuthError::MissingClaim("role")
        );
    }

    #[test]
    fn test_refresh_token_is_not_an_access_token() {
        let tokens = service();
        let pair = tokens.issue_access_token("user-1", "admin").unwrap();
        assert!(tokens.extract_identity(&bearer(&pair.refresh_token)).is_err());
    }

    #[test]
    fn test_extract_refresh() {
        let tokens = service();
        let pair = tokens.issue_access_token("user-1", "admin").unwrap();

        let details = tokens.extract_refresh(&pair.refresh_token).unwrap();
        assert_eq!(details.refresh_id, pair.refresh_id);
        assert_eq!(details.subject_id, "user-1");
        assert_eq!(details.role, "admin");
    }

    #[test]
    fn test_missing_secret_is_signing_error() {
        let tokens = TokenService::new("");
        assert!(matches!(
            tokens.issue_access_token("user-1", "admin"),
            Err(AuthError::SigningError(_))
        ));
    }

    #[test]
    fn test_refresh_id_split() {
        let id = refresh_id("6f1c", "user++odd");
        assert_eq!(split_refresh_id(&id), Some(("6f1c", "user++odd")));
        assert_eq!(split_refresh_id("no-separator"), None);
        assert_eq!(split_refresh_id("++user"), None);
    }
}
