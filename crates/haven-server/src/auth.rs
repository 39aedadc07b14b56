//! Bearer-token authentication for the tenant APIs and the admin API.

use axum::http::HeaderMap;
use subtle::ConstantTimeEq;

use haven_shared::constants::UNKNOWN_TOKEN;
use haven_shared::scope::TokenScope;
use haven_store::{Database, Principal};

use crate::config::ServerConfig;
use crate::error::ServerError;

/// The secret of an `Authorization: Bearer <secret>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let auth = headers.get("authorization")?.to_str().ok()?;
    let token = auth.strip_prefix("Bearer ").unwrap_or(auth).trim();
    (!token.is_empty()).then_some(token)
}

/// Resolve the presented token, if any, to a principal.
pub fn resolve_principal(db: &Database, headers: &HeaderMap) -> Result<Option<Principal>, ServerError> {
    match bearer_token(headers) {
        Some(secret) => Ok(db.authenticate(secret)?),
        None => Ok(None),
    }
}

/// Resolve the principal and check it holds `scope`. Used by the tenant
/// management API, which is not provenance-logged.
pub fn require_scope(db: &Database, headers: &HeaderMap, scope: TokenScope) -> Result<Principal, ServerError> {
    let principal =
        resolve_principal(db, headers)?.ok_or_else(|| ServerError::Unauthorized(UNKNOWN_TOKEN.into()))?;
    if !principal.scopes.allows(scope) {
        tracing::warn!(user_id = %principal.user_id, scope = %scope.as_str(), "token lacks scope");
        return Err(ServerError::Forbidden(format!(
            "Token is missing the '{}' scope",
            scope.as_str()
        )));
    }
    Ok(principal)
}

pub fn verify_admin_token(headers: &HeaderMap, config: &ServerConfig) -> Result<(), ServerError> {
    let Some(ref expected) = config.admin_token else {
        return Err(ServerError::Forbidden(
            "Admin API is disabled (no ADMIN_TOKEN configured)".into(),
        ));
    };

    let token = bearer_token(headers).unwrap_or("");

    // Constant-time comparison of the admin secret.
    let token_bytes = token.as_bytes();
    let expected_bytes = expected.as_bytes();
    if token_bytes.len() != expected_bytes.len() || token_bytes.ct_eq(expected_bytes).unwrap_u8() != 1 {
        return Err(ServerError::Forbidden("Invalid admin token".into()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(auth: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_str(auth).unwrap());
        headers
    }

    #[test]
    fn bearer_prefix_is_optional() {
        assert_eq!(bearer_token(&headers("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&headers("abc")), Some("abc"));
        assert_eq!(bearer_token(&headers("Bearer ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn admin_token_must_match_exactly() {
        let config = ServerConfig {
            admin_token: Some("s3cret".into()),
            ..ServerConfig::default()
        };
        assert!(verify_admin_token(&headers("Bearer s3cret"), &config).is_ok());
        assert!(verify_admin_token(&headers("Bearer s3cre"), &config).is_err());
        assert!(verify_admin_token(&HeaderMap::new(), &config).is_err());
    }

    #[test]
    fn admin_api_disabled_without_token() {
        let config = ServerConfig::default();
        assert!(matches!(
            verify_admin_token(&headers("Bearer anything"), &config),
            Err(ServerError::Forbidden(_))
        ));
    }
}
