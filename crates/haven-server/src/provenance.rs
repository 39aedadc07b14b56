//! Provenance for the external API: every call opens an `ApiLog` entry
//! before any access check, so rejected attempts stay auditable.

use std::convert::Infallible;
use std::net::IpAddr;

use axum::async_trait;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Method};

use haven_shared::constants::{APPLICATION_ID_HEADER, BAD_TOKEN_ACCESS, UNKNOWN_TOKEN};
use haven_shared::scope::TokenScope;
use haven_store::{ApiLog, Database, NewApiLog, Principal};

use crate::auth::resolve_principal;
use crate::error::ServerError;

/// Facts about the caller taken from the connection and its headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub application_id: Option<String>,
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ClientInfo {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let application_id = parts
            .headers
            .get(APPLICATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        Ok(Self {
            ip: extract_client_ip(parts).map(|ip| ip.to_string()),
            application_id,
        })
    }
}

/// Try ConnectInfo first, then X-Forwarded-For, then X-Real-IP.
fn extract_client_ip(parts: &Parts) -> Option<IpAddr> {
    if let Some(connect_info) = parts.extensions.get::<ConnectInfo<std::net::SocketAddr>>() {
        return Some(connect_info.0.ip());
    }

    if let Some(forwarded) = parts.headers.get("x-forwarded-for") {
        if let Ok(value) = forwarded.to_str() {
            if let Some(first) = value.split(',').next() {
                if let Ok(ip) = first.trim().parse::<IpAddr>() {
                    return Some(ip);
                }
            }
        }
    }

    if let Some(real_ip) = parts.headers.get("x-real-ip") {
        if let Ok(value) = real_ip.to_str() {
            if let Ok(ip) = value.trim().parse::<IpAddr>() {
                return Some(ip);
            }
        }
    }

    None
}

/// An accepted external call: who made it and where its outcome is logged.
#[derive(Debug, Clone)]
pub struct Admitted {
    pub principal: Principal,
    pub log: ApiLog,
}

/// What a call is about, as recorded on its provenance entry.
pub struct CallSubject<'a> {
    pub api_type: &'a str,
    pub method: &'a Method,
    pub payload: Option<String>,
}

/// Open the provenance entry for a call, then check the caller's token.
///
/// Unknown tokens are refused with 401, tokens without `scope` with 403
/// carrying `forbidden_message`. Both leave a note on the entry first.
pub fn admit(
    db: &Database,
    headers: &HeaderMap,
    client: &ClientInfo,
    subject: CallSubject<'_>,
    scope: TokenScope,
    forbidden_message: &str,
) -> Result<Admitted, ServerError> {
    let principal = resolve_principal(db, headers)?;

    let log = db.create_api_log(NewApiLog {
        crew_id: principal.as_ref().map(|p| p.crew_id),
        user_id: principal.as_ref().map(|p| p.user_id),
        ip: client.ip.clone(),
        application_id: client.application_id.clone(),
        api_type: subject.api_type.to_string(),
        http_method: subject.method.as_str().to_string(),
        payload: subject.payload,
    })?;

    let Some(principal) = principal else {
        db.append_api_log_response(log.id, UNKNOWN_TOKEN)?;
        tracing::warn!(api_log = %log.id, ip = ?client.ip, "external call with unknown token");
        return Err(ServerError::Unauthorized(UNKNOWN_TOKEN.into()));
    };

    if !principal.scopes.allows(scope) {
        db.append_api_log_response(log.id, BAD_TOKEN_ACCESS)?;
        tracing::warn!(
            api_log = %log.id,
            user_id = %principal.user_id,
            scope = %scope.as_str(),
            "external call without the needed scope"
        );
        return Err(ServerError::Forbidden(forbidden_message.to_string()));
    }

    Ok(Admitted { principal, log })
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    fn parts(builder: axum::http::request::Builder) -> Parts {
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn client_info_reads_forwarded_ip_and_application_id() {
        let mut parts = parts(
            Request::builder()
                .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
                .header(APPLICATION_ID_HEADER, "tablet-4"),
        );
        let info = ClientInfo::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(info.ip.as_deref(), Some("203.0.113.9"));
        assert_eq!(info.application_id.as_deref(), Some("tablet-4"));
    }

    #[tokio::test]
    async fn connection_address_wins_over_headers() {
        let mut parts = parts(Request::builder().header("x-real-ip", "198.51.100.2"));
        parts
            .extensions
            .insert(ConnectInfo(std::net::SocketAddr::from(([192, 0, 2, 1], 4000))));
        let info = ClientInfo::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(info.ip.as_deref(), Some("192.0.2.1"));
        assert_eq!(info.application_id, None);
    }
}
